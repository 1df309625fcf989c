use serde::{Deserialize, Serialize};

/// Access represents a bitmask of rights an actor holds on a shareable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Access(u32);

impl Access {
    pub const READ: Access = Access(1 << 0); // 1
    pub const EDIT: Access = Access(1 << 1); // 2
    pub const SHARE: Access = Access(1 << 2); // 4
    pub const DELETE: Access = Access(1 << 3); // 8

    /// Returns true if this bitmask contains the required access.
    #[must_use]
    pub const fn has(self, required: Access) -> bool {
        self.0 & required.0 == required.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn union(self, other: Access) -> Access {
        Access(self.0 | other.0)
    }

    /// Everything an owner holds. Sharing and deletion never come from a grant.
    #[must_use]
    pub const fn owner() -> Access {
        Access(Self::READ.0 | Self::EDIT.0 | Self::SHARE.0 | Self::DELETE.0)
    }

    /// Rights conferred by a share grant.
    /// An editing grant implies read.
    #[must_use]
    pub const fn from_grant(can_edit: bool) -> Access {
        if can_edit {
            Access(Self::READ.0 | Self::EDIT.0)
        } else {
            Self::READ
        }
    }

    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        let mut rights = Vec::new();
        if self.has(Self::READ) {
            rights.push("read");
        }
        if self.has(Self::EDIT) {
            rights.push("edit");
        }
        if self.has(Self::SHARE) {
            rights.push("share");
        }
        if self.has(Self::DELETE) {
            rights.push("delete");
        }
        rights
    }
}

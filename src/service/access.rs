//! Read, edit and delete rules for shareable resources.

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Access, Resource};

/// Computes every right `actor_id` holds on the resource.
///
/// Owners hold everything. A share grant confers read, plus edit when
/// `can_edit` is set. Public resources are readable by anyone.
pub fn access_for(store: &dyn Store, resource: &Resource, actor_id: &str) -> Result<Access> {
    if resource.owner_id == actor_id {
        return Ok(Access::owner());
    }

    let mut access = store
        .get_share(&resource.id, actor_id)?
        .map(|grant| Access::from_grant(grant.can_edit))
        .unwrap_or_default();

    if resource.is_public {
        access = access.union(Access::READ);
    }

    Ok(access)
}

pub fn can_read(store: &dyn Store, resource: &Resource, actor_id: &str) -> Result<bool> {
    Ok(access_for(store, resource, actor_id)?.has(Access::READ))
}

pub fn can_edit(store: &dyn Store, resource: &Resource, actor_id: &str) -> Result<bool> {
    Ok(access_for(store, resource, actor_id)?.has(Access::EDIT))
}

/// Shares never grant delete.
pub fn can_delete(resource: &Resource, actor_id: &str) -> bool {
    resource.owner_id == actor_id
}

pub fn require_read(store: &dyn Store, resource: &Resource, actor_id: &str) -> Result<Access> {
    let access = access_for(store, resource, actor_id)?;
    if !access.has(Access::READ) {
        return Err(Error::forbidden(format!(
            "Not authorized to view this {}",
            resource.kind
        )));
    }
    Ok(access)
}

pub fn require_edit(store: &dyn Store, resource: &Resource, actor_id: &str) -> Result<Access> {
    let access = access_for(store, resource, actor_id)?;
    if !access.has(Access::EDIT) {
        return Err(Error::forbidden(format!(
            "Not authorized to edit this {}",
            resource.kind
        )));
    }
    Ok(access)
}

/// Owner-only operations: delete, share management, project placement.
pub fn require_owner(resource: &Resource, actor_id: &str, action: &str) -> Result<()> {
    if resource.owner_id != actor_id {
        return Err(Error::forbidden(format!(
            "Only the owner can {action} this {}",
            resource.kind
        )));
    }
    Ok(())
}

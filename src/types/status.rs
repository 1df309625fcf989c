//! Lifecycle statuses and their transition tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A status that moves through a fixed set of legal transitions.
pub trait Lifecycle: Copy + Eq + fmt::Display {
    /// Returns true if moving from `self` to `next` is a legal transition.
    fn can_transition_to(self, next: Self) -> bool;

    /// Returns true if no transition out of this status exists.
    fn is_terminal(self) -> bool;
}

macro_rules! status_strings {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($ty::$variant),)+
                    other => Err(format!(
                        "invalid {}: {other}",
                        stringify!($ty)
                    )),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

status_strings!(RequestStatus {
    Open => "open",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl Lifecycle for RequestStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Open, InProgress) | (Open, Cancelled) | (InProgress, Completed) | (InProgress, Cancelled)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }
}

/// Conversations only move forward: active, negotiating, agreed, completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Negotiating,
    Agreed,
    Completed,
}

status_strings!(ConversationStatus {
    Active => "active",
    Negotiating => "negotiating",
    Agreed => "agreed",
    Completed => "completed",
});

impl ConversationStatus {
    const fn rank(self) -> u8 {
        match self {
            ConversationStatus::Active => 0,
            ConversationStatus::Negotiating => 1,
            ConversationStatus::Agreed => 2,
            ConversationStatus::Completed => 3,
        }
    }
}

impl Lifecycle for ConversationStatus {
    fn can_transition_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }

    fn is_terminal(self) -> bool {
        self == ConversationStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    Proposed,
    Accepted,
}

status_strings!(AgreementStatus {
    Proposed => "proposed",
    Accepted => "accepted",
});

impl Lifecycle for AgreementStatus {
    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (AgreementStatus::Proposed, AgreementStatus::Accepted)
        )
    }

    fn is_terminal(self) -> bool {
        self == AgreementStatus::Accepted
    }
}

/// Sessions move freely between open and in_progress until resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    InProgress,
    Resolved,
}

status_strings!(SessionStatus {
    Open => "open",
    InProgress => "in_progress",
    Resolved => "resolved",
});

impl Lifecycle for SessionStatus {
    fn can_transition_to(self, next: Self) -> bool {
        !self.is_terminal() && self != next
    }

    fn is_terminal(self) -> bool {
        self == SessionStatus::Resolved
    }
}

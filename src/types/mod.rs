mod access;
mod models;
mod status;

pub use access::Access;
pub use models::*;
pub use status::{
    AgreementStatus, ConversationStatus, Lifecycle, RequestStatus, SessionStatus,
};

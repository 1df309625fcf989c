mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// A session message before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewSessionMessage {
    pub session_id: String,
    pub participant_id: Option<String>,
    pub content: String,
    pub message_type: String,
    pub metadata: Option<serde_json::Value>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing the resources a user owns.
#[derive(Debug, Clone, Default)]
pub struct OwnedResourceFilter<'a> {
    pub kind: Option<ResourceKind>,
    pub project_id: Option<&'a str>,
}

/// Store defines the database interface.
///
/// Every method is one logical transaction. Status-changing methods take the
/// status the caller observed and return `false`/`None` when the row has moved
/// on in the meantime.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>>;
    fn search_users(&self, prefix: &str, limit: i32) -> Result<Vec<User>>;
    fn set_user_active(&self, id: &str, is_active: bool) -> Result<()>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    // Project operations
    fn create_project(&self, project: &Project) -> Result<()>;
    fn get_project(&self, id: &str) -> Result<Option<Project>>;
    fn list_user_projects(&self, owner_id: &str) -> Result<Vec<Project>>;
    fn count_project_requests_by_status(&self, project_id: &str)
    -> Result<Vec<(RequestStatus, i64)>>;
    fn count_project_conversations_by_status(
        &self,
        project_id: &str,
    ) -> Result<Vec<(ConversationStatus, i64)>>;

    // Resource operations (notes and requests)
    fn create_resource(&self, resource: &Resource) -> Result<()>;
    fn get_resource(&self, id: &str) -> Result<Option<Resource>>;
    /// Writes every mutable field, guarded by the `updated_at` the caller read.
    fn update_resource(&self, resource: &Resource, expected_updated_at: &DateTime<Utc>)
    -> Result<bool>;
    fn delete_resource(&self, id: &str) -> Result<bool>;
    fn list_owned_resources(
        &self,
        owner_id: &str,
        filter: &OwnedResourceFilter<'_>,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Resource>>;
    fn list_shared_resources(
        &self,
        grantee_id: &str,
        kind: Option<ResourceKind>,
    ) -> Result<Vec<(Resource, ShareGrant)>>;
    fn list_public_resources(
        &self,
        kind: ResourceKind,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Resource>>;

    // Share grant operations
    fn create_share(&self, grant: &ShareGrant) -> Result<()>;
    fn get_share(&self, resource_id: &str, grantee_id: &str) -> Result<Option<ShareGrant>>;
    fn update_share(&self, resource_id: &str, grantee_id: &str, can_edit: bool) -> Result<bool>;
    fn delete_share(&self, resource_id: &str, grantee_id: &str) -> Result<bool>;
    fn list_resource_shares(&self, resource_id: &str) -> Result<Vec<ShareGrant>>;
    fn mark_share_viewed(&self, resource_id: &str, grantee_id: &str) -> Result<()>;

    // Conversation operations
    /// Inserts the conversation unless one already exists for the same
    /// (request, starter, recipient); returns the stored row either way.
    fn create_conversation(&self, conversation: &Conversation) -> Result<Conversation>;
    fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;
    fn list_user_conversations(
        &self,
        user_id: &str,
        request_id: Option<&str>,
    ) -> Result<Vec<Conversation>>;
    fn transition_conversation_status(
        &self,
        id: &str,
        from: ConversationStatus,
        to: ConversationStatus,
    ) -> Result<bool>;
    fn create_conversation_message(
        &self,
        conversation_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<ConversationMessage>;
    fn list_conversation_messages(&self, conversation_id: &str)
    -> Result<Vec<ConversationMessage>>;

    // Agreement operations
    fn create_agreement(&self, agreement: &Agreement, proposal: &NegotiationEntry) -> Result<()>;
    fn get_agreement(&self, id: &str) -> Result<Option<Agreement>>;
    fn get_agreement_by_request(&self, request_id: &str) -> Result<Option<Agreement>>;
    fn accept_agreement(
        &self,
        id: &str,
        acceptance: &NegotiationEntry,
        agreement_date: DateTime<Utc>,
    ) -> Result<bool>;
    fn list_negotiation_history(&self, agreement_id: &str) -> Result<Vec<NegotiationEntry>>;

    // Collaboration session operations
    fn create_session(&self, session: &CollaborationSession, creator: &Participant) -> Result<()>;
    fn get_session(&self, id: &str) -> Result<Option<CollaborationSession>>;
    fn transition_session_status(
        &self,
        id: &str,
        from: SessionStatus,
        to: SessionStatus,
        audit: &NewSessionMessage,
    ) -> Result<Option<SessionMessage>>;

    fn add_participant(&self, participant: &Participant) -> Result<()>;
    fn get_participant(&self, id: &str) -> Result<Option<Participant>>;
    fn get_participant_by_email(&self, session_id: &str, email: &str)
    -> Result<Option<Participant>>;
    fn get_participant_by_user(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>>;
    fn list_participants(&self, session_id: &str) -> Result<Vec<Participant>>;
    fn touch_participant(&self, id: &str) -> Result<()>;

    /// Fails with `BadRequest` if the session has been resolved.
    fn create_session_message(
        &self,
        message: &NewSessionMessage,
        attachment_ids: &[String],
    ) -> Result<SessionMessage>;
    fn list_session_messages(
        &self,
        session_id: &str,
        after_id: i64,
        limit: i32,
    ) -> Result<Vec<SessionMessage>>;

    /// Fails with `BadRequest` if the session has been resolved.
    fn create_attachment(&self, attachment: &Attachment) -> Result<()>;
    fn get_attachment(&self, id: &str) -> Result<Option<Attachment>>;
    fn list_message_attachments(&self, message_id: i64) -> Result<Vec<Attachment>>;
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::collaboration::SessionAccess;
use crate::types::{
    ConversationStatus, Resource, SessionStatus, Token, User, UserType,
};

// Admin

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub user_type: UserType,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            id: token.id,
            is_admin: token.is_admin,
            user_id: token.user_id,
            created_at: token.created_at,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: TokenResponse,
}

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub cursor: Option<String>,
}

// Users

/// What other users may see of an account.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub user_type: UserType,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            user_type: user.user_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserSearchParams {
    pub q: String,
    #[serde(default)]
    pub limit: Option<i32>,
}

// Notes and requests

#[derive(Debug, Deserialize)]
pub struct ListResourcesParams {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateResourceRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub estimated_budget: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    #[serde(flatten)]
    pub resource: Resource,
    /// The caller's rights on this resource.
    pub access: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProjectPlacementRequest {
    /// `null` detaches the resource from its project.
    pub project_id: Option<String>,
}

/// The grantee is named by id or by username.
#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    #[serde(default)]
    pub grantee_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub can_edit: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateShareRequest {
    pub can_edit: bool,
}

// Projects

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// Conversations and agreements

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsParams {
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationStatusRequest {
    pub status: ConversationStatus,
}

#[derive(Debug, Deserialize)]
pub struct PostConversationMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ProposeAgreementRequest {
    pub request_id: String,
    pub developer_id: String,
    pub client_id: String,
    pub price: f64,
    pub terms: String,
}

#[derive(Debug, Deserialize)]
pub struct AgreementLookupParams {
    pub request_id: String,
}

// Collaboration

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub external_ticket_id: i64,
    pub source_system: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub duration_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinSessionRequest {
    #[serde(default)]
    pub duration_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InviteParticipantRequest {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: String,
    #[serde(default)]
    pub duration_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SessionAccessResponse {
    #[serde(flatten)]
    pub access: SessionAccess,
    pub access_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionStatusRequest {
    pub status: SessionStatus,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub attachment_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesParams {
    #[serde(default)]
    pub after_id: Option<i64>,
    #[serde(default)]
    pub limit: Option<i32>,
}

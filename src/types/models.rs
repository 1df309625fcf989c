use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgreementStatus, ConversationStatus, RequestStatus, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Client,
    Developer,
}

impl UserType {
    pub const fn as_str(self) -> &'static str {
        match self {
            UserType::Client => "client",
            UserType::Developer => "developer",
        }
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(UserType::Client),
            "developer" => Ok(UserType::Developer),
            other => Err(format!("invalid user type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub user_type: UserType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Notes and requests share one visibility and sharing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Note,
    Request,
}

impl ResourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Note => "note",
            ResourceKind::Request => "request",
        }
    }

    /// Capitalized label for user-facing messages.
    pub const fn label(self) -> &'static str {
        match self {
            ResourceKind::Note => "Note",
            ResourceKind::Request => "Request",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "note" => Ok(ResourceKind::Note),
            "request" => Ok(ResourceKind::Request),
            other => Err(format!("invalid resource kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub kind: ResourceKind,
    pub owner_id: String,
    pub title: String,
    pub body: String,
    pub is_public: bool,
    pub contains_sensitive_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_to_project_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_budget: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareGrant {
    pub resource_id: String,
    pub grantee_id: String,
    pub can_edit: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub request_id: String,
    pub starter_id: String,
    pub recipient_id: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.starter_id == user_id || self.recipient_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: i64,
    pub conversation_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agreement {
    pub id: String,
    pub request_id: String,
    pub developer_id: String,
    pub client_id: String,
    pub price: f64,
    pub terms: String,
    pub status: AgreementStatus,
    pub proposed_by: String,
    pub proposed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_date: Option<DateTime<Utc>>,
}

impl Agreement {
    pub fn is_party(&self, user_id: &str) -> bool {
        self.developer_id == user_id || self.client_id == user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationAction {
    Proposal,
    Acceptance,
}

impl NegotiationAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            NegotiationAction::Proposal => "proposal",
            NegotiationAction::Acceptance => "acceptance",
        }
    }
}

impl FromStr for NegotiationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposal" => Ok(NegotiationAction::Proposal),
            "acceptance" => Ok(NegotiationAction::Acceptance),
            other => Err(format!("invalid negotiation action: {other}")),
        }
    }
}

/// One row of an agreement's append-only negotiation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationEntry {
    pub agreement_id: String,
    pub seq: i64,
    pub action: NegotiationAction,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub terms: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgreementWithHistory {
    #[serde(flatten)]
    pub agreement: Agreement,
    pub negotiation_history: Vec<NegotiationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationSession {
    pub id: String,
    pub external_ticket_id: i64,
    pub source_system: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

pub const RYZE_DEVELOPER_ROLE: &str = "ryze_developer";

/// Internal staff hold `ryze_developer`; everyone else carries a free-form external role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParticipantRole {
    RyzeDeveloper,
    External(String),
}

impl ParticipantRole {
    pub fn as_str(&self) -> &str {
        match self {
            ParticipantRole::RyzeDeveloper => RYZE_DEVELOPER_ROLE,
            ParticipantRole::External(role) => role,
        }
    }

    pub fn is_ryze_developer(&self) -> bool {
        matches!(self, ParticipantRole::RyzeDeveloper)
    }
}

impl From<String> for ParticipantRole {
    fn from(s: String) -> Self {
        if s == RYZE_DEVELOPER_ROLE {
            ParticipantRole::RyzeDeveloper
        } else {
            ParticipantRole::External(s)
        }
    }
}

impl From<ParticipantRole> for String {
    fn from(role: ParticipantRole) -> Self {
        role.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub email: String,
    pub display_name: String,
    pub role: ParticipantRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub const SYSTEM_MESSAGE_TYPE: &str = "system";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: i64,
    pub session_id: String,
    /// None for system messages.
    pub participant_id: Option<String>,
    pub content: String,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
    pub file_name: String,
    pub stored_path: String,
    pub content_type: String,
    pub size: i64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

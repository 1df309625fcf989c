//! Collaboration sessions bridging an external support ticket with internal
//! developers.
//!
//! Users reach a session through their API token only to create it, renew
//! their own access or invite others. Everything inside a session is done with a participant
//! access token minted here.

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;

use crate::auth::{SessionClaims, SessionTokens};
use crate::error::{Error, Result};
use crate::storage::AttachmentStorage;
use crate::store::{NewSessionMessage, Store};
use crate::types::{
    Attachment, CollaborationSession, Lifecycle, Participant, ParticipantRole,
    SYSTEM_MESSAGE_TYPE, SessionMessage, SessionStatus, User, UserType,
};

pub const DEFAULT_ACCESS_DAYS: i64 = 30;
const MAX_ACCESS_DAYS: i64 = 365;
const DEFAULT_MESSAGE_TYPE: &str = "text";
pub const MAX_MESSAGE_PAGE: i32 = 200;

#[derive(Debug, Clone)]
pub struct NewSession {
    pub external_ticket_id: i64,
    pub source_system: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct Invitation {
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub duration_days: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub content: String,
    pub message_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub attachment_ids: Vec<String>,
}

/// A participant's access token and where it leads.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAccess {
    pub session_id: String,
    pub participant: Participant,
    pub access_token: String,
    pub expires_at: chrono::DateTime<Utc>,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: CollaborationSession,
    pub participants: Vec<Participant>,
    pub current_participant_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: SessionMessage,
    pub attachments: Vec<Attachment>,
}

/// The session and participant a verified access token resolves to.
#[derive(Debug, Clone)]
pub struct ParticipantContext {
    pub session: CollaborationSession,
    pub participant: Participant,
}

impl ParticipantContext {
    /// The token must belong to the session named in the path.
    pub fn ensure_session(&self, session_id: &str) -> Result<()> {
        if self.session.id != session_id {
            return Err(Error::bad_request("Session ID mismatch"));
        }
        Ok(())
    }
}

fn access_duration(days: Option<i64>) -> Result<Duration> {
    let days = days.unwrap_or(DEFAULT_ACCESS_DAYS);
    if !(1..=MAX_ACCESS_DAYS).contains(&days) {
        return Err(Error::bad_request(format!(
            "duration_days must be between 1 and {MAX_ACCESS_DAYS}"
        )));
    }
    Ok(Duration::days(days))
}

fn mint_access(
    tokens: &SessionTokens,
    participant: Participant,
    valid_for: Duration,
) -> Result<SessionAccess> {
    let minted = tokens.mint(&participant.session_id, &participant.id, valid_for)?;
    Ok(SessionAccess {
        session_id: participant.session_id.clone(),
        participant,
        access_token: minted.token,
        expires_at: minted.expires_at,
        expires_in: valid_for.num_seconds(),
    })
}

fn load_session(store: &dyn Store, id: &str) -> Result<CollaborationSession> {
    store
        .get_session(id)?
        .ok_or_else(|| Error::not_found("Session not found"))
}

fn require_developer(actor: &User, action: &str) -> Result<()> {
    if actor.user_type != UserType::Developer {
        return Err(Error::forbidden(format!(
            "Only developers can {action} collaboration sessions"
        )));
    }
    Ok(())
}

fn internal_participant(session_id: &str, actor: &User) -> Participant {
    Participant {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        user_id: Some(actor.id.clone()),
        email: actor.email.clone(),
        display_name: actor.username.clone(),
        role: ParticipantRole::RyzeDeveloper,
        last_viewed_at: None,
        created_at: Utc::now(),
    }
}

/// Opens a session for an external ticket. The creating developer becomes
/// its first `ryze_developer` participant.
pub fn create_session(
    store: &dyn Store,
    tokens: &SessionTokens,
    actor: &User,
    new: NewSession,
    duration_days: Option<i64>,
) -> Result<SessionAccess> {
    require_developer(actor, "create")?;
    let valid_for = access_duration(duration_days)?;

    if new.source_system.trim().is_empty() {
        return Err(Error::bad_request("source_system cannot be empty"));
    }

    let now = Utc::now();
    let session = CollaborationSession {
        id: uuid::Uuid::new_v4().to_string(),
        external_ticket_id: new.external_ticket_id,
        source_system: new.source_system,
        status: SessionStatus::Open,
        metadata: new.metadata,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    };
    let creator = internal_participant(&session.id, actor);

    store.create_session(&session, &creator)?;
    tracing::info!(id = %session.id, ticket = session.external_ticket_id, source = %session.source_system, by = %actor.id, "Created collaboration session");

    mint_access(tokens, creator, valid_for)
}

/// Re-issues an access token to a user who already takes part in the
/// session. Users outside the session cannot enter it this way.
pub fn join_session(
    store: &dyn Store,
    tokens: &SessionTokens,
    actor: &User,
    session_id: &str,
    duration_days: Option<i64>,
) -> Result<SessionAccess> {
    let valid_for = access_duration(duration_days)?;
    let session = load_session(store, session_id)?;

    let participant = store
        .get_participant_by_user(&session.id, &actor.id)?
        .ok_or_else(|| Error::forbidden("You don't have access to this session"))?;
    tracing::info!(session = %session.id, participant = %participant.id, user = %actor.id, "Re-issued session access");

    mint_access(tokens, participant, valid_for)
}

/// Issues an access token for an external party. An existing participant
/// with the same email is reused rather than duplicated.
pub fn invite(
    store: &dyn Store,
    tokens: &SessionTokens,
    actor: &User,
    session_id: &str,
    invitation: Invitation,
) -> Result<SessionAccess> {
    let session = load_session(store, session_id)?;
    if store.get_participant_by_user(&session.id, &actor.id)?.is_none() {
        return Err(Error::forbidden("You don't have access to this session"));
    }

    let valid_for = access_duration(invitation.duration_days)?;
    let email = invitation.email.trim().to_ascii_lowercase();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(Error::bad_request(format!("Invalid email '{email}'")));
    }

    let role = ParticipantRole::from(invitation.role.trim().to_string());
    if role.is_ryze_developer() {
        return Err(Error::bad_request(
            "Internal developers join with their own account",
        ));
    }
    if role.as_str().is_empty() {
        return Err(Error::bad_request("Role cannot be empty"));
    }

    let participant = match store.get_participant_by_email(&session.id, &email)? {
        Some(existing) => existing,
        None => {
            let display_name = invitation
                .display_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
            let participant = Participant {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session.id.clone(),
                user_id: None,
                email,
                display_name,
                role,
                last_viewed_at: None,
                created_at: Utc::now(),
            };
            store.add_participant(&participant)?;
            tracing::info!(session = %session.id, participant = %participant.id, role = %participant.role.as_str(), "Invited participant");
            participant
        }
    };

    mint_access(tokens, participant, valid_for)
}

/// Resolves verified token claims to a live session and participant, and
/// stamps the participant's `last_viewed_at`.
pub fn authenticate(store: &dyn Store, claims: &SessionClaims) -> Result<ParticipantContext> {
    let session = store.get_session(&claims.sid)?.ok_or(Error::Unauthorized)?;
    let participant = store
        .get_participant(&claims.pid)?
        .filter(|p| p.session_id == session.id)
        .ok_or(Error::Unauthorized)?;

    if let Err(e) = store.touch_participant(&participant.id) {
        tracing::warn!(participant = %participant.id, "Failed to update last_viewed_at: {}", e);
    }

    Ok(ParticipantContext {
        session,
        participant,
    })
}

pub fn view(store: &dyn Store, ctx: &ParticipantContext) -> Result<SessionView> {
    Ok(SessionView {
        session: load_session(store, &ctx.session.id)?,
        participants: store.list_participants(&ctx.session.id)?,
        current_participant_id: ctx.participant.id.clone(),
    })
}

/// Changes the session status and records a system message in the same
/// transaction. `resolved` is terminal.
pub fn change_status(
    store: &dyn Store,
    ctx: &ParticipantContext,
    next: SessionStatus,
) -> Result<(CollaborationSession, SessionMessage)> {
    if !ctx.participant.role.is_ryze_developer() {
        return Err(Error::forbidden("Only RYZE developers can update status"));
    }

    let session = load_session(store, &ctx.session.id)?;
    let current = session.status;
    if current.is_terminal() {
        return Err(Error::bad_request(format!(
            "Cannot change status from {current}"
        )));
    }
    if !current.can_transition_to(next) {
        return Err(Error::bad_request(format!("Session is already {current}")));
    }

    let audit = NewSessionMessage {
        session_id: session.id.clone(),
        participant_id: None,
        content: format!("Status changed to: {next}"),
        message_type: SYSTEM_MESSAGE_TYPE.to_string(),
        metadata: Some(json!({
            "previous_status": current,
            "new_status": next,
            "changed_by": ctx.participant.id,
        })),
        is_system: true,
        created_at: Utc::now(),
    };

    let message = store
        .transition_session_status(&session.id, current, next, &audit)?
        .ok_or_else(|| {
            Error::conflict("Session status changed concurrently, reload and retry")
        })?;

    tracing::info!(id = %session.id, from = %current, to = %next, by = %ctx.participant.id, "Session status changed");
    Ok((load_session(store, &session.id)?, message))
}

pub fn post_message(
    store: &dyn Store,
    ctx: &ParticipantContext,
    new: NewMessage,
) -> Result<MessageView> {
    let session = load_session(store, &ctx.session.id)?;
    if session.status == SessionStatus::Resolved {
        return Err(Error::bad_request("Cannot send messages to resolved sessions"));
    }

    if new.content.trim().is_empty() && new.attachment_ids.is_empty() {
        return Err(Error::bad_request("Message must have content or attachments"));
    }

    let message_type = new
        .message_type
        .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string());
    if message_type == SYSTEM_MESSAGE_TYPE {
        return Err(Error::bad_request("System messages cannot be posted"));
    }

    let message = store.create_session_message(
        &NewSessionMessage {
            session_id: session.id.clone(),
            participant_id: Some(ctx.participant.id.clone()),
            content: new.content,
            message_type,
            metadata: new.metadata,
            is_system: false,
            created_at: Utc::now(),
        },
        &new.attachment_ids,
    )?;

    let attachments = store.list_message_attachments(message.id)?;
    Ok(MessageView {
        message,
        attachments,
    })
}

/// Messages after `after_id` in creation order.
pub fn list_messages(
    store: &dyn Store,
    ctx: &ParticipantContext,
    after_id: i64,
    limit: i32,
) -> Result<Vec<MessageView>> {
    let limit = limit.clamp(1, MAX_MESSAGE_PAGE);
    store
        .list_session_messages(&ctx.session.id, after_id, limit)?
        .into_iter()
        .map(|message| {
            let attachments = store.list_message_attachments(message.id)?;
            Ok(MessageView {
                message,
                attachments,
            })
        })
        .collect()
}

/// Stores an uploaded file. It stays unattached until a message names it.
pub async fn upload_attachment(
    store: &dyn Store,
    storage: &AttachmentStorage,
    ctx: &ParticipantContext,
    file_name: &str,
    content_type: &str,
    data: &[u8],
) -> Result<Attachment> {
    let session = load_session(store, &ctx.session.id)?;
    if session.status == SessionStatus::Resolved {
        return Err(Error::bad_request("Cannot upload files to resolved sessions"));
    }
    if file_name.trim().is_empty() {
        return Err(Error::bad_request("File name cannot be empty"));
    }

    let stored = storage.put(&session.id, file_name, data).await?;
    let attachment = Attachment {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        message_id: None,
        file_name: file_name.to_string(),
        stored_path: stored.stored_path,
        content_type: content_type.to_string(),
        size: stored.size,
        sha256: stored.sha256,
        created_at: Utc::now(),
    };

    if let Err(e) = store.create_attachment(&attachment) {
        if let Err(cleanup) = storage.delete(&attachment.stored_path).await {
            tracing::warn!(path = %attachment.stored_path, "Failed to remove orphaned upload: {}", cleanup);
        }
        return Err(e);
    }

    tracing::info!(session = %session.id, attachment = %attachment.id, size = attachment.size, "Uploaded attachment");
    Ok(attachment)
}

pub async fn download_attachment(
    store: &dyn Store,
    storage: &AttachmentStorage,
    ctx: &ParticipantContext,
    attachment_id: &str,
) -> Result<(Attachment, Vec<u8>)> {
    let attachment = store
        .get_attachment(attachment_id)?
        .filter(|a| a.session_id == ctx.session.id)
        .ok_or_else(|| Error::not_found("Attachment not found"))?;
    let data = storage.read(&attachment.stored_path).await?;
    Ok((attachment, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_session_secret;
    use crate::service::test_support::{open_store, seed_user};

    fn tokens() -> SessionTokens {
        SessionTokens::new(&generate_session_secret()).unwrap()
    }

    fn ticket() -> NewSession {
        NewSession {
            external_ticket_id: 7,
            source_system: "helpdesk".to_string(),
            metadata: None,
        }
    }

    fn context(store: &dyn Store, tokens: &SessionTokens, access: &SessionAccess) -> ParticipantContext {
        let claims = tokens.verify(&access.access_token).unwrap();
        authenticate(store, &claims).unwrap()
    }

    #[test]
    fn test_session_resolution_lock() {
        let (_temp, store) = open_store();
        let tokens = tokens();
        let dev = seed_user(&store, "bob", UserType::Developer);

        let access = create_session(&store, &tokens, &dev, ticket(), None).unwrap();
        assert_eq!(access.expires_in, DEFAULT_ACCESS_DAYS * 86_400);
        let ctx = context(&store, &tokens, &access);
        assert_eq!(ctx.session.status, SessionStatus::Open);

        change_status(&store, &ctx, SessionStatus::InProgress).unwrap();
        let (resolved, _) = change_status(&store, &ctx, SessionStatus::Resolved).unwrap();
        assert_eq!(resolved.status, SessionStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        let err = change_status(&store, &ctx, SessionStatus::InProgress).unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref m) if m == "Cannot change status from resolved"));
        assert!(matches!(
            change_status(&store, &ctx, SessionStatus::Resolved),
            Err(Error::BadRequest(_))
        ));

        let log = list_messages(&store, &ctx, 0, 50).unwrap();
        let system: Vec<_> = log
            .iter()
            .filter(|m| m.message.is_system)
            .map(|m| m.message.content.as_str())
            .collect();
        assert_eq!(
            system,
            ["Status changed to: in_progress", "Status changed to: resolved"]
        );
        assert!(log.iter().all(|m| m.message.participant_id.is_none()));
        assert_eq!(
            log[1].message.metadata.as_ref().unwrap()["previous_status"],
            "in_progress"
        );

        let send = post_message(
            &store,
            &ctx,
            NewMessage {
                content: "still there?".to_string(),
                ..Default::default()
            },
        );
        assert!(matches!(send, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_upload_rejected_after_resolution() {
        let (temp, store) = open_store();
        let storage = AttachmentStorage::new(temp.path());
        let tokens = tokens();
        let dev = seed_user(&store, "bob", UserType::Developer);

        let access = create_session(&store, &tokens, &dev, ticket(), None).unwrap();
        let ctx = context(&store, &tokens, &access);

        let uploaded = upload_attachment(&store, &storage, &ctx, "log.txt", "text/plain", b"boom")
            .await
            .unwrap();
        let posted = post_message(
            &store,
            &ctx,
            NewMessage {
                content: "see log".to_string(),
                attachment_ids: vec![uploaded.id.clone()],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(posted.attachments.len(), 1);
        assert_eq!(posted.attachments[0].id, uploaded.id);

        let (_, data) = download_attachment(&store, &storage, &ctx, &uploaded.id)
            .await
            .unwrap();
        assert_eq!(data, b"boom");

        change_status(&store, &ctx, SessionStatus::Resolved).unwrap();
        let result =
            upload_attachment(&store, &storage, &ctx, "more.txt", "text/plain", b"late").await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_external_participant_cannot_change_status() {
        let (_temp, store) = open_store();
        let tokens = tokens();
        let dev = seed_user(&store, "bob", UserType::Developer);

        let access = create_session(&store, &tokens, &dev, ticket(), None).unwrap();
        let invited = invite(
            &store,
            &tokens,
            &dev,
            &access.session_id,
            Invitation {
                email: "Customer@Example.com".to_string(),
                display_name: None,
                role: "customer".to_string(),
                duration_days: Some(7),
            },
        )
        .unwrap();
        assert_eq!(invited.participant.email, "customer@example.com");
        assert_eq!(invited.participant.display_name, "customer");
        assert_eq!(invited.expires_in, 7 * 86_400);

        let ctx = context(&store, &tokens, &invited);
        assert!(matches!(
            change_status(&store, &ctx, SessionStatus::InProgress),
            Err(Error::Forbidden(_))
        ));

        let msg = post_message(
            &store,
            &ctx,
            NewMessage {
                content: "Hello from the customer".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(msg.message.participant_id.as_deref(), Some(invited.participant.id.as_str()));
    }

    #[test]
    fn test_invitation_reuses_participant_by_email() {
        let (_temp, store) = open_store();
        let tokens = tokens();
        let dev = seed_user(&store, "bob", UserType::Developer);
        let access = create_session(&store, &tokens, &dev, ticket(), None).unwrap();

        let invitation = Invitation {
            email: "ext@example.com".to_string(),
            display_name: Some("Ext".to_string()),
            role: "customer".to_string(),
            duration_days: None,
        };
        let first = invite(&store, &tokens, &dev, &access.session_id, invitation.clone()).unwrap();
        let second = invite(&store, &tokens, &dev, &access.session_id, invitation).unwrap();
        assert_eq!(first.participant.id, second.participant.id);
        assert_eq!(store.list_participants(&access.session_id).unwrap().len(), 2);
    }

    #[test]
    fn test_invitation_rules() {
        let (_temp, store) = open_store();
        let tokens = tokens();
        let dev = seed_user(&store, "bob", UserType::Developer);
        let stranger = seed_user(&store, "eve", UserType::Developer);
        let access = create_session(&store, &tokens, &dev, ticket(), None).unwrap();

        let invitation = |role: &str, days| Invitation {
            email: "ext@example.com".to_string(),
            display_name: None,
            role: role.to_string(),
            duration_days: days,
        };

        assert!(matches!(
            invite(&store, &tokens, &stranger, &access.session_id, invitation("customer", None)),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            invite(&store, &tokens, &dev, &access.session_id, invitation("ryze_developer", None)),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            invite(&store, &tokens, &dev, &access.session_id, invitation("customer", Some(0))),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            invite(&store, &tokens, &dev, "missing", invitation("customer", None)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_only_existing_participants_rejoin() {
        let (_temp, store) = open_store();
        let tokens = tokens();
        let client = seed_user(&store, "alice", UserType::Client);
        let dev = seed_user(&store, "bob", UserType::Developer);
        let outsider = seed_user(&store, "carol", UserType::Developer);

        assert!(matches!(
            create_session(&store, &tokens, &client, ticket(), None),
            Err(Error::Forbidden(_))
        ));

        let access = create_session(&store, &tokens, &dev, ticket(), None).unwrap();

        assert!(matches!(
            join_session(&store, &tokens, &outsider, &access.session_id, None),
            Err(Error::Forbidden(_))
        ));
        assert_eq!(store.list_participants(&access.session_id).unwrap().len(), 1);
        let session = store.get_session(&access.session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Open);

        let again = join_session(&store, &tokens, &dev, &access.session_id, Some(7)).unwrap();
        assert_eq!(again.participant.id, access.participant.id);
        assert_eq!(again.expires_in, 7 * 86_400);

        let ctx = context(&store, &tokens, &again);
        change_status(&store, &ctx, SessionStatus::InProgress).unwrap();
    }

    #[test]
    fn test_token_for_other_session_is_mismatch() {
        let (_temp, store) = open_store();
        let tokens = tokens();
        let dev = seed_user(&store, "bob", UserType::Developer);

        let a = create_session(&store, &tokens, &dev, ticket(), None).unwrap();
        let b = create_session(&store, &tokens, &dev, ticket(), None).unwrap();
        let ctx = context(&store, &tokens, &a);

        assert!(ctx.ensure_session(&a.session_id).is_ok());
        assert!(matches!(ctx.ensure_session(&b.session_id), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_message_paging_after_id() {
        let (_temp, store) = open_store();
        let tokens = tokens();
        let dev = seed_user(&store, "bob", UserType::Developer);
        let access = create_session(&store, &tokens, &dev, ticket(), None).unwrap();
        let ctx = context(&store, &tokens, &access);

        let ids: Vec<i64> = ["one", "two", "three"]
            .into_iter()
            .map(|content| {
                post_message(
                    &store,
                    &ctx,
                    NewMessage {
                        content: content.to_string(),
                        ..Default::default()
                    },
                )
                .unwrap()
                .message
                .id
            })
            .collect();

        let page = list_messages(&store, &ctx, ids[0], 10).unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.message.content.as_str()).collect();
        assert_eq!(contents, ["two", "three"]);

        assert!(
            store
                .get_participant(&ctx.participant.id)
                .unwrap()
                .unwrap()
                .last_viewed_at
                .is_some()
        );
    }
}

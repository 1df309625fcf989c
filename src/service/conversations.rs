//! Conversations between a developer and the client who owns a request.

use chrono::Utc;

use super::resources::readable;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{
    Conversation, ConversationMessage, ConversationStatus, Lifecycle, ResourceKind, User, UserType,
};

fn load(store: &dyn Store, id: &str) -> Result<Conversation> {
    store
        .get_conversation(id)?
        .ok_or_else(|| Error::not_found("Conversation not found"))
}

fn require_participant(conversation: &Conversation, actor: &User) -> Result<()> {
    if !conversation.is_participant(&actor.id) {
        return Err(Error::forbidden("Not a participant in this conversation"));
    }
    Ok(())
}

/// Starts (or returns) the conversation between the acting developer and the
/// owner of `request_id`. The flag is true when a new row was created.
pub fn start(store: &dyn Store, actor: &User, request_id: &str) -> Result<(Conversation, bool)> {
    if actor.user_type != UserType::Developer {
        return Err(Error::forbidden("Only developers can start conversations"));
    }

    let request = store
        .get_resource(request_id)?
        .filter(|r| r.kind == ResourceKind::Request)
        .ok_or_else(|| Error::not_found("Request not found"))?;

    if request.owner_id == actor.id {
        return Err(Error::bad_request(
            "Cannot start a conversation on your own request",
        ));
    }

    let owner = store
        .get_user(&request.owner_id)?
        .ok_or_else(|| Error::not_found("Request owner not found"))?;
    if owner.user_type != UserType::Client {
        return Err(Error::bad_request("Request owner must be a client"));
    }

    if !readable(store, &request, actor)? {
        return Err(Error::forbidden("Not authorized to view this request"));
    }

    let now = Utc::now();
    let candidate = Conversation {
        id: uuid::Uuid::new_v4().to_string(),
        request_id: request.id.clone(),
        starter_id: actor.id.clone(),
        recipient_id: owner.id.clone(),
        status: ConversationStatus::Active,
        created_at: now,
        updated_at: now,
    };

    let stored = store.create_conversation(&candidate)?;
    let created = stored.id == candidate.id;
    if created {
        tracing::info!(id = %stored.id, request = %request.id, starter = %actor.id, "Started conversation");
    }
    Ok((stored, created))
}

pub fn get(store: &dyn Store, actor: &User, id: &str) -> Result<Conversation> {
    let conversation = load(store, id)?;
    require_participant(&conversation, actor)?;
    Ok(conversation)
}

pub fn list(store: &dyn Store, actor: &User, request_id: Option<&str>) -> Result<Vec<Conversation>> {
    store.list_user_conversations(&actor.id, request_id)
}

/// Moves the conversation strictly forward.
pub fn transition(
    store: &dyn Store,
    actor: &User,
    id: &str,
    next: ConversationStatus,
) -> Result<Conversation> {
    let conversation = load(store, id)?;
    require_participant(&conversation, actor)?;

    let current = conversation.status;
    if current.is_terminal() {
        return Err(Error::bad_request(format!(
            "Cannot change status from {current}"
        )));
    }
    if !current.can_transition_to(next) {
        return Err(Error::bad_request(format!(
            "Invalid status transition from {current} to {next}"
        )));
    }

    if !store.transition_conversation_status(&conversation.id, current, next)? {
        return Err(Error::conflict(
            "Conversation status changed concurrently, reload and retry",
        ));
    }

    tracing::info!(id = %conversation.id, from = %current, to = %next, user = %actor.id, "Conversation status changed");
    load(store, id)
}

pub fn post_message(
    store: &dyn Store,
    actor: &User,
    id: &str,
    content: &str,
) -> Result<ConversationMessage> {
    let conversation = load(store, id)?;
    require_participant(&conversation, actor)?;

    if content.trim().is_empty() {
        return Err(Error::bad_request("Message content cannot be empty"));
    }

    store.create_conversation_message(&conversation.id, &actor.id, content)
}

pub fn list_messages(store: &dyn Store, actor: &User, id: &str) -> Result<Vec<ConversationMessage>> {
    let conversation = load(store, id)?;
    require_participant(&conversation, actor)?;
    store.list_conversation_messages(&conversation.id)
}

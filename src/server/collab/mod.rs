//! Collaboration endpoints. Session creation, joining and invitations take a
//! user API token; everything inside a session takes a participant token.

mod attachments;
mod messages;
mod sessions;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::server::AppState;

pub fn collab_router() -> Router<Arc<AppState>> {
    Router::new()
        // User-authenticated
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/{id}/join", post(sessions::join_session))
        .route("/sessions/{id}/access", post(sessions::invite_participant))
        // Participant-authenticated
        .route("/sessions/{id}", get(sessions::get_session))
        .route("/sessions/{id}/status", put(sessions::update_status))
        .route(
            "/sessions/{id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/sessions/{id}/attachments", post(attachments::upload))
        .route(
            "/sessions/{id}/attachments/{attachment_id}",
            get(attachments::download),
        )
}

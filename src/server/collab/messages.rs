use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireParticipant;
use crate::server::AppState;
use crate::server::dto::{ListMessagesParams, SendMessageRequest};
use crate::server::response::{ApiError, ApiResponse, DEFAULT_PAGE_SIZE};
use crate::service::collaboration::{self, NewMessage};

pub async fn list_messages(
    RequireParticipant(ctx): RequireParticipant,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ListMessagesParams>,
) -> impl IntoResponse {
    ctx.ensure_session(&id)?;

    let messages = collaboration::list_messages(
        state.store.as_ref(),
        &ctx,
        params.after_id.unwrap_or(0),
        params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(messages)))
}

pub async fn send_message(
    RequireParticipant(ctx): RequireParticipant,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    ctx.ensure_session(&id)?;

    let message = collaboration::post_message(
        state.store.as_ref(),
        &ctx,
        NewMessage {
            content: req.content,
            message_type: req.message_type,
            metadata: req.metadata,
            attachment_ids: req.attachment_ids,
        },
    )?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(message))))
}

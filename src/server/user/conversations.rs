use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    ConversationStatusRequest, ListConversationsParams, PostConversationMessageRequest,
    StartConversationRequest,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::service::conversations;

/// Starting a conversation that already exists returns it with 200.
pub async fn start_conversation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartConversationRequest>,
) -> impl IntoResponse {
    let (conversation, created) =
        conversations::start(state.store.as_ref(), &auth.user, &req.request_id)?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok::<_, ApiError>((status, Json(ApiResponse::success(conversation))))
}

pub async fn list_conversations(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListConversationsParams>,
) -> impl IntoResponse {
    let list = conversations::list(
        state.store.as_ref(),
        &auth.user,
        params.request_id.as_deref(),
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(list)))
}

pub async fn get_conversation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let conversation = conversations::get(state.store.as_ref(), &auth.user, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(conversation)))
}

pub async fn update_status(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ConversationStatusRequest>,
) -> impl IntoResponse {
    let conversation =
        conversations::transition(state.store.as_ref(), &auth.user, &id, req.status)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(conversation)))
}

pub async fn list_messages(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let messages = conversations::list_messages(state.store.as_ref(), &auth.user, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(messages)))
}

pub async fn post_message(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PostConversationMessageRequest>,
) -> impl IntoResponse {
    let message =
        conversations::post_message(state.store.as_ref(), &auth.user, &id, &req.content)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(message))))
}

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::{RequireParticipant, RequireUser};
use crate::server::AppState;
use crate::server::dto::{
    CreateSessionRequest, InviteParticipantRequest, JoinSessionRequest, SessionAccessResponse,
    SessionStatusRequest,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_email;
use crate::service::collaboration::{self, Invitation, NewSession, SessionAccess};

fn with_url(state: &AppState, access: SessionAccess) -> SessionAccessResponse {
    let access_url = state
        .config
        .access_url(&access.session_id, &access.access_token);
    SessionAccessResponse { access, access_url }
}

pub async fn create_session(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let access = collaboration::create_session(
        state.store.as_ref(),
        &state.session_tokens,
        &auth.user,
        NewSession {
            external_ticket_id: req.external_ticket_id,
            source_system: req.source_system,
            metadata: req.metadata,
        },
        req.duration_days.or(Some(state.config.session_token_days)),
    )?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(with_url(&state, access))),
    ))
}

pub async fn join_session(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<JoinSessionRequest>,
) -> impl IntoResponse {
    let access = collaboration::join_session(
        state.store.as_ref(),
        &state.session_tokens,
        &auth.user,
        &id,
        req.duration_days.or(Some(state.config.session_token_days)),
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(with_url(&state, access))))
}

/// Issues an access link for an external participant.
pub async fn invite_participant(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<InviteParticipantRequest>,
) -> impl IntoResponse {
    validate_email(req.email.trim())?;

    let access = collaboration::invite(
        state.store.as_ref(),
        &state.session_tokens,
        &auth.user,
        &id,
        Invitation {
            email: req.email,
            display_name: req.display_name,
            role: req.role,
            duration_days: req.duration_days.or(Some(state.config.session_token_days)),
        },
    )?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(with_url(&state, access))),
    ))
}

pub async fn get_session(
    RequireParticipant(ctx): RequireParticipant,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    ctx.ensure_session(&id)?;

    let view = collaboration::view(state.store.as_ref(), &ctx)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(view)))
}

pub async fn update_status(
    RequireParticipant(ctx): RequireParticipant,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SessionStatusRequest>,
) -> impl IntoResponse {
    ctx.ensure_session(&id)?;

    let (session, _message) =
        collaboration::change_status(state.store.as_ref(), &ctx, req.status)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(session)))
}

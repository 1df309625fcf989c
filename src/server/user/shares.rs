use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{CreateShareRequest, UpdateShareRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::service::resources;
use crate::types::ResourceKind;

pub async fn list_shares(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let shares = resources::list_shares(state.store.as_ref(), &auth.user, kind, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(shares)))
}

pub async fn create_share(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateShareRequest>,
) -> impl IntoResponse {
    let grantee_id = match (req.grantee_id, req.username) {
        (Some(grantee_id), None) => grantee_id,
        (None, Some(username)) => {
            state
                .store
                .get_user_by_username(&username)
                .api_err("Failed to look up user")?
                .or_not_found("User not found")?
                .id
        }
        _ => {
            return Err(ApiError::bad_request(
                "Provide exactly one of grantee_id or username",
            ));
        }
    };

    let grant = resources::create_share(
        state.store.as_ref(),
        &auth.user,
        kind,
        &id,
        &grantee_id,
        req.can_edit,
    )?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(grant))))
}

pub async fn update_share(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Path((id, grantee_id)): Path<(String, String)>,
    Json(req): Json<UpdateShareRequest>,
) -> impl IntoResponse {
    let grant = resources::update_share(
        state.store.as_ref(),
        &auth.user,
        kind,
        &id,
        &grantee_id,
        req.can_edit,
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(grant)))
}

/// Removing a grant that does not exist still succeeds.
pub async fn remove_share(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Path((id, grantee_id)): Path<(String, String)>,
) -> impl IntoResponse {
    resources::remove_share(state.store.as_ref(), &auth.user, kind, &id, &grantee_id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

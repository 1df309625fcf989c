use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{UserSearchParams, UserSummary};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};

const DEFAULT_SEARCH_LIMIT: i32 = 10;
const MAX_SEARCH_LIMIT: i32 = 50;

pub async fn current_user(auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(auth.user))
}

/// Username prefix search, used to pick share recipients.
pub async fn search_users(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserSearchParams>,
) -> impl IntoResponse {
    let prefix = params.q.trim();
    if prefix.is_empty() {
        return Err(ApiError::bad_request("Search query cannot be empty"));
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    let users: Vec<UserSummary> = state
        .store
        .search_users(prefix, limit)
        .api_err("Failed to search users")?
        .into_iter()
        .filter(|u| u.id != auth.user.id)
        .map(UserSummary::from)
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(users)))
}

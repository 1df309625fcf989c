use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::RequireAdmin;
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{
    CreateTokenResponse, CreateUserRequest, CreateUserTokenRequest, PaginationParams,
    TokenResponse, UpdateUserRequest,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::{validate_email, validate_username};
use crate::types::{Token, User};

const MAX_TOKEN_RETRIES: u32 = 3;

pub async fn create_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    validate_username(&req.username)?;
    let email = req.email.trim().to_ascii_lowercase();
    validate_email(&email)?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: req.username,
        email,
        user_type: req.user_type,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    state.store.create_user(&user)?;
    tracing::info!(id = %user.id, username = %user.username, user_type = user.user_type.as_str(), "Created user");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let users = state
        .store
        .list_users(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list users")?;

    let (users, next_cursor, has_more) =
        paginate(users, DEFAULT_PAGE_SIZE as usize, |u| u.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(users, next_cursor, has_more)))
}

fn load_user(state: &AppState, id: &str) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = load_user(&state, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

/// Users are never deleted; deactivation blocks their tokens instead.
pub async fn update_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> impl IntoResponse {
    let user = load_user(&state, &id)?;

    state
        .store
        .set_user_active(&user.id, req.is_active)
        .api_err("Failed to update user")?;
    tracing::info!(id = %user.id, is_active = req.is_active, "Updated user");

    let user = load_user(&state, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn list_user_tokens(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = load_user(&state, &id)?;

    let tokens = state
        .store
        .list_user_tokens(&user.id)
        .api_err("Failed to list user tokens")?;

    let responses: Vec<TokenResponse> = tokens.into_iter().map(TokenResponse::from).collect();
    Ok::<_, ApiError>(Json(ApiResponse::success(responses)))
}

pub async fn create_user_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateUserTokenRequest>,
) -> impl IntoResponse {
    let user = load_user(&state, &id)?;

    if !user.is_active {
        return Err(ApiError::bad_request("Cannot issue a token for a deactivated user"));
    }

    if let Some(seconds) = req.expires_in_seconds {
        if seconds < 0 {
            return Err(ApiError::bad_request(
                "expires_in_seconds cannot be negative",
            ));
        }
    }

    let expires_at = req
        .expires_in_seconds
        .map(|s| Utc::now() + Duration::seconds(s));

    for _ in 0..MAX_TOKEN_RETRIES {
        let issued = state
            .api_tokens
            .issue()
            .api_err("Failed to generate token")?;

        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: issued.hash,
            token_lookup: issued.lookup,
            is_admin: false,
            user_id: Some(user.id.clone()),
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };

        match state.store.create_token(&token) {
            Ok(()) => {
                tracing::info!(id = %token.id, user = %user.id, "Issued user token");
                return Ok((
                    StatusCode::CREATED,
                    Json(ApiResponse::success(CreateTokenResponse {
                        token: issued.raw,
                        metadata: TokenResponse::from(token),
                    })),
                ));
            }
            Err(Error::TokenLookupCollision) => continue,
            Err(_) => return Err(ApiError::internal("Failed to create token")),
        }
    }

    Err(ApiError::internal("Failed to create token after retries"))
}

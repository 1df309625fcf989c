use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{TokenValidationError, ValidatedToken, extract_token_from_header, validate_api_token};
use crate::error::Error;
use crate::server::AppState;
use crate::service::collaboration::{self, ParticipantContext};
use crate::types::{Token, User};

/// Extractor that requires an admin API token
pub struct RequireAdmin(pub Token);

/// Extractor that requires an active user's API token
pub struct RequireUser {
    pub token: Token,
    pub user: User,
}

/// Extractor that requires a collaboration participant access token
pub struct RequireParticipant(pub ParticipantContext);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    NotAdmin,
    NotUser,
    UserDisabled,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::NotUser => (
                StatusCode::FORBIDDEN,
                "User token required for this operation",
            ),
            AuthError::UserDisabled => (StatusCode::FORBIDDEN, "User account is disabled"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"ryze\""),
            );
        }

        response
    }
}

impl From<TokenValidationError> for AuthError {
    fn from(e: TokenValidationError) -> Self {
        match e {
            TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
            TokenValidationError::InvalidToken => AuthError::InvalidToken,
            TokenValidationError::TokenExpired => AuthError::TokenExpired,
            TokenValidationError::InternalError => AuthError::InternalError,
        }
    }
}

fn raw_token(parts: &Parts, allow_basic: bool) -> Result<String, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    extract_token_from_header(auth_header, allow_basic)?.ok_or(AuthError::MissingAuth)
}

fn api_token(parts: &Parts, state: &Arc<AppState>) -> Result<ValidatedToken, AuthError> {
    let raw = raw_token(parts, true)?;
    Ok(validate_api_token(state, &raw)?)
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = api_token(parts, state)?;

        if !validated.token.is_admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(validated.token))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ValidatedToken { token, user } = api_token(parts, state)?;

        if token.is_admin {
            return Err(AuthError::NotUser);
        }
        let user = user.ok_or(AuthError::NotUser)?;
        if !user.is_active {
            return Err(AuthError::UserDisabled);
        }

        Ok(RequireUser { token, user })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireParticipant {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = raw_token(parts, false)?;

        let claims = state.session_tokens.verify(&raw).map_err(|e| match e {
            Error::TokenExpired => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;

        let ctx = collaboration::authenticate(state.store.as_ref(), &claims).map_err(|e| match e {
            Error::Unauthorized => AuthError::InvalidToken,
            e => {
                tracing::error!("Failed to resolve participant: {}", e);
                AuthError::InternalError
            }
        })?;

        Ok(RequireParticipant(ctx))
    }
}

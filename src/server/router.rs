use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::collab::collab_router;
use super::user::user_router;
use crate::auth::{ApiTokenHasher, SessionTokens};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::storage::AttachmentStorage;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub api_tokens: ApiTokenHasher,
    pub session_tokens: SessionTokens,
    pub attachments: AttachmentStorage,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: ServerConfig, session_secret: &str) -> Result<Self> {
        Ok(Self {
            store,
            api_tokens: ApiTokenHasher::new()?,
            session_tokens: SessionTokens::new(session_secret)?,
            attachments: AttachmentStorage::new(&config.data_dir),
            config,
        })
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", user_router())
        .nest(
            "/api/v1/collab",
            collab_router().layer(DefaultBodyLimit::max(upload_limit)),
        )
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

//! In-process harness: a router over a fresh database in a temp directory,
//! driven with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use ryze::auth::{ApiTokenHasher, generate_session_secret};
use ryze::config::ServerConfig;
use ryze::server::{AppState, create_router};
use ryze::store::{SqliteStore, Store};
use ryze::types::Token;

const BODY_LIMIT: usize = 16 * 1024 * 1024;
const BOUNDARY: &str = "ryze-test-boundary";

pub struct TestApp {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub admin_token: String,
    router: Router,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub bytes: Vec<u8>,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }

    pub fn data(&self) -> Value {
        self.json()["data"].clone()
    }

    pub fn error(&self) -> String {
        self.json()["error"].as_str().unwrap_or_default().to_string()
    }
}

pub struct TestUser {
    pub id: String,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            public_base_url: Some("https://ryze.test".to_string()),
            ..ServerConfig::default()
        };

        let store = Arc::new(SqliteStore::new(config.db_path()).expect("open store"));
        store.initialize().expect("initialize store");

        let hasher = ApiTokenHasher::new().expect("hasher");
        let issued = hasher.issue().expect("issue admin token");
        store
            .create_token(&Token {
                id: Uuid::new_v4().to_string(),
                token_hash: issued.hash,
                token_lookup: issued.lookup,
                is_admin: true,
                user_id: None,
                created_at: Utc::now(),
                expires_at: None,
                last_used_at: None,
            })
            .expect("store admin token");

        let state = AppState::new(store.clone(), config, &generate_session_secret())
            .expect("build state");

        Self {
            temp_dir,
            store,
            admin_token: issued.raw,
            router: create_router(Arc::new(state)),
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), BODY_LIMIT)
            .await
            .expect("read body")
            .to_vec();

        Response {
            status,
            headers,
            bytes,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> Response {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> Response {
        self.request(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    pub async fn upload(&self, uri: &str, token: &str, file_name: &str, data: &[u8]) -> Response {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("build upload");

        self.send(request).await
    }

    /// Creates a user through the admin API and issues them a token.
    pub async fn create_user(&self, username: &str, user_type: &str) -> TestUser {
        let resp = self
            .post(
                "/api/v1/admin/users",
                &self.admin_token,
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "user_type": user_type,
                }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error());
        let id = resp.data()["id"].as_str().expect("user id").to_string();

        let resp = self
            .post(
                &format!("/api/v1/admin/users/{id}/tokens"),
                &self.admin_token,
                json!({}),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error());
        let token = resp.data()["token"].as_str().expect("token").to_string();

        TestUser { id, token }
    }
}

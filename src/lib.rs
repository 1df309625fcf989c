//! # Ryze
//!
//! Collaboration backend for clients and developers: notes and requests with
//! share grants and a public/sensitive visibility rule, request conversations
//! that negotiate into agreements, and collaboration sessions that bring
//! external support-ticket participants together with internal developers.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! ryze = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ryze::config::ServerConfig;
//! use ryze::server::{AppState, create_router};
//! use ryze::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), config, &secret).unwrap());
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `ryze` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod service;
pub mod storage;
pub mod store;
pub mod types;

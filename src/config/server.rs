use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_SESSION_TOKEN_DAYS: i64 = 30;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL for external access (e.g., "https://ryze.example.com").
    /// Used to build participant access links. If not set, links are relative.
    pub public_base_url: Option<String>,
    /// Default lifetime of participant access tokens.
    pub session_token_days: i64,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ryze.db")
    }

    #[must_use]
    pub fn session_secret_path(&self) -> PathBuf {
        self.data_dir.join(".session_secret")
    }

    /// Applies values from a config file over the defaults.
    #[must_use]
    pub fn with_file(mut self, file: FileConfig) -> Self {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(data_dir) = file.data_dir {
            self.data_dir = data_dir;
        }
        if file.public_base_url.is_some() {
            self.public_base_url = file.public_base_url;
        }
        if let Some(days) = file.session_token_days {
            self.session_token_days = days;
        }
        if let Some(bytes) = file.max_upload_bytes {
            self.max_upload_bytes = bytes;
        }
        self
    }

    /// Builds the link an invited participant opens.
    pub fn access_url(&self, session_id: &str, token: &str) -> String {
        let base = self
            .public_base_url
            .as_deref()
            .unwrap_or_default()
            .trim_end_matches('/');
        format!("{base}/collaboration/{session_id}/access/{token}")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            session_token_days: DEFAULT_SESSION_TOKEN_DAYS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// The optional TOML config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub public_base_url: Option<String>,
    pub session_token_days: Option<i64>,
    pub max_upload_bytes: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

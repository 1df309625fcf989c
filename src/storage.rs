//! On-disk storage for collaboration attachments.
//!
//! Files live under `<data_dir>/collaboration/<session_id>/` with random names;
//! the original file name is kept only in the database.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{Error, Result};

const MAX_EXTENSION_LEN: usize = 10;

/// What was written, relative to the storage root.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub stored_path: String,
    pub size: i64,
    pub sha256: String,
}

pub struct AttachmentStorage {
    base_path: PathBuf,
}

impl AttachmentStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("collaboration"),
        }
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    /// Resolves a stored relative path, refusing anything that escapes the root.
    fn resolve(&self, stored_path: &str) -> Result<PathBuf> {
        let relative = Path::new(stored_path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(Error::bad_request("Invalid attachment path"));
        }
        Ok(self.base_path.join(relative))
    }

    pub async fn put(&self, session_id: &str, file_name: &str, data: &[u8]) -> Result<StoredFile> {
        let mut name_bytes = [0u8; 8];
        rand::thread_rng().fill(&mut name_bytes);
        let stored_name = match safe_extension(file_name) {
            Some(ext) => format!("{}.{ext}", hex::encode(name_bytes)),
            None => hex::encode(name_bytes),
        };
        let stored_path = format!("{session_id}/{stored_name}");
        let final_path = self.resolve(&stored_path)?;

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = write_then_rename(&temp_path, &final_path, data).await {
            match fs::remove_file(&temp_path).await {
                Err(cleanup) if cleanup.kind() != ErrorKind::NotFound => {
                    tracing::warn!("Failed to remove {}: {cleanup}", temp_path.display());
                }
                _ => {}
            }
            return Err(e.into());
        }

        Ok(StoredFile {
            stored_path,
            size: data.len() as i64,
            sha256: hex::encode(Sha256::digest(data)),
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(stored_path)?;
        fs::read(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::not_found("Attachment file not found")
            } else {
                Error::Io(e)
            }
        })
    }

    pub async fn delete(&self, stored_path: &str) -> Result<bool> {
        let path = self.resolve(stored_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Keeps short alphanumeric extensions only.
async fn write_then_rename(temp_path: &Path, final_path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut temp_file = File::create(temp_path).await?;
    temp_file.write_all(data).await?;
    temp_file.sync_all().await?;
    drop(temp_file);

    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::rename(temp_path, final_path).await
}

fn safe_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    (!ext.is_empty() && ext.len() <= MAX_EXTENSION_LEN && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

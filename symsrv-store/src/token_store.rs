//! Refresh token file.
//!
//! The token is stored as raw bytes, no framing, owner-only. Each new token
//! overwrites the previous one.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::persistence::{create_parent_dir, default_token_path, set_restrictive_permissions};

/// Persists the OAuth refresh token at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenStore {
    path: PathBuf,
}

impl RefreshTokenStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default per-user location.
    pub fn default_location() -> Self {
        Self::new(default_token_path())
    }

    /// The token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted token.
    ///
    /// Returns `None` if the file is missing or empty.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the file exists but cannot be read, and
    /// `StoreError::Config` if it is not UTF-8.
    pub async fn load(&self) -> Result<Option<String>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No refresh token stored");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        let token = String::from_utf8(bytes).map_err(|_| {
            StoreError::Config(format!("{} is not valid UTF-8", self.path.display()))
        })?;
        debug!(path = %self.path.display(), "Loaded refresh token");
        Ok(Some(token))
    }

    /// Overwrites the persisted token.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the file cannot be written.
    pub async fn save(&self, token: &str) -> Result<(), StoreError> {
        create_parent_dir(&self.path).await?;
        tokio::fs::write(&self.path, token.as_bytes()).await?;
        set_restrictive_permissions(&self.path).await?;
        info!(path = %self.path.display(), "Saved refresh token");
        Ok(())
    }

    /// Removes the persisted token. Missing is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Content-addressed symbol cache.
//!
//! Layout: `<root>/<first 2 hex>/<rest>[.debug]`. Downloads are streamed to a
//! temporary file next to the cache (same filesystem) and renamed into place,
//! so readers never observe a partial file.

use std::io;
use std::path::{Path, PathBuf};

use symsrv_core::{
    BuildId, FetchRequest, FileType, SYMBOL_CACHE_PATH_KEY, SettingsAccessor, SymbolError,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// The local symbol cache. A cache without a root stores nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolCache {
    root: Option<PathBuf>,
}

impl SymbolCache {
    /// Cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Cache with no root configured.
    pub fn disabled() -> Self {
        Self { root: None }
    }

    /// Reads the root from the `symbol-cache-path` setting. Empty means none.
    pub fn from_settings(settings: &dyn SettingsAccessor) -> Self {
        match settings.get_string(SYMBOL_CACHE_PATH_KEY) {
            Some(path) if !path.trim().is_empty() => Self::new(path.trim()),
            _ => Self::disabled(),
        }
    }

    /// Cache root, if configured.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Final cache path for a build ID and file type.
    pub fn path_for(&self, id: &BuildId, file_type: FileType) -> Option<PathBuf> {
        self.root.as_ref().map(|root| {
            root.join(id.shard())
                .join(format!("{}{}", id.rest(), file_type.suffix()))
        })
    }

    /// Returns the cached file for `request`, if present.
    pub fn lookup(&self, request: &FetchRequest) -> Option<PathBuf> {
        let id = request.parsed_build_id().ok()?;
        let path = self.path_for(&id, request.file_type)?;
        path.is_file().then_some(path)
    }

    /// Creates the temporary download file.
    ///
    /// Lives in the cache root when one exists and is writable, else in the
    /// system temp directory. Deleted on drop unless stored or kept.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if no temporary file can be created.
    pub fn temp_file(&self, id: &BuildId) -> io::Result<NamedTempFile> {
        let prefix = format!("symsrv-{id}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".part");

        if let Some(root) = &self.root {
            if std::fs::create_dir_all(root).is_ok() {
                match builder.tempfile_in(root) {
                    Ok(file) => return Ok(file),
                    Err(e) => warn!(root = %root.display(), error = %e, "Cache root not writable"),
                }
            }
        }
        builder.tempfile()
    }

    /// Moves a finished download into the cache.
    ///
    /// # Errors
    ///
    /// - `NoCacheConfigured` when there is no root; the file is kept at its
    ///   temporary location and that path is reported.
    /// - `FileSystemError` when relocation fails; the file is kept and its
    ///   temporary path is reported.
    pub async fn store(
        &self,
        temp: NamedTempFile,
        id: &BuildId,
        file_type: FileType,
    ) -> Result<PathBuf, SymbolError> {
        let Some(dest) = self.path_for(id, file_type) else {
            let path = keep(temp)?;
            info!(path = %path.display(), "No symbol cache configured, leaving download in place");
            return Err(SymbolError::NoCacheConfigured { path });
        };

        if let Some(shard) = dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(shard).await {
                let path = keep(temp)?;
                return Err(SymbolError::FileSystemError {
                    message: format!("Failed to create {}: {e}", shard.display()),
                    path: Some(path),
                });
            }
        }

        match temp.persist(&dest) {
            Ok(_) => {
                debug!(path = %dest.display(), "Stored symbol file");
                Ok(dest)
            }
            Err(e) => {
                let message = format!("Failed to move download to {}: {}", dest.display(), e.error);
                let path = keep(e.file)?;
                Err(SymbolError::FileSystemError {
                    message,
                    path: Some(path),
                })
            }
        }
    }
}

fn keep(temp: NamedTempFile) -> Result<PathBuf, SymbolError> {
    temp.keep()
        .map(|(_, path)| path)
        .map_err(|e| SymbolError::FileSystemError {
            message: format!("Failed to keep download: {}", e.error),
            path: None,
        })
}

//! File persistence helpers.
//!
//! Settings and credentials live under the per-user config directory and are
//! written owner-only.

use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;

/// Directory name under the platform config and cache directories.
pub const APP_DIR_NAME: &str = "symsrv";

// ============================================================================
// Default Paths
// ============================================================================

/// Returns the default configuration directory.
///
/// - macOS: `~/Library/Application Support/symsrv`
/// - Linux: `~/.config/symsrv`
/// - Windows: `%APPDATA%\symsrv`
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|c| c.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the default directory for downloaded symbols.
///
/// - macOS: `~/Library/Caches/symsrv`
/// - Linux: `~/.cache/symsrv`
/// - Windows: `%LOCALAPPDATA%\symsrv`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|c| c.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the default settings file path.
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}

/// Returns the default refresh token file path.
pub fn default_token_path() -> PathBuf {
    default_config_dir().join("refresh_token")
}

// ============================================================================
// Security: File Permissions
// ============================================================================

/// Sets owner-only permissions (0o600) on Unix systems.
#[cfg(unix)]
pub(crate) async fn set_restrictive_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    debug!(path = %path.display(), mode = "0600", "Set restrictive permissions");
    Ok(())
}

/// No-op for non-Unix systems.
#[cfg(not(unix))]
pub(crate) async fn set_restrictive_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

/// Sets owner-only directory permissions (0o700) on Unix systems.
#[cfg(unix)]
async fn set_restrictive_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await?;
    Ok(())
}

/// No-op for non-Unix systems.
#[cfg(not(unix))]
async fn set_restrictive_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ============================================================================
// File Operations
// ============================================================================

/// Creates the parent directory of `path` if missing, owner-only.
pub(crate) async fn create_parent_dir(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!(path = %parent.display(), "Creating directory");
            tokio::fs::create_dir_all(parent).await?;
            set_restrictive_dir_permissions(parent).await?;
        }
    }
    Ok(())
}

/// Saves data as pretty JSON, owner-only.
///
/// Writes to a sibling temp file and renames it into place.
///
/// # Errors
///
/// Returns `StoreError` if serialization or any file operation fails.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    debug!(path = %path.display(), "Saving JSON file");
    create_parent_dir(path).await?;

    let json = serde_json::to_string_pretty(data)?;
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, &json).await?;
    set_restrictive_permissions(&temp_path).await?;
    tokio::fs::rename(&temp_path, path).await?;

    Ok(())
}

/// Loads data from a JSON file.
///
/// # Errors
///
/// Returns `StoreError` if the file cannot be read or parsed.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    debug!(path = %path.display(), "Loading JSON file");
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        assert!(default_settings_path().ends_with("symsrv/settings.json"));
        assert!(default_token_path().ends_with("symsrv/refresh_token"));
        assert!(default_cache_dir().ends_with(APP_DIR_NAME));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.json");
        tokio::fs::write(&test_file, "{}").await.unwrap();

        set_restrictive_permissions(&test_file).await.unwrap();

        let mode = tokio::fs::metadata(&test_file)
            .await
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }
}

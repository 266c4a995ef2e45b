//! User settings store.
//!
//! Settings are a JSON document; every field has a default so a missing or
//! partial file still loads. Two environment variables override the file:
//! `SYMSRV_CACHE_PATH` and `SYMSRV_BUCKET`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use symsrv_core::{SYMBOL_CACHE_PATH_KEY, SettingsAccessor};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{default_settings_path, load_json, save_json};

/// Environment variable overriding [`Settings::symbol_cache_path`].
pub const ENV_CACHE_PATH: &str = "SYMSRV_CACHE_PATH";

/// Environment variable overriding [`Settings::bucket`].
pub const ENV_BUCKET: &str = "SYMSRV_BUCKET";

/// Settings key for the bucket.
pub const BUCKET_KEY: &str = "bucket";

/// Settings key for the storage host.
pub const STORAGE_HOST_KEY: &str = "storage-host";

/// Settings key for the log level.
pub const LOG_LEVEL_KEY: &str = "log-level";

// ============================================================================
// Settings Types
// ============================================================================

/// User settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the local symbol cache. `None` disables caching.
    pub symbol_cache_path: Option<PathBuf>,

    /// Bucket holding symbol files, optionally with a path prefix and a
    /// `gs://` scheme.
    pub bucket: String,

    /// Object storage host.
    pub storage_host: String,

    /// OAuth client configuration.
    pub oauth: OAuthSettings,

    /// Seconds before token expiry at which to refresh.
    pub refresh_margin_secs: u64,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Log level.
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbol_cache_path: None,
            bucket: String::new(),
            storage_host: "storage.googleapis.com".to_string(),
            oauth: OAuthSettings::default(),
            refresh_margin_secs: 100,
            request_timeout_secs: 30,
            log_level: LogLevel::default(),
        }
    }
}

impl Settings {
    /// Applies environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_CACHE_PATH).filter(|v| !v.is_empty()) {
            debug!(var = ENV_CACHE_PATH, "Applying override");
            self.symbol_cache_path = Some(PathBuf::from(path));
        }
        if let Some(bucket) = lookup(ENV_BUCKET).filter(|v| !v.is_empty()) {
            debug!(var = ENV_BUCKET, "Applying override");
            self.bucket = bucket;
        }
    }

    /// Checks the settings needed to fetch anything.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` naming the first missing value.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.bucket.trim().is_empty() {
            return Err(StoreError::Config(format!(
                "no bucket configured (set \"bucket\" or {ENV_BUCKET})"
            )));
        }
        if self.oauth.client_id.is_empty() {
            return Err(StoreError::Config("no OAuth client_id configured".to_string()));
        }
        Ok(())
    }
}

impl SettingsAccessor for Settings {
    fn get_string(&self, key: &str) -> Option<String> {
        match key {
            SYMBOL_CACHE_PATH_KEY => self
                .symbol_cache_path
                .as_ref()
                .map(|p| p.display().to_string()),
            BUCKET_KEY => Some(self.bucket.clone()),
            STORAGE_HOST_KEY => Some(self.storage_host.clone()),
            LOG_LEVEL_KEY => Some(self.log_level.to_string()),
            _ => None,
        }
    }
}

/// OAuth client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Client ID registered with the authorization server.
    pub client_id: String,
    /// Client secret for installed-application flows.
    pub client_secret: String,
    /// Authorization endpoint the user visits.
    pub auth_server: String,
    /// Token endpoint for code and refresh exchanges.
    pub token_server: String,
    /// Requested scope.
    pub scope: String,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_server: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_server: "https://oauth2.googleapis.com/token".to_string(),
            scope: "https://www.googleapis.com/auth/devstorage.read_only".to_string(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Error level logging.
    Error,
    /// Warning level logging.
    #[default]
    Warn,
    /// Info level logging.
    Info,
    /// Debug level logging.
    Debug,
    /// Trace level logging.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Settings plus the file they were loaded from.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    settings: Settings,
    path: PathBuf,
}

impl SettingsStore {
    /// Creates a store holding default settings for `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            settings: Settings::default(),
            path,
        }
    }

    /// Loads settings from the default path.
    ///
    /// # Errors
    ///
    /// Returns error if an existing settings file cannot be parsed.
    pub async fn load_default() -> Result<Self, StoreError> {
        Self::load(default_settings_path()).await
    }

    /// Loads settings from a path, then applies environment overrides.
    ///
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns error if an existing settings file cannot be parsed.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let mut settings = match load_json::<Settings>(&path).await {
            Ok(settings) => {
                info!(path = %path.display(), "Loaded settings");
                settings
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %path.display(), "Settings file not found, using defaults");
                Settings::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load settings");
                return Err(e);
            }
        };
        settings.apply_env_overrides();
        Ok(Self { settings, path })
    }

    /// Current settings.
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// File the settings are saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modifies the settings in memory.
    pub fn update<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        f(&mut self.settings);
    }

    /// Saves settings to disk.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        save_json(&self.path, &self.settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

impl SettingsAccessor for SettingsStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.settings.get_string(key)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.storage_host, "storage.googleapis.com");
        assert_eq!(settings.refresh_margin_secs, 100);
        assert_eq!(settings.request_timeout_secs, 30);
        assert!(settings.symbol_cache_path.is_none());
        assert!(settings.oauth.token_server.starts_with("https://"));
    }

    #[test]
    fn test_accessor_keys() {
        let settings = Settings {
            symbol_cache_path: Some(PathBuf::from("/cache")),
            bucket: "gs://syms".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            settings.get_string(SYMBOL_CACHE_PATH_KEY).as_deref(),
            Some("/cache")
        );
        assert_eq!(settings.get_string(BUCKET_KEY).as_deref(), Some("gs://syms"));
        assert_eq!(
            settings.get_string(STORAGE_HOST_KEY).as_deref(),
            Some("storage.googleapis.com")
        );
        assert_eq!(settings.get_string(LOG_LEVEL_KEY).as_deref(), Some("warn"));
        assert_eq!(settings.get_string("unknown"), None);
        assert_eq!(Settings::default().get_string(SYMBOL_CACHE_PATH_KEY), None);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> =
            [(ENV_CACHE_PATH, "/override"), (ENV_BUCKET, "")].into_iter().collect();
        let mut settings = Settings {
            bucket: "from-file".to_string(),
            ..Settings::default()
        };
        settings.apply_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(settings.symbol_cache_path, Some(PathBuf::from("/override")));
        assert_eq!(settings.bucket, "from-file");
    }

    #[test]
    fn test_validate() {
        let mut settings = Settings::default();
        assert!(matches!(settings.validate(), Err(StoreError::Config(m)) if m.contains("bucket")));

        settings.bucket = "syms".to_string();
        assert!(matches!(settings.validate(), Err(StoreError::Config(m)) if m.contains("client_id")));

        settings.oauth.client_id = "id".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"bucket":"syms","oauth":{"client_id":"abc"}}"#).unwrap();
        assert_eq!(settings.bucket, "syms");
        assert_eq!(settings.oauth.client_id, "abc");
        assert_eq!(settings.oauth.scope, OAuthSettings::default().scope);
        assert_eq!(settings.refresh_margin_secs, 100);
    }
}

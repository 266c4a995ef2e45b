// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `symsrv` Store
//!
//! Persisted state for `symsrv`.
//!
//! - **SettingsStore**: JSON settings with defaults and env overrides
//! - **RefreshTokenStore**: The OAuth refresh token file
//! - **Persistence**: Default paths and owner-only file helpers
//!
//! ## Usage
//!
//! ```ignore
//! use symsrv_store::{RefreshTokenStore, SettingsStore};
//!
//! let settings = SettingsStore::load_default().await?;
//! let tokens = RefreshTokenStore::default_location();
//! if let Some(token) = tokens.load().await? {
//!     println!("have a refresh token for {}", settings.get().bucket);
//! }
//! ```

pub mod error;
pub mod persistence;
pub mod settings_store;
pub mod token_store;

pub use error::StoreError;
pub use persistence::{
    APP_DIR_NAME, default_cache_dir, default_config_dir, default_settings_path,
    default_token_path, load_json, save_json,
};
pub use settings_store::{
    BUCKET_KEY, ENV_BUCKET, ENV_CACHE_PATH, LOG_LEVEL_KEY, LogLevel, OAuthSettings,
    STORAGE_HOST_KEY, Settings, SettingsStore,
};
pub use token_store::RefreshTokenStore;
#[cfg(test)]
mod persistence_tests;

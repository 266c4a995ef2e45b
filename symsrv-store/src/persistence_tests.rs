//! Settings persistence and edge case tests.

use std::path::PathBuf;
use tempfile::TempDir;

use crate::error::StoreError;
use crate::persistence::{load_json, save_json};
use crate::settings_store::{LogLevel, Settings, SettingsStore};

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested_path = temp_dir.path().join("deeply").join("nested").join("settings.json");

    save_json(&nested_path, &serde_json::json!({"key": "value"}))
        .await
        .unwrap();

    assert!(nested_path.exists());
    assert!(!nested_path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_load_nonexistent_file() {
    let file_path = PathBuf::from("/nonexistent/path/settings.json");

    let result: Result<Settings, _> = load_json(&file_path).await;
    assert!(result.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_store_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let store = SettingsStore::load(temp_dir.path().join("settings.json"))
        .await
        .unwrap();

    assert_eq!(store.get().storage_host, Settings::default().storage_host);
    assert_eq!(store.get().refresh_margin_secs, 100);
}

#[tokio::test]
async fn test_store_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");

    let mut store = SettingsStore::new(path.clone());
    store.update(|s| {
        s.bucket = "gs://symbols/prod".to_string();
        s.oauth.client_id = "client-1".to_string();
        s.log_level = LogLevel::Debug;
        s.refresh_margin_secs = 300;
    });
    store.save().await.unwrap();

    let loaded = SettingsStore::load(path).await.unwrap();
    assert_eq!(loaded.get().oauth.client_id, "client-1");
    assert_eq!(loaded.get().log_level, LogLevel::Debug);
    assert_eq!(loaded.get().refresh_margin_secs, 300);
}

#[tokio::test]
async fn test_store_rejects_corrupt_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let result = SettingsStore::load(path).await;
    assert!(matches!(result, Err(StoreError::Serialization(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_saved_settings_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    SettingsStore::new(path.clone()).save().await.unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

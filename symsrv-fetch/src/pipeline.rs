//! Symbol fetch pipeline.
//!
//! Builds object URLs from build IDs, performs the authenticated request, and
//! hands finished downloads to the [`SymbolCache`].

use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use symsrv_core::{BuildId, FileType, SymbolError};
use tracing::{debug, instrument};

use crate::cache::SymbolCache;
use crate::host::{Connector, Method, Transport};

/// Object storage host used when none is configured.
pub const DEFAULT_STORAGE_HOST: &str = "storage.googleapis.com";

// ============================================================================
// URL Building
// ============================================================================

/// Normalizes a bucket setting to `bucket/optional/prefix/`.
///
/// Accepts a `gs://` scheme, leading slashes, and a missing trailing slash.
pub fn normalize_bucket_path(bucket: &str) -> String {
    let trimmed = bucket.trim();
    let without_scheme = trimmed.strip_prefix("gs://").unwrap_or(trimmed);
    let path = without_scheme.trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Builds the object URL for a build ID.
///
/// `storage_host` may carry its own scheme; otherwise `https` is used.
pub fn build_url(storage_host: &str, bucket_path: &str, id: &BuildId, file_type: FileType) -> String {
    let host = storage_host.trim_end_matches('/');
    let base = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    format!("{base}/{bucket_path}{id}{}", file_type.suffix())
}

/// Maps an HTTP status to the fetch outcome.
///
/// # Errors
///
/// - `401` → `AuthExpired`
/// - `404`, `410` → `NotFound`
/// - any other non-2xx → `UnexpectedResponse`
pub fn interpret_status(status: u16, id: &BuildId) -> Result<(), SymbolError> {
    match status {
        200..=299 => Ok(()),
        401 => Err(SymbolError::AuthExpired),
        404 | 410 => Err(SymbolError::NotFound(id.to_string())),
        code => Err(SymbolError::UnexpectedResponse(code)),
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Fetches symbol files from one bucket into one cache.
#[derive(Clone)]
pub struct FetchPipeline {
    connector: Rc<dyn Connector>,
    storage_host: String,
    bucket_path: String,
    cache: SymbolCache,
    timeout: Option<Duration>,
}

impl FetchPipeline {
    /// Creates a pipeline for `bucket` with no cache.
    pub fn new(connector: Rc<dyn Connector>, bucket: &str) -> Self {
        Self {
            connector,
            storage_host: DEFAULT_STORAGE_HOST.to_string(),
            bucket_path: normalize_bucket_path(bucket),
            cache: SymbolCache::disabled(),
            timeout: None,
        }
    }

    /// Overrides the storage host.
    pub fn with_storage_host(mut self, host: impl Into<String>) -> Self {
        self.storage_host = host.into();
        self
    }

    /// Sets the cache downloads are stored in.
    pub fn with_cache(mut self, cache: SymbolCache) -> Self {
        self.cache = cache;
        self
    }

    /// Sets a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The cache downloads land in.
    pub fn cache(&self) -> &SymbolCache {
        &self.cache
    }

    /// Normalized bucket path.
    pub fn bucket_path(&self) -> &str {
        &self.bucket_path
    }

    /// Object URL for a build ID.
    pub fn url_for(&self, id: &BuildId, file_type: FileType) -> String {
        build_url(&self.storage_host, &self.bucket_path, id, file_type)
    }

    fn transport(
        &self,
        id: &BuildId,
        file_type: FileType,
        access_token: &str,
    ) -> Result<Transport, SymbolError> {
        let mut transport = Transport::new(Rc::clone(&self.connector))?;
        transport
            .set_url(self.url_for(id, file_type))
            .add_header(format!("Authorization: Bearer {access_token}"));
        if let Some(timeout) = self.timeout {
            transport.set_timeout(timeout);
        }
        Ok(transport)
    }

    /// Checks that a file exists without downloading it.
    ///
    /// # Errors
    ///
    /// Returns the interpreted status for non-2xx responses, or a
    /// `NetworkError` if the exchange fails.
    #[instrument(skip(self, access_token), fields(build_id = %id, file_type = %file_type))]
    pub async fn check(
        &self,
        id: &BuildId,
        file_type: FileType,
        access_token: &str,
    ) -> Result<(), SymbolError> {
        let mut transport = self.transport(id, file_type, access_token)?;
        transport.set_method(Method::Head);
        let response = transport.perform().await?;
        interpret_status(response.status, id)
    }

    /// Downloads a file into the cache and returns its final path.
    ///
    /// The body is streamed to a temporary file. On any failure before
    /// relocation the temporary file is removed.
    ///
    /// # Errors
    ///
    /// Returns the interpreted status, a `NetworkError`, or the cache's
    /// `NoCacheConfigured` / `FileSystemError` outcomes.
    #[instrument(skip(self, access_token), fields(build_id = %id, file_type = %file_type))]
    pub async fn download(
        &self,
        id: &BuildId,
        file_type: FileType,
        access_token: &str,
    ) -> Result<std::path::PathBuf, SymbolError> {
        let temp = self
            .cache
            .temp_file(id)
            .map_err(|e| SymbolError::FileSystemError {
                message: format!("Failed to create temporary file: {e}"),
                path: None,
            })?;
        let mut writer = temp.reopen().map_err(|e| SymbolError::FileSystemError {
            message: format!("Failed to open temporary file: {e}"),
            path: None,
        })?;

        let mut transport = self.transport(id, file_type, access_token)?;
        transport.set_body_collector(move |chunk| writer.write_all(chunk));

        let response = transport.perform().await?;
        interpret_status(response.status, id)?;
        debug!(bytes = response.bytes_received, "Download complete");

        self.cache.store(temp, id, file_type).await
    }
}

impl std::fmt::Debug for FetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPipeline")
            .field("storage_host", &self.storage_host)
            .field("bucket_path", &self.bucket_path)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MockConnector, MockReply};

    fn id(s: &str) -> BuildId {
        BuildId::parse(s).unwrap()
    }

    fn entries(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                found.extend(entries(&path));
            } else {
                found.push(path);
            }
        }
        found
    }

    #[test]
    fn test_normalize_bucket_path() {
        assert_eq!(normalize_bucket_path("my-bucket"), "my-bucket/");
        assert_eq!(normalize_bucket_path("gs://my-bucket/debug"), "my-bucket/debug/");
        assert_eq!(normalize_bucket_path("/my-bucket/"), "my-bucket/");
        assert_eq!(normalize_bucket_path(""), "");
    }

    #[test]
    fn test_build_url() {
        let bid = id("deadbeef01");
        assert_eq!(
            build_url(DEFAULT_STORAGE_HOST, "syms/", &bid, FileType::DebugInfo),
            "https://storage.googleapis.com/syms/deadbeef01.debug"
        );
        assert_eq!(
            build_url(DEFAULT_STORAGE_HOST, "syms/", &bid, FileType::Binary),
            "https://storage.googleapis.com/syms/deadbeef01"
        );
        assert_eq!(
            build_url("http://127.0.0.1:8080/", "b/", &bid, FileType::Binary),
            "http://127.0.0.1:8080/b/deadbeef01"
        );
    }

    #[test]
    fn test_interpret_status() {
        let bid = id("abc");
        assert!(interpret_status(200, &bid).is_ok());
        assert!(interpret_status(206, &bid).is_ok());
        assert_eq!(interpret_status(401, &bid), Err(SymbolError::AuthExpired));
        assert_eq!(
            interpret_status(404, &bid),
            Err(SymbolError::NotFound("abc".into()))
        );
        assert_eq!(
            interpret_status(410, &bid),
            Err(SymbolError::NotFound("abc".into()))
        );
        assert_eq!(
            interpret_status(403, &bid),
            Err(SymbolError::UnexpectedResponse(403))
        );
    }

    #[tokio::test]
    async fn test_download_into_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Rc::new(MockConnector::new());
        mock.on(
            Method::Get,
            "/syms/deadbeef01.debug",
            MockReply::new(200, "SYMDATA"),
        );

        let pipeline = FetchPipeline::new(mock.clone(), "gs://syms")
            .with_cache(SymbolCache::new(dir.path()));
        let path = pipeline
            .download(&id("deadbeef01"), FileType::DebugInfo, "AT1")
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("de/adbeef01.debug"));
        assert_eq!(std::fs::read(&path).unwrap(), b"SYMDATA");
        assert_eq!(entries(dir.path()), vec![path]);
        assert_eq!(
            mock.requests()[0].header("authorization"),
            Some("Bearer AT1")
        );
    }

    #[tokio::test]
    async fn test_download_not_found_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Get, "/syms/", MockReply::new(404, "no such object"));

        let pipeline =
            FetchPipeline::new(mock, "syms").with_cache(SymbolCache::new(dir.path()));
        let err = pipeline
            .download(&id("deadbeef01"), FileType::DebugInfo, "AT1")
            .await
            .unwrap_err();

        assert_eq!(err, SymbolError::NotFound("deadbeef01".into()));
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_download_network_error_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Get, "/syms/", MockReply::network_error("reset"));

        let pipeline =
            FetchPipeline::new(mock, "syms").with_cache(SymbolCache::new(dir.path()));
        let err = pipeline
            .download(&id("abcdef"), FileType::Binary, "AT1")
            .await
            .unwrap_err();

        assert!(matches!(err, SymbolError::NetworkError(_)));
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_download_without_cache() {
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Get, "/syms/abcdef", MockReply::new(200, "BIN"));

        let pipeline = FetchPipeline::new(mock, "syms");
        let err = pipeline
            .download(&id("abcdef"), FileType::Binary, "AT1")
            .await
            .unwrap_err();

        let SymbolError::NoCacheConfigured { path } = err else {
            panic!("expected NoCacheConfigured, got {err:?}");
        };
        assert_eq!(std::fs::read(&path).unwrap(), b"BIN");
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_check_uses_head() {
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Head, "/syms/abcdef.debug", MockReply::new(200, ""));
        mock.on(Method::Head, "/syms/abcdef.debug", MockReply::new(401, ""));

        let pipeline = FetchPipeline::new(mock.clone(), "syms");
        let bid = id("abcdef");
        assert!(pipeline.check(&bid, FileType::DebugInfo, "AT").await.is_ok());
        assert_eq!(
            pipeline.check(&bid, FileType::DebugInfo, "AT").await,
            Err(SymbolError::AuthExpired)
        );
        assert!(mock.requests().iter().all(|r| r.method == Method::Head));
    }
}

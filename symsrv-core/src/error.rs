//! Symbol acquisition error taxonomy.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type reported to symbol server callers.
///
/// Every variant is cheap to clone so a single outcome can be both recorded
/// in the error log and handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    /// The server is not in the `Ready` state.
    #[error("Symbol server is not ready")]
    NotReady,

    /// Connection refused, timeout, DNS failure, or a broken body stream.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The storage backend rejected the access token (HTTP 401).
    #[error("Authentication expired")]
    AuthExpired,

    /// No file exists for this build ID (HTTP 404/410).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status code.
    #[error("Unexpected response code: {0}")]
    UnexpectedResponse(u16),

    /// The download succeeded but no symbol cache directory is configured.
    #[error("No symbol cache configured, file left at {}", path.display())]
    NoCacheConfigured {
        /// Where the downloaded file was left.
        path: PathBuf,
    },

    /// The download succeeded but could not be moved into the cache.
    #[error("File system error: {message}")]
    FileSystemError {
        /// What went wrong.
        message: String,
        /// The downloaded file's temporary location, if it still exists.
        path: Option<PathBuf>,
    },

    /// The build ID is not a usable hex string.
    #[error("Invalid build ID: {0}")]
    InvalidBuildId(String),

    /// `authenticate` was called while not in the `Auth` state.
    #[error("Authentication not required")]
    AuthNotRequired,

    /// The token endpoint rejected the exchange.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The request was abandoned before completing.
    ///
    /// Servers never pass this to a callback: a server that is dropped
    /// drops its pending callbacks instead. Code that bridges a callback to
    /// a channel reports it when the sending half goes away, and
    /// `Transport::perform_async` reports it for a released transport.
    #[error("Request cancelled")]
    Cancelled,
}

impl SymbolError {
    /// Returns the path of a downloaded file the caller can still use.
    ///
    /// Only `NoCacheConfigured` and `FileSystemError` carry one.
    pub fn usable_path(&self) -> Option<&Path> {
        match self {
            Self::NoCacheConfigured { path } => Some(path),
            Self::FileSystemError { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// Returns true if calling `fetch` again might succeed without
    /// re-authenticating.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError(_) => true,
            Self::UnexpectedResponse(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    /// Returns true for outcomes that say nothing about server health.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::NoCacheConfigured { .. } | Self::FileSystemError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_path() {
        let err = SymbolError::NoCacheConfigured {
            path: PathBuf::from("/tmp/x"),
        };
        assert_eq!(err.usable_path(), Some(Path::new("/tmp/x")));

        let err = SymbolError::FileSystemError {
            message: "rename failed".to_string(),
            path: None,
        };
        assert_eq!(err.usable_path(), None);

        assert_eq!(SymbolError::AuthExpired.usable_path(), None);
    }

    #[test]
    fn test_is_retryable() {
        assert!(SymbolError::NetworkError("timeout".into()).is_retryable());
        assert!(SymbolError::UnexpectedResponse(503).is_retryable());
        assert!(SymbolError::UnexpectedResponse(429).is_retryable());
        assert!(!SymbolError::UnexpectedResponse(403).is_retryable());
        assert!(!SymbolError::NotFound("ab12".into()).is_retryable());
        assert!(!SymbolError::AuthExpired.is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SymbolError::UnexpectedResponse(500).to_string(),
            "Unexpected response code: 500"
        );
        assert_eq!(SymbolError::NotReady.to_string(), "Symbol server is not ready");
    }
}

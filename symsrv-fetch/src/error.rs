//! Transport error types.

use symsrv_core::SymbolError;
use thiserror::Error;

/// Error type for a single HTTP exchange.
///
/// Non-success status codes are not errors at this layer; they are reported
/// through [`TransportResponse::status`](crate::host::transport::TransportResponse).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, timeout, DNS failure, TLS failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The request was abandoned before it completed.
    #[error("Request cancelled")]
    Cancelled,

    /// The URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A header line was not of the form `Name: value`.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The body collector rejected a chunk.
    #[error("Body collector failed: {0}")]
    Body(#[from] std::io::Error),

    /// Process-wide transport state could not be set up.
    #[error("Transport initialization failed: {0}")]
    Init(String),

    /// A blocking request could not build its runtime.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Network(format!("Request timed out: {err}"))
        } else if err.is_connect() {
            TransportError::Network(format!("Connection failed: {err}"))
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

impl From<TransportError> for SymbolError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => SymbolError::Cancelled,
            TransportError::Body(e) => SymbolError::FileSystemError {
                message: format!("Failed to write download: {e}"),
                path: None,
            },
            other => SymbolError::NetworkError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_symbol_error() {
        assert_eq!(
            SymbolError::from(TransportError::Cancelled),
            SymbolError::Cancelled
        );
        assert!(matches!(
            SymbolError::from(TransportError::Network("refused".into())),
            SymbolError::NetworkError(msg) if msg.contains("refused")
        ));
        assert!(matches!(
            SymbolError::from(TransportError::Body(std::io::Error::other("disk full"))),
            SymbolError::FileSystemError { path: None, .. }
        ));
    }
}

//! JSON output formatting.

use anyhow::Result;
use serde::Serialize;
use symsrv_core::{FetchContinuation, FetchRequest, FetchResult, FileType, ServerState, SymbolError};
use symsrv_server::{DownloadCounts, SessionStatus};

// ============================================================================
// Output Types
// ============================================================================

/// Outcome of one `fetch`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutput {
    pub build_id: String,
    pub file_type: FileType,
    /// Where the file is, including a temp file left outside the cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchOutput {
    /// Builds the output for one request and its final result.
    pub fn new(request: &FetchRequest, result: &FetchResult, attempts: u32) -> Self {
        let (path, error) = match result {
            Ok(path) => (Some(path.display().to_string()), None),
            Err(e) => (
                e.usable_path().map(|p| p.display().to_string()),
                Some(e.to_string()),
            ),
        };
        Self {
            build_id: request.build_id.clone(),
            file_type: request.file_type,
            path,
            attempts,
            error,
        }
    }

    /// Returns true if the caller has a file to use.
    pub fn has_file(&self) -> bool {
        self.path.is_some()
    }
}

/// Outcome of one `check`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutput {
    pub build_id: String,
    pub file_type: FileType,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckOutput {
    /// Builds the output for one request and its check result.
    pub fn new(request: &FetchRequest, result: &Result<FetchContinuation, SymbolError>) -> Self {
        Self {
            build_id: request.build_id.clone(),
            file_type: request.file_type,
            available: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        }
    }
}

/// Server and session status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub server: String,
    pub state: ServerState,
    pub healthy: bool,
    pub ready_count: u64,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_refresh_secs: Option<u64>,
    pub downloads: DownloadCounts,
    pub errors: Vec<String>,
}

impl From<&SessionStatus> for StatusOutput {
    fn from(status: &SessionStatus) -> Self {
        let server = &status.server;
        Self {
            server: server.name.clone(),
            state: server.state,
            healthy: server.is_healthy(),
            ready_count: server.ready_count,
            retry_count: server.retry_count,
            next_refresh_secs: server.next_refresh.map(|d| d.as_secs()),
            downloads: status.downloads,
            errors: server.errors.iter().map(ToString::to_string).collect(),
        }
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats a list, unwrapping a single element.
    pub fn format_list<T: Serialize>(&self, items: &[T]) -> Result<String> {
        match items {
            [single] => self.format(single),
            _ => self.format(&items),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Symbol server state types.
//!
//! - [`ServerState`] - States of the connection state machine
//! - [`ErrorLog`] - Append-only diagnostic log
//! - [`ServerStatus`] - Point-in-time snapshot for status reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Server State
// ============================================================================

/// State of a symbol server.
///
/// ```text
/// Initializing ──► Busy ──► Ready ──► Busy (refresh) ──► Ready
///      │            │         │                  │
///      └──► Auth ◄──┴─────────┴──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Created, `init` not yet run.
    #[default]
    Initializing,
    /// Needs an authorization code from the user.
    Auth,
    /// A token exchange is in flight.
    Busy,
    /// Holds a valid access token; fetches are permitted.
    Ready,
}

impl ServerState {
    /// Returns true if fetches are permitted.
    pub fn is_ready(&self) -> bool {
        *self == Self::Ready
    }

    /// Returns true if the user must supply an authorization code.
    pub fn needs_auth(&self) -> bool {
        *self == Self::Auth
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Auth => write!(f, "authentication required"),
            Self::Busy => write!(f, "busy"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

// ============================================================================
// Error Log
// ============================================================================

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%Y-%m-%d %H:%M:%S"), self.message)
    }
}

/// Append-only, ordered log of failures. Entries are never removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorLog {
    entries: Vec<ErrorEntry>,
}

impl ErrorLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message stamped with the current time.
    pub fn push(&mut self, message: impl Into<String>) {
        self.entries.push(ErrorEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    /// Returns all entries, oldest first.
    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    /// Returns just the messages, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Server Status
// ============================================================================

/// Snapshot of a server's health, for status commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Server name (usually the bucket).
    pub name: String,
    /// Current state.
    pub state: ServerState,
    /// How many times the server has entered `Ready`.
    pub ready_count: u64,
    /// Failed, non-stale requests since creation.
    pub retry_count: u32,
    /// Recorded failures, oldest first.
    pub errors: Vec<ErrorEntry>,
    /// Time until the scheduled token refresh, if one is pending.
    pub next_refresh: Option<Duration>,
}

impl ServerStatus {
    /// Returns true if the server is usable and has not recorded failures.
    pub fn is_healthy(&self) -> bool {
        self.state.is_ready() && self.retry_count == 0
    }
}

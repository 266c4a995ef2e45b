//! Reference-counted process-wide transport state.
//!
//! The first live [`TransportInit`] guard builds the shared HTTP client
//! (connection pool, TLS configuration); dropping the last one tears it down.
//! Guards are held by every [`Transport`](super::transport::Transport), so a
//! burst of short-lived requests shares one client while an idle process
//! holds none.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::TransportError;

/// Connect timeout for the shared client.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// User agent string for symsrv.
const USER_AGENT: &str = concat!("symsrv/", env!("CARGO_PKG_VERSION"));

struct GlobalState {
    users: usize,
    client: Option<Client>,
}

static GLOBAL: Mutex<GlobalState> = Mutex::new(GlobalState {
    users: 0,
    client: None,
});

fn lock() -> MutexGuard<'static, GlobalState> {
    GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
}

fn build_client() -> Result<Client, TransportError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|e| TransportError::Init(e.to_string()))
}

// ============================================================================
// Guard
// ============================================================================

/// Scope guard keeping process-wide transport state alive.
#[derive(Debug)]
pub struct TransportInit {
    _private: (),
}

impl TransportInit {
    /// Registers a new user, initializing global state if it is the first.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Init` if the HTTP client cannot be built.
    pub fn acquire() -> Result<Self, TransportError> {
        let mut state = lock();
        if state.users == 0 {
            state.client = Some(build_client()?);
            debug!("Transport state initialized");
        }
        state.users += 1;
        Ok(Self { _private: () })
    }

    /// Number of live guards in the process.
    pub fn live_count() -> usize {
        lock().users
    }

    /// Returns true while at least one guard is alive.
    pub fn is_initialized() -> bool {
        lock().client.is_some()
    }
}

impl Drop for TransportInit {
    fn drop(&mut self) {
        let mut state = lock();
        state.users = state.users.saturating_sub(1);
        if state.users == 0 {
            state.client = None;
            debug!("Transport state released");
        }
    }
}

/// Returns the shared client. Only valid while a guard is alive.
pub(crate) fn shared_client() -> Result<Client, TransportError> {
    lock()
        .client
        .clone()
        .ok_or_else(|| TransportError::Init("transport used without an init guard".to_string()))
}

//! Cloud storage symbol server.
//!
//! [`CloudStorageServer`] owns the credentials and drives the connection
//! state machine:
//!
//! ```text
//! Initializing ──(no token)──────────────▶ Auth
//!      │                                    │ authenticate
//!      └──(persisted token)──▶ Busy ◀───────┘
//!                               │ ▲
//!                      success  │ │ refresh (timer or manual)
//!                               ▼ │
//!                              Ready ──(401 / refresh failure)──▶ Auth
//! ```
//!
//! Every entry into `Ready` bumps `ready_count`. Requests capture it when
//! issued, and a failure whose captured value no longer matches is stale: it
//! still reaches the caller but does not touch the retry counter, the error
//! log, or the state.
//!
//! All work runs on the event loop. Tasks hold a [`CancellationToken`] that
//! the server cancels when dropped. Pending callbacks are then dropped without
//! being called, so a caller bridging a callback to a future sees its channel
//! close and reports [`SymbolError::Cancelled`] itself.
//!
//! [`CloudStorageServer::watch_state`] publishes every transition on a
//! [`watch`] channel.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use symsrv_core::{
    AuthCallback, BuildId, CheckFetchCallback, ErrorLog, FetchCallback, FetchContinuation,
    FetchRequest, ServerState, ServerStatus, SymbolError, SymbolServer,
};
use symsrv_fetch::host::event_loop;
use symsrv_fetch::{Connector, FetchPipeline, SymbolCache, TimerHandle};
use symsrv_store::{RefreshTokenStore, Settings};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{Authenticator, OAuthConfig, TokenGrant};

/// How long before expiry the access token is refreshed.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(100);

/// Delay until the refresh for a token living `expires_in`.
///
/// `expires_in - margin`, but never less than half the lifetime so short-lived
/// tokens are not refreshed in a tight loop.
pub fn refresh_delay(expires_in: Duration, margin: Duration) -> Duration {
    expires_in.saturating_sub(margin).max(expires_in / 2)
}

// ============================================================================
// Shared State
// ============================================================================

struct Core {
    state: ServerState,
    init_started: bool,
    ready_count: u64,
    access_token: Option<String>,
    refresh_token: Option<String>,
    retry_count: u32,
    errors: ErrorLog,
    refresh_timer: Option<TimerHandle>,
}

impl Core {
    fn new() -> Self {
        Self {
            state: ServerState::Initializing,
            init_started: false,
            ready_count: 0,
            access_token: None,
            refresh_token: None,
            retry_count: 0,
            errors: ErrorLog::new(),
            refresh_timer: None,
        }
    }

    fn cancel_refresh_timer(&mut self) {
        if let Some(timer) = self.refresh_timer.take() {
            timer.cancel();
        }
    }
}

struct Inner {
    name: String,
    pipeline: FetchPipeline,
    authenticator: Authenticator,
    refresh_margin: Duration,
    core: RefCell<Core>,
    state_tx: watch::Sender<ServerState>,
}

/// What posted tasks capture: the shared state plus the server's lifetime.
#[derive(Clone)]
struct Handle {
    inner: Rc<Inner>,
    token: CancellationToken,
}

impl Handle {
    fn post<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        event_loop::post_cancellable(&self.token, task);
    }

    /// Delivers `value` from the loop, never on the caller's stack.
    fn deliver<T: 'static>(&self, callback: Box<dyn FnOnce(T)>, value: T) {
        self.post(async move { callback(value) });
    }

    fn set_state(&self, core: &mut Core, to: ServerState) {
        if core.state != to {
            info!(server = %self.inner.name, from = %core.state, to = %to, "State transition");
            core.state = to;
            self.inner.state_tx.send_replace(to);
        }
    }

    fn enter_auth(&self, core: &mut Core) {
        core.access_token = None;
        core.cancel_refresh_timer();
        self.set_state(core, ServerState::Auth);
    }

    fn enter_ready(&self, grant: TokenGrant) {
        let mut core = self.inner.core.borrow_mut();
        core.access_token = Some(grant.access_token);
        if let Some(refresh_token) = grant.refresh_token {
            core.refresh_token = Some(refresh_token);
        }
        core.ready_count += 1;
        let generation = core.ready_count;
        self.set_state(&mut core, ServerState::Ready);

        core.cancel_refresh_timer();
        if let Some(expires_in) = grant.expires_in {
            let delay = refresh_delay(expires_in, self.inner.refresh_margin);
            let handle = self.clone();
            core.refresh_timer = Some(event_loop::post_timer(delay, async move {
                handle.on_refresh_timer(generation);
            }));
            debug!(delay_secs = delay.as_secs(), "Scheduled token refresh");
        }
    }

    // ------------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------------

    async fn run_init(self) {
        match self.inner.authenticator.load_refresh_token().await {
            Ok(Some(refresh_token)) => {
                {
                    let mut core = self.inner.core.borrow_mut();
                    core.refresh_token = Some(refresh_token.clone());
                    self.set_state(&mut core, ServerState::Busy);
                }
                self.run_refresh(refresh_token).await;
            }
            Ok(None) => {
                info!(server = %self.inner.name, "No stored credentials, authentication required");
                let mut core = self.inner.core.borrow_mut();
                self.enter_auth(&mut core);
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored credentials");
                let mut core = self.inner.core.borrow_mut();
                core.errors.push(format!("Failed to read stored credentials: {e}"));
                self.enter_auth(&mut core);
            }
        }
    }

    async fn run_refresh(&self, refresh_token: String) {
        match self.inner.authenticator.refresh(&refresh_token).await {
            Ok(grant) => self.enter_ready(grant),
            Err(e) => {
                warn!(server = %self.inner.name, error = %e, "Token refresh failed");
                let mut core = self.inner.core.borrow_mut();
                core.errors.push(format!("Token refresh failed: {e}"));
                self.enter_auth(&mut core);
            }
        }
    }

    fn on_refresh_timer(&self, generation: u64) {
        {
            let mut core = self.inner.core.borrow_mut();
            // This task is the timer; clearing the handle keeps it from being aborted.
            core.refresh_timer = None;
            if core.ready_count != generation {
                debug!(generation, current = core.ready_count, "Refresh timer superseded");
                return;
            }
        }
        self.start_refresh();
    }

    fn start_refresh(&self) {
        let refresh_token = {
            let mut core = self.inner.core.borrow_mut();
            if core.state != ServerState::Ready {
                debug!(state = %core.state, "Refresh skipped");
                return;
            }
            core.cancel_refresh_timer();
            let Some(refresh_token) = core.refresh_token.clone() else {
                core.errors.push("Token refresh failed: no refresh token".to_string());
                self.enter_auth(&mut core);
                return;
            };
            self.set_state(&mut core, ServerState::Busy);
            refresh_token
        };

        let handle = self.clone();
        self.post(async move { handle.run_refresh(refresh_token).await });
    }

    fn authenticate(&self, code: &str, callback: AuthCallback) {
        {
            let mut core = self.inner.core.borrow_mut();
            if core.state != ServerState::Auth {
                drop(core);
                self.deliver(callback, Err(SymbolError::AuthNotRequired));
                return;
            }
            self.set_state(&mut core, ServerState::Busy);
        }

        let handle = self.clone();
        let code = code.to_string();
        self.post(async move {
            match handle.inner.authenticator.exchange_code(&code).await {
                Ok(grant) => {
                    handle.enter_ready(grant);
                    callback(Ok(()));
                }
                Err(e) => {
                    warn!(server = %handle.inner.name, error = %e, "Authentication failed");
                    {
                        let mut core = handle.inner.core.borrow_mut();
                        core.errors.push(format!("Authentication failed: {e}"));
                        handle.set_state(&mut core, ServerState::Auth);
                    }
                    callback(Err(e.into()));
                }
            }
        });
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Validates a request against the current state and captures its
    /// generation and access token.
    fn begin(&self, request: &FetchRequest) -> Result<(BuildId, u64, String), SymbolError> {
        let core = self.inner.core.borrow();
        if core.state != ServerState::Ready {
            return Err(SymbolError::NotReady);
        }
        let id = request.parsed_build_id()?;
        let access_token = core.access_token.clone().ok_or(SymbolError::NotReady)?;
        Ok((id, core.ready_count, access_token))
    }

    /// Applies a request outcome to the shared health state.
    fn record_outcome(&self, generation: u64, request: &FetchRequest, error: Option<&SymbolError>) {
        let Some(error) = error else {
            return;
        };
        if error.is_benign() || *error == SymbolError::Cancelled {
            debug!(request = %request, error = %error, "Request finished without a server fault");
            return;
        }

        let mut core = self.inner.core.borrow_mut();
        if core.ready_count != generation {
            debug!(
                request = %request,
                generation,
                current = core.ready_count,
                "Ignoring stale response"
            );
            return;
        }

        core.retry_count += 1;
        core.errors.push(format!("{request}: {error}"));
        warn!(request = %request, error = %error, retries = core.retry_count, "Request failed");

        if *error == SymbolError::AuthExpired && core.state == ServerState::Ready {
            self.enter_auth(&mut core);
        }
    }

    fn fetch(&self, request: FetchRequest, callback: FetchCallback) {
        let (id, generation, access_token) = match self.begin(&request) {
            Ok(begun) => begun,
            Err(e) => {
                self.deliver(callback, Err(e));
                return;
            }
        };

        let handle = self.clone();
        self.post(async move {
            let result = handle
                .inner
                .pipeline
                .download(&id, request.file_type, &access_token)
                .await;
            handle.record_outcome(generation, &request, result.as_ref().err());
            callback(result);
        });
    }

    fn check_fetch(&self, request: FetchRequest, callback: CheckFetchCallback) {
        let (id, generation, access_token) = match self.begin(&request) {
            Ok(begun) => begun,
            Err(e) => {
                self.deliver(callback, Err(e));
                return;
            }
        };

        let handle = self.clone();
        self.post(async move {
            let result = handle
                .inner
                .pipeline
                .check(&id, request.file_type, &access_token)
                .await;
            handle.record_outcome(generation, &request, result.as_ref().err());

            let result = result.map(|()| {
                let server = handle.clone();
                FetchContinuation::new(request, move |request, callback| {
                    server.fetch(request, callback);
                })
            });
            callback(result);
        });
    }

    fn status(&self) -> ServerStatus {
        let core = self.inner.core.borrow();
        ServerStatus {
            name: self.inner.name.clone(),
            state: core.state,
            ready_count: core.ready_count,
            retry_count: core.retry_count,
            errors: core.errors.entries().to_vec(),
            next_refresh: core
                .refresh_timer
                .as_ref()
                .filter(|timer| !timer.is_finished())
                .map(TimerHandle::remaining),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Symbol server backed by an OAuth-protected object storage bucket.
pub struct CloudStorageServer {
    handle: Handle,
}

impl CloudStorageServer {
    /// Creates a server in `Initializing`. Call [`SymbolServer::init`] next.
    pub fn new(
        name: impl Into<String>,
        pipeline: FetchPipeline,
        authenticator: Authenticator,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            handle: Handle {
                inner: Rc::new(Inner {
                    name: name.into(),
                    pipeline,
                    authenticator,
                    refresh_margin,
                    core: RefCell::new(Core::new()),
                    state_tx: watch::Sender::new(ServerState::Initializing),
                }),
                token: CancellationToken::new(),
            },
        }
    }

    /// Builds a server from user settings.
    pub fn from_settings(
        settings: &Settings,
        connector: Rc<dyn Connector>,
        token_store: RefreshTokenStore,
    ) -> Self {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let pipeline = FetchPipeline::new(Rc::clone(&connector), &settings.bucket)
            .with_storage_host(settings.storage_host.clone())
            .with_cache(SymbolCache::from_settings(settings))
            .with_timeout(timeout);
        let authenticator =
            Authenticator::new(OAuthConfig::from(&settings.oauth), connector, token_store)
                .with_timeout(timeout);
        let name = pipeline.bucket_path().trim_end_matches('/').to_string();

        Self::new(
            name,
            pipeline,
            authenticator,
            Duration::from_secs(settings.refresh_margin_secs),
        )
    }

    /// Refreshes the access token now. Only acts in `Ready`.
    pub fn refresh(&self) {
        self.handle.start_refresh();
    }

    /// Subscribes to state transitions. The receiver starts at the current
    /// state.
    pub fn watch_state(&self) -> watch::Receiver<ServerState> {
        self.handle.inner.state_tx.subscribe()
    }

    /// The cache downloads land in.
    pub fn cache(&self) -> &SymbolCache {
        self.handle.inner.pipeline.cache()
    }

    #[cfg(test)]
    pub(crate) fn access_token(&self) -> Option<String> {
        self.handle.inner.core.borrow().access_token.clone()
    }
}

impl SymbolServer for CloudStorageServer {
    fn name(&self) -> &str {
        &self.handle.inner.name
    }

    fn state(&self) -> ServerState {
        self.handle.inner.core.borrow().state
    }

    fn status(&self) -> ServerStatus {
        self.handle.status()
    }

    fn init(&self) {
        {
            let mut core = self.handle.inner.core.borrow_mut();
            if core.init_started {
                warn!(server = %self.name(), "init called more than once");
                return;
            }
            core.init_started = true;
        }
        let handle = self.handle.clone();
        self.handle.post(handle.run_init());
    }

    fn auth_info(&self) -> String {
        self.handle.inner.authenticator.authorization_url()
    }

    fn authenticate(&self, code: &str, callback: AuthCallback) {
        self.handle.authenticate(code, callback);
    }

    fn check_fetch(&self, request: FetchRequest, callback: CheckFetchCallback) {
        self.handle.check_fetch(request, callback);
    }

    fn fetch(&self, request: FetchRequest, callback: FetchCallback) {
        self.handle.fetch(request, callback);
    }
}

impl Drop for CloudStorageServer {
    fn drop(&mut self) {
        self.handle.token.cancel();
        if let Ok(mut core) = self.handle.inner.core.try_borrow_mut() {
            core.cancel_refresh_timer();
        }
    }
}

impl std::fmt::Debug for CloudStorageServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudStorageServer")
            .field("name", &self.handle.inner.name)
            .field("state", &self.state())
            .field("pipeline", &self.handle.inner.pipeline)
            .finish_non_exhaustive()
    }
}

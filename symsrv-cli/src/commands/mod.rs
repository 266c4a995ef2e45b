//! CLI command implementations.
//!
//! Helpers shared by the commands: building a server from settings, waiting
//! for it to settle, and turning its callbacks into futures.

pub mod auth;
pub mod config;
pub mod fetch;
pub mod ping;
pub mod status;

use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use symsrv_core::{FetchContinuation, FetchRequest, FetchResult, ServerState, SymbolError, SymbolServer};
use symsrv_fetch::{Connector, ReqwestConnector};
use symsrv_server::{CloudStorageServer, DownloadSession};
use symsrv_store::{RefreshTokenStore, Settings};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::Cli;

/// Returned when a command needs credentials that are missing or expired.
#[derive(Debug, Error)]
#[error("not authenticated; run `symsrv auth-url` and then `symsrv auth <code>`")]
pub struct NotAuthenticated;

/// Refresh token location: next to `--config` if given, the default otherwise.
pub fn token_store(cli: &Cli) -> RefreshTokenStore {
    match cli.config.as_deref().and_then(std::path::Path::parent) {
        Some(dir) => RefreshTokenStore::new(dir.join("refresh_token")),
        None => RefreshTokenStore::default_location(),
    }
}

/// Connector honoring the configured request timeout.
pub fn connector(settings: &Settings) -> Rc<dyn Connector> {
    Rc::new(ReqwestConnector::with_timeout(Duration::from_secs(
        settings.request_timeout_secs,
    )))
}

/// Builds and initializes a server, then waits until it leaves the
/// transient states.
pub async fn connect(settings: &Settings, cli: &Cli) -> Result<Rc<CloudStorageServer>> {
    settings.validate().context("Invalid settings")?;

    let server = Rc::new(CloudStorageServer::from_settings(
        settings,
        connector(settings),
        token_store(cli),
    ));
    let states = server.watch_state();
    server.init();

    // Init may refresh a token, which is bounded by the request timeout.
    let limit = Duration::from_secs(settings.request_timeout_secs.saturating_mul(2).max(1));
    let state = wait_settled(states, limit).await;
    debug!(server = %server.name(), state = %state, "Server settled");
    Ok(server)
}

/// Like [`connect`], but fails with [`NotAuthenticated`] unless `Ready`.
pub async fn connect_ready(settings: &Settings, cli: &Cli) -> Result<Rc<CloudStorageServer>> {
    let server = connect(settings, cli).await?;
    match server.state() {
        ServerState::Ready => Ok(server),
        ServerState::Auth => Err(NotAuthenticated.into()),
        other => anyhow::bail!("Server did not become ready (state: {other})"),
    }
}

/// A session over `server` sharing its cache.
pub fn session(server: &Rc<CloudStorageServer>) -> DownloadSession {
    let cache = server.cache().clone();
    DownloadSession::new(Rc::clone(server) as Rc<dyn SymbolServer>, cache)
}

/// Waits until `states` reports neither initializing nor busy, or `limit`
/// elapses. Returns the last observed state.
pub async fn wait_settled(
    mut states: watch::Receiver<ServerState>,
    limit: Duration,
) -> ServerState {
    let settled = states.wait_for(|state| {
        !matches!(state, ServerState::Initializing | ServerState::Busy)
    });
    let settled = tokio::time::timeout(limit, settled)
        .await
        .ok()
        .and_then(Result::ok)
        .map(|state| *state);
    // Timed out, or the server is gone.
    settled.unwrap_or_else(|| *states.borrow())
}

/// Fetches one file through the session.
pub async fn fetch_one(session: &DownloadSession, request: FetchRequest) -> FetchResult {
    let (tx, rx) = oneshot::channel();
    session.fetch(
        request,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    rx.await.unwrap_or(Err(SymbolError::Cancelled))
}

/// Checks one file through the session.
pub async fn check_one(
    session: &DownloadSession,
    request: FetchRequest,
) -> Result<FetchContinuation, SymbolError> {
    let (tx, rx) = oneshot::channel();
    session.check_fetch(
        request,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    rx.await.unwrap_or(Err(SymbolError::Cancelled))
}

/// Exchanges an authorization code.
pub async fn authenticate(server: &dyn SymbolServer, code: &str) -> Result<(), SymbolError> {
    let (tx, rx) = oneshot::channel();
    server.authenticate(
        code,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    rx.await.unwrap_or(Err(SymbolError::Cancelled))
}

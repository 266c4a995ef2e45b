// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `symsrv` Server
//!
//! Credential handling and the symbol server state machine.
//!
//! - [`auth::Authenticator`] - OAuth2 code exchange and token refresh
//! - [`server::CloudStorageServer`] - The authenticated, cache-backed server
//! - [`session::DownloadSession`] - Cache-first front end with download
//!   start/stop notifications
//! - [`mock_server::MockSymbolServer`] - Canned results for consumers' tests
//!
//! Everything here runs on a current-thread event loop inside a
//! `tokio::task::LocalSet`; callbacks are never invoked on the caller's
//! stack.

pub mod auth;
pub mod mock_server;
pub mod server;
pub mod session;


pub use auth::{AuthError, Authenticator, OAuthConfig, REDIRECT_URI, TokenGrant, parse_token_response};
pub use mock_server::MockSymbolServer;
pub use server::{CloudStorageServer, DEFAULT_REFRESH_MARGIN, refresh_delay};
pub use session::{DownloadCounts, DownloadSession, SessionStatus};

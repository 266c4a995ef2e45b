// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `symsrv` Core
//!
//! Core types, errors, and collaborator traits shared by every `symsrv` crate.
//!
//! ## Key Types
//!
//! ### Requests
//! - [`BuildId`] - Validated, normalized hex build identifier
//! - [`FileType`] - Binary or debug info
//! - [`FetchRequest`] - What a caller asks the symbol server for
//!
//! ### Server State
//! - [`ServerState`] - Connection state machine states
//! - [`ServerStatus`] - Snapshot for status reporting
//! - [`ErrorLog`] - Append-only diagnostic log
//!
//! ### Traits
//! - [`SymbolServer`] - The two fetch operations plus authentication
//! - [`DownloadObserver`] - Download start/stop notifications
//! - [`SettingsAccessor`] - String-keyed settings lookup

pub mod error;
pub mod models;
pub mod traits;

pub use error::SymbolError;

pub use models::{
    // Requests
    BuildId,
    FetchRequest,
    FileType,
    MIN_BUILD_ID_LEN,
    // Server state
    ErrorEntry,
    ErrorLog,
    ServerState,
    ServerStatus,
};

pub use traits::{
    AuthCallback, CheckFetchCallback, DownloadObserver, FetchCallback, FetchContinuation,
    FetchResult, SYMBOL_CACHE_PATH_KEY, SettingsAccessor, SymbolServer,
};

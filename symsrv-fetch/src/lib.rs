// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `symsrv` Fetch
//!
//! HTTP transport, event loop helpers, and the symbol fetch pipeline.
//!
//! ## Host APIs
//!
//! The [`host`] module wraps everything that touches the outside world:
//!
//! - [`host::event_loop`] - Task and timer posting on the current-thread loop
//! - [`host::global`] - Reference-counted process-wide transport state
//! - [`host::transport`] - One HTTP request/response exchange
//! - [`host::connector`] - The network seam, with `reqwest` and mock backends
//!
//! ## Fetch Pipeline
//!
//! - [`pipeline::FetchPipeline`] - Authenticated check and download of one file
//! - [`cache::SymbolCache`] - Content-addressed on-disk layout
//! - [`retry::RetryStrategy`] - Backoff advice for caller-driven retries
//!
//! ## Example
//!
//! ```ignore
//! use symsrv_fetch::{FetchPipeline, ReqwestConnector, SymbolCache};
//!
//! let pipeline = FetchPipeline::new(Rc::new(ReqwestConnector::new()), "gs://symbols")
//!     .with_cache(SymbolCache::new("/var/cache/symbols"));
//! let path = pipeline.download(&build_id, FileType::DebugInfo, &access_token).await?;
//! ```

pub mod cache;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod retry;

pub use cache::SymbolCache;
pub use error::TransportError;
pub use host::{
    BodySink, Connector, Method, MockConnector, MockGate, MockReply, PostData, RecordedRequest,
    ReqwestConnector, Request, TimerHandle, Transport, TransportInit, TransportResponse, escape,
};
pub use pipeline::{
    DEFAULT_STORAGE_HOST, FetchPipeline, build_url, interpret_status, normalize_bucket_path,
};
pub use retry::RetryStrategy;

//! Host APIs for symsrv.
//!
//! - [`event_loop`] - Task and timer posting on the current-thread loop
//! - [`global`] - Reference-counted process-wide transport state
//! - [`transport`] - One HTTP request/response exchange
//! - [`connector`] - The network seam (`Connector` trait, reqwest backend)
//! - [`mock`] - In-memory connector with canned replies

pub mod connector;
pub mod event_loop;
pub mod global;
pub mod mock;
pub mod transport;

pub use connector::{Connector, ReqwestConnector};
pub use event_loop::TimerHandle;
pub use global::TransportInit;
pub use mock::{MockConnector, MockGate, MockReply, RecordedRequest};
pub use transport::{
    BodySink, Method, PostData, Request, Transport, TransportResponse, escape,
};

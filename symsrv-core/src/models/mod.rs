//! Domain models for symsrv.
//!
//! ## Submodules
//!
//! - [`request`] - What callers ask for (BuildId, FileType, FetchRequest)
//! - [`state`] - Server state machine data (ServerState, ServerStatus, ErrorLog)

mod request;
mod state;

pub use request::{BuildId, FetchRequest, FileType, MIN_BUILD_ID_LEN};
pub use state::{ErrorEntry, ErrorLog, ServerState, ServerStatus};
#[cfg(test)]
mod serde_tests;

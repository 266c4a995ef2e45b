//! Trait definitions for symsrv.
//!
//! [`SymbolServer`] is what the debugger's symbol layer programs against.
//! [`DownloadObserver`] and [`SettingsAccessor`] are implemented by the
//! embedding session.
//!
//! All callbacks run on the event loop thread and are never invoked on the
//! stack of the call that registered them.

use std::fmt;
use std::path::PathBuf;

use crate::error::SymbolError;
use crate::models::{FetchRequest, ServerState, ServerStatus};

/// Settings key naming the local symbol cache directory.
pub const SYMBOL_CACHE_PATH_KEY: &str = "symbol-cache-path";

/// Outcome of a fetch: the path of the downloaded file.
pub type FetchResult = Result<PathBuf, SymbolError>;

/// Completion for [`SymbolServer::fetch`].
pub type FetchCallback = Box<dyn FnOnce(FetchResult)>;

/// Completion for [`SymbolServer::check_fetch`].
pub type CheckFetchCallback = Box<dyn FnOnce(Result<FetchContinuation, SymbolError>)>;

/// Completion for [`SymbolServer::authenticate`].
pub type AuthCallback = Box<dyn FnOnce(Result<(), SymbolError>)>;

// ============================================================================
// Fetch Continuation
// ============================================================================

/// Deferred download handed out by a successful `check_fetch`.
///
/// The caller decides whether the file is worth downloading and calls
/// [`FetchContinuation::fetch`] to start it; dropping it costs nothing.
pub struct FetchContinuation {
    request: FetchRequest,
    run: Box<dyn FnOnce(FetchRequest, FetchCallback)>,
}

impl FetchContinuation {
    /// Wraps the function that performs the download.
    pub fn new(
        request: FetchRequest,
        run: impl FnOnce(FetchRequest, FetchCallback) + 'static,
    ) -> Self {
        Self {
            request,
            run: Box::new(run),
        }
    }

    /// The request that was checked.
    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    /// Starts the download.
    pub fn fetch(self, callback: FetchCallback) {
        (self.run)(self.request, callback);
    }
}

impl fmt::Debug for FetchContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContinuation")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Symbol Server
// ============================================================================

/// A remote source of debug symbols.
///
/// Implementations are single-threaded: every method must be called from the
/// event loop thread, and callbacks are delivered on that loop.
pub trait SymbolServer {
    /// Human-readable name, usually the bucket.
    fn name(&self) -> &str;

    /// Current state.
    fn state(&self) -> ServerState;

    /// Snapshot for status reporting.
    fn status(&self) -> ServerStatus;

    /// Leaves `Initializing`, reusing persisted credentials when present.
    fn init(&self);

    /// URL the user visits to obtain an authorization code.
    fn auth_info(&self) -> String;

    /// Exchanges an authorization code for credentials.
    ///
    /// Only valid in `Auth`; otherwise reports `AuthNotRequired`.
    fn authenticate(&self, code: &str, callback: AuthCallback);

    /// Checks that a file exists and is accessible without downloading it.
    ///
    /// Only valid in `Ready`; otherwise reports `NotReady`.
    fn check_fetch(&self, request: FetchRequest, callback: CheckFetchCallback);

    /// Downloads a file into the symbol cache.
    ///
    /// Only valid in `Ready`; otherwise reports `NotReady`.
    fn fetch(&self, request: FetchRequest, callback: FetchCallback);
}

// ============================================================================
// Collaborators
// ============================================================================

/// Notified when the number of in-flight downloads leaves or returns to zero.
pub trait DownloadObserver {
    /// The first download of a batch started.
    fn on_downloads_started(&self);

    /// The last download of a batch finished.
    fn on_downloads_stopped(&self, num_succeeded: usize, num_failed: usize);
}

/// String-keyed access to the embedding application's settings.
pub trait SettingsAccessor {
    /// Returns the value for `key`, or `None` if unset or empty.
    fn get_string(&self, key: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_continuation_passes_request() {
        let seen = Rc::new(RefCell::new(None));
        let seen_in = Rc::clone(&seen);

        let cont = FetchContinuation::new(FetchRequest::binary("abcdef"), move |req, cb| {
            *seen_in.borrow_mut() = Some(req);
            cb(Ok(PathBuf::from("/cache/ab/cdef")));
        });
        assert_eq!(cont.request().build_id, "abcdef");

        let result = Rc::new(RefCell::new(None));
        let result_in = Rc::clone(&result);
        cont.fetch(Box::new(move |r| *result_in.borrow_mut() = Some(r)));

        assert_eq!(seen.borrow().as_ref().unwrap().build_id, "abcdef");
        assert_eq!(
            result.borrow().clone().unwrap().unwrap(),
            PathBuf::from("/cache/ab/cdef")
        );
    }
}

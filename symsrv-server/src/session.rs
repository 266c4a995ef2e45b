//! Download session.
//!
//! A [`DownloadSession`] sits between the debugger and a [`SymbolServer`].
//! It serves files already in the cache without touching the network, and
//! notifies a [`DownloadObserver`] when the number of in-flight downloads
//! leaves zero and when it returns to zero, with the batch's tallies.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use symsrv_core::{
    CheckFetchCallback, DownloadObserver, FetchCallback, FetchContinuation, FetchRequest,
    FetchResult, ServerStatus, SymbolServer,
};
use symsrv_fetch::SymbolCache;
use symsrv_fetch::host::event_loop;
use tracing::debug;

/// In-flight and finished downloads of the current batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadCounts {
    /// Downloads started and not yet finished.
    pub in_flight: usize,
    /// Finished downloads that produced a file.
    pub succeeded: usize,
    /// Finished downloads that did not.
    pub failed: usize,
}

/// Status of a session, reported on demand.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// The server's state, counters, and error log.
    pub server: ServerStatus,
    /// The current batch.
    pub downloads: DownloadCounts,
}

// ============================================================================
// Tracker
// ============================================================================

#[derive(Clone)]
struct Tracker {
    counts: Rc<RefCell<DownloadCounts>>,
    observer: Option<Rc<dyn DownloadObserver>>,
}

impl Tracker {
    fn start(&self) {
        let first = {
            let mut counts = self.counts.borrow_mut();
            counts.in_flight += 1;
            counts.in_flight == 1
        };
        if first {
            debug!("Downloads started");
            if let Some(observer) = &self.observer {
                observer.on_downloads_started();
            }
        }
    }

    fn finish(&self, result: &FetchResult) {
        let produced_file = match result {
            Ok(_) => true,
            Err(e) => e.usable_path().is_some(),
        };
        let stopped = {
            let mut counts = self.counts.borrow_mut();
            counts.in_flight = counts.in_flight.saturating_sub(1);
            if produced_file {
                counts.succeeded += 1;
            } else {
                counts.failed += 1;
            }
            if counts.in_flight == 0 {
                let batch = *counts;
                *counts = DownloadCounts::default();
                Some(batch)
            } else {
                None
            }
        };
        if let Some(batch) = stopped {
            debug!(succeeded = batch.succeeded, failed = batch.failed, "Downloads stopped");
            if let Some(observer) = &self.observer {
                observer.on_downloads_stopped(batch.succeeded, batch.failed);
            }
        }
    }

    /// Wraps `callback` so the download is counted.
    fn track(&self, callback: FetchCallback) -> FetchCallback {
        self.start();
        let tracker = self.clone();
        Box::new(move |result| {
            tracker.finish(&result);
            callback(result);
        })
    }
}

// ============================================================================
// Session
// ============================================================================

/// Cache-first front end to a symbol server.
pub struct DownloadSession {
    server: Rc<dyn SymbolServer>,
    cache: SymbolCache,
    tracker: Tracker,
}

impl DownloadSession {
    /// Creates a session without an observer.
    pub fn new(server: Rc<dyn SymbolServer>, cache: SymbolCache) -> Self {
        Self {
            server,
            cache,
            tracker: Tracker {
                counts: Rc::new(RefCell::new(DownloadCounts::default())),
                observer: None,
            },
        }
    }

    /// Sets the download observer.
    pub fn with_observer(mut self, observer: Rc<dyn DownloadObserver>) -> Self {
        self.tracker.observer = Some(observer);
        self
    }

    /// The server behind this session.
    pub fn server(&self) -> &Rc<dyn SymbolServer> {
        &self.server
    }

    /// The cache consulted before the server.
    pub fn cache(&self) -> &SymbolCache {
        &self.cache
    }

    /// Fetches a file, from the cache if present.
    pub fn fetch(&self, request: FetchRequest, callback: FetchCallback) {
        if let Some(path) = self.cache.lookup(&request) {
            debug!(request = %request, path = %path.display(), "Cache hit");
            event_loop::post_task(async move { callback(Ok(path)) });
            return;
        }
        if !self.server.state().is_ready() {
            // Reported as NotReady by the server; nothing is downloaded.
            self.server.fetch(request, callback);
            return;
        }
        self.server.fetch(request, self.tracker.track(callback));
    }

    /// Checks that a file is obtainable.
    ///
    /// A cached file yields a continuation that serves it locally. A
    /// continuation from the server is counted as a download when invoked.
    pub fn check_fetch(&self, request: FetchRequest, callback: CheckFetchCallback) {
        if let Some(path) = self.cache.lookup(&request) {
            debug!(request = %request, path = %path.display(), "Cache hit");
            let continuation = FetchContinuation::new(request, move |_, callback| {
                event_loop::post_task(async move { callback(Ok(path)) });
            });
            event_loop::post_task(async move { callback(Ok(continuation)) });
            return;
        }

        let tracker = self.tracker.clone();
        self.server.check_fetch(
            request,
            Box::new(move |result| {
                callback(result.map(|inner| {
                    let request = inner.request().clone();
                    FetchContinuation::new(request, move |_, callback| {
                        inner.fetch(tracker.track(callback));
                    })
                }));
            }),
        );
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            server: self.server.status(),
            downloads: *self.tracker.counts.borrow(),
        }
    }
}

impl std::fmt::Debug for DownloadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSession")
            .field("server", &self.server.name())
            .field("cache", &self.cache)
            .field("downloads", &*self.tracker.counts.borrow())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_server::MockSymbolServer;
    use std::cell::Cell;
    use std::path::PathBuf;
    use symsrv_core::{FileType, ServerState, SymbolError};
    use tokio::task::LocalSet;

    #[derive(Default)]
    struct RecordingObserver {
        started: Cell<usize>,
        stopped: RefCell<Vec<(usize, usize)>>,
    }

    impl DownloadObserver for RecordingObserver {
        fn on_downloads_started(&self) {
            self.started.set(self.started.get() + 1);
        }

        fn on_downloads_stopped(&self, num_succeeded: usize, num_failed: usize) {
            self.stopped.borrow_mut().push((num_succeeded, num_failed));
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn collect() -> (Rc<RefCell<Vec<FetchResult>>>, impl Fn() -> FetchCallback) {
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&results);
        let make = move || -> FetchCallback {
            let sink = Rc::clone(&sink);
            Box::new(move |r| sink.borrow_mut().push(r))
        };
        (results, make)
    }

    #[tokio::test]
    async fn test_observer_sees_one_batch() {
        LocalSet::new()
            .run_until(async {
                let server = Rc::new(MockSymbolServer::new("syms"));
                server.serve("aaa111", FileType::DebugInfo, "/tmp/aa/a111.debug");
                let observer = Rc::new(RecordingObserver::default());
                let session = DownloadSession::new(server.clone(), SymbolCache::disabled())
                    .with_observer(observer.clone());

                let (results, callback) = collect();
                session.fetch(FetchRequest::debug_info("aaa111"), callback());
                session.fetch(FetchRequest::debug_info("bbb222"), callback());
                assert_eq!(observer.started.get(), 1);
                assert_eq!(session.status().downloads.in_flight, 2);

                settle().await;

                assert_eq!(results.borrow().len(), 2);
                assert_eq!(observer.stopped.borrow().as_slice(), &[(1, 1)]);
                assert_eq!(session.status().downloads, DownloadCounts::default());

                // A second batch starts fresh.
                session.fetch(FetchRequest::debug_info("aaa111"), callback());
                settle().await;
                assert_eq!(observer.started.get(), 2);
                assert_eq!(observer.stopped.borrow().as_slice(), &[(1, 1), (1, 0)]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_cache_hit_skips_server() {
        LocalSet::new()
            .run_until(async {
                let dir = tempfile::tempdir().unwrap();
                std::fs::create_dir_all(dir.path().join("de")).unwrap();
                let cached = dir.path().join("de").join("adbeef01.debug");
                std::fs::write(&cached, b"SYMDATA").unwrap();

                let server = Rc::new(MockSymbolServer::new("syms"));
                let observer = Rc::new(RecordingObserver::default());
                let session = DownloadSession::new(server.clone(), SymbolCache::new(dir.path()))
                    .with_observer(observer.clone());

                let (results, callback) = collect();
                session.fetch(FetchRequest::debug_info("deadbeef01"), callback());
                assert!(results.borrow().is_empty());
                settle().await;

                assert_eq!(results.borrow()[0].as_ref().unwrap(), &cached);
                assert!(server.fetches().is_empty());
                assert_eq!(observer.started.get(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn test_not_ready_is_not_a_download() {
        LocalSet::new()
            .run_until(async {
                let server = Rc::new(MockSymbolServer::new("syms"));
                server.set_state(ServerState::Auth);
                let observer = Rc::new(RecordingObserver::default());
                let session = DownloadSession::new(server, SymbolCache::disabled())
                    .with_observer(observer.clone());

                let (results, callback) = collect();
                session.fetch(FetchRequest::binary("abcdef"), callback());
                settle().await;

                assert_eq!(results.borrow()[0], Err(SymbolError::NotReady));
                assert_eq!(observer.started.get(), 0);
                assert!(observer.stopped.borrow().is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn test_continuation_is_counted() {
        LocalSet::new()
            .run_until(async {
                let server = Rc::new(MockSymbolServer::new("syms"));
                server.serve("abcdef", FileType::Binary, "/tmp/ab/cdef");
                let observer = Rc::new(RecordingObserver::default());
                let session = DownloadSession::new(server, SymbolCache::disabled())
                    .with_observer(observer.clone());

                let continuation = Rc::new(RefCell::new(None));
                let slot = Rc::clone(&continuation);
                session.check_fetch(
                    FetchRequest::binary("abcdef"),
                    Box::new(move |r| *slot.borrow_mut() = Some(r)),
                );
                settle().await;
                assert_eq!(observer.started.get(), 0);

                let continuation = continuation.borrow_mut().take().unwrap().unwrap();
                let (results, callback) = collect();
                continuation.fetch(callback());
                assert_eq!(observer.started.get(), 1);
                settle().await;

                assert_eq!(
                    results.borrow()[0].as_ref().unwrap(),
                    &PathBuf::from("/tmp/ab/cdef")
                );
                assert_eq!(observer.stopped.borrow().as_slice(), &[(1, 0)]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_no_cache_configured_counts_as_success() {
        LocalSet::new()
            .run_until(async {
                let server = Rc::new(MockSymbolServer::new("syms"));
                server.set_result(
                    "abcdef",
                    FileType::Binary,
                    Err(SymbolError::NoCacheConfigured {
                        path: PathBuf::from("/tmp/symsrv-abcdef.part"),
                    }),
                );
                let observer = Rc::new(RecordingObserver::default());
                let session = DownloadSession::new(server, SymbolCache::disabled())
                    .with_observer(observer.clone());

                let (_results, callback) = collect();
                session.fetch(FetchRequest::binary("abcdef"), callback());
                settle().await;

                assert_eq!(observer.stopped.borrow().as_slice(), &[(1, 0)]);
            })
            .await;
    }
}

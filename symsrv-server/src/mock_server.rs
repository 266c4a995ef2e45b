//! Scriptable symbol server for tests of code that consumes [`SymbolServer`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;

use symsrv_core::{
    AuthCallback, CheckFetchCallback, FetchCallback, FetchContinuation, FetchRequest,
    FetchResult, FileType, ServerState, ServerStatus, SymbolError, SymbolServer,
};
use symsrv_fetch::host::event_loop;

/// A [`SymbolServer`] answering from a table of canned results.
///
/// Unknown requests report `NotFound`. Results are delivered from the loop
/// like a real server's.
#[derive(Debug)]
pub struct MockSymbolServer {
    name: String,
    state: Cell<ServerState>,
    results: RefCell<HashMap<(String, FileType), FetchResult>>,
    fetches: RefCell<Vec<FetchRequest>>,
    auth_code: RefCell<Option<String>>,
    drop_callbacks: Cell<bool>,
}

impl MockSymbolServer {
    /// Creates a mock in `Ready`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Cell::new(ServerState::Ready),
            results: RefCell::new(HashMap::new()),
            fetches: RefCell::new(Vec::new()),
            auth_code: RefCell::new(None),
            drop_callbacks: Cell::new(false),
        }
    }

    /// Forces the state.
    pub fn set_state(&self, state: ServerState) {
        self.state.set(state);
    }

    /// Sets the result for one build ID and file type.
    pub fn set_result(&self, build_id: &str, file_type: FileType, result: FetchResult) {
        self.results
            .borrow_mut()
            .insert((build_id.to_ascii_lowercase(), file_type), result);
    }

    /// Serves `path` for a build ID and file type.
    pub fn serve(&self, build_id: &str, file_type: FileType, path: impl Into<PathBuf>) {
        self.set_result(build_id, file_type, Ok(path.into()));
    }

    /// Accepts `code` in `authenticate`; any other code fails.
    pub fn accept_code(&self, code: impl Into<String>) {
        *self.auth_code.borrow_mut() = Some(code.into());
    }

    /// Drops fetch callbacks without calling them, like a server that was
    /// shut down mid-request.
    pub fn drop_callbacks(&self) {
        self.drop_callbacks.set(true);
    }

    /// Requests passed to `fetch`, in order.
    pub fn fetches(&self) -> Vec<FetchRequest> {
        self.fetches.borrow().clone()
    }

    fn result_for(&self, request: &FetchRequest) -> FetchResult {
        self.results
            .borrow()
            .get(&(request.build_id.to_ascii_lowercase(), request.file_type))
            .cloned()
            .unwrap_or_else(|| Err(SymbolError::NotFound(request.build_id.clone())))
    }
}

impl SymbolServer for MockSymbolServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ServerState {
        self.state.get()
    }

    fn status(&self) -> ServerStatus {
        ServerStatus {
            name: self.name.clone(),
            state: self.state.get(),
            ready_count: u64::from(self.state.get().is_ready()),
            retry_count: 0,
            errors: Vec::new(),
            next_refresh: None,
        }
    }

    fn init(&self) {}

    fn auth_info(&self) -> String {
        format!("mock://{}/auth", self.name)
    }

    fn authenticate(&self, code: &str, callback: AuthCallback) {
        let result = if self.state.get() != ServerState::Auth {
            Err(SymbolError::AuthNotRequired)
        } else if self.auth_code.borrow().as_deref() == Some(code) {
            self.state.set(ServerState::Ready);
            Ok(())
        } else {
            Err(SymbolError::AuthFailed("code rejected".to_string()))
        };
        event_loop::post_task(async move { callback(result) });
    }

    fn check_fetch(&self, request: FetchRequest, callback: CheckFetchCallback) {
        let result = if self.state.get().is_ready() {
            let outcome = self.result_for(&request);
            match outcome {
                Ok(path) => Ok(FetchContinuation::new(request, move |_, callback| {
                    event_loop::post_task(async move { callback(Ok(path)) });
                })),
                Err(e) => Err(e),
            }
        } else {
            Err(SymbolError::NotReady)
        };
        event_loop::post_task(async move { callback(result) });
    }

    fn fetch(&self, request: FetchRequest, callback: FetchCallback) {
        let result = if self.state.get().is_ready() {
            self.fetches.borrow_mut().push(request.clone());
            self.result_for(&request)
        } else {
            Err(SymbolError::NotReady)
        };
        if self.drop_callbacks.get() {
            return;
        }
        event_loop::post_task(async move { callback(result) });
    }
}

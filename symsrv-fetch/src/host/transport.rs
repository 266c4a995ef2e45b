//! One HTTP request/response exchange.
//!
//! A [`Transport`] is configured with setters, then consumed by one of the
//! perform methods:
//!
//! - [`Transport::perform`] - `async`, for code already running on the loop
//! - [`Transport::perform_async`] - callback delivered on the loop, exactly once
//! - [`Transport::perform_blocking`] - for auxiliary tooling outside any runtime
//!
//! ```ignore
//! let mut transport = Transport::new(connector)?;
//! transport
//!     .set_url("https://storage.googleapis.com/bucket/abcdef.debug")
//!     .add_header("Authorization: Bearer ya29...");
//! transport.perform_async(|result| match result {
//!     Ok(response) => println!("HTTP {}", response.status),
//!     Err(e) => eprintln!("{e}"),
//! });
//! ```

use std::fmt;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, instrument};
use url::Url;

use super::connector::Connector;
use super::event_loop;
use super::global::TransportInit;
use crate::error::TransportError;

/// Everything except RFC 3986 unreserved characters is escaped.
const ESCAPE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes a string for use in a URL query or form body.
pub fn escape(value: &str) -> String {
    utf8_percent_encode(value, ESCAPE_SET).to_string()
}

// ============================================================================
// Request Types
// ============================================================================

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// GET with a body.
    #[default]
    Get,
    /// GET without a body.
    Head,
    /// POST with form or raw data.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Head => write!(f, "HEAD"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// Body of a POST request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostData {
    /// Form fields, sent `application/x-www-form-urlencoded` in order.
    Form(Vec<(String, String)>),
    /// Pre-encoded body.
    Raw(String),
}

impl PostData {
    /// Builds form data from key/value pairs.
    pub fn form<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Encodes the body as sent on the wire.
    pub fn encode(&self) -> String {
        match self {
            Self::Form(fields) => fields
                .iter()
                .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
                .collect::<Vec<_>>()
                .join("&"),
            Self::Raw(body) => body.clone(),
        }
    }

    /// Content type sent with the body.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Form(_) => "application/x-www-form-urlencoded",
            Self::Raw(_) => "text/plain",
        }
    }
}

/// A validated request, as handed to a [`Connector`].
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Extra headers.
    pub headers: HeaderMap,
    /// POST body.
    pub body: Option<PostData>,
    /// Per-request timeout, overriding the client default.
    pub timeout: Option<Duration>,
}

/// Completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Buffered body. Empty when a body collector was installed.
    pub body: Vec<u8>,
    /// Body bytes received, whether buffered or collected.
    pub bytes_received: u64,
}

impl TransportResponse {
    /// Returns true for 2xx status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the buffered body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// Body Sink
// ============================================================================

/// Streaming body consumer.
pub type BodyCollector = Box<dyn FnMut(&[u8]) -> io::Result<()>>;

/// Destination for response body chunks: a buffer or a collector.
pub struct BodySink {
    collector: Option<BodyCollector>,
    buffer: Vec<u8>,
    received: u64,
}

impl BodySink {
    /// Sink that buffers the body in memory.
    pub fn buffered() -> Self {
        Self {
            collector: None,
            buffer: Vec::new(),
            received: 0,
        }
    }

    /// Sink that streams chunks to `collector`.
    pub fn streaming(collector: BodyCollector) -> Self {
        Self {
            collector: Some(collector),
            buffer: Vec::new(),
            received: 0,
        }
    }

    /// Accepts one body chunk.
    ///
    /// # Errors
    ///
    /// Propagates the collector's error; buffering never fails.
    pub fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.received += chunk.len() as u64;
        match self.collector.as_mut() {
            Some(collector) => collector(chunk),
            None => {
                self.buffer.extend_from_slice(chunk);
                Ok(())
            }
        }
    }

    /// Body bytes accepted so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    fn into_response(self, status: u16) -> TransportResponse {
        TransportResponse {
            status,
            body: self.buffer,
            bytes_received: self.received,
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// A single outbound HTTP request.
pub struct Transport {
    connector: Rc<dyn Connector>,
    method: Method,
    url: Option<String>,
    post_data: Option<PostData>,
    headers: Vec<String>,
    collector: Option<BodyCollector>,
    timeout: Option<Duration>,
    _init: TransportInit,
}

impl Transport {
    /// Creates an unconfigured transport.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Init` if process-wide state cannot be built.
    pub fn new(connector: Rc<dyn Connector>) -> Result<Self, TransportError> {
        Ok(Self {
            connector,
            method: Method::Get,
            url: None,
            post_data: None,
            headers: Vec::new(),
            collector: None,
            timeout: None,
            _init: TransportInit::acquire()?,
        })
    }

    /// Sets the target URL.
    pub fn set_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the method. [`set_post_data`](Self::set_post_data) implies POST.
    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.method = method;
        self
    }

    /// Sets the POST body and switches the method to POST.
    pub fn set_post_data(&mut self, data: PostData) -> &mut Self {
        self.method = Method::Post;
        self.post_data = Some(data);
        self
    }

    /// Adds a header given as one `Name: value` line.
    pub fn add_header(&mut self, line: impl Into<String>) -> &mut Self {
        self.headers.push(line.into());
        self
    }

    /// Streams the response body to `collector` instead of buffering it.
    pub fn set_body_collector<F>(&mut self, collector: F) -> &mut Self
    where
        F: FnMut(&[u8]) -> io::Result<()> + 'static,
    {
        self.collector = Some(Box::new(collector));
        self
    }

    /// Overrides the request timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    fn build_request(&mut self) -> Result<Request, TransportError> {
        let raw_url = self
            .url
            .as_deref()
            .ok_or_else(|| TransportError::InvalidUrl("no URL set".to_string()))?;
        let url = Url::parse(raw_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{raw_url}: {e}")))?;

        let mut headers = HeaderMap::new();
        for line in &self.headers {
            let (name, value) = parse_header_line(line)?;
            headers.append(name, value);
        }

        Ok(Request {
            method: self.method,
            url,
            headers,
            body: self.post_data.take(),
            timeout: self.timeout,
        })
    }

    /// Performs the exchange on the current loop.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` for configuration, network, or collector
    /// failures. HTTP error statuses are returned as `Ok`.
    #[instrument(skip(self), fields(method = %self.method))]
    pub async fn perform(mut self) -> Result<TransportResponse, TransportError> {
        let request = self.build_request()?;
        let mut sink = match self.collector.take() {
            Some(collector) => BodySink::streaming(collector),
            None => BodySink::buffered(),
        };

        debug!(url = %request.url, "Sending request");
        let status = self.connector.send(&request, &mut sink).await?;
        debug!(status, bytes = sink.received(), "Response received");

        Ok(sink.into_response(status))
    }

    /// Performs the exchange on the loop and calls `on_done` exactly once.
    ///
    /// If the loop shuts down first, `on_done` receives
    /// `TransportError::Cancelled`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a `LocalSet`.
    pub fn perform_async<F>(self, on_done: F)
    where
        F: FnOnce(Result<TransportResponse, TransportError>) + 'static,
    {
        let mut completion = Completion::new(on_done);
        event_loop::post_task(async move {
            let result = self.perform().await;
            completion.complete(result);
        });
    }

    /// Performs the exchange, blocking the calling thread.
    ///
    /// Must not be called from inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Same as [`perform`](Self::perform), plus `TransportError::Runtime`.
    pub fn perform_blocking(self) -> Result<TransportResponse, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Runtime(e.to_string()))?;
        runtime.block_on(self.perform())
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers.len())
            .field("streaming", &self.collector.is_some())
            .finish_non_exhaustive()
    }
}

fn parse_header_line(line: &str) -> Result<(HeaderName, HeaderValue), TransportError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| TransportError::InvalidHeader(line.to_string()))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| TransportError::InvalidHeader(line.to_string()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|_| TransportError::InvalidHeader(line.to_string()))?;
    Ok((name, value))
}

// ============================================================================
// Completion
// ============================================================================

/// Fires its callback exactly once: on completion, or with `Cancelled` if
/// dropped without completing.
struct Completion<F>
where
    F: FnOnce(Result<TransportResponse, TransportError>),
{
    on_done: Option<F>,
}

impl<F> Completion<F>
where
    F: FnOnce(Result<TransportResponse, TransportError>),
{
    fn new(on_done: F) -> Self {
        Self {
            on_done: Some(on_done),
        }
    }

    fn complete(&mut self, result: Result<TransportResponse, TransportError>) {
        if let Some(on_done) = self.on_done.take() {
            on_done(result);
        }
    }
}

impl<F> Drop for Completion<F>
where
    F: FnOnce(Result<TransportResponse, TransportError>),
{
    fn drop(&mut self) {
        if let Some(on_done) = self.on_done.take() {
            on_done(Err(TransportError::Cancelled));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{MockConnector, MockReply};
    use std::cell::RefCell;
    use tokio::task::LocalSet;

    #[test]
    fn test_escape() {
        assert_eq!(escape("abc-._~"), "abc-._~");
        assert_eq!(escape("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(
            escape("https://www.googleapis.com/auth/devstorage.read_only"),
            "https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fdevstorage.read_only"
        );
    }

    #[test]
    fn test_form_encoding_preserves_order() {
        let data = PostData::form([("code", "a/b"), ("grant_type", "authorization_code")]);
        assert_eq!(data.encode(), "code=a%2Fb&grant_type=authorization_code");
        assert_eq!(data.content_type(), "application/x-www-form-urlencoded");
    }

    #[test]
    fn test_parse_header_line() {
        let (name, value) = parse_header_line("Authorization: Bearer abc").unwrap();
        assert_eq!(name.as_str(), "authorization");
        assert_eq!(value.to_str().unwrap(), "Bearer abc");

        assert!(parse_header_line("no colon here").is_err());
        assert!(parse_header_line("bad name: x").is_err());
    }

    #[tokio::test]
    async fn test_perform_buffers_body() {
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Get, "/hello", MockReply::new(200, "world"));

        let mut transport = Transport::new(mock.clone()).unwrap();
        transport
            .set_url("https://example.com/hello")
            .add_header("X-Test: 1");
        let response = transport.perform().await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.text(), "world");
        assert_eq!(response.bytes_received, 5);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header("x-test"), Some("1"));
    }

    #[tokio::test]
    async fn test_perform_streams_to_collector() {
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Get, "/file", MockReply::new(200, "SYMDATA"));

        let collected = Rc::new(RefCell::new(Vec::new()));
        let collected_in = Rc::clone(&collected);

        let mut transport = Transport::new(mock).unwrap();
        transport
            .set_url("https://example.com/file")
            .set_body_collector(move |chunk| {
                collected_in.borrow_mut().extend_from_slice(chunk);
                Ok(())
            });
        let response = transport.perform().await.unwrap();

        assert!(response.body.is_empty());
        assert_eq!(response.bytes_received, 7);
        assert_eq!(collected.borrow().as_slice(), b"SYMDATA");
    }

    #[tokio::test]
    async fn test_non_success_is_not_an_error() {
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Get, "/missing", MockReply::new(404, "nope"));

        let mut transport = Transport::new(mock).unwrap();
        transport.set_url("https://example.com/missing");
        let response = transport.perform().await.unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let mock = Rc::new(MockConnector::new());
        let mut transport = Transport::new(mock).unwrap();
        transport.set_url("not a url");

        assert!(matches!(
            transport.perform().await,
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_perform_async_delivers_once_on_loop() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let mock = Rc::new(MockConnector::new());
                mock.on(Method::Post, "/token", MockReply::new(200, "{}"));

                let results = Rc::new(RefCell::new(Vec::new()));
                let results_in = Rc::clone(&results);

                let mut transport = Transport::new(mock.clone()).unwrap();
                transport
                    .set_url("https://example.com/token")
                    .set_post_data(PostData::form([("a", "1")]));
                transport.perform_async(move |r| results_in.borrow_mut().push(r.map(|r| r.status)));

                assert!(results.borrow().is_empty());
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                }

                let results = results.borrow();
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].as_ref().unwrap(), &200);
                assert_eq!(mock.requests()[0].body.as_deref(), Some("a=1"));
            })
            .await;
    }

    #[tokio::test]
    async fn test_perform_async_reports_cancel_on_shutdown() {
        let results = Rc::new(RefCell::new(Vec::new()));

        let local = LocalSet::new();
        let results_in = Rc::clone(&results);
        let gate = local
            .run_until(async move {
                let mock = Rc::new(MockConnector::new());
                let (reply, gate) = MockReply::new(200, "late").gated();
                mock.on(Method::Get, "/slow", reply);

                let mut transport = Transport::new(mock).unwrap();
                transport.set_url("https://example.com/slow");
                transport.perform_async(move |r| results_in.borrow_mut().push(r));

                tokio::task::yield_now().await;
                gate
            })
            .await;
        assert!(results.borrow().is_empty());

        // The gate is still closed when the loop goes away.
        drop(local);
        drop(gate);

        let results = results.borrow();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(TransportError::Cancelled)));
    }
}

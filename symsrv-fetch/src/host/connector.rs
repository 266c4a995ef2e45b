//! The network seam.
//!
//! [`Connector`] is what a [`Transport`](super::transport::Transport) hands a
//! validated [`Request`] to. [`ReqwestConnector`] talks to the network through
//! the shared client; [`MockConnector`](super::mock::MockConnector) serves
//! canned replies in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, trace};

use super::global::shared_client;
use super::transport::{BodySink, Method, Request};
use crate::error::TransportError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Sends one request and streams its body into a sink.
#[async_trait(?Send)]
pub trait Connector {
    /// Sends `request`, writes the body to `sink`, and returns the status.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the exchange could not complete.
    /// HTTP error statuses are not errors.
    async fn send(&self, request: &Request, sink: &mut BodySink) -> Result<u16, TransportError>;
}

/// Connector backed by the process-wide `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    timeout: Duration,
}

impl ReqwestConnector {
    /// Creates a connector with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a connector with a custom default timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ReqwestConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Connector for ReqwestConnector {
    async fn send(&self, request: &Request, sink: &mut BodySink) -> Result<u16, TransportError> {
        let client = shared_client()?;

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = client
            .request(method, request.url.clone())
            .timeout(request.timeout.unwrap_or(self.timeout))
            .headers(request.headers.clone());

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, body.content_type())
                .body(body.encode());
        }

        let mut response = builder.send().await?;
        let status = response.status().as_u16();
        debug!(status, url = %request.url, "HTTP response");

        while let Some(chunk) = response.chunk().await? {
            trace!(len = chunk.len(), "Body chunk");
            sink.write(&chunk)?;
        }

        Ok(status)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::transport::{PostData, Transport};
    use httptest::matchers::{all_of, contains, request};
    use httptest::responders::status_code;
    use httptest::{Expectation, Server};
    use std::rc::Rc;

    #[tokio::test]
    async fn test_get_with_header() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/bucket/ab/cd.debug"),
                request::headers(contains(("authorization", "Bearer token-1"))),
            ])
            .respond_with(status_code(200).body("ELF")),
        );

        let mut transport = Transport::new(Rc::new(ReqwestConnector::new())).unwrap();
        transport
            .set_url(server.url_str("/bucket/ab/cd.debug"))
            .add_header("Authorization: Bearer token-1");
        let response = transport.perform().await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"ELF");
    }

    #[tokio::test]
    async fn test_post_form() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/token"),
                request::headers(contains((
                    "content-type",
                    "application/x-www-form-urlencoded"
                ))),
                request::body("grant_type=refresh_token"),
            ])
            .respond_with(status_code(200).body(r#"{"access_token":"a"}"#)),
        );

        let mut transport = Transport::new(Rc::new(ReqwestConnector::new())).unwrap();
        transport
            .set_url(server.url_str("/token"))
            .set_post_data(PostData::form([("grant_type", "refresh_token")]));
        let response = transport.perform().await.unwrap();

        assert!(response.is_success());
        assert!(response.text().contains("access_token"));
    }

    #[tokio::test]
    async fn test_error_status_is_returned() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("HEAD", "/bucket/missing"))
                .respond_with(status_code(404)),
        );

        let mut transport = Transport::new(Rc::new(ReqwestConnector::new())).unwrap();
        transport
            .set_url(server.url_str("/bucket/missing"))
            .set_method(Method::Head);
        let response = transport.perform().await.unwrap();

        assert_eq!(response.status, 404);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let mut transport = Transport::new(Rc::new(ReqwestConnector::new())).unwrap();
        transport
            .set_url("http://127.0.0.1:9/unreachable")
            .set_timeout(Duration::from_secs(2));

        assert!(matches!(
            transport.perform().await,
            Err(TransportError::Network(_))
        ));
    }
}

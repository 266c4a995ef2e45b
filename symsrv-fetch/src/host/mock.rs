//! In-memory connector with canned replies.
//!
//! Routes match on method and a URL substring, and are tried in the order
//! they were added. A route added with [`MockConnector::on`] answers once;
//! one added with [`MockConnector::always`] answers every matching request.
//! Every request is recorded.

use std::cell::RefCell;
use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::connector::Connector;
use super::transport::{BodySink, Method, Request};
use crate::error::TransportError;

// ============================================================================
// Replies
// ============================================================================

/// A canned reply.
#[derive(Debug)]
pub struct MockReply {
    status: u16,
    body: Vec<u8>,
    error: Option<String>,
    gate: Option<oneshot::Receiver<()>>,
}

impl MockReply {
    /// Reply with a status and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            error: None,
            gate: None,
        }
    }

    /// Reply that fails with a network error.
    pub fn network_error(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: Vec::new(),
            error: Some(message.into()),
            gate: None,
        }
    }

    /// Holds the reply until the returned gate is released or dropped.
    pub fn gated(mut self) -> (Self, MockGate) {
        let (tx, rx) = oneshot::channel();
        self.gate = Some(rx);
        (self, MockGate { tx: Some(tx) })
    }

    fn duplicate(&self) -> Self {
        Self {
            status: self.status,
            body: self.body.clone(),
            error: self.error.clone(),
            gate: None,
        }
    }
}

/// Releases a gated reply.
#[derive(Debug)]
pub struct MockGate {
    tx: Option<oneshot::Sender<()>>,
}

impl MockGate {
    /// Lets the gated reply proceed.
    pub fn release(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

// ============================================================================
// Recorded Requests
// ============================================================================

/// A request seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: Method,
    /// Full URL.
    pub url: String,
    /// Header name/value pairs, names lowercased.
    pub headers: Vec<(String, String)>,
    /// Encoded POST body.
    pub body: Option<String>,
}

impl RecordedRequest {
    /// Returns the first value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a decoded form field from the body.
    pub fn form_value(&self, key: &str) -> Option<String> {
        let body = self.body.as_deref()?;
        url::form_urlencoded::parse(body.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

// ============================================================================
// Connector
// ============================================================================

struct Route {
    method: Method,
    pattern: String,
    reply: MockReply,
    repeat: bool,
}

/// Connector serving canned replies.
#[derive(Default)]
pub struct MockConnector {
    routes: RefCell<VecDeque<Route>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl MockConnector {
    /// Creates a mock with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route that answers one matching request.
    pub fn on(&self, method: Method, url_contains: &str, reply: MockReply) -> &Self {
        self.push(method, url_contains, reply, false)
    }

    /// Adds a route that answers every matching request.
    pub fn always(&self, method: Method, url_contains: &str, reply: MockReply) -> &Self {
        self.push(method, url_contains, reply, true)
    }

    fn push(&self, method: Method, pattern: &str, reply: MockReply, repeat: bool) -> &Self {
        self.routes.borrow_mut().push_back(Route {
            method,
            pattern: pattern.to_string(),
            reply,
            repeat,
        });
        self
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    /// Requests whose URL contains `url_contains`.
    pub fn requests_to(&self, url_contains: &str) -> Vec<RecordedRequest> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.url.contains(url_contains))
            .cloned()
            .collect()
    }

    /// Number of one-shot routes not yet used.
    pub fn pending_routes(&self) -> usize {
        self.routes.borrow().iter().filter(|r| !r.repeat).count()
    }

    fn take_reply(&self, method: Method, url: &str) -> Option<MockReply> {
        let mut routes = self.routes.borrow_mut();
        let index = routes
            .iter()
            .position(|r| r.method == method && url.contains(&r.pattern))?;
        if routes[index].repeat {
            Some(routes[index].reply.duplicate())
        } else {
            routes.remove(index).map(|r| r.reply)
        }
    }
}

#[async_trait(?Send)]
impl Connector for MockConnector {
    async fn send(&self, request: &Request, sink: &mut BodySink) -> Result<u16, TransportError> {
        let url = request.url.to_string();
        self.requests.borrow_mut().push(RecordedRequest {
            method: request.method,
            url: url.clone(),
            headers: request
                .headers
                .iter()
                .map(|(n, v)| {
                    (
                        n.as_str().to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            body: request.body.as_ref().map(|b| b.encode()),
        });

        let reply = self
            .take_reply(request.method, &url)
            .ok_or_else(|| TransportError::Network(format!("no mock route for {url}")))?;

        if let Some(gate) = reply.gate {
            // A dropped gate releases too.
            let _ = gate.await;
        }
        if let Some(message) = reply.error {
            return Err(TransportError::Network(message));
        }
        if request.method != Method::Head {
            sink.write(&reply.body)?;
        }
        Ok(reply.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::transport::{PostData, Transport};
    use std::rc::Rc;

    #[tokio::test]
    async fn test_one_shot_routes_are_consumed_in_order() {
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Get, "/a", MockReply::new(500, ""));
        mock.on(Method::Get, "/a", MockReply::new(200, "ok"));

        for expected in [500, 200] {
            let mut t = Transport::new(mock.clone()).unwrap();
            t.set_url("https://h/a");
            assert_eq!(t.perform().await.unwrap().status, expected);
        }

        let mut t = Transport::new(mock.clone()).unwrap();
        t.set_url("https://h/a");
        assert!(matches!(
            t.perform().await,
            Err(TransportError::Network(_))
        ));
        assert_eq!(mock.pending_routes(), 0);
    }

    #[tokio::test]
    async fn test_always_route_repeats() {
        let mock = Rc::new(MockConnector::new());
        mock.always(Method::Head, "/bucket/", MockReply::new(200, "ignored"));

        for _ in 0..3 {
            let mut t = Transport::new(mock.clone()).unwrap();
            t.set_url("https://h/bucket/abc").set_method(Method::Head);
            let response = t.perform().await.unwrap();
            assert_eq!(response.status, 200);
            assert!(response.body.is_empty());
        }
        assert_eq!(mock.requests_to("/bucket/").len(), 3);
    }

    #[tokio::test]
    async fn test_form_value() {
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Post, "/token", MockReply::new(200, "{}"));

        let mut t = Transport::new(mock.clone()).unwrap();
        t.set_url("https://h/token")
            .set_post_data(PostData::form([("code", "4/a b"), ("x", "y")]));
        t.perform().await.unwrap();

        let recorded = &mock.requests()[0];
        assert_eq!(recorded.form_value("code").as_deref(), Some("4/a b"));
        assert_eq!(recorded.form_value("missing"), None);
    }

    #[tokio::test]
    async fn test_network_error_reply() {
        let mock = Rc::new(MockConnector::new());
        mock.on(Method::Get, "/", MockReply::network_error("refused"));

        let mut t = Transport::new(mock).unwrap();
        t.set_url("https://h/");
        assert!(matches!(
            t.perform().await,
            Err(TransportError::Network(m)) if m == "refused"
        ));
    }
}

//! Mock transport for testing without an appliance.
//!
//! [`MockTransport`] returns canned responses in order, or computes them
//! with a handler, and records every request it receives.
//!
//! # Example
//!
//! ```
//! use mgmt_chain::backend::MockTransport;
//!
//! let mock = MockTransport::fixed("<ok/>");
//! assert_eq!(mock.request_count(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{PostRequest, Transport};
use crate::error::Result;

/// A request as seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    pub payload: String,
    pub user_name: String,
}

type Handler = dyn Fn(&RecordedRequest, usize) -> Result<String> + Send + Sync;

enum Responder {
    Canned(Vec<String>),
    Handler(Box<Handler>),
}

/// A test transport that returns canned responses in order.
///
/// Canned responses cycle back to the beginning once exhausted.
pub struct MockTransport {
    responder: Responder,
    index: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    /// Canned responses, returned in order and then cycled.
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "MockTransport requires at least one response");
        Self::build(Responder::Canned(responses))
    }

    /// Always return the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Compute each response from the request and its zero-based sequence number.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest, usize) -> Result<String> + Send + Sync + 'static,
    {
        Self::build(Responder::Handler(Box::new(handler)))
    }

    fn build(responder: Responder) -> Self {
        Self {
            responder,
            index: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.request_count())
            .finish()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, request: &PostRequest<'_>) -> Result<String> {
        let recorded = RecordedRequest {
            host: request.host.to_string(),
            port: request.port,
            endpoint: request.endpoint.to_string(),
            payload: request.payload.to_string(),
            user_name: request.credentials.user_name.clone(),
        };
        let n = self.index.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut log) = self.requests.lock() {
            log.push(recorded.clone());
        }
        match &self.responder {
            Responder::Canned(responses) => Ok(responses[n % responses.len()].clone()),
            Responder::Handler(handler) => handler(&recorded, n),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;

    fn request<'a>(creds: &'a Credentials, payload: &'a str) -> PostRequest<'a> {
        PostRequest {
            host: "dp1",
            port: 5550,
            endpoint: "/service/mgmt/current",
            payload,
            credentials: creds,
        }
    }

    #[tokio::test]
    async fn test_mock_cycles_responses() {
        let mock = MockTransport::new(vec!["first".into(), "second".into()]);
        let creds = Credentials::new("admin", "pw");
        let r1 = mock.post(&request(&creds, "a")).await.unwrap();
        let r2 = mock.post(&request(&creds, "b")).await.unwrap();
        let r3 = mock.post(&request(&creds, "c")).await.unwrap();
        assert_eq!((r1.as_str(), r2.as_str(), r3.as_str()), ("first", "second", "first"));
    }

    #[test]
    fn test_handler_errors_pass_through() {
        let mock = MockTransport::with_handler(|_, _| {
            Err(crate::error::ChainError::Transport {
                status: Some(503),
                message: "busy".into(),
            })
        });
        let creds = Credentials::new("admin", "pw");
        let err = tokio_test::assert_err!(tokio_test::block_on(mock.post(&request(&creds, "a"))));
        assert!(matches!(
            err,
            crate::error::ChainError::Transport { status: Some(503), .. }
        ));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let mock = MockTransport::with_handler(|req, n| Ok(format!("{}:{}", n, req.payload)));
        let creds = Credentials::new("deployer", "pw");
        let out = mock.post(&request(&creds, "<x/>")).await.unwrap();
        assert_eq!(out, "0:<x/>");

        let seen = mock.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].endpoint, "/service/mgmt/current");
        assert_eq!(seen[0].user_name, "deployer");
    }
}

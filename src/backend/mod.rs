//! Transport trait and retry wrapper.
//!
//! The [`Transport`] trait posts a request document to an appliance endpoint
//! and returns the raw response text. Built-in implementations:
//! [`HttpsTransport`] (reqwest, basic auth) and [`MockTransport`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! ChainExecutor ──► PostRequest ──► with_backoff() ──► Transport::post() ──► raw XML
//!                                        │                    │
//!                               retry on 429/5xx       ┌──────┴──────┐
//!                               and connect errors  HttpsTransport  MockTransport
//! ```

pub mod backoff;
pub mod https;
pub mod mock;

pub use backoff::BackoffConfig;
pub use https::HttpsTransport;
pub use mock::{MockTransport, RecordedRequest};

use crate::credentials::Credentials;
use crate::error::{ChainError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, std::time::Duration, &str) + Send)>;

/// One request to an appliance.
#[derive(Debug, Clone, Copy)]
pub struct PostRequest<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Endpoint path, e.g. `/service/mgmt/current`.
    pub endpoint: &'a str,
    pub payload: &'a str,
    pub credentials: &'a Credentials,
}

impl PostRequest<'_> {
    pub fn url(&self) -> String {
        format!("https://{}:{}{}", self.host, self.port, self.endpoint)
    }
}

/// Abstraction over the network path to the appliance.
///
/// This trait is object-safe and designed to be used as `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post `request.payload` and return the raw response body.
    async fn post(&self, request: &PostRequest<'_>) -> Result<String>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// Whether a transport error is worth retrying under `config`.
///
/// Retryable: [`ChainError::Transport`] with a status in
/// `config.retryable_statuses` or with no status at all (connection level),
/// and [`ChainError::Request`].
pub fn is_retryable(error: &ChainError, config: &BackoffConfig) -> bool {
    match error {
        ChainError::Transport {
            status: Some(status),
            ..
        } => config.retryable_statuses.contains(status),
        ChainError::Transport { status: None, .. } => true,
        ChainError::Request(_) => true,
        _ => false,
    }
}

/// Post with transport-level retry and exponential backoff.
///
/// Returns the first successful response, or the last error once retries
/// are exhausted. The call and every backoff sleep race `cancel`.
pub async fn with_backoff(
    transport: &Arc<dyn Transport>,
    request: &PostRequest<'_>,
    config: &BackoffConfig,
    cancel: &CancellationToken,
    mut on_retry: RetryCallback<'_>,
) -> Result<String> {
    let mut last_error: Option<ChainError> = None;

    for attempt in 0..=config.max_retries {
        if cancel.is_cancelled() {
            return Err(ChainError::Cancelled);
        }

        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt - 1);
            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();

            if let Some(ref mut cb) = on_retry {
                cb(attempt, delay, &reason);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ChainError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ChainError::Cancelled),
            r = transport.post(request) => r,
        };

        match outcome {
            Ok(body) => return Ok(body),
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ChainError::Transport {
        status: None,
        message: "retry loop exited unexpectedly".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn creds() -> Credentials {
        Credentials::new("admin", "pw")
    }

    #[test]
    fn test_is_retryable_statuses() {
        let config = BackoffConfig::standard();
        let err = |status| ChainError::Transport {
            status: Some(status),
            message: "x".into(),
        };
        assert!(is_retryable(&err(429), &config));
        assert!(is_retryable(&err(503), &config));
        assert!(!is_retryable(&err(401), &config));
    }

    #[test]
    fn test_is_retryable_connection_level() {
        let config = BackoffConfig::standard();
        let err = ChainError::Transport {
            status: None,
            message: "connection refused".into(),
        };
        assert!(is_retryable(&err, &config));
        assert!(!is_retryable(&ChainError::Cancelled, &config));
    }

    #[test]
    fn test_url() {
        let c = creds();
        let req = PostRequest {
            host: "dp1",
            port: 5550,
            endpoint: "/service/mgmt/current",
            payload: "<x/>",
            credentials: &c,
        };
        assert_eq!(req.url(), "https://dp1:5550/service/mgmt/current");
    }

    #[tokio::test]
    async fn test_backoff_respects_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::fixed("<ok/>"));
        let c = creds();
        let req = PostRequest {
            host: "dp1",
            port: 5550,
            endpoint: "/service/mgmt/current",
            payload: "<x/>",
            credentials: &c,
        };
        let result = with_backoff(&transport, &req, &BackoffConfig::standard(), &cancel, None).await;
        assert!(matches!(result, Err(ChainError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_retries_then_succeeds() {
        let mock = Arc::new(MockTransport::with_handler(|_req, n| {
            if n < 2 {
                Err(ChainError::Transport {
                    status: Some(503),
                    message: "busy".into(),
                })
            } else {
                Ok("<ok/>".to_string())
            }
        }));
        let transport: Arc<dyn Transport> = mock.clone();
        let c = creds();
        let req = PostRequest {
            host: "dp1",
            port: 5550,
            endpoint: "/service/mgmt/current",
            payload: "<x/>",
            credentials: &c,
        };
        let mut retries = Vec::new();
        let mut on_retry = |attempt: u32, _delay: Duration, _reason: &str| retries.push(attempt);
        let body = with_backoff(
            &transport,
            &req,
            &BackoffConfig::standard(),
            &CancellationToken::new(),
            Some(&mut on_retry),
        )
        .await
        .unwrap();
        assert_eq!(body, "<ok/>");
        assert_eq!(mock.request_count(), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let mock = Arc::new(MockTransport::with_handler(|_req, _n| {
            Err(ChainError::Transport {
                status: Some(503),
                message: "busy".into(),
            })
        }));
        let transport: Arc<dyn Transport> = mock.clone();
        let c = creds();
        let req = PostRequest {
            host: "dp1",
            port: 5550,
            endpoint: "/e",
            payload: "<x/>",
            credentials: &c,
        };
        let result = with_backoff(
            &transport,
            &req,
            &BackoffConfig::default(),
            &CancellationToken::new(),
            None,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(mock.request_count(), 1);
    }
}

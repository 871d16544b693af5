//! HTTPS transport to the appliance's XML management interface.
//!
//! [`HttpsTransport`] posts the request document to
//! `https://host:port/endpoint` with HTTP basic authentication. Appliances
//! ship self-signed certificates, so certificate validation is off unless
//! [`HttpsTransport::verifying`] is used.

use super::{PostRequest, Transport};
use crate::error::{ChainError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpsTransport {
    client: Client,
}

impl HttpsTransport {
    /// Transport that accepts any server certificate.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }

    /// Transport that validates server certificates.
    pub fn verifying(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn post(&self, request: &PostRequest<'_>) -> Result<String> {
        let url = request.url();
        let resp = self
            .client
            .post(&url)
            .basic_auth(
                &request.credentials.user_name,
                Some(request.credentials.password()),
            )
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(request.payload.to_string())
            .send()
            .await
            .map_err(|e| ChainError::Transport {
                status: None,
                message: format!("Failed to connect to {}: {}", url, e),
            })?;

        let status = resp.status();
        let text = resp.text().await?;

        // SOAP faults arrive with 500 and still carry a classifiable body.
        if !status.is_success() && !looks_like_xml(&text) {
            return Err(ChainError::Transport {
                status: Some(status.as_u16()),
                message: format!("{} returned {}: {}", url, status, text.trim()),
            });
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "https"
    }
}

fn looks_like_xml(body: &str) -> bool {
    body.trim_start().starts_with('<')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;

    #[test]
    fn test_builds_with_timeout() {
        let t = HttpsTransport::new(Duration::from_secs(5)).unwrap();
        assert_eq!(t.name(), "https");
        assert!(HttpsTransport::verifying(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_looks_like_xml() {
        assert!(looks_like_xml("  <env:Envelope/>"));
        assert!(!looks_like_xml("Unauthorized"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let t = HttpsTransport::new(Duration::from_secs(2)).unwrap();
        let creds = Credentials::new("admin", "pw");
        let req = PostRequest {
            host: "127.0.0.1",
            port: 1,
            endpoint: "/service/mgmt/current",
            payload: "<x/>",
            credentials: &creds,
        };
        let err = t.post(&req).await.unwrap_err();
        assert!(matches!(err, ChainError::Transport { status: None, .. }));
    }
}

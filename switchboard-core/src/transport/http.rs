//! HTTP transport backed by `reqwest`.

use super::{HttpRequest, HttpResponse, HttpStream, Transport};
use crate::provider::{ProviderError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// The default [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `timeout`.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Create a transport with a custom HTTP client.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn headers(request: &HttpRequest) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));

        if let Some(token) = &request.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ProviderError::Configuration("API key contains invalid header characters".into())
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn send(&self, request: &HttpRequest) -> Result<reqwest::Response> {
        self.client
            .post(&request.url)
            .headers(Self::headers(request)?)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| self.map_error(e))
    }

    fn map_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.send(&request).await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_error(e))?;

        Ok(HttpResponse { status, body })
    }

    async fn post_stream(&self, request: HttpRequest) -> Result<HttpStream> {
        let response = self.send(&request).await?;
        let status = response.status().as_u16();
        let timeout = self.timeout;

        let chunks = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map(|bytes| bytes.to_vec()).map_err(|e| {
                    if e.is_timeout() {
                        ProviderError::Timeout(timeout)
                    } else {
                        ProviderError::Transport(e.to_string())
                    }
                })
            })
            .boxed();

        Ok(HttpStream { status, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bearer_header_only_when_configured() {
        let mut request = HttpRequest {
            url: "http://localhost".into(),
            bearer_token: None,
            body: json!({}),
        };
        assert!(HttpTransport::headers(&request).unwrap().get(AUTHORIZATION).is_none());

        request.bearer_token = Some("sk-test".into());
        let headers = HttpTransport::headers(&request).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
    }

    #[test]
    fn invalid_key_is_configuration_error() {
        let request = HttpRequest {
            url: "http://localhost".into(),
            bearer_token: Some("bad\nkey".into()),
            body: json!({}),
        };
        assert!(matches!(
            HttpTransport::headers(&request),
            Err(ProviderError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let client = Client::builder().no_proxy().build().unwrap();
        let transport = HttpTransport::with_client(client, Duration::from_secs(5));
        let request = HttpRequest {
            // Port 9 (discard) on loopback is closed on test machines.
            url: "http://127.0.0.1:9/chat/completions".into(),
            bearer_token: None,
            body: json!({}),
        };
        assert!(matches!(
            transport.post_json(request).await,
            Err(ProviderError::Transport(_))
        ));
    }
}

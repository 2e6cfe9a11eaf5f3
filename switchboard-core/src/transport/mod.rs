//! Transport implementations for provider adapters
//!
//! Adapters only ever need "POST this JSON, give me the status and body back"
//! (or the body as a byte stream). Connection pooling, TLS and proxies stay
//! behind this seam.

pub mod http;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use crate::provider::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::fmt;

/// An outbound JSON POST.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
    pub body: Value,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("body", &self.body)
            .finish()
    }
}

/// Status and fully-read body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Status and body chunks of a streamed response.
pub struct HttpStream {
    pub status: u16,
    pub chunks: BoxStream<'static, Result<Vec<u8>>>,
}

impl HttpStream {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends adapter requests over the wire.
///
/// Implementations report connection, DNS and TLS failures as
/// [`ProviderError::Transport`](crate::ProviderError::Transport) and their own
/// deadline as [`ProviderError::Timeout`](crate::ProviderError::Timeout). A
/// non-2xx status is not an error at this level.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpResponse>;

    async fn post_stream(&self, request: HttpRequest) -> Result<HttpStream>;
}

use std::time::Duration;
use thiserror::Error;

/// Everything a completion call can fail with.
///
/// Each variant calls for a different recovery, so adapters never fold one
/// into another: a `Transport` failure may be retried, an `HttpStatus` depends
/// on the status, a `Decode` failure usually means the backend speaks a
/// different dialect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API response error: {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Failed to decode API response: {0}")]
    Decode(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Streaming tool calls are not supported, send tool requests without streaming")]
    StreamingToolCallsUnsupported,

    #[error("Backend returned a tool call that could not be parsed: {0}")]
    UnparseableToolCall(String),
}

impl ProviderError {
    /// Whether the same request may succeed if sent again.
    ///
    /// The core never retries; this only informs the caller's policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout(_) => true,
            ProviderError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn decode(message: impl ToString) -> Self {
        ProviderError::Decode(message.to_string())
    }
}

impl From<crate::config::ConfigError> for ProviderError {
    fn from(err: crate::config::ConfigError) -> Self {
        ProviderError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::HttpStatus { status: 503, body: String::new() }.is_retryable());
        assert!(ProviderError::HttpStatus { status: 429, body: String::new() }.is_retryable());
        assert!(!ProviderError::HttpStatus { status: 401, body: String::new() }.is_retryable());
        assert!(!ProviderError::Decode("bad".into()).is_retryable());
        assert!(!ProviderError::StreamingToolCallsUnsupported.is_retryable());
    }
}

use super::error::{ProviderError, Result};
use crate::transport::{HttpResponse, HttpStream};
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call controls supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Abort the call if it hasn't completed within this duration.
    pub timeout: Option<Duration>,
    /// Abort the call as soon as this token is cancelled.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Runs `call` under the caller's timeout and cancellation token.
///
/// Whichever fires first drops the in-flight future; nothing of a partial
/// response is kept.
pub(crate) async fn run_with_options<F, T>(options: &CallOptions, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let timed = async {
        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ProviderError::Timeout(limit))?,
            None => call.await,
        }
    };

    match &options.cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(ProviderError::Cancelled),
                result = timed => result,
            }
        }
        None => timed.await,
    }
}

/// Fails with `HttpStatus` for a non-2xx response.
pub(crate) fn ensure_success(response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ProviderError::HttpStatus {
            status: response.status,
            body: response.body,
        })
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| ProviderError::decode(format!("{e}: {}", preview(body))))
}

/// First 200 characters of a body, for error messages.
pub(crate) fn preview(body: &str) -> String {
    const LIMIT: usize = 200;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Reads the whole body of a failed streamed response into an `HttpStatus` error.
pub(crate) async fn stream_status_error(stream: HttpStream) -> ProviderError {
    let mut body = Vec::new();
    let mut chunks = stream.chunks;
    while let Some(Ok(chunk)) = chunks.next().await {
        body.extend_from_slice(&chunk);
    }
    ProviderError::HttpStatus {
        status: stream.status,
        body: String::from_utf8_lossy(&body).into_owned(),
    }
}

/// Re-cuts a byte stream into complete, non-empty text lines.
///
/// Chunk boundaries can fall anywhere, including inside a UTF-8 sequence,
/// so bytes are buffered until a newline arrives.
pub(crate) fn lines(chunks: BoxStream<'static, Result<Vec<u8>>>) -> BoxStream<'static, Result<String>> {
    stream::unfold(
        (chunks, Vec::<u8>::new(), false),
        |(mut chunks, mut buffer, mut finished)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match decode_line(&line) {
                        Ok(Some(text)) => return Some((Ok(text), (chunks, buffer, finished))),
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), (chunks, Vec::new(), true))),
                    }
                }

                if finished {
                    if buffer.is_empty() {
                        return None;
                    }
                    let rest = std::mem::take(&mut buffer);
                    return match decode_line(&rest) {
                        Ok(Some(text)) => Some((Ok(text), (chunks, buffer, true))),
                        Ok(None) => None,
                        Err(e) => Some((Err(e), (chunks, buffer, true))),
                    };
                }

                match chunks.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (chunks, Vec::new(), true))),
                    None => finished = true,
                }
            }
        },
    )
    .boxed()
}

/// Applies the caller's deadline and cancellation token to every item of a
/// streamed body.
///
/// The deadline counts from `started`, so time spent waiting for headers is
/// included. On expiry or cancellation the stream yields `Timeout` or
/// `Cancelled` once and then ends.
pub(crate) fn guard_stream<T: Send + 'static>(
    inner: BoxStream<'static, Result<T>>,
    options: &CallOptions,
    started: Instant,
) -> BoxStream<'static, Result<T>> {
    if options.timeout.is_none() && options.cancel.is_none() {
        return inner;
    }
    let deadline = options.timeout.map(|limit| (started + limit, limit));
    let cancel = options.cancel.clone();

    stream::unfold(Some(inner), move |state| {
        let cancel = cancel.clone();
        async move {
            let mut inner = state?;
            let next = async {
                match deadline {
                    Some((at, limit)) => tokio::time::timeout_at(at, inner.next())
                        .await
                        .map_err(|_| ProviderError::Timeout(limit)),
                    None => Ok(inner.next().await),
                }
            };
            let outcome = match &cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(ProviderError::Cancelled),
                        result = next => result,
                    }
                }
                None => next.await,
            };

            match outcome {
                Ok(Some(item)) => Some((item, Some(inner))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        }
    })
    .boxed()
}

fn decode_line(raw: &[u8]) -> Result<Option<String>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ProviderError::decode(format!("stream is not valid UTF-8: {e}")))?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

//! Scripted in-memory transport.
//!
//! Answers every request from a closure instead of the network and records
//! what it was sent, so adapters can be exercised against fixed fixtures.

use super::{HttpRequest, HttpResponse, HttpStream, Transport};
use crate::provider::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync;
type Delay = dyn Fn(&HttpRequest) -> Duration + Send + Sync;

pub struct ScriptedTransport {
    responder: Box<Responder>,
    delay: Option<Box<Delay>>,
    chunk_size: usize,
    stall: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            chunk_size: 7,
            stall: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `status` and the JSON `body`.
    pub fn json(status: u16, body: Value) -> Self {
        let body = body.to_string();
        Self::new(move |_| {
            Ok(HttpResponse {
                status,
                body: body.clone(),
            })
        })
    }

    /// Always answers with `status` and a raw text body.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(move |_| {
            Ok(HttpResponse {
                status,
                body: body.clone(),
            })
        })
    }

    /// Sleeps before answering; the duration may depend on the request.
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&HttpRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Size of the pieces streamed bodies are cut into.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Streamed bodies never end: after the last piece the stream stays pending.
    pub fn with_stalled_stream(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of requests that reached this transport.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests().pop()
    }

    async fn answer(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(request)).await;
        }
        (self.responder)(request)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.answer(&request).await
    }

    async fn post_stream(&self, request: HttpRequest) -> Result<HttpStream> {
        let response = self.answer(&request).await?;
        let pieces: Vec<Result<Vec<u8>>> = response
            .body
            .as_bytes()
            .chunks(self.chunk_size)
            .map(|piece| Ok(piece.to_vec()))
            .collect();

        let chunks = stream::iter(pieces);
        let chunks = if self.stall {
            chunks.chain(stream::pending()).boxed()
        } else {
            chunks.boxed()
        };

        Ok(HttpStream {
            status: response.status,
            chunks,
        })
    }
}

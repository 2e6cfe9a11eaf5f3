//! LLM provider abstraction layer.
//!
//! This module defines a common interface for chat-completion backends
//! (OpenAI-compatible APIs and Ollama) so callers can switch between them
//! without touching request or response handling.

mod error;
mod factory;
pub mod ollama;
pub mod openai;
mod types;
mod utils;

use crate::config::ProviderKind;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

pub use error::{ProviderError, Result};
pub use factory::{get_provider, get_provider_with_transport};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use types::{
    ChatMessage, CompletionChunk, CompletionKind, CompletionRequest, CompletionResponse,
    FinishReason, Role, TokenUsage, ToolCallFunction, ToolCallRequest,
};
pub use utils::CallOptions;

/// Text deltas of a streamed completion.
pub type CompletionStream = BoxStream<'static, Result<CompletionChunk>>;

/// A provider shared across tasks.
pub type SharedProvider = Arc<Provider>;

/// Common interface every backend adapter implements.
///
/// Adapters keep no per-call state, so one instance can serve any number of
/// concurrent calls.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Sends `request` under the caller's timeout and cancellation token.
    async fn completion_with(
        &self,
        request: CompletionRequest,
        options: CallOptions,
    ) -> Result<CompletionResponse>;

    async fn completion(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.completion_with(request, CallOptions::default()).await
    }

    /// Streams a plain-text completion.
    ///
    /// Requests offering tools fail with
    /// [`ProviderError::StreamingToolCallsUnsupported`] before anything is sent.
    async fn completion_stream(
        &self,
        request: CompletionRequest,
        options: CallOptions,
    ) -> Result<CompletionStream>;
}

/// The closed set of supported backends.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi(OpenAiProvider),
    Ollama(OllamaProvider),
}

#[async_trait]
impl LlmProvider for Provider {
    fn kind(&self) -> ProviderKind {
        match self {
            Provider::OpenAi(p) => p.kind(),
            Provider::Ollama(p) => p.kind(),
        }
    }

    async fn completion_with(
        &self,
        request: CompletionRequest,
        options: CallOptions,
    ) -> Result<CompletionResponse> {
        match self {
            Provider::OpenAi(p) => p.completion_with(request, options).await,
            Provider::Ollama(p) => p.completion_with(request, options).await,
        }
    }

    async fn completion_stream(
        &self,
        request: CompletionRequest,
        options: CallOptions,
    ) -> Result<CompletionStream> {
        match self {
            Provider::OpenAi(p) => p.completion_stream(request, options).await,
            Provider::Ollama(p) => p.completion_stream(request, options).await,
        }
    }
}

//! switchboard-core - Provider-agnostic LLM completions
//!
//! Provides the pieces an application needs to talk to chat-completion backends:
//! - Configuration (`LlmConfig`, YAML loading, provider selection)
//! - A uniform `LlmProvider` interface with OpenAI-compatible and Ollama adapters
//! - Tool calling on the wire, backed by `switchboard-tools`
//! - A pluggable HTTP transport
//!
//! ## Primary API
//!
//! Build an [`LlmConfig`], hand it to [`get_provider`], and call
//! [`LlmProvider::completion`] on the result.

pub mod config;
pub mod provider;
pub mod transport;

pub use config::{build_config, ConfigError, LlmConfig, ProviderKind};
pub use provider::{
    get_provider, get_provider_with_transport, CallOptions, ChatMessage, CompletionChunk,
    CompletionKind, CompletionRequest, CompletionResponse, CompletionStream, FinishReason,
    LlmProvider, OllamaProvider, OpenAiProvider, Provider, ProviderError, Result, Role,
    SharedProvider, TokenUsage, ToolCallFunction, ToolCallRequest,
};
pub use switchboard_tools::{JsonSchema, Tool};
pub use transport::http::HttpTransport;
pub use transport::{HttpRequest, HttpResponse, HttpStream, Transport};

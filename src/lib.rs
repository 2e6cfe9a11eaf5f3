//! switchboard - Provider-agnostic chat completions with typed tool calling
//!
//! One configuration selects the backend (an OpenAI-compatible API or Ollama);
//! the same request and response types work against either. Native Rust
//! functions become tools the model may call:
//!
//! ```no_run
//! use switchboard::{
//!     all_tools, build_config, get_provider, register_tool_fn, tool_result_messages,
//!     ChatMessage, CompletionRequest, LlmProvider,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! register_tool_fn(
//!     "sum_numbers",
//!     "Calculates the sum of two integers.",
//!     &["a", "b"],
//!     |a: i64, b: i64| a + b,
//! )?;
//!
//! let config = build_config("ollama", "llama3.1", None, None)?;
//! let provider = get_provider(&config)?;
//!
//! let mut request = CompletionRequest::new(
//!     "llama3.1",
//!     vec![ChatMessage::user("What is the sum of 123 and 456?")],
//! )
//! .with_tools(all_tools());
//!
//! let response = provider.completion(request.clone()).await?;
//! if let Some(calls) = response.tool_calls() {
//!     request.push_message(response.to_message());
//!     request.messages.extend(tool_result_messages(calls));
//!     let answer = provider.completion(request.with_tools(Vec::new())).await?;
//!     println!("{}", answer.message().unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub use switchboard_core::{
    config, get_provider_with_transport, provider, transport, CallOptions, ChatMessage,
    CompletionChunk, CompletionKind, CompletionRequest, CompletionResponse, CompletionStream,
    ConfigError, FinishReason, HttpRequest, HttpResponse, HttpStream, HttpTransport, LlmConfig,
    LlmProvider, OllamaProvider, OpenAiProvider, Provider, ProviderError, ProviderKind, Role,
    SharedProvider, TokenUsage, ToolCallFunction, ToolCallRequest, Transport,
};
pub use switchboard_tools::{
    all_tools, dispatch, execute_tool, get_tool, global_registry, is_valid_tool_name,
    parse_arguments, register_tool, register_tool_fn, seal_tools, IntoToolOutput, JsonSchema,
    RegistryError, ScalarType, SchemaError, Tool, ToolEntry, ToolError, ToolFn, ToolHandler,
    ToolParam, ToolRegistry,
};

use serde_json::{json, Value};
use tracing::warn;

/// Builds a validated [`LlmConfig`] from plain settings strings.
///
/// `provider` is `"openai"` or `"ollama"` (case-insensitive). Empty `api_key`
/// and `base_url` count as unset.
pub fn build_config(
    provider: &str,
    model: &str,
    api_key: Option<&str>,
    base_url: Option<&str>,
) -> Result<LlmConfig, ProviderError> {
    Ok(switchboard_core::build_config(provider, model, api_key, base_url)?)
}

/// Creates the provider selected by `config`.
pub fn get_provider(config: &LlmConfig) -> Result<SharedProvider, ProviderError> {
    switchboard_core::get_provider(config)
}

/// Runs every call against the process-wide registry and wraps each outcome
/// in a tool-result message, in call order.
///
/// A failed call still produces a message, `{"error": "..."}`, so the model
/// can see what went wrong.
pub fn tool_result_messages(calls: &[ToolCallRequest]) -> Vec<ChatMessage> {
    tool_result_messages_with(global_registry(), calls)
}

/// [`tool_result_messages`] against a specific registry.
pub fn tool_result_messages_with(
    registry: &ToolRegistry,
    calls: &[ToolCallRequest],
) -> Vec<ChatMessage> {
    calls
        .iter()
        .map(|call| {
            let content = match registry.execute(&call.function.name, &call.function.arguments) {
                Ok(output) => render_output(output),
                Err(err) => {
                    warn!(
                        tool = %call.function.name,
                        call_id = %call.id,
                        error = %err,
                        "Tool call failed"
                    );
                    json!({ "error": err.to_string() }).to_string()
                }
            };
            ChatMessage::tool_result(call.id.clone(), content)
        })
        .collect()
}

fn render_output(output: Value) -> String {
    match output {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

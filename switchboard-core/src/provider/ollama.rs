//! Ollama `/api/chat` adapter.
//!
//! Ollama differs from the OpenAI dialect in a few places that are absorbed
//! here: tool-call arguments travel as JSON objects, tool calls carry no ids,
//! usage comes as eval counts, and some models write a tool call as plain JSON
//! in the message content instead of using `tool_calls`.

use super::error::{ProviderError, Result};
use super::types::*;
use super::utils::{
    decode_body, ensure_success, guard_stream, lines, preview, run_with_options,
    stream_status_error, CallOptions,
};
use super::{CompletionStream, LlmProvider};
use crate::config::{LlmConfig, ProviderKind};
use crate::transport::{HttpRequest, Transport};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use switchboard_tools::{JsonSchema, Tool};
use tracing::{debug, warn};

// --- Wire shapes ---

#[derive(Serialize, Debug)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Serialize, Debug)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCallOut<'a>>>,
}

#[derive(Serialize, Debug)]
struct OllamaToolCallOut<'a> {
    function: OllamaFunctionCallOut<'a>,
}

#[derive(Serialize, Debug)]
struct OllamaFunctionCallOut<'a> {
    name: &'a str,
    arguments: Value,
}

#[derive(Serialize, Debug)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OllamaFunctionDef<'a>,
}

#[derive(Serialize, Debug)]
struct OllamaFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a JsonSchema,
}

#[derive(Deserialize, Debug)]
struct OllamaChatResponse {
    message: Option<OllamaResponseMessage>,
    done: Option<bool>,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCallIn>>,
}

#[derive(Deserialize, Debug)]
struct OllamaToolCallIn {
    function: Option<OllamaFunctionCallIn>,
}

#[derive(Deserialize, Debug)]
struct OllamaFunctionCallIn {
    name: Option<String>,
    #[serde(default)]
    arguments: Value,
}

impl OllamaChatResponse {
    fn usage(&self) -> Option<TokenUsage> {
        match (self.prompt_eval_count, self.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt.saturating_add(completion),
            }),
            _ => None,
        }
    }

    fn finish_reason(&self) -> Option<FinishReason> {
        self.done_reason.as_deref().map(FinishReason::from)
    }
}

// --- Provider ---

/// Adapter for Ollama and servers exposing its `/api/chat` endpoint.
#[derive(Clone)]
pub struct OllamaProvider {
    transport: Arc<dyn Transport>,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: config.resolved_base_url(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn build_body(request: &CompletionRequest, stream: bool) -> Result<Value> {
        let messages = request
            .messages
            .iter()
            .enumerate()
            .map(|(i, message)| map_message(i, message))
            .collect::<Result<Vec<_>>>()?;

        let options = (request.temperature.is_some() || request.max_tokens.is_some()).then(|| {
            OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }
        });

        let body = OllamaChatRequest {
            model: &request.model,
            messages,
            stream,
            tools: request
                .tools
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|ts| ts.iter().map(map_tool).collect()),
            options,
        };
        serde_json::to_value(body)
            .map_err(|e| ProviderError::InvalidRequest(format!("failed to serialize request: {e}")))
    }

    fn http_request(&self, body: Value) -> HttpRequest {
        HttpRequest {
            url: self.endpoint(),
            bearer_token: self.api_key.clone(),
            body,
        }
    }

    async fn send(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = Self::build_body(&request, false)?;
        let offered: Vec<&str> = request
            .tools
            .iter()
            .flatten()
            .map(|tool| tool.name.as_str())
            .collect();
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = offered.len(),
            "Ollama completion request"
        );

        let response = self.transport.post_json(self.http_request(body)).await?;
        let response = ensure_success(response)?;
        parse_response(&response.body, &offered)
    }
}

fn map_message(index: usize, message: &ChatMessage) -> Result<OllamaMessage<'_>> {
    let tool_calls = match &message.tool_calls {
        Some(calls) => Some(
            calls
                .iter()
                .map(|call| -> Result<OllamaToolCallOut<'_>> {
                    Ok(OllamaToolCallOut {
                        function: OllamaFunctionCallOut {
                            name: &call.function.name,
                            arguments: arguments_object(index, &call.function.arguments)?,
                        },
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        None => None,
    };

    Ok(OllamaMessage {
        role: message.role.as_str(),
        content: message.content.as_deref().unwrap_or_default(),
        tool_calls,
    })
}

/// Ollama expects tool-call arguments as an object, not a JSON string.
fn arguments_object(index: usize, raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(ProviderError::InvalidRequest(format!(
            "message {index}: tool call arguments must be a JSON object"
        ))),
        Err(e) => Err(ProviderError::InvalidRequest(format!(
            "message {index}: tool call arguments are not valid JSON: {e}"
        ))),
    }
}

fn map_tool(tool: &Tool) -> OllamaTool<'_> {
    OllamaTool {
        tool_type: "function",
        function: OllamaFunctionDef {
            name: &tool.name,
            description: &tool.description,
            parameters: &tool.parameters,
        },
    }
}

fn arguments_string(arguments: Value) -> String {
    match arguments {
        Value::String(raw) => raw,
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// A tool call written as `{"name": ..., "arguments": {...}}` in plain content.
///
/// Some models use `parameters` instead of `arguments`.
fn content_tool_call(content: &str) -> Option<(String, String)> {
    let trimmed = content.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    let Value::Object(mut object) = serde_json::from_str::<Value>(trimmed).ok()? else {
        return None;
    };
    let Value::String(name) = object.remove("name")? else {
        return None;
    };
    let arguments = object
        .remove("arguments")
        .or_else(|| object.remove("parameters"))
        .unwrap_or(Value::Null);
    Some((name, arguments_string(arguments)))
}

fn synthesized_id(index: usize) -> String {
    format!("call_{index}")
}

/// Maps an `/api/chat` body to a [`CompletionResponse`].
///
/// `offered` names the tools sent with the request.
fn parse_response(body: &str, offered: &[&str]) -> Result<CompletionResponse> {
    let response: OllamaChatResponse = decode_body(body)?;
    if let Some(error) = response.error.as_deref() {
        return Err(ProviderError::decode(format!("backend reported an error: {error}")));
    }
    if response.done == Some(false) {
        return Err(ProviderError::UnparseableToolCall(
            "response is incomplete (done: false)".into(),
        ));
    }

    let usage = response.usage();
    let finish_reason = response.finish_reason();
    let message = response.message.ok_or_else(|| {
        ProviderError::UnparseableToolCall(format!("response has no message: {}", preview(body)))
    })?;

    let mut tool_calls = Vec::new();
    for (i, call) in message.tool_calls.unwrap_or_default().into_iter().enumerate() {
        let function = call.function.filter(|f| f.name.as_deref().is_some_and(|n| !n.is_empty()));
        let Some(OllamaFunctionCallIn { name: Some(name), arguments }) = function else {
            return Err(ProviderError::UnparseableToolCall(format!(
                "tool call {i} has no function name"
            )));
        };
        tool_calls.push(ToolCallRequest::new(
            synthesized_id(i),
            name,
            arguments_string(arguments),
        ));
    }

    if tool_calls.is_empty() && !offered.is_empty() {
        if let Some((name, arguments)) = content_tool_call(&message.content) {
            if !offered.contains(&name.as_str()) {
                return Err(ProviderError::UnparseableToolCall(format!(
                    "content names unknown tool `{name}`"
                )));
            }
            warn!(tool = %name, "Tool call written as message content");
            tool_calls.push(ToolCallRequest::new(synthesized_id(0), name, arguments));
        }
    }

    let (kind, finish_reason) = if tool_calls.is_empty() {
        (
            CompletionKind::Message {
                content: message.content,
            },
            finish_reason.unwrap_or(FinishReason::Stop),
        )
    } else {
        // Ollama reports `stop` when the turn ends in tool calls.
        let reason = match finish_reason {
            None | Some(FinishReason::Stop) => FinishReason::ToolCalls,
            Some(other) => other,
        };
        (CompletionKind::ToolCall { tool_calls }, reason)
    };

    Ok(CompletionResponse {
        kind,
        finish_reason,
        usage,
    })
}

/// Parses one NDJSON line of a streamed response.
fn parse_stream_line(line: &str) -> Option<Result<CompletionChunk>> {
    let event: OllamaChatResponse = match decode_body(line) {
        Ok(event) => event,
        Err(e) => return Some(Err(e)),
    };
    if let Some(error) = event.error.as_deref() {
        return Some(Err(ProviderError::decode(format!(
            "backend reported an error: {error}"
        ))));
    }
    if event
        .message
        .as_ref()
        .and_then(|m| m.tool_calls.as_ref())
        .is_some_and(|calls| !calls.is_empty())
    {
        return Some(Err(ProviderError::StreamingToolCallsUnsupported));
    }

    let done = event.done.unwrap_or(false);
    let (usage, finish_reason) = if done {
        (event.usage(), Some(event.finish_reason().unwrap_or(FinishReason::Stop)))
    } else {
        (None, None)
    };
    let delta = event.message.map(|m| m.content).unwrap_or_default();

    if delta.is_empty() && !done {
        return None;
    }
    Some(Ok(CompletionChunk {
        delta,
        finish_reason,
        usage,
    }))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn completion_with(
        &self,
        request: CompletionRequest,
        options: CallOptions,
    ) -> Result<CompletionResponse> {
        request.validate()?;
        run_with_options(&options, self.send(request)).await
    }

    async fn completion_stream(
        &self,
        request: CompletionRequest,
        options: CallOptions,
    ) -> Result<CompletionStream> {
        if request.has_tools() {
            return Err(ProviderError::StreamingToolCallsUnsupported);
        }
        request.validate()?;

        let body = Self::build_body(&request, true)?;
        let started = tokio::time::Instant::now();
        let stream = run_with_options(&options, self.transport.post_stream(self.http_request(body)))
            .await?;
        if !stream.is_success() {
            return Err(stream_status_error(stream).await);
        }

        let chunks = lines(stream.chunks)
            .filter_map(|line| async move {
                match line {
                    Ok(line) => parse_stream_line(&line),
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed();
        Ok(guard_stream(chunks, &options, started))
    }
}

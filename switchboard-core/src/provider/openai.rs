//! OpenAI-compatible chat-completions adapter.
//!
//! Works with OpenAI itself and with any endpoint that speaks the same
//! `/chat/completions` dialect (OpenRouter, vLLM, LM Studio, ...).

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
use serde_json::{json, Value};
use std::sync::Arc;
use switchboard_tools::{JsonSchema, Tool};
use tracing::{debug, warn};

// --- Wire shapes ---

#[derive(Serialize, Debug)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Serialize, Debug)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCallOut<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize, Debug)]
struct OpenAiToolCallOut<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: OpenAiFunctionCallOut<'a>,
}

#[derive(Serialize, Debug)]
struct OpenAiFunctionCallOut<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize, Debug)]
struct OpenAiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAiFunctionDef<'a>,
}

#[derive(Serialize, Debug)]
struct OpenAiFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a JsonSchema,
}

#[derive(Deserialize, Debug)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCallIn>>,
}

#[derive(Deserialize, Debug)]
struct OpenAiToolCallIn {
    id: String,
    function: OpenAiFunctionCallIn,
}

#[derive(Deserialize, Debug)]
struct OpenAiFunctionCallIn {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize, Debug, Clone, Copy)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(u: OpenAiUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize, Debug)]
struct OpenAiStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Value>,
}

// --- Provider ---

/// Adapter for OpenAI-compatible backends.
#[derive(Clone)]
pub struct OpenAiProvider {
    transport: Arc<dyn Transport>,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
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
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(request: &CompletionRequest, stream: bool) -> Result<Value> {
        let tools = request.tools.as_ref().filter(|t| !t.is_empty());
        let body = OpenAiChatRequest {
            model: &request.model,
            messages: request.messages.iter().map(map_message).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
            tools: tools.map(|ts| ts.iter().map(map_tool).collect()),
            tool_choice: tools.map(|_| json!("auto")),
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
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "OpenAI completion request"
        );

        let response = self.transport.post_json(self.http_request(body)).await?;
        let response = ensure_success(response)?;
        parse_response(&response.body)
    }
}

fn map_message(message: &ChatMessage) -> OpenAiMessage<'_> {
    OpenAiMessage {
        role: message.role.as_str(),
        content: message.content.as_deref(),
        tool_calls: message.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|call| OpenAiToolCallOut {
                    id: &call.id,
                    call_type: "function",
                    function: OpenAiFunctionCallOut {
                        name: &call.function.name,
                        arguments: &call.function.arguments,
                    },
                })
                .collect()
        }),
        tool_call_id: message.tool_call_id.as_deref(),
    }
}

fn map_tool(tool: &Tool) -> OpenAiTool<'_> {
    OpenAiTool {
        tool_type: "function",
        function: OpenAiFunctionDef {
            name: &tool.name,
            description: &tool.description,
            parameters: &tool.parameters,
        },
    }
}

/// Maps the first choice of a chat-completions body to a [`CompletionResponse`].
fn parse_response(body: &str) -> Result<CompletionResponse> {
    let response: OpenAiChatResponse = decode_body(body)?;
    let usage = response.usage.map(TokenUsage::from);

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::decode(format!("no choices in response: {}", preview(body))))?;

    let finish_reason = choice.finish_reason.as_deref().map(FinishReason::from);
    let tool_calls: Vec<ToolCallRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCallRequest::new(call.id, call.function.name, call.function.arguments))
        .collect();
    let content = choice.message.content.filter(|c| !c.is_empty());

    let kind = match (&finish_reason, content) {
        (Some(FinishReason::ToolCalls), _) => {
            if tool_calls.is_empty() {
                return Err(ProviderError::decode(
                    "finish_reason is tool_calls but the message carries no tool calls",
                ));
            }
            CompletionKind::ToolCall { tool_calls }
        }
        // Some proxies report `stop` (or nothing) alongside tool calls.
        (_, None) if !tool_calls.is_empty() => {
            warn!(
                finish_reason = ?finish_reason,
                "Tool calls returned without a tool_calls finish reason"
            );
            CompletionKind::ToolCall { tool_calls }
        }
        (_, content) => CompletionKind::Message {
            content: content.unwrap_or_default(),
        },
    };

    let finish_reason = finish_reason.unwrap_or(match kind {
        CompletionKind::ToolCall { .. } => FinishReason::ToolCalls,
        CompletionKind::Message { .. } => FinishReason::Stop,
    });

    Ok(CompletionResponse {
        kind,
        finish_reason,
        usage,
    })
}

/// Parses one SSE line. `None` means the line carries nothing for the caller.
fn parse_stream_line(line: &str) -> Option<Result<CompletionChunk>> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    let event: OpenAiStreamResponse = match decode_body(data) {
        Ok(event) => event,
        Err(e) => return Some(Err(e)),
    };
    let usage = event.usage.map(TokenUsage::from);
    let choice = event.choices.into_iter().next();

    let has_tool_calls = choice.as_ref().is_some_and(|c| {
        c.delta
            .tool_calls
            .as_ref()
            .is_some_and(|calls| calls.as_array().map_or(true, |a| !a.is_empty()))
    });
    if has_tool_calls {
        return Some(Err(ProviderError::StreamingToolCallsUnsupported));
    }

    let (delta, finish_reason) = match choice {
        Some(choice) => (
            choice.delta.content.unwrap_or_default(),
            choice.finish_reason.as_deref().map(FinishReason::from),
        ),
        None => (String::new(), None),
    };

    if delta.is_empty() && finish_reason.is_none() && usage.is_none() {
        return None;
    }
    Some(Ok(CompletionChunk {
        delta,
        finish_reason,
        usage,
    }))
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ScriptedTransport;
    use futures::TryStreamExt;
    use switchboard_tools::ScalarType;

    fn provider(transport: Arc<ScriptedTransport>) -> OpenAiProvider {
        let config = LlmConfig::new(ProviderKind::OpenAi, "gpt-4o-mini")
            .with_api_key("sk-test")
            .with_base_url("https://openrouter.ai/api/v1/");
        OpenAiProvider::new(&config, transport)
    }

    fn sum_tool() -> Tool {
        Tool::new(
            "sum_numbers",
            "Calculates the sum of two integers.",
            JsonSchema::from_params(&[("a", ScalarType::Integer), ("b", ScalarType::Integer)]),
        )
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            "gpt-4o-mini",
            vec![
                ChatMessage::system("You add numbers."),
                ChatMessage::user("What is the sum of 123 and 456?"),
            ],
        )
    }

    #[tokio::test]
    async fn serializes_request_in_wire_shape() {
        let transport = ScriptedTransport::json(
            200,
            json!({ "choices": [{ "message": { "content": "579" }, "finish_reason": "stop" }] }),
        )
        .shared();
        let provider = provider(transport.clone());

        let req = request()
            .with_temperature(0.1)
            .with_max_tokens(150)
            .with_tools(vec![sum_tool()]);
        provider.completion(req).await.unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.url, "https://openrouter.ai/api/v1/chat/completions");
        assert_eq!(sent.bearer_token.as_deref(), Some("sk-test"));
        assert_eq!(sent.body["model"], "gpt-4o-mini");
        assert_eq!(sent.body["stream"], false);
        assert_eq!(sent.body["max_tokens"], 150);
        assert_eq!(sent.body["tool_choice"], "auto");
        assert_eq!(sent.body["messages"][0], json!({ "role": "system", "content": "You add numbers." }));
        assert_eq!(sent.body["messages"][1]["role"], "user");
        assert_eq!(
            sent.body["tools"][0],
            json!({
                "type": "function",
                "function": {
                    "name": "sum_numbers",
                    "description": "Calculates the sum of two integers.",
                    "parameters": {
                        "type": "object",
                        "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
                        "required": ["a", "b"]
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn follow_up_messages_carry_tool_calls_and_results() {
        let transport = ScriptedTransport::json(
            200,
            json!({ "choices": [{ "message": { "content": "579" }, "finish_reason": "stop" }] }),
        )
        .shared();
        let provider = provider(transport.clone());

        let mut req = request();
        req.push_message(ChatMessage::assistant_tool_calls(vec![ToolCallRequest::new(
            "call_abc",
            "sum_numbers",
            r#"{"a":123,"b":456}"#,
        )]));
        req.push_message(ChatMessage::tool_result("call_abc", "579"));
        provider.completion(req).await.unwrap();

        let body = transport.last_request().unwrap().body;
        assert_eq!(
            body["messages"][2],
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": { "name": "sum_numbers", "arguments": "{\"a\":123,\"b\":456}" }
                }]
            })
        );
        assert_eq!(
            body["messages"][3],
            json!({ "role": "tool", "content": "579", "tool_call_id": "call_abc" })
        );
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn tool_call_fixture_preserves_ids_and_arguments() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        { "id": "call_1", "type": "function",
                          "function": { "name": "sum_numbers", "arguments": "{\"a\": 123, \"b\": 456}" } },
                        { "id": "call_2", "type": "function",
                          "function": { "name": "sum_numbers", "arguments": "{\"a\":1,\"b\":2}" } }
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 82, "completion_tokens": 40, "total_tokens": 122 }
        })
        .to_string();

        let response = parse_response(&body).unwrap();
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert!(response.message().is_none());

        let calls = response.tool_calls().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, "{\"a\": 123, \"b\": 456}");
        assert_eq!(calls[1].id, "call_2");
        assert_eq!(calls[1].function.arguments, "{\"a\":1,\"b\":2}");
        assert_eq!(
            response.usage,
            Some(TokenUsage { prompt_tokens: 82, completion_tokens: 40, total_tokens: 122 })
        );
    }

    #[test]
    fn message_fixture_without_usage() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hello!" }, "finish_reason": "length" }]
        })
        .to_string();

        let response = parse_response(&body).unwrap();
        assert_eq!(response.message(), Some("Hello!"));
        assert!(response.tool_calls().is_none());
        assert_eq!(response.finish_reason, FinishReason::Length);
        assert!(response.usage.is_none());
    }

    #[test]
    fn missing_finish_reason_defaults() {
        let body = json!({ "choices": [{ "message": { "content": "ok" } }] }).to_string();
        assert_eq!(parse_response(&body).unwrap().finish_reason, FinishReason::Stop);
    }

    #[test]
    fn tool_calls_with_stop_reason_still_map_to_tool_call() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{ "id": "x", "type": "function",
                                     "function": { "name": "sum_numbers", "arguments": "{}" } }]
                },
                "finish_reason": "stop"
            }]
        })
        .to_string();

        let response = parse_response(&body).unwrap();
        assert_eq!(response.tool_calls().unwrap()[0].id, "x");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn tool_calls_reason_without_calls_is_decode_error() {
        let body = json!({
            "choices": [{ "message": { "content": null }, "finish_reason": "tool_calls" }]
        })
        .to_string();
        assert!(matches!(parse_response(&body), Err(ProviderError::Decode(_))));
    }

    #[test]
    fn empty_choices_is_decode_error() {
        let body = json!({ "choices": [] }).to_string();
        assert!(matches!(parse_response(&body), Err(ProviderError::Decode(_))));
        assert!(matches!(parse_response("<html>"), Err(ProviderError::Decode(_))));
    }

    #[tokio::test]
    async fn http_status_keeps_body() {
        let transport = ScriptedTransport::text(401, r#"{"error":{"message":"Invalid API key"}}"#).shared();
        let err = provider(transport).completion(request()).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::HttpStatus {
                status: 401,
                body: r#"{"error":{"message":"Invalid API key"}}"#.into()
            }
        );
    }

    #[tokio::test]
    async fn transport_failure_passes_through() {
        let transport =
            ScriptedTransport::new(|_| Err(ProviderError::Transport("connection refused".into())))
                .shared();
        let err = provider(transport).completion(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_transport() {
        let transport = ScriptedTransport::json(200, json!({})).shared();
        let provider = provider(transport.clone());

        let err = provider
            .completion(CompletionRequest::new("gpt-4o-mini", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn caller_timeout_aborts_call() {
        let transport = ScriptedTransport::json(200, json!({}))
            .with_delay(|_| std::time::Duration::from_secs(5))
            .shared();
        let options = CallOptions::new().with_timeout(std::time::Duration::from_millis(20));

        let err = provider(transport)
            .completion_with(request(), options)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn streams_text_deltas() {
        let sse = [
            r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            r#"data: {"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#,
            "data: [DONE]",
        ]
        .join("\n\n");
        let transport = ScriptedTransport::text(200, sse).with_chunk_size(5).shared();

        let stream = provider(transport.clone())
            .completion_stream(request(), CallOptions::new())
            .await
            .unwrap();
        let chunks: Vec<CompletionChunk> = stream.try_collect().await.unwrap();

        let text: String = chunks.iter().map(|c| c.delta.as_str()).collect();
        assert_eq!(text, "Hello");
        assert!(chunks.iter().any(|c| c.finish_reason == Some(FinishReason::Stop)));
        assert_eq!(chunks.last().unwrap().usage.unwrap().total_tokens, 7);
        assert_eq!(transport.last_request().unwrap().body["stream"], true);
    }

    #[tokio::test]
    async fn streaming_with_tools_is_rejected_before_sending() {
        let transport = ScriptedTransport::text(200, "").shared();
        let err = provider(transport.clone())
            .completion_stream(request().with_tools(vec![sum_tool()]), CallOptions::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err, ProviderError::StreamingToolCallsUnsupported);
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn empty_tool_call_delta_is_plain_text() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi","tool_calls":[]}}]}"#;
        let chunk = parse_stream_line(line).unwrap().unwrap();
        assert_eq!(chunk.delta, "Hi");
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n";
        let transport = ScriptedTransport::text(200, sse).with_stalled_stream().shared();
        let limit = std::time::Duration::from_millis(50);

        let mut stream = provider(transport)
            .completion_stream(request(), CallOptions::new().with_timeout(limit))
            .await
            .unwrap();

        let collect = async {
            let mut items = Vec::new();
            while let Some(item) = stream.next().await {
                items.push(item);
            }
            items
        };
        let items = tokio::time::timeout(std::time::Duration::from_secs(2), collect)
            .await
            .expect("stream should end after the deadline");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().delta, "Hel");
        assert_eq!(items[1], Err(ProviderError::Timeout(limit)));
    }

    #[tokio::test]
    async fn tool_call_deltas_fail_the_stream() {
        let sse = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1"}]}}]}"#;
        let transport = ScriptedTransport::text(200, sse).shared();
        let stream = provider(transport)
            .completion_stream(request(), CallOptions::new())
            .await
            .unwrap();

        let result: Result<Vec<CompletionChunk>> = stream.try_collect().await;
        assert_eq!(result, Err(ProviderError::StreamingToolCallsUnsupported));
    }
}

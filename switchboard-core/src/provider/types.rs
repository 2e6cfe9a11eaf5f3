use super::error::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use switchboard_tools::Tool;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// `None` for pure tool-call messages.
    pub content: Option<String>,
    /// Present only on assistant messages that requested tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Present only on tool results, pointing at the originating call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// The assistant turn that requested `tool_calls`, echoed back to the
    /// model in the follow-up request.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// The result of running the tool call `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Backend-assigned, unique within the response.
    pub id: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Raw JSON argument string, exactly as the backend sent it.
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            function: ToolCallFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// A provider-independent chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            tools: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Offer `tools` to the model. An empty list offers none.
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = (!tools.is_empty()).then_some(tools);
        self
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }

    /// Structural checks run before a request is handed to a backend.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ProviderError::InvalidRequest(msg));

        if self.model.trim().is_empty() {
            return invalid("model must not be empty".into());
        }
        if self.messages.is_empty() {
            return invalid("at least one message is required".into());
        }
        if let Some(t) = self.temperature {
            if !t.is_finite() || t < 0.0 {
                return invalid(format!("temperature must be a non-negative number, got {t}"));
            }
        }

        for (i, message) in self.messages.iter().enumerate() {
            if message.tool_calls.is_some() && message.role != Role::Assistant {
                return invalid(format!("message {i}: only assistant messages may carry tool calls"));
            }
            if message.role == Role::Tool && message.tool_call_id.is_none() {
                return invalid(format!("message {i}: tool results need a tool_call_id"));
            }
        }

        for tool in self.tools.iter().flatten() {
            tool.validate().map_err(ProviderError::InvalidRequest)?;
        }
        Ok(())
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Other(other) => other,
        }
    }
}

impl From<&str> for FinishReason {
    fn from(value: &str) -> Self {
        match value {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FinishReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FinishReason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(FinishReason::from(value.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What the model produced: text, or a request to run tools.
///
/// Never both. A `ToolCall` always carries at least one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionKind {
    Message { content: String },
    ToolCall { tool_calls: Vec<ToolCallRequest> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(flatten)]
    pub kind: CompletionKind,
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Text content, if the model answered with a message.
    pub fn message(&self) -> Option<&str> {
        match &self.kind {
            CompletionKind::Message { content } => Some(content),
            CompletionKind::ToolCall { .. } => None,
        }
    }

    /// Requested tool calls, if any.
    pub fn tool_calls(&self) -> Option<&[ToolCallRequest]> {
        match &self.kind {
            CompletionKind::ToolCall { tool_calls } => Some(tool_calls),
            CompletionKind::Message { .. } => None,
        }
    }

    /// The assistant message to append to the conversation for this response.
    pub fn to_message(&self) -> ChatMessage {
        match &self.kind {
            CompletionKind::Message { content } => ChatMessage::assistant(content.clone()),
            CompletionKind::ToolCall { tool_calls } => {
                ChatMessage::assistant_tool_calls(tool_calls.clone())
            }
        }
    }
}

/// One piece of a streamed plain-text completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub delta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_tools::JsonSchema;

    fn request() -> CompletionRequest {
        CompletionRequest::new("gpt-4o-mini", vec![ChatMessage::user("hi")])
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().with_temperature(0.2).with_max_tokens(64).validate().is_ok());
    }

    #[test]
    fn empty_messages_rejected() {
        let req = CompletionRequest::new("m", Vec::new());
        assert!(matches!(req.validate(), Err(ProviderError::InvalidRequest(_))));
    }

    #[test]
    fn empty_tool_name_rejected() {
        let req = request().with_tools(vec![Tool::new("", "nameless", JsonSchema::default())]);
        assert!(matches!(req.validate(), Err(ProviderError::InvalidRequest(_))));
    }

    #[test]
    fn tool_result_needs_call_id() {
        let mut req = request();
        req.push_message(ChatMessage {
            role: Role::Tool,
            content: Some("42".into()),
            tool_calls: None,
            tool_call_id: None,
        });
        assert!(matches!(req.validate(), Err(ProviderError::InvalidRequest(_))));
    }

    #[test]
    fn tool_calls_only_on_assistant() {
        let mut message = ChatMessage::user("hi");
        message.tool_calls = Some(vec![ToolCallRequest::new("1", "f", "{}")]);
        let req = CompletionRequest::new("m", vec![message]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn empty_tool_list_offers_nothing() {
        let req = request().with_tools(Vec::new());
        assert!(req.tools.is_none());
        assert!(!req.has_tools());
    }

    #[test]
    fn finish_reason_round_trip() {
        assert_eq!(FinishReason::from("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(
            FinishReason::from("eos"),
            FinishReason::Other("eos".into())
        );
        assert_eq!(serde_json::to_value(FinishReason::Length).unwrap(), json!("length"));
    }

    #[test]
    fn response_exposes_exactly_one_variant() {
        let response = CompletionResponse {
            kind: CompletionKind::ToolCall {
                tool_calls: vec![ToolCallRequest::new("call_1", "add", "{}")],
            },
            finish_reason: FinishReason::ToolCalls,
            usage: None,
        };
        assert!(response.message().is_none());
        assert_eq!(response.tool_calls().unwrap().len(), 1);

        let message = response.to_message();
        assert_eq!(message.role, Role::Assistant);
        assert!(message.content.is_none());
    }

    #[test]
    fn message_serializes_without_empty_fields() {
        let value = serde_json::to_value(ChatMessage::tool_result("call_1", "59")).unwrap();
        assert_eq!(
            value,
            json!({ "role": "tool", "content": "59", "tool_call_id": "call_1" })
        );
    }
}

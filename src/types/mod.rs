//! Vendor-neutral data model shared by every provider.
//!
//! Requests, messages, tool definitions, responses and streaming increments are plain
//! values; provider modules translate them to and from each vendor's JSON dialect.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LLMError;

/// Author of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
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

/// Normalized chat message shared across providers.
///
/// `content` may be empty when an assistant message only carries tool calls.
/// `tool_call_id` is only meaningful on [`Role::Tool`] messages, where it names the call
/// being answered.
///
/// # Examples
///
/// ```
/// # use hibiki_llm::types::{Message, Role, ToolCall};
/// let call = ToolCall::new("call_1", "get_weather", r#"{"city":"Paris"}"#);
/// let history = vec![
///     Message::system("You are terse."),
///     Message::user("Weather in Paris?"),
///     Message::assistant_with_tool_calls("", vec![call]),
///     Message::tool("call_1", r#"{"temp_c":21}"#),
/// ];
/// assert_eq!(history[3].role, Role::Tool);
/// assert_eq!(history[3].tool_call_id.as_deref(), Some("call_1"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Assistant turn that requested tool invocations.
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Tool result answering the call identified by `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }
}

/// Tool declaration forwarded to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema describing the arguments; passed through untouched.
    pub parameters: Value,
}

/// A model-requested invocation of a caller-supplied function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments. Always valid JSON once the call is complete.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decodes the argument string.
    pub fn arguments_value(&self) -> Result<Value, LLMError> {
        serde_json::from_str(&self.arguments).map_err(|err| LLMError::Parse {
            target: format!("arguments of tool {}", self.name),
            message: err.to_string(),
        })
    }
}

/// Structured-output directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    pub name: String,
    #[serde(default)]
    pub strict: bool,
    pub schema: Value,
}

impl JsonSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            strict: true,
            schema,
        }
    }
}

/// Sampling parameters. Providers omit fields their vendor does not accept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub seed: Option<i64>,
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

/// Canonical chat request.
///
/// An empty `model` falls back to the provider's default model; if neither is set the
/// call fails with [`LLMError::InvalidConfig`] before any I/O.
///
/// # Examples
///
/// ```
/// # use hibiki_llm::types::{ChatRequest, Message};
/// let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")])
///     .with_temperature(0.2)
///     .with_max_output_tokens(128);
/// assert_eq!(request.options.temperature, Some(0.2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub response_schema: Option<JsonSchema>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.options.top_p = Some(top_p);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.options.top_k = Some(top_k);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.options.seed = Some(seed);
        self
    }

    pub fn with_max_output_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_output_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop_sequences(mut self, stop: Vec<String>) -> Self {
        self.options.stop_sequences = stop;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_response_schema(mut self, schema: JsonSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    ToolCalls,
    Length,
}

/// Token accounting; zero when the vendor omits it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Canonical response, either returned directly or accumulated from a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    #[serde(default)]
    pub usage: TokenUsage,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Assistant message that replays this response into a conversation history.
    pub fn to_message(&self) -> Message {
        Message::assistant_with_tool_calls(self.content.clone(), self.tool_calls.clone())
    }

    /// Decodes structured output from the response text.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hibiki_llm::types::ChatResponse;
    /// #[derive(serde::Deserialize)]
    /// struct City { name: String }
    ///
    /// let response = ChatResponse { content: r#"{"name":"Oslo"}"#.into(), ..Default::default() };
    /// let city: City = response.parse().unwrap();
    /// assert_eq!(city.name, "Oslo");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Parse`] naming the target type when the text does not decode.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, LLMError> {
        serde_json::from_str(&self.content).map_err(|err| LLMError::Parse {
            target: std::any::type_name::<T>().to_string(),
            message: err.to_string(),
        })
    }
}

/// One argument fragment of a streamed tool call.
///
/// Fragments for the same call must be concatenated in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub id: String,
    pub name: String,
    pub arguments_delta: String,
}

/// One streaming increment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta, surfaced verbatim.
    pub delta: String,
    pub tool_call_delta: Option<ToolCallDelta>,
    /// Only set on the terminal chunk of a choice.
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            ..Self::default()
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            tool_call_delta: Some(delta),
            ..Self::default()
        }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Self::default()
        }
    }
}

/// Capability flags reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub supports_stream: bool,
    pub supports_tools: bool,
    pub supports_structured_output: bool,
    pub supports_top_k: bool,
    pub supports_seed: bool,
}

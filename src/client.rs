//! Call entry points: resolve a provider by name and dispatch a request to it.

use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::provider::DynProvider;
use crate::registry::{self, ProviderRegistry};
use crate::stream::ChatStream;
use crate::tool::{DynTool, Tool, ToolRegistry};
use crate::types::{ChatOptions, ChatRequest, ChatResponse, JsonSchema, Message};

/// 发送同步聊天请求 通过全局注册表解析 Provider
///
/// # Errors
///
/// Returns [`LLMError::InvalidConfig`] for a blank provider or model name before any I/O,
/// [`LLMError::UnknownProvider`] for an unregistered name, or the provider's own error.
pub async fn call(
    provider: &str,
    request: ChatRequest,
    cancel: CancellationToken,
) -> Result<ChatResponse, LLMError> {
    call_in(registry::global(), provider, request, cancel).await
}

/// 发起流式聊天请求
///
/// # Errors
///
/// See [`call`].
pub async fn call_stream(
    provider: &str,
    request: ChatRequest,
    cancel: CancellationToken,
) -> Result<ChatStream, LLMError> {
    call_stream_in(registry::global(), provider, request, cancel).await
}

/// [`call`] against an explicit registry.
pub async fn call_in(
    registry: &ProviderRegistry,
    provider: &str,
    request: ChatRequest,
    cancel: CancellationToken,
) -> Result<ChatResponse, LLMError> {
    let resolved = resolve(registry, provider, &request)?;
    tracing::debug!(provider = %provider, model = %request.model, "dispatching chat");
    resolved.chat(request, cancel).await
}

/// [`call_stream`] against an explicit registry.
pub async fn call_stream_in(
    registry: &ProviderRegistry,
    provider: &str,
    request: ChatRequest,
    cancel: CancellationToken,
) -> Result<ChatStream, LLMError> {
    let resolved = resolve(registry, provider, &request)?;
    tracing::debug!(provider = %provider, model = %request.model, "dispatching chat stream");
    resolved.stream_chat(request, cancel).await
}

fn resolve(
    registry: &ProviderRegistry,
    provider: &str,
    request: &ChatRequest,
) -> Result<DynProvider, LLMError> {
    if provider.trim().is_empty() {
        return Err(LLMError::invalid_config("provider", "provider name is required"));
    }
    if request.model.trim().is_empty() {
        return Err(LLMError::invalid_config("model", "model name is required"));
    }
    registry.get(provider)
}

/// 绑定 provider + model 与默认选项的便捷句柄
///
/// ```no_run
/// use hibiki_llm::Model;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), hibiki_llm::LLMError> {
/// let model = Model::new("openai", "gpt-4o-mini")
///     .with_system("Answer in one sentence.")
///     .with_temperature(0.2);
/// let response = model.call("Why is the sky blue?", CancellationToken::new()).await?;
/// println!("{}", response.content);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Model {
    provider: String,
    model: String,
    system: Option<String>,
    options: ChatOptions,
    tools: ToolRegistry,
    response_schema: Option<JsonSchema>,
}

impl Model {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            system: None,
            options: ChatOptions::default(),
            tools: ToolRegistry::new(),
            response_schema: None,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 每次请求前置的 system 消息
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
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

    pub fn with_response_schema(mut self, schema: JsonSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_tool_arc(mut self, tool: DynTool) -> Self {
        self.tools.register_arc(tool);
        self
    }

    /// Tools declared on every request, for use with [`crate::tool::execute_tool_calls`].
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Builds the request this handle would send for `messages`.
    pub fn request(&self, messages: Vec<Message>) -> ChatRequest {
        let mut all = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = &self.system {
            all.push(Message::system(system.clone()));
        }
        all.extend(messages);

        let mut request = ChatRequest::new(self.model.clone(), all).with_tools(self.tools.definitions());
        request.options = self.options.clone();
        request.response_schema = self.response_schema.clone();
        request
    }

    /// Sends `prompt` as a single user message.
    pub async fn call(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, LLMError> {
        self.call_messages(vec![Message::user(prompt)], cancel).await
    }

    pub async fn call_messages(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, LLMError> {
        call(&self.provider, self.request(messages), cancel).await
    }

    /// Like [`Model::call_messages`] but keeps the history so the exchange can be resumed.
    pub async fn converse(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<Conversation, LLMError> {
        let response = self.call_messages(messages.clone(), cancel).await?;
        let mut messages = messages;
        messages.push(response.to_message());
        Ok(Conversation { messages, response })
    }

    /// Continues `conversation` with a new user turn, using this handle's provider, model,
    /// options and tools.
    pub async fn resume(
        &self,
        conversation: &Conversation,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<Conversation, LLMError> {
        let mut messages = conversation.messages.clone();
        messages.push(Message::user(content));
        self.converse(messages, cancel).await
    }

    /// Continues `conversation` with the `tool` messages answering its tool calls, usually
    /// produced by [`crate::tool::execute_tool_calls`].
    pub async fn resume_with_tool_outputs(
        &self,
        conversation: &Conversation,
        tool_outputs: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<Conversation, LLMError> {
        let mut messages = conversation.messages.clone();
        messages.extend(tool_outputs);
        self.converse(messages, cancel).await
    }

    pub async fn stream(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        self.stream_messages(vec![Message::user(prompt)], cancel).await
    }

    pub async fn stream_messages(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        call_stream(&self.provider, self.request(messages), cancel).await
    }
}

/// 带完整历史的一轮对话结果
///
/// `messages` holds every turn sent so far plus the assistant reply; the handle's system
/// prompt is not part of it and is prepended again on each call.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    response: ChatResponse,
}

impl Conversation {
    pub fn response(&self) -> &ChatResponse {
        &self.response
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_response(self) -> ChatResponse {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::provider::LLMProvider;
    use crate::types::{CapabilityDescriptor, Role};

    /// 回显最后一条消息的测试 Provider
    struct EchoProvider;

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn chat(
            &self,
            request: ChatRequest,
            _cancel: CancellationToken,
        ) -> Result<ChatResponse, LLMError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatResponse {
                content: format!("{}:{last}", request.model),
                ..ChatResponse::default()
            })
        }

        fn capabilities(&self) -> CapabilityDescriptor {
            CapabilityDescriptor::default()
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    struct Noop;

    #[async_trait]
    impl Tool for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn description(&self) -> &str {
            "Does nothing"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _arguments: &str) -> Result<Value, LLMError> {
            Ok(Value::Null)
        }
    }

    fn counting_registry() -> (ProviderRegistry, Arc<AtomicUsize>) {
        let registry = ProviderRegistry::new();
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        registry.register("echo", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoProvider) as DynProvider)
        });
        (registry, builds)
    }

    #[tokio::test]
    async fn dispatches_to_registered_provider() {
        let (registry, _) = counting_registry();
        let request = ChatRequest::new("m1", vec![Message::user("ping")]);
        let response = call_in(&registry, "echo", request, CancellationToken::new())
            .await
            .expect("response");
        assert_eq!(response.content, "m1:ping");
    }

    #[tokio::test]
    async fn blank_names_fail_before_resolution() {
        let (registry, builds) = counting_registry();
        let err = call_in(
            &registry,
            " ",
            ChatRequest::new("m1", vec![Message::user("ping")]),
            CancellationToken::new(),
        )
        .await
        .expect_err("blank provider");
        assert!(matches!(err, LLMError::InvalidConfig { ref field, .. } if field == "provider"));

        let err = call_stream_in(
            &registry,
            "echo",
            ChatRequest::new("", vec![Message::user("ping")]),
            CancellationToken::new(),
        )
        .await
        .err()
        .expect("blank model");
        assert!(matches!(err, LLMError::InvalidConfig { ref field, .. } if field == "model"));
        assert_eq!(builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_stream_is_unsupported() {
        let (registry, _) = counting_registry();
        let result = call_stream_in(
            &registry,
            "echo",
            ChatRequest::new("m1", vec![Message::user("ping")]),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            result,
            Err(LLMError::UnsupportedFeature { feature: "streaming" })
        ));
    }

    #[test]
    fn model_builds_requests_with_defaults() {
        let model = Model::new("openai", "gpt-4o-mini")
            .with_system("be brief")
            .with_temperature(0.3)
            .with_seed(9)
            .with_max_output_tokens(64)
            .with_tool(Noop);
        let request = model.request(vec![Message::user("hi")]);
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.options.temperature, Some(0.3));
        assert_eq!(request.options.seed, Some(9));
        assert_eq!(request.options.max_output_tokens, Some(64));
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].name, "noop");
        assert_eq!(model.provider(), "openai");
    }
}

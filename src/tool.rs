//! Tools the model may call, and execution of the calls it makes.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LLMError;
use crate::types::{Message, ToolCall, ToolDefinition};

/// 可被模型调用的工具
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Runs the tool with the raw JSON argument string produced by the model.
    async fn execute(&self, arguments: &str) -> Result<Value, LLMError>;
}

pub type DynTool = Arc<dyn Tool>;

impl ToolDefinition {
    /// Declaration sent to the vendor for `tool`.
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
        }
    }
}

/// A tool backed by an async closure over typed input.
///
/// Arguments are deserialized into `In`; the handler's output is serialized back to JSON.
///
/// ```
/// use hibiki_llm::tool::{Tool, TypedTool};
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct Add {
///     a: i64,
///     b: i64,
/// }
///
/// let tool = TypedTool::new(
///     "add",
///     "Adds two integers",
///     json!({"type": "object", "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}}}),
///     |input: Add| async move { Ok(input.a + input.b) },
/// );
/// assert_eq!(tool.name(), "add");
/// ```
pub struct TypedTool<In, F> {
    name: String,
    description: String,
    parameters: Value,
    handler: F,
    _input: PhantomData<fn(In)>,
}

impl<In, F> TypedTool<In, F> {
    pub fn new<Out, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(In) -> Fut,
        Fut: Future<Output = Result<Out, LLMError>>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
            _input: PhantomData,
        }
    }
}

#[async_trait]
impl<In, Out, F, Fut> Tool for TypedTool<In, F>
where
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send,
    F: Fn(In) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Out, LLMError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, arguments: &str) -> Result<Value, LLMError> {
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        let input: In = serde_json::from_str(arguments)
            .map_err(|err| LLMError::tool(&self.name, format!("invalid arguments: {err}")))?;
        let output = (self.handler)(input).await?;
        serde_json::to_value(output)
            .map_err(|err| LLMError::tool(&self.name, format!("failed to encode result: {err}")))
    }
}

/// 工具注册表 按名称查找 保留注册顺序
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, DynTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool; a tool with the same name is replaced in place.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: DynTool) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<DynTool> {
        self.tools.get(name).cloned()
    }

    /// Tools in registration order.
    pub fn all(&self) -> Vec<DynTool> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }

    /// Declarations for every tool, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.all()
            .iter()
            .map(|tool| ToolDefinition::from_tool(tool.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Runs each call and returns one `tool` message per call, in order, carrying the call id.
///
/// A failing tool does not abort the batch: its message content is `Error: <message>` so
/// the model can react to it.
///
/// # Errors
///
/// Returns [`LLMError::ToolNotFound`] when a call names a tool the registry lacks.
pub async fn execute_tool_calls(
    calls: &[ToolCall],
    registry: &ToolRegistry,
) -> Result<Vec<Message>, LLMError> {
    let mut messages = Vec::with_capacity(calls.len());
    for call in calls {
        let tool = registry.get(&call.name).ok_or_else(|| LLMError::ToolNotFound {
            name: call.name.clone(),
        })?;
        let content = match tool.execute(&call.arguments).await {
            Ok(Value::String(text)) => text,
            Ok(value) => value.to_string(),
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "tool execution failed");
                format!("Error: {err}")
            }
        };
        messages.push(Message::tool(call.id.clone(), content));
    }
    Ok(messages)
}

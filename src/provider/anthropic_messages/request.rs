use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::provider::log_dropped_option;
use crate::types::{ChatRequest, Message, Role, ToolCall, ToolDefinition};

use super::PROVIDER_NAME;

pub(crate) const DEFAULT_MAX_TOKENS: u32 = 4096;

/// 构建 Anthropic Messages 请求体
pub(crate) fn build_anthropic_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));

    // 1. system 折叠为顶层 system，其余进入 messages
    let system_texts: Vec<&str> = request
        .messages
        .iter()
        .filter(|message| message.role == Role::System && !message.content.is_empty())
        .map(|message| message.content.as_str())
        .collect();
    if !system_texts.is_empty() {
        body.insert("system".to_string(), Value::String(system_texts.join("\n\n")));
    }

    let messages = convert_messages(&request.messages)?;
    if messages.is_empty() {
        return Err(LLMError::Validation {
            message: "Anthropic Messages request requires at least one user/assistant message"
                .to_string(),
        });
    }
    body.insert("messages".to_string(), Value::Array(messages));

    // 2. 采样与生成控制参数
    let options = &request.options;
    body.insert(
        "max_tokens".to_string(),
        Value::from(options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );
    if let Some(temperature) = options.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(top_p) = options.top_p {
        body.insert("top_p".to_string(), Value::from(top_p));
    }
    if let Some(top_k) = options.top_k {
        body.insert("top_k".to_string(), Value::from(top_k));
    }
    if options.seed.is_some() {
        log_dropped_option(PROVIDER_NAME, "seed");
    }
    if !options.stop_sequences.is_empty() {
        body.insert("stop_sequences".to_string(), json!(options.stop_sequences));
    }

    // 3. tools 与结构化输出
    if !request.tools.is_empty() {
        body.insert("tools".to_string(), Value::Array(convert_tools(&request.tools)));
    }
    if let Some(schema) = &request.response_schema {
        body.insert(
            "output_format".to_string(),
            json!({ "type": "json_schema", "schema": schema.schema }),
        );
    }

    if stream {
        body.insert("stream".to_string(), Value::Bool(true));
    }

    Ok(Value::Object(body))
}

/// Converts the conversation, folding runs of tool results into a single user turn.
fn convert_messages(messages: &[Message]) -> Result<Vec<Value>, LLMError> {
    let mut converted: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {}
            Role::Tool => pending_results.push(convert_tool_result(message)?),
            Role::User | Role::Assistant => {
                flush_tool_results(&mut converted, &mut pending_results);
                converted.push(convert_message(message)?);
            }
        }
    }
    flush_tool_results(&mut converted, &mut pending_results);
    Ok(converted)
}

fn flush_tool_results(converted: &mut Vec<Value>, pending: &mut Vec<Value>) {
    if pending.is_empty() {
        return;
    }
    converted.push(json!({
        "role": "user",
        "content": std::mem::take(pending)
    }));
}

/// Anthropic rejects empty text blocks, so a turn needs text or at least one tool call.
fn convert_message(message: &Message) -> Result<Value, LLMError> {
    // Anthropic 仅支持 user / assistant 角色
    let role = match message.role {
        Role::Assistant => "assistant",
        _ => "user",
    };
    if message.content.is_empty() && message.tool_calls.is_empty() {
        return Err(LLMError::Validation {
            message: format!("{role} message has no text content"),
        });
    }

    let mut blocks = Vec::new();
    if !message.content.is_empty() {
        blocks.push(json!({ "type": "text", "text": message.content }));
    }
    blocks.extend(message.tool_calls.iter().map(convert_tool_use));

    Ok(json!({ "role": role, "content": blocks }))
}

fn convert_tool_use(call: &ToolCall) -> Value {
    let input = serde_json::from_str::<Value>(&call.arguments)
        .unwrap_or_else(|_| Value::String(call.arguments.clone()));
    json!({
        "type": "tool_use",
        "id": call.id,
        "name": call.name,
        "input": input
    })
}

fn convert_tool_result(message: &Message) -> Result<Value, LLMError> {
    let tool_use_id = message
        .tool_call_id
        .as_ref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| LLMError::Validation {
            message: "tool message requires tool_call_id (mapped to tool_use_id)".to_string(),
        })?;
    Ok(json!({
        "type": "tool_result",
        "tool_use_id": tool_use_id,
        "content": message.content
    }))
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters
            })
        })
        .collect()
}

use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::provider::log_dropped_option;
use crate::types::{ChatRequest, JsonSchema, Message, Role, ToolCall, ToolDefinition};

use super::PROVIDER_NAME;
use super::schema::make_all_properties_required;

pub(crate) fn build_openai_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
    include_stream_usage: bool,
) -> Result<Value, LLMError> {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert(
        "messages".to_string(),
        Value::Array(convert_messages(&request.messages)?),
    );

    let options = &request.options;
    if let Some(temperature) = options.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(top_p) = options.top_p {
        body.insert("top_p".to_string(), Value::from(top_p));
    }
    if options.top_k.is_some() {
        log_dropped_option(PROVIDER_NAME, "top_k");
    }
    if let Some(seed) = options.seed {
        body.insert("seed".to_string(), Value::from(seed));
    }
    if let Some(max_tokens) = options.max_output_tokens {
        body.insert("max_completion_tokens".to_string(), Value::from(max_tokens));
    }
    if !options.stop_sequences.is_empty() {
        body.insert("stop".to_string(), json!(options.stop_sequences));
    }
    if !request.tools.is_empty() {
        body.insert("tools".to_string(), Value::Array(convert_tools(&request.tools)));
    }
    if let Some(schema) = &request.response_schema {
        body.insert(
            "response_format".to_string(),
            convert_response_format(schema),
        );
    }
    if stream {
        body.insert("stream".to_string(), Value::Bool(true));
        if include_stream_usage {
            body.insert("stream_options".to_string(), json!({ "include_usage": true }));
        }
    }
    Ok(Value::Object(body))
}

fn convert_messages(messages: &[Message]) -> Result<Vec<Value>, LLMError> {
    messages.iter().map(convert_message).collect()
}

fn convert_message(message: &Message) -> Result<Value, LLMError> {
    let mut obj = Map::new();
    obj.insert(
        "role".to_string(),
        Value::String(message.role.as_str().to_string()),
    );

    match message.role {
        Role::Tool => {
            let call_id = message
                .tool_call_id
                .as_ref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| LLMError::Validation {
                    message: "tool message missing tool_call_id".to_string(),
                })?;
            obj.insert("content".to_string(), Value::String(message.content.clone()));
            obj.insert("tool_call_id".to_string(), Value::String(call_id.clone()));
        }
        _ if !message.tool_calls.is_empty() => {
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                Value::String(message.content.clone())
            };
            obj.insert("content".to_string(), content);
            obj.insert(
                "tool_calls".to_string(),
                Value::Array(message.tool_calls.iter().map(convert_tool_call).collect()),
            );
        }
        _ => {
            obj.insert("content".to_string(), Value::String(message.content.clone()));
        }
    }

    Ok(Value::Object(obj))
}

fn convert_tool_call(call: &ToolCall) -> Value {
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": call.arguments
        }
    })
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters
                }
            })
        })
        .collect()
}

fn convert_response_format(schema: &JsonSchema) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": schema.name,
            "strict": schema.strict,
            "schema": make_all_properties_required(&schema.schema)
        }
    })
}

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::{ChatRequest, Message, Role, ToolCall, ToolDefinition};

/// 构建 Gemini GenerateContent 请求体
pub(crate) fn build_gemini_body(request: &ChatRequest) -> Result<Value, LLMError> {
    let mut body = Map::new();

    // 1. system 折叠为 systemInstruction
    let system_parts: Vec<Value> = request
        .messages
        .iter()
        .filter(|message| message.role == Role::System && !message.content.is_empty())
        .map(|message| json!({ "text": message.content }))
        .collect();
    if !system_parts.is_empty() {
        body.insert(
            "systemInstruction".to_string(),
            json!({ "parts": system_parts }),
        );
    }

    // 2. contents
    body.insert(
        "contents".to_string(),
        Value::Array(convert_messages(&request.messages)?),
    );

    // 3. generationConfig
    if let Some(config) = build_generation_config(request) {
        body.insert("generationConfig".to_string(), config);
    }

    // 4. tools
    if !request.tools.is_empty() {
        body.insert(
            "tools".to_string(),
            json!([{ "functionDeclarations": convert_tools(&request.tools) }]),
        );
    }

    Ok(Value::Object(body))
}

/// Converts the conversation; consecutive tool results share one `user` turn.
fn convert_messages(messages: &[Message]) -> Result<Vec<Value>, LLMError> {
    // 工具结果按函数名回答，名称取自发起调用的 assistant 消息
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut contents = Vec::new();
    let mut pending_responses: Vec<Value> = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {}
            Role::Tool => {
                let call_id = message
                    .tool_call_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| LLMError::Validation {
                        message: "tool message requires tool_call_id".to_string(),
                    })?;
                let name = call_names.get(call_id).copied().unwrap_or(call_id);
                pending_responses.push(json!({
                    "functionResponse": {
                        "name": name,
                        "response": wrap_tool_result(&message.content)
                    }
                }));
            }
            Role::User | Role::Assistant => {
                flush_responses(&mut contents, &mut pending_responses);
                for call in &message.tool_calls {
                    call_names.insert(call.id.as_str(), call.name.as_str());
                }
                contents.push(convert_message(message));
            }
        }
    }
    flush_responses(&mut contents, &mut pending_responses);
    Ok(contents)
}

fn flush_responses(contents: &mut Vec<Value>, pending: &mut Vec<Value>) {
    if pending.is_empty() {
        return;
    }
    contents.push(json!({
        "role": "user",
        "parts": std::mem::take(pending)
    }));
}

fn convert_message(message: &Message) -> Value {
    let role = match message.role {
        Role::Assistant => "model",
        _ => "user",
    };
    let mut parts = Vec::new();
    if !message.content.is_empty() || message.tool_calls.is_empty() {
        parts.push(json!({ "text": message.content }));
    }
    parts.extend(message.tool_calls.iter().map(convert_function_call));
    json!({ "role": role, "parts": parts })
}

fn convert_function_call(call: &ToolCall) -> Value {
    // 参数无法解析时退化为空对象
    let args = match serde_json::from_str::<Value>(&call.arguments) {
        Ok(Value::Object(args)) => Value::Object(args),
        _ => Value::Object(Map::new()),
    };
    json!({
        "functionCall": {
            "name": call.name,
            "args": args
        }
    })
}

/// functionResponse.response must be an object.
fn wrap_tool_result(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(object)) => Value::Object(object),
        Ok(other) => json!({ "result": other }),
        Err(_) => json!({ "result": content }),
    }
}

/// 构造 generationConfig 字段
fn build_generation_config(request: &ChatRequest) -> Option<Value> {
    let options = &request.options;
    let mut cfg = Map::new();

    // 采样相关参数
    if let Some(temperature) = options.temperature {
        cfg.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(max_tokens) = options.max_output_tokens {
        cfg.insert("maxOutputTokens".to_string(), Value::from(max_tokens));
    }
    if let Some(top_p) = options.top_p {
        cfg.insert("topP".to_string(), Value::from(top_p));
    }
    if let Some(top_k) = options.top_k {
        cfg.insert("topK".to_string(), Value::from(top_k));
    }
    if let Some(seed) = options.seed {
        cfg.insert("seed".to_string(), Value::from(seed));
    }
    if !options.stop_sequences.is_empty() {
        cfg.insert("stopSequences".to_string(), json!(options.stop_sequences));
    }

    // 结构化输出
    if let Some(schema) = &request.response_schema {
        cfg.insert(
            "responseMimeType".to_string(),
            Value::String("application/json".to_string()),
        );
        cfg.insert("responseSchema".to_string(), schema.schema.clone());
    }

    if cfg.is_empty() {
        None
    } else {
        Some(Value::Object(cfg))
    }
}

/// 将抽象 ToolDefinition 映射为 functionDeclarations
fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters
            })
        })
        .collect()
}

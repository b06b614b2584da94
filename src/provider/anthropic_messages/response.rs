use crate::types::{ChatResponse, FinishReason, TokenUsage, ToolCall};

use super::types::{AnthropicContentBlock, AnthropicMessageResponse, AnthropicUsage};

pub(crate) fn map_response(resp: AnthropicMessageResponse) -> ChatResponse {
    let mut response = ChatResponse::default();
    for block in resp.content {
        match block.kind.as_str() {
            "text" => {
                if let Some(text) = block.text {
                    response.content.push_str(&text);
                }
            }
            "tool_use" => response.tool_calls.push(convert_tool_use(block)),
            // thinking / redacted_thinking 等块不进入规范化响应
            _ => {}
        }
    }
    response.finish_reason = resp
        .stop_reason
        .as_deref()
        .map(convert_finish_reason)
        .unwrap_or_default();
    if let Some(usage) = resp.usage {
        response.usage = convert_usage(&usage);
    }
    response
}

fn convert_tool_use(block: AnthropicContentBlock) -> ToolCall {
    let arguments = block
        .input
        .map(|input| input.to_string())
        .unwrap_or_else(|| "{}".to_string());
    ToolCall::new(
        block.id.unwrap_or_default(),
        block.name.unwrap_or_default(),
        arguments,
    )
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "tool_use" => FinishReason::ToolCalls,
        "max_tokens" => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

fn convert_usage(usage: &AnthropicUsage) -> TokenUsage {
    let prompt_tokens = usage.input_tokens.unwrap_or(0);
    let completion_tokens = usage.output_tokens.unwrap_or(0);
    TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens.saturating_add(completion_tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_text_and_tool_use_blocks() {
        let resp: AnthropicMessageResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "type": "message",
                "role": "assistant",
                "model": "claude-sonnet-4-5",
                "content": [
                    {"type": "text", "text": "Let me "},
                    {"type": "text", "text": "check."},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 20, "output_tokens": 11}
            }"#,
        )
        .expect("valid response");
        let response = map_response(resp);
        assert_eq!(response.content, "Let me check.");
        assert_eq!(
            response.tool_calls,
            vec![ToolCall::new("toolu_1", "get_weather", r#"{"city":"Paris"}"#)]
        );
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage.total_tokens, 31);
    }

    #[test]
    fn finish_reason_mapping_is_total() {
        assert_eq!(convert_finish_reason("end_turn"), FinishReason::Stop);
        assert_eq!(convert_finish_reason("stop_sequence"), FinishReason::Stop);
        assert_eq!(convert_finish_reason("tool_use"), FinishReason::ToolCalls);
        assert_eq!(convert_finish_reason("max_tokens"), FinishReason::Length);
        assert_eq!(convert_finish_reason("refusal"), FinishReason::Stop);
    }
}

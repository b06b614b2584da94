use crate::error::LLMError;
use crate::types::{ChatResponse, FinishReason, TokenUsage, ToolCall};

use super::PROVIDER_NAME;
use super::types::{OpenAiChatResponse, OpenAiToolCallResponse, OpenAiUsage};

/// Maps the first choice of a completion into the canonical response.
pub(crate) fn map_response(resp: OpenAiChatResponse) -> Result<ChatResponse, LLMError> {
    let choice = resp
        .choices
        .into_iter()
        .min_by_key(|choice| choice.index)
        .ok_or_else(|| LLMError::decode(PROVIDER_NAME, "response contained no choices"))?;

    let mut response = ChatResponse::default();
    if let Some(message) = choice.message {
        if let Some(content) = message.content {
            response.content = content.text();
        }
        response.tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(convert_tool_call)
            .collect();
    }
    response.finish_reason = choice
        .finish_reason
        .as_deref()
        .map(convert_finish_reason)
        .unwrap_or_default();
    if let Some(usage) = resp.usage {
        response.usage = convert_usage(usage);
    }
    Ok(response)
}

fn convert_tool_call(call: OpenAiToolCallResponse) -> ToolCall {
    let (name, arguments) = call
        .function
        .map(|function| {
            (
                function.name.unwrap_or_default(),
                function.arguments.unwrap_or_default(),
            )
        })
        .unwrap_or_default();
    ToolCall::new(call.id.unwrap_or_default(), name, arguments)
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "length" => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

fn convert_usage(usage: OpenAiUsage) -> TokenUsage {
    let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
    let completion_tokens = usage.completion_tokens.unwrap_or(0);
    TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: usage
            .total_tokens
            .unwrap_or(prompt_tokens.saturating_add(completion_tokens)),
    }
}

use crate::types::{ChatResponse, FinishReason, TokenUsage, ToolCall};

use super::types::{GeminiGenerateContentResponse, GeminiUsageMetadata};

/// Maps the first candidate into the canonical response.
///
/// A response without candidates (e.g. a blocked prompt) maps to an empty `stop` response.
pub(crate) fn map_response(resp: GeminiGenerateContentResponse) -> ChatResponse {
    let mut response = ChatResponse::default();
    if let Some(usage) = &resp.usage_metadata {
        response.usage = convert_usage(usage);
    }

    let Some(candidate) = resp.candidates.into_iter().next() else {
        return response;
    };
    for part in candidate.content.map(|content| content.parts).unwrap_or_default() {
        if let Some(text) = part.visible_text() {
            response.content.push_str(text);
        }
        if let Some(call) = &part.function_call {
            // Gemini 不分配调用 ID，以函数名代替
            response
                .tool_calls
                .push(ToolCall::new(&call.name, &call.name, call.arguments()));
        }
    }
    response.finish_reason = resolve_finish_reason(
        candidate.finish_reason.as_deref(),
        !response.tool_calls.is_empty(),
    );
    response
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "TOOL_USE" | "FUNCTION_CALL" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Gemini reports `STOP` even when the turn ended in function calls.
pub(crate) fn resolve_finish_reason(reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    match reason.map(convert_finish_reason).unwrap_or_default() {
        FinishReason::Stop if has_tool_calls => FinishReason::ToolCalls,
        other => other,
    }
}

fn convert_usage(usage: &GeminiUsageMetadata) -> TokenUsage {
    let prompt_tokens = usage.prompt_token_count.unwrap_or(0);
    let completion_tokens = usage.candidates_token_count.unwrap_or(0);
    TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: usage
            .total_token_count
            .unwrap_or(prompt_tokens.saturating_add(completion_tokens)),
    }
}

use std::time::Duration;

use serde::Deserialize;

use crate::error::LLMError;

use super::PROVIDER_NAME;
use super::types::AnthropicErrorDetail;

/// Parses the `{"type":"error","error":{type, message}}` envelope.
pub(crate) fn parse_anthropic_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<AnthropicErrorDetail>,
    }

    if let Ok(ErrorBody { error: Some(detail) }) = serde_json::from_str::<ErrorBody>(body) {
        return api_error_from_detail(status, detail, retry_after);
    }

    // Fallback: if the payload cannot be parsed, surface the raw body.
    LLMError::Api {
        provider: PROVIDER_NAME,
        status,
        error_type: None,
        code: None,
        message: format!("status {status}: {body}"),
        retry_after,
    }
}

pub(crate) fn api_error_from_detail(
    status: u16,
    detail: AnthropicErrorDetail,
    retry_after: Option<Duration>,
) -> LLMError {
    LLMError::Api {
        provider: PROVIDER_NAME,
        status,
        error_type: detail.kind,
        code: None,
        message: detail.message.unwrap_or_else(|| "unknown error".to_string()),
        retry_after,
    }
}

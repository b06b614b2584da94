use std::time::Duration;

use serde::Deserialize;

use crate::error::LLMError;

use super::PROVIDER_NAME;
use super::types::GeminiErrorDetail;

/// Parses the `{"error":{code, message, status}}` envelope returned by Google Gemini.
pub(crate) fn parse_gemini_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiErrorDetail>,
    }

    if let Ok(ErrorBody { error: Some(detail) }) = serde_json::from_str::<ErrorBody>(body) {
        return api_error_from_detail(status, detail, retry_after);
    }
    LLMError::Api {
        provider: PROVIDER_NAME,
        status,
        error_type: None,
        code: None,
        message: format!("status {status}: {body}"),
        retry_after,
    }
}

/// The RPC status (`INVALID_ARGUMENT`, ...) becomes the error type, the numeric code the code.
pub(crate) fn api_error_from_detail(
    status: u16,
    detail: GeminiErrorDetail,
    retry_after: Option<Duration>,
) -> LLMError {
    LLMError::Api {
        provider: PROVIDER_NAME,
        status,
        error_type: detail.status.filter(|status| !status.is_empty()),
        code: detail.code.map(|code| code.to_string()),
        message: detail.message.unwrap_or_else(|| "unknown error".to_string()),
        retry_after,
    }
}

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::LLMError;

use super::PROVIDER_NAME;
use super::types::OpenAiErrorDetail;

/// Parses the `{"error": {message, type, code}}` envelope.
pub(crate) fn parse_openai_error(status: u16, body: &str, retry_after: Option<Duration>) -> LLMError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAiErrorDetail>,
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

pub(crate) fn api_error_from_detail(
    status: u16,
    detail: OpenAiErrorDetail,
    retry_after: Option<Duration>,
) -> LLMError {
    let code = detail.code.and_then(|code| match code {
        Value::String(text) => Some(text),
        Value::Null => None,
        other => Some(other.to_string()),
    });
    LLMError::Api {
        provider: PROVIDER_NAME,
        status,
        error_type: detail.kind,
        code,
        message: detail.message.unwrap_or_else(|| "unknown error".to_string()),
        retry_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_error_envelope() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key","param":null}}"#;
        match parse_openai_error(401, body, None) {
            LLMError::Api {
                provider,
                status,
                error_type,
                code,
                message,
                ..
            } => {
                assert_eq!(provider, "openai");
                assert_eq!(status, 401);
                assert_eq!(error_type.as_deref(), Some("invalid_request_error"));
                assert_eq!(code.as_deref(), Some("invalid_api_key"));
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn numeric_codes_are_stringified() {
        let body = r#"{"error":{"message":"overloaded","code":503}}"#;
        let err = parse_openai_error(503, body, Some(Duration::from_secs(3)));
        match err {
            LLMError::Api {
                code, retry_after, ..
            } => {
                assert_eq!(code.as_deref(), Some("503"));
                assert_eq!(retry_after, Some(Duration::from_secs(3)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_raw_body() {
        match parse_openai_error(502, "<html>bad gateway</html>", None) {
            LLMError::Api {
                message, error_type, ..
            } => {
                assert_eq!(message, "status 502: <html>bad gateway</html>");
                assert!(error_type.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

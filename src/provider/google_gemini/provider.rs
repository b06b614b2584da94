use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::resolve_api_key;
use crate::error::LLMError;
use crate::http::{
    DynHttpTransport, HttpResponse, collect_body_text, post_json_stream_with_headers,
    post_json_with_headers, with_cancellation,
};
use crate::provider::retry::retry_after_from_headers;
use crate::provider::{LLMProvider, resolve_model};
use crate::stream::ChatStream;
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResponse};

use super::error::parse_gemini_error;
use super::request::build_gemini_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::GeminiGenerateContentResponse;
use super::{API_KEY_ENV, PROVIDER_NAME};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini GenerateContent Provider
pub struct GoogleGeminiProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: Option<String>,
    pub(crate) timeout: Option<Duration>,
}

impl GoogleGeminiProvider {
    /// 创建带默认 base_url 的 Provider
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model: None,
            timeout: None,
        }
    }

    /// Reads the key from `GEMINI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::InvalidConfig`] when the variable is unset or blank.
    pub fn from_env(transport: DynHttpTransport) -> Result<Self, LLMError> {
        let api_key = resolve_api_key(None, API_KEY_ENV, PROVIDER_NAME)?;
        Ok(Self::new(transport, api_key))
    }

    /// 自定义 base_url
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 设置默认模型
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// 请求超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the non-streaming endpoint URL for GenerateContent.
    pub(crate) fn endpoint(&self, model: &str) -> String {
        format!("{}:generateContent", self.model_url(model))
    }

    /// Builds the streaming endpoint URL (SSE) for GenerateContent.
    pub(crate) fn stream_endpoint(&self, model: &str) -> String {
        format!("{}:streamGenerateContent?alt=sse", self.model_url(model))
    }

    fn model_url(&self, model: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let model_path = normalize_model(model);
        if base.ends_with("/v1beta") {
            format!("{base}/{model_path}")
        } else {
            format!("{base}/v1beta/{model_path}")
        }
    }

    fn build_headers(&self, stream: bool) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-goog-api-key".to_string(), self.api_key.clone());
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.insert("Accept".to_string(), accept.to_string());
        headers
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, LLMError> {
        let status = response.status;
        let retry_after = retry_after_from_headers(&response.headers);
        let text = response.into_string(PROVIDER_NAME)?;
        if (200..300).contains(&status) {
            Ok(text)
        } else {
            tracing::warn!(provider = PROVIDER_NAME, status, "vendor returned an error status");
            Err(parse_gemini_error(status, &text, retry_after))
        }
    }
}

fn normalize_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl LLMProvider for GoogleGeminiProvider {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, LLMError> {
        let model = resolve_model(&request, self.default_model.as_deref(), PROVIDER_NAME)?;
        let body = build_gemini_body(&request)?;
        tracing::debug!(provider = PROVIDER_NAME, model = %model, "sending chat request");
        let response = with_cancellation(
            &cancel,
            post_json_with_headers(
                self.transport.as_ref(),
                self.endpoint(&model),
                self.build_headers(false),
                &body,
                self.timeout,
            ),
        )
        .await?;
        let text = self.ensure_success(response)?;
        let parsed: GeminiGenerateContentResponse = serde_json::from_str(&text).map_err(|err| {
            LLMError::decode(PROVIDER_NAME, format!("failed to parse Gemini response: {err}"))
        })?;
        Ok(map_response(parsed))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        let model = resolve_model(&request, self.default_model.as_deref(), PROVIDER_NAME)?;
        let body = build_gemini_body(&request)?;
        tracing::debug!(provider = PROVIDER_NAME, model = %model, "opening chat stream");
        let response = with_cancellation(
            &cancel,
            post_json_stream_with_headers(
                self.transport.as_ref(),
                self.stream_endpoint(&model),
                self.build_headers(true),
                &body,
                self.timeout,
            ),
        )
        .await?;
        if !response.is_success() {
            let status = response.status;
            let retry_after = retry_after_from_headers(&response.headers);
            let text = with_cancellation(&cancel, collect_body_text(response.body, PROVIDER_NAME))
                .await?;
            tracing::warn!(provider = PROVIDER_NAME, status, "vendor rejected stream request");
            return Err(parse_gemini_error(status, &text, retry_after));
        }
        Ok(create_stream(response.body, cancel, response.status))
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_tools: true,
            supports_structured_output: true,
            supports_top_k: true,
            supports_seed: true,
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

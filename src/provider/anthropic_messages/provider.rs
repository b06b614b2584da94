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

use super::error::parse_anthropic_error;
use super::request::build_anthropic_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::AnthropicMessageResponse;
use super::{API_KEY_ENV, PROVIDER_NAME};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_VERSION: &str = "2023-06-01";
const STRUCTURED_OUTPUTS_BETA: &str = "structured-outputs-2025-11-13";

/// Anthropic Messages Provider
pub struct AnthropicMessagesProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) version: String,
    pub(crate) beta: Option<String>,
    pub(crate) default_model: Option<String>,
    pub(crate) timeout: Option<Duration>,
}

impl AnthropicMessagesProvider {
    /// 创建带默认 base_url 与版本的 Provider
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            version: DEFAULT_VERSION.to_string(),
            beta: None,
            default_model: None,
            timeout: None,
        }
    }

    /// Reads the key from `ANTHROPIC_API_KEY`.
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

    /// 覆盖 anthropic-version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 额外的 anthropic-beta 标记，多个值用逗号分隔
    pub fn with_beta(mut self, beta: impl Into<String>) -> Self {
        self.beta = Some(beta.into());
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

    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    fn build_headers(&self, request: &ChatRequest, stream: bool) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), self.api_key.clone());
        headers.insert("anthropic-version".to_string(), self.version.clone());
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.insert("Accept".to_string(), accept.to_string());

        let mut betas: Vec<&str> = self
            .beta
            .as_deref()
            .map(|beta| {
                beta.split(',')
                    .map(str::trim)
                    .filter(|flag| !flag.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if request.response_schema.is_some() && !betas.contains(&STRUCTURED_OUTPUTS_BETA) {
            betas.push(STRUCTURED_OUTPUTS_BETA);
        }
        if !betas.is_empty() {
            headers.insert("anthropic-beta".to_string(), betas.join(","));
        }
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
            Err(parse_anthropic_error(status, &text, retry_after))
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicMessagesProvider {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, LLMError> {
        let model = resolve_model(&request, self.default_model.as_deref(), PROVIDER_NAME)?;
        let body = build_anthropic_body(&request, &model, false)?;
        tracing::debug!(provider = PROVIDER_NAME, model = %model, "sending chat request");
        let response = with_cancellation(
            &cancel,
            post_json_with_headers(
                self.transport.as_ref(),
                self.endpoint(),
                self.build_headers(&request, false),
                &body,
                self.timeout,
            ),
        )
        .await?;
        let text = self.ensure_success(response)?;
        let parsed: AnthropicMessageResponse = serde_json::from_str(&text).map_err(|err| {
            LLMError::decode(PROVIDER_NAME, format!("failed to parse Anthropic response: {err}"))
        })?;
        Ok(map_response(parsed))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        let model = resolve_model(&request, self.default_model.as_deref(), PROVIDER_NAME)?;
        let body = build_anthropic_body(&request, &model, true)?;
        tracing::debug!(provider = PROVIDER_NAME, model = %model, "opening chat stream");
        let response = with_cancellation(
            &cancel,
            post_json_stream_with_headers(
                self.transport.as_ref(),
                self.endpoint(),
                self.build_headers(&request, true),
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
            return Err(parse_anthropic_error(status, &text, retry_after));
        }
        Ok(create_stream(response.body, cancel, response.status))
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_tools: true,
            supports_structured_output: true,
            supports_top_k: true,
            supports_seed: false,
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http::reqwest::default_dyn_transport;
    use crate::types::{JsonSchema, Message};

    fn provider() -> AnthropicMessagesProvider {
        AnthropicMessagesProvider::new(default_dyn_transport().expect("transport"), "sk-ant")
    }

    #[test]
    fn endpoint_and_version_headers() {
        let provider = provider().with_base_url("https://proxy.local/v1/");
        assert_eq!(provider.endpoint(), "https://proxy.local/v1/messages");

        let request = ChatRequest::new("m", vec![Message::user("hi")]);
        let headers = provider.build_headers(&request, false);
        assert_eq!(headers["x-api-key"], "sk-ant");
        assert_eq!(headers["anthropic-version"], "2023-06-01");
        assert!(!headers.contains_key("anthropic-beta"));
    }

    #[test]
    fn structured_output_merges_beta_flag() {
        let provider = provider().with_beta("prompt-caching-2024-07-31");
        let request = ChatRequest::new("m", vec![Message::user("hi")])
            .with_response_schema(JsonSchema::new("answer", json!({"type": "object"})));
        let headers = provider.build_headers(&request, true);
        assert_eq!(
            headers["anthropic-beta"],
            "prompt-caching-2024-07-31,structured-outputs-2025-11-13"
        );
        assert_eq!(headers["Accept"], "text/event-stream");
    }
}

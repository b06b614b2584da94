use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
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

use super::error::parse_openai_error;
use super::request::build_openai_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::OpenAiChatResponse;
use super::{API_KEY_ENV, PROVIDER_NAME};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI Chat Completions Provider
pub struct OpenAiChatProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) organization: Option<String>,
    pub(crate) project: Option<String>,
    pub(crate) default_model: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) include_stream_usage: bool,
}

impl OpenAiChatProvider {
    /// 创建带默认 base_url 的 Provider
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            organization: None,
            project: None,
            default_model: None,
            timeout: None,
            include_stream_usage: false,
        }
    }

    /// Reads the key from `OPENAI_API_KEY`.
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

    /// 配置组织 ID
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// 配置项目 ID
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
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

    /// Requests a trailing usage chunk on streams (`stream_options.include_usage`).
    ///
    /// Off by default since some compatible gateways reject the field.
    pub fn with_stream_usage(mut self, enabled: bool) -> Self {
        self.include_stream_usage = enabled;
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    fn build_headers(&self, stream: bool) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.insert("Accept".to_string(), accept.to_string());
        if let Some(org) = &self.organization {
            headers.insert("OpenAI-Organization".to_string(), org.clone());
        }
        if let Some(project) = &self.project {
            headers.insert("OpenAI-Project".to_string(), project.clone());
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
            Err(parse_openai_error(status, &text, retry_after))
        }
    }

    fn try_parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, LLMError> {
        serde_json::from_str(text).map_err(|err| {
            LLMError::decode(PROVIDER_NAME, format!("failed to parse OpenAI response: {err}"))
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAiChatProvider {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, LLMError> {
        let model = resolve_model(&request, self.default_model.as_deref(), PROVIDER_NAME)?;
        let body = build_openai_body(&request, &model, false, false)?;
        tracing::debug!(provider = PROVIDER_NAME, model = %model, "sending chat request");
        let response = with_cancellation(
            &cancel,
            post_json_with_headers(
                self.transport.as_ref(),
                self.endpoint(),
                self.build_headers(false),
                &body,
                self.timeout,
            ),
        )
        .await?;
        let text = self.ensure_success(response)?;
        let parsed: OpenAiChatResponse = self.try_parse(&text)?;
        map_response(parsed)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        let model = resolve_model(&request, self.default_model.as_deref(), PROVIDER_NAME)?;
        let body = build_openai_body(&request, &model, true, self.include_stream_usage)?;
        tracing::debug!(provider = PROVIDER_NAME, model = %model, "opening chat stream");
        let response = with_cancellation(
            &cancel,
            post_json_stream_with_headers(
                self.transport.as_ref(),
                self.endpoint(),
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
            return Err(parse_openai_error(status, &text, retry_after));
        }
        Ok(create_stream(response.body, cancel, response.status))
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_tools: true,
            supports_structured_output: true,
            supports_top_k: false,
            supports_seed: true,
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::stream::ChatStream;
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResponse};

pub mod anthropic_messages;
pub mod google_gemini;
pub mod openai_chat;
pub(crate) mod retry;

/// 统一的 Provider Trait 所有供应商实现该接口即可接入
///
/// The request is consumed by the call. Cancelling `cancel` aborts the HTTP exchange and,
/// for streams, unblocks any pending [`ChatStream::next`].
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// 提交完整请求并等待完整响应
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, LLMError>;

    /// 以流式方式返回增量事件
    async fn stream_chat(
        &self,
        _request: ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        Err(LLMError::UnsupportedFeature {
            feature: "streaming",
        })
    }

    /// 描述支持的能力范围
    fn capabilities(&self) -> CapabilityDescriptor;

    /// 供应商名称
    fn name(&self) -> &'static str;
}

/// 线程安全 Provider
pub type DynProvider = Arc<dyn LLMProvider>;

/// Resolves the model for a request, falling back to the provider default.
pub(crate) fn resolve_model(
    request: &ChatRequest,
    default_model: Option<&str>,
    provider: &'static str,
) -> Result<String, LLMError> {
    let model = request.model.trim();
    if !model.is_empty() {
        return Ok(model.to_string());
    }
    default_model
        .filter(|model| !model.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| LLMError::invalid_config("model", format!("model is required for {provider}")))
}

/// Logs a sampling option the vendor does not accept; the field is left out of the body.
pub(crate) fn log_dropped_option(provider: &'static str, option: &'static str) {
    tracing::debug!(provider = %provider, option, "option not supported by vendor, omitted");
}

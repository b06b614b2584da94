use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;

use crate::error::{LLMError, TransportPhase};

use super::{DynHttpTransport, HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};

/// 基于 reqwest 的默认 HttpTransport
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// 使用自定义 reqwest::Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 创建默认配置
    pub fn default_client() -> Result<Self, LLMError> {
        Client::builder()
            .build()
            .map(Self::new)
            .map_err(|err| LLMError::invalid_config("http_client", format!("failed to create reqwest client: {err}")))
    }

    fn build_request(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, LLMError> {
        let HttpRequest {
            url,
            headers,
            body,
            timeout,
        } = request;
        let mut builder = self.client.post(&url);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        for (name, value) in headers {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                LLMError::transport(TransportPhase::Send, format!("invalid header name: {err}"))
            })?;
            let header_value = reqwest::header::HeaderValue::from_str(&value).map_err(|err| {
                LLMError::transport(
                    TransportPhase::Send,
                    format!("invalid header value for {header_name}: {err}"),
                )
            })?;
            builder = builder.header(header_name, header_value);
        }

        Ok(builder.body(body))
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<reqwest::Response, LLMError> {
        self.build_request(request)?
            .send()
            .await
            .map_err(|err| map_reqwest_error(TransportPhase::Send, &err))
    }

    fn headers_to_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

/// Flattens reqwest's error kinds into the single transport error shape.
fn map_reqwest_error(phase: TransportPhase, err: &reqwest::Error) -> LLMError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_body() || err.is_decode() {
        "body"
    } else if err.is_request() {
        "request"
    } else {
        "other"
    };
    LLMError::transport(phase, format!("{kind}: {err}"))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        let response = self.dispatch(request).await?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(TransportPhase::Read, &err))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
        let response = self.dispatch(request).await?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| map_reqwest_error(TransportPhase::Read, &err))
        });
        let body: HttpBodyStream = Box::pin(stream);

        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

static SHARED_TRANSPORT: OnceLock<DynHttpTransport> = OnceLock::new();

/// 便捷构造线程安全 Transport
pub fn default_dyn_transport() -> Result<DynHttpTransport, LLMError> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}

/// Process-wide transport shared by the built-in registry constructors so they reuse one
/// connection pool.
pub fn shared_transport() -> Result<DynHttpTransport, LLMError> {
    if let Some(transport) = SHARED_TRANSPORT.get() {
        return Ok(transport.clone());
    }
    let transport = default_dyn_transport()?;
    Ok(SHARED_TRANSPORT.get_or_init(|| transport).clone())
}

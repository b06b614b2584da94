use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;

/// Minimal HTTP request representation shared across providers.
///
/// Every vendor call is a JSON `POST`, so the method is implied.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a POST request with a JSON request body.
    ///
    /// # Examples
    ///
    /// ```
    /// use hibiki_llm::http::HttpRequest;
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// ```
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body,
            timeout: None,
        }
    }

    /// Merges headers into the request, replacing existing values with the same name.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use hibiki_llm::http::HttpRequest;
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec())
    ///     .with_headers(HashMap::from([("Authorization".into(), "Bearer test".into())]));
    /// assert_eq!(request.headers.get("Authorization"), Some(&"Bearer test".to_string()));
    /// assert!(request.headers.contains_key("Content-Type"));
    /// ```
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets a per-request timeout enforced by the transport.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Minimal HTTP response representation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts the body into a UTF-8 string.
    ///
    /// # Examples
    ///
    /// ```
    /// use hibiki_llm::http::HttpResponse;
    ///
    /// let response = HttpResponse { status: 200, headers: Default::default(), body: b"ok".to_vec() };
    /// assert_eq!(response.into_string("openai").unwrap(), "ok");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Decode`] when the body cannot be interpreted as UTF-8.
    pub fn into_string(self, provider: &'static str) -> Result<String, LLMError> {
        String::from_utf8(self.body)
            .map_err(|err| LLMError::decode(provider, format!("response body is not UTF-8: {err}")))
    }
}

/// HTTP response that carries a streaming body.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

impl HttpStreamResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Alias for the body stream returned by [`HttpTransport::send_stream`].
///
/// Dropping the stream releases the underlying connection.
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LLMError>> + Send>>;

/// Transport abstraction used to decouple providers from the concrete HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves when the full response is available.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use hibiki_llm::http::{HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse};
    /// # use hibiki_llm::error::LLMError;
    /// # use futures_util::stream;
    /// struct MemoryTransport;
    ///
    /// #[async_trait]
    /// impl HttpTransport for MemoryTransport {
    ///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
    ///         Ok(HttpResponse { status: 200, headers: request.headers, body: b"ok".to_vec() })
    ///     }
    ///     async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
    ///         Ok(HttpStreamResponse { status: 200, headers: request.headers, body: Box::pin(stream::empty()) })
    ///     }
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let response = MemoryTransport
    ///     .send(HttpRequest::post_json("https://example.com", br"{}".to_vec()))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(response.status, 200);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Implementations map network failures to [`LLMError::Transport`] with the phase that failed.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError>;

    /// Sends a request and returns as soon as the status line and headers arrive.
    ///
    /// # Errors
    ///
    /// Implementations return [`LLMError::Transport`] with [`crate::error::TransportPhase::Send`]
    /// for failures before the body; body read failures are yielded by the stream itself.
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

fn encode_body<T: Serialize>(body: &T) -> Result<Vec<u8>, LLMError> {
    serde_json::to_vec(body).map_err(|err| LLMError::Validation {
        message: format!("failed to serialize request: {err}"),
    })
}

/// Serializes a body to JSON, attaches headers, and issues a POST request.
///
/// # Errors
///
/// Returns [`LLMError::Validation`] if serialization fails or forwards the error raised by
/// [`HttpTransport::send`].
pub async fn post_json_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
    timeout: Option<Duration>,
) -> Result<HttpResponse, LLMError> {
    let request = HttpRequest::post_json(url, encode_body(body)?)
        .with_headers(headers)
        .with_timeout(timeout);
    transport.send(request).await
}

/// Issues a JSON POST request and returns the streaming response.
///
/// # Errors
///
/// Returns [`LLMError::Validation`] when serialization fails or propagates any error from
/// [`HttpTransport::send_stream`].
pub async fn post_json_stream_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
    timeout: Option<Duration>,
) -> Result<HttpStreamResponse, LLMError> {
    let request = HttpRequest::post_json(url, encode_body(body)?)
        .with_headers(headers)
        .with_timeout(timeout);
    transport.send_stream(request).await
}

/// Races `future` against the cancellation token.
///
/// The token wins ties, so an already-cancelled token never starts I/O.
pub async fn with_cancellation<T, F>(cancel: &CancellationToken, future: F) -> Result<T, LLMError>
where
    F: Future<Output = Result<T, LLMError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LLMError::aborted()),
        result = future => result,
    }
}

/// Drains a streaming body into a string, used for error payloads of streaming calls.
pub(crate) async fn collect_body_text(
    mut body: HttpBodyStream,
    provider: &'static str,
) -> Result<String, LLMError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    String::from_utf8(bytes)
        .map_err(|err| LLMError::decode(provider, format!("failed to decode stream error body: {err}")))
}

pub mod reqwest;

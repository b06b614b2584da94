use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Phase of an HTTP exchange in which a transport failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPhase {
    /// Building, connecting, or sending the request (DNS, TLS, connect, timeout before headers).
    Send,
    /// Reading the response body, including streamed SSE bytes.
    Read,
}

impl fmt::Display for TransportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportPhase::Send => f.write_str("request send"),
            TransportPhase::Read => f.write_str("body read"),
        }
    }
}

/// Aggregates every failure mode exposed by the client.
///
/// Nothing inside the crate retries or silently recovers; each variant is returned to the
/// immediate caller of the operation that detected it.
#[derive(Debug, Clone, Error)]
pub enum LLMError {
    /// Raised when building or validating configuration fails, before any network activity.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the configuration field that failed validation.
        field: String,
        /// Additional context explaining why the field is invalid.
        reason: String,
    },
    /// The registry has no constructor for the requested provider name.
    #[error("unknown provider: {name:?} (available: {})", .available.join(", "))]
    UnknownProvider {
        name: String,
        /// Names registered at the time of the lookup, sorted.
        available: Vec<String>,
    },
    /// Connection, TLS, DNS or timeout failures, tagged with the phase that failed.
    #[error("transport error during {phase}: {message}")]
    Transport {
        phase: TransportPhase,
        message: String,
    },
    /// Surfaces cancellations triggered by the caller's cancellation token.
    #[error("request aborted: {message}")]
    Aborted {
        /// Message describing who/what cancelled the request.
        message: String,
    },
    /// Non-success status returned by a vendor, normalized from its error envelope.
    #[error("{provider} API error (status {status}): {message}")]
    Api {
        /// Name of the provider, such as `openai`.
        provider: &'static str,
        status: u16,
        /// Vendor error type (`invalid_request_error`, `INVALID_ARGUMENT`, ...).
        error_type: Option<String>,
        /// Vendor error code when the envelope carries one.
        code: Option<String>,
        /// Vendor message, or `status {status}: {body}` when the envelope does not parse.
        message: String,
        /// Wait duration suggested via `Retry-After`; reported only, never acted on.
        retry_after: Option<Duration>,
    },
    /// Malformed JSON or invalid UTF-8 in a response body or in a single SSE event.
    #[error("failed to decode {provider} payload: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
    /// Structured output could not be decoded into the caller's type.
    #[error("failed to parse response into {target}: {message}")]
    Parse { target: String, message: String },
    /// Signals validation failures in the request payload.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Declares that a capability is not supported by the selected provider.
    #[error("feature unsupported: {feature}")]
    UnsupportedFeature { feature: &'static str },
    /// A model requested a tool that is not registered with the executor.
    #[error("tool not found: {name}")]
    ToolNotFound { name: String },
    /// Failure reported by a tool implementation.
    #[error("tool {name} failed: {message}")]
    Tool { name: String, message: String },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] for the given phase.
    ///
    /// # Examples
    ///
    /// ```
    /// use hibiki_llm::error::{LLMError, TransportPhase};
    ///
    /// let err = LLMError::transport(TransportPhase::Send, "dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { phase: TransportPhase::Send, .. }));
    /// assert_eq!(err.to_string(), "transport error during request send: dns lookup failed");
    /// ```
    pub fn transport<T: Into<String>>(phase: TransportPhase, message: T) -> Self {
        Self::Transport {
            phase,
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Decode`] tagged with the provider name.
    pub fn decode<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Decode {
            provider,
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::InvalidConfig`].
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an [`LLMError::Tool`]; intended for [`crate::tool::Tool`] implementations.
    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn aborted() -> Self {
        Self::Aborted {
            message: "cancellation token triggered".to_string(),
        }
    }

    /// HTTP status for vendor API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            LLMError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for 401/403 vendor responses.
    pub fn is_auth(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Returns `true` when the vendor throttled the request.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status(), Some(429))
    }
}

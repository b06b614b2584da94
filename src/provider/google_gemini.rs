//! Google Gemini GenerateContent (`/v1beta/models/{model}:generateContent`). Streams use
//! `:streamGenerateContent?alt=sse` and end when a candidate reports a `finishReason`.

mod error;
mod provider;
mod request;
mod response;
mod stream;
mod types;

pub use provider::GoogleGeminiProvider;

pub(crate) const PROVIDER_NAME: &str = "gemini";
pub(crate) const API_KEY_ENV: &str = "GEMINI_API_KEY";

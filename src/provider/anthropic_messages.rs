//! Anthropic Messages (`/v1/messages`). Streams use typed `event:`/`data:` pairs and end on
//! `message_stop`.

mod error;
mod provider;
mod request;
mod response;
mod stream;
mod types;

pub use provider::AnthropicMessagesProvider;

pub(crate) const PROVIDER_NAME: &str = "anthropic";
pub(crate) const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

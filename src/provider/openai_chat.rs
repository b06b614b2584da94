//! OpenAI Chat Completions (`/v1/chat/completions`), also spoken by many compatible
//! gateways. Streams use `data:` lines terminated by `data: [DONE]`.

mod error;
mod provider;
mod request;
mod response;
mod schema;
mod stream;
mod types;

pub use provider::OpenAiChatProvider;
pub use schema::make_all_properties_required;

pub(crate) const PROVIDER_NAME: &str = "openai";
pub(crate) const API_KEY_ENV: &str = "OPENAI_API_KEY";

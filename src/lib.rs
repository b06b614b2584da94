//! LLM 多后端统一调用库
//!
//! One canonical request/response model over the OpenAI Chat Completions, Anthropic Messages
//! and Google Gemini wire formats, with a pull-based stream facade shared by all three.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod registry;
pub mod stream;
pub mod tool;
pub mod types;

pub use client::{Conversation, Model, call, call_stream};
pub use error::{LLMError, TransportPhase};
pub use provider::{DynProvider, LLMProvider};
pub use stream::{ChatStream, ResponseStream};
pub use tool::{Tool, ToolRegistry, TypedTool, execute_tool_calls};
pub use types::*;

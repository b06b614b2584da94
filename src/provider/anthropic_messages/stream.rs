use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::stream::ChatStream;
use crate::stream::accumulator::StreamAccumulator;
use crate::stream::normalizer::{EventFolder, Fold, SseNormalizer};
use crate::stream::sse::SseEvent;

use super::PROVIDER_NAME;
use super::error::api_error_from_detail;
use super::response::convert_finish_reason;
use super::types::{AnthropicBlockDelta, AnthropicStreamEvent};

pub(crate) fn create_stream(
    body: HttpBodyStream,
    cancel: CancellationToken,
    status: u16,
) -> ChatStream {
    ChatStream::new(SseNormalizer::new(
        body,
        PROVIDER_NAME,
        cancel,
        AnthropicFolder::new(status),
    ))
}

/// Folds typed Messages events.
///
/// Tool calls are keyed by the order of their `tool_use` block starts; `block_keys` maps
/// the vendor's content-block index onto that key so `input_json_delta` events find their call.
pub(crate) struct AnthropicFolder {
    status: u16,
    next_key: usize,
    block_keys: HashMap<usize, usize>,
}

impl AnthropicFolder {
    fn new(status: u16) -> Self {
        Self {
            status,
            next_key: 0,
            block_keys: HashMap::new(),
        }
    }
}

impl EventFolder for AnthropicFolder {
    fn fold(&mut self, event: SseEvent, acc: &mut StreamAccumulator) -> Result<Fold, LLMError> {
        let parsed: AnthropicStreamEvent = serde_json::from_str(&event.data).map_err(|err| {
            LLMError::decode(PROVIDER_NAME, format!("failed to parse stream event: {err}"))
        })?;

        match parsed {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    acc.update_usage(usage.input_tokens, usage.output_tokens, None);
                }
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block.kind.as_str() {
                "tool_use" => {
                    let key = self.next_key;
                    self.next_key += 1;
                    self.block_keys.insert(index, key);
                    acc.push_tool_fragment(
                        key,
                        content_block.id.as_deref(),
                        content_block.name.as_deref(),
                        "",
                    );
                }
                "text" => acc.push_text(content_block.text.as_deref().unwrap_or_default()),
                _ => {}
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicBlockDelta::TextDelta { text } => acc.push_text(&text),
                AnthropicBlockDelta::InputJsonDelta { partial_json } => {
                    match self.block_keys.get(&index) {
                        Some(&key) => acc.push_tool_fragment(key, None, None, &partial_json),
                        None => tracing::debug!(
                            provider = PROVIDER_NAME,
                            index,
                            "input_json_delta for unknown block ignored"
                        ),
                    }
                }
                AnthropicBlockDelta::Other => {}
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.as_deref() {
                    acc.finish(convert_finish_reason(reason));
                }
                if let Some(usage) = usage {
                    acc.update_usage(usage.input_tokens, usage.output_tokens, None);
                }
            }
            AnthropicStreamEvent::MessageStop => return Ok(Fold::Terminal),
            AnthropicStreamEvent::Error { error } => {
                return Err(api_error_from_detail(self.status, error, None));
            }
            AnthropicStreamEvent::ContentBlockStop
            | AnthropicStreamEvent::Ping
            | AnthropicStreamEvent::Unknown => {}
        }
        Ok(Fold::Continue)
    }
}

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
use super::types::OpenAiStreamChunk;

pub(crate) fn create_stream(
    body: HttpBodyStream,
    cancel: CancellationToken,
    status: u16,
) -> ChatStream {
    ChatStream::new(SseNormalizer::new(
        body,
        PROVIDER_NAME,
        cancel,
        OpenAiChatFolder { status },
    ))
}

/// Folds `chat.completion.chunk` payloads. Only choice 0 is surfaced.
///
/// The stream ends on `data: [DONE]`, which the driver handles, so every chunk folds to
/// [`Fold::Continue`].
pub(crate) struct OpenAiChatFolder {
    /// Status of the streaming response, attached to in-band errors.
    status: u16,
}

impl EventFolder for OpenAiChatFolder {
    fn fold(&mut self, event: SseEvent, acc: &mut StreamAccumulator) -> Result<Fold, LLMError> {
        let chunk: OpenAiStreamChunk = serde_json::from_str(&event.data).map_err(|err| {
            LLMError::decode(PROVIDER_NAME, format!("failed to parse stream chunk: {err}"))
        })?;

        if let Some(detail) = chunk.error {
            return Err(api_error_from_detail(self.status, detail, None));
        }

        for choice in chunk.choices.into_iter().filter(|choice| choice.index == 0) {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content {
                    acc.push_text(&content.text());
                }
                for (position, call) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
                    let key = call.index.unwrap_or(position);
                    let (name, arguments) = match call.function {
                        Some(function) => (function.name, function.arguments),
                        None => (None, None),
                    };
                    acc.push_tool_fragment(
                        key,
                        call.id.as_deref(),
                        name.as_deref(),
                        arguments.as_deref().unwrap_or_default(),
                    );
                }
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                acc.finish(convert_finish_reason(reason));
            }
        }

        if let Some(usage) = chunk.usage {
            acc.update_usage(usage.prompt_tokens, usage.completion_tokens, usage.total_tokens);
        }

        Ok(Fold::Continue)
    }
}

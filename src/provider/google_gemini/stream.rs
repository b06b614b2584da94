use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::stream::ChatStream;
use crate::stream::accumulator::StreamAccumulator;
use crate::stream::normalizer::{EventFolder, Fold, SseNormalizer};
use crate::stream::sse::SseEvent;

use super::PROVIDER_NAME;
use super::error::api_error_from_detail;
use super::response::resolve_finish_reason;
use super::types::GeminiGenerateContentResponse;

pub(crate) fn create_stream(
    body: HttpBodyStream,
    cancel: CancellationToken,
    status: u16,
) -> ChatStream {
    ChatStream::new(SseNormalizer::new(
        body,
        PROVIDER_NAME,
        cancel,
        GeminiFolder { status, next_key: 0 },
    ))
}

/// Folds `GenerateContentResponse` chunks.
///
/// Function calls arrive whole, so each `functionCall` part opens a new entry with its
/// complete arguments. A candidate `finishReason` is the terminal signal.
pub(crate) struct GeminiFolder {
    status: u16,
    next_key: usize,
}

impl EventFolder for GeminiFolder {
    fn fold(&mut self, event: SseEvent, acc: &mut StreamAccumulator) -> Result<Fold, LLMError> {
        let chunk: GeminiGenerateContentResponse =
            serde_json::from_str(&event.data).map_err(|err| {
                LLMError::decode(PROVIDER_NAME, format!("failed to parse stream chunk: {err}"))
            })?;

        if let Some(detail) = chunk.error {
            return Err(api_error_from_detail(self.status, detail, None));
        }

        if let Some(usage) = chunk.usage_metadata {
            acc.update_usage(
                usage.prompt_token_count,
                usage.candidates_token_count,
                usage.total_token_count,
            );
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return Ok(Fold::Continue);
        };
        for part in candidate.content.map(|content| content.parts).unwrap_or_default() {
            if let Some(text) = part.visible_text() {
                acc.push_text(text);
            }
            if let Some(call) = &part.function_call {
                let key = self.next_key;
                self.next_key += 1;
                acc.push_tool_fragment(
                    key,
                    Some(call.name.as_str()),
                    Some(call.name.as_str()),
                    &call.arguments(),
                );
            }
        }

        match candidate.finish_reason.as_deref() {
            Some(reason) => {
                acc.finish(resolve_finish_reason(Some(reason), acc.has_tool_calls()));
                Ok(Fold::Terminal)
            }
            None => Ok(Fold::Continue),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::types::{FinishReason, StreamChunk, ToolCall};

    fn body(raw: &'static str) -> HttpBodyStream {
        Box::pin(stream::iter(vec![Ok(raw.as_bytes().to_vec())]))
    }

    async fn drain(stream: &mut ChatStream) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        while stream.next().await {
            chunks.push(stream.current().cloned().expect("current chunk"));
        }
        chunks
    }

    #[tokio::test]
    async fn text_chunks_until_finish_reason() {
        let mut stream = create_stream(
            body(concat!(
                "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hel\"}]}}]}\r\n\r\n",
                "\r\n",
                "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}],",
                "\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":2,\"totalTokenCount\":5}}\r\n\r\n",
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ignored\"}]}}]}\r\n\r\n",
            )),
            CancellationToken::new(),
            200,
        );
        let chunks = drain(&mut stream).await;
        assert_eq!(
            chunks,
            vec![
                StreamChunk::text("Hel"),
                StreamChunk::text("lo"),
                StreamChunk::finish(FinishReason::Stop),
            ]
        );
        let response = stream.response();
        assert_eq!(response.content, "Hello");
        assert_eq!(response.usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn whole_function_calls_each_open_an_entry() {
        let mut stream = create_stream(
            body(concat!(
                "data: {\"candidates\":[{\"content\":{\"parts\":[",
                "{\"functionCall\":{\"name\":\"get_weather\",\"args\":{\"city\":\"Paris\"}}},",
                "{\"functionCall\":{\"name\":\"get_time\"}}",
                "]},\"finishReason\":\"STOP\"}]}\n\n",
            )),
            CancellationToken::new(),
            200,
        );
        let chunks = drain(&mut stream).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], StreamChunk::finish(FinishReason::ToolCalls));
        assert_eq!(
            stream.response().tool_calls,
            vec![
                ToolCall::new("get_weather", "get_weather", r#"{"city":"Paris"}"#),
                ToolCall::new("get_time", "get_time", "{}"),
            ]
        );
    }
}

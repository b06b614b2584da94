use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::types::{ChatResponse, StreamChunk};

use super::ResponseStream;
use super::accumulator::StreamAccumulator;
use super::sse::{SseEvent, StreamDecoder, StreamEvent};

/// Outcome of folding one vendor event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fold {
    Continue,
    /// The vendor signalled the end of the response.
    Terminal,
}

/// Vendor-specific half of a streaming normalizer.
///
/// Implementations parse one SSE event into vendor records and feed them into the
/// accumulator. `data: [DONE]` and transport EOF are handled by [`SseNormalizer`].
pub(crate) trait EventFolder: Send {
    fn fold(&mut self, event: SseEvent, acc: &mut StreamAccumulator) -> Result<Fold, LLMError>;
}

/// Pull-based normalizer shared by every SSE framing.
///
/// The body is held in an `Option` and dropped exactly once: on the terminal signal, EOF,
/// error, cancellation, [`ResponseStream::close`], or when the normalizer itself drops.
pub(crate) struct SseNormalizer<F> {
    decoder: Option<StreamDecoder>,
    folder: F,
    provider: &'static str,
    cancel: CancellationToken,
    accumulator: StreamAccumulator,
    current: Option<StreamChunk>,
    error: Option<LLMError>,
    exhausted: bool,
}

impl<F: EventFolder> SseNormalizer<F> {
    pub(crate) fn new(
        body: HttpBodyStream,
        provider: &'static str,
        cancel: CancellationToken,
        folder: F,
    ) -> Self {
        Self {
            decoder: Some(StreamDecoder::new(body, provider)),
            folder,
            provider,
            cancel,
            accumulator: StreamAccumulator::new(),
            current: None,
            error: None,
            exhausted: false,
        }
    }

    fn release(&mut self) {
        if self.decoder.take().is_some() {
            tracing::debug!(provider = %self.provider, "stream body released");
        }
    }

    fn complete(&mut self) {
        self.accumulator.flush_tool_calls();
        self.exhausted = true;
        self.release();
    }

    fn fail(&mut self, err: LLMError) {
        tracing::warn!(provider = %self.provider, error = %err, "stream terminated with error");
        self.accumulator.discard_ready();
        self.error = Some(err);
        self.exhausted = true;
        self.release();
    }
}

#[async_trait]
impl<F: EventFolder> ResponseStream for SseNormalizer<F> {
    async fn next(&mut self) -> bool {
        loop {
            if let Some(chunk) = self.accumulator.pop_ready() {
                self.current = Some(chunk);
                return true;
            }
            if self.exhausted {
                self.release();
                return false;
            }
            let Some(decoder) = self.decoder.as_mut() else {
                self.exhausted = true;
                return false;
            };

            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(LLMError::aborted()),
                event = decoder.next() => Ok(event),
            };

            match polled {
                Err(err) | Ok(Some(Err(err))) => self.fail(err),
                Ok(None) => {
                    tracing::debug!(provider = %self.provider, "stream reached EOF");
                    self.complete();
                }
                Ok(Some(Ok(StreamEvent::Done))) => self.complete(),
                Ok(Some(Ok(StreamEvent::Data(event)))) => {
                    match self.folder.fold(event, &mut self.accumulator) {
                        Ok(Fold::Continue) => {}
                        Ok(Fold::Terminal) => self.complete(),
                        Err(err) => self.fail(err),
                    }
                }
            }
        }
    }

    fn current(&self) -> Option<&StreamChunk> {
        self.current.as_ref()
    }

    fn err(&self) -> Option<&LLMError> {
        self.error.as_ref()
    }

    fn close(&mut self) {
        self.accumulator.discard_ready();
        self.exhausted = true;
        self.release();
    }

    fn accumulated(&self) -> &ChatResponse {
        self.accumulator.response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures_core::Stream;
    use futures_util::stream;

    use super::*;

    /// Treats every event's data as a text delta; `stop` ends the response.
    struct EchoFolder;

    impl EventFolder for EchoFolder {
        fn fold(&mut self, event: SseEvent, acc: &mut StreamAccumulator) -> Result<Fold, LLMError> {
            match event.data.as_str() {
                "stop" => Ok(Fold::Terminal),
                "bad" => Err(LLMError::decode("echo", "bad event")),
                text => {
                    acc.push_text(text);
                    Ok(Fold::Continue)
                }
            }
        }
    }

    /// Body that records when it is dropped.
    struct TrackedBody {
        inner: HttpBodyStream,
        dropped: Arc<AtomicBool>,
    }

    impl Stream for TrackedBody {
        type Item = Result<Vec<u8>, LLMError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.as_mut().poll_next(cx)
        }
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn tracked(chunks: Vec<&'static str>) -> (HttpBodyStream, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        let inner: HttpBodyStream =
            Box::pin(stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec()))));
        let body = TrackedBody {
            inner,
            dropped: dropped.clone(),
        };
        (Box::pin(body), dropped)
    }

    #[tokio::test]
    async fn terminal_signal_releases_body_before_consumer_closes() {
        let (body, dropped) = tracked(vec!["data: a\n\ndata: stop\n\ndata: never\n\n"]);
        let mut normalizer = SseNormalizer::new(body, "echo", CancellationToken::new(), EchoFolder);

        assert!(normalizer.next().await);
        assert_eq!(normalizer.current().map(|c| c.delta.as_str()), Some("a"));
        assert!(!normalizer.next().await);
        assert!(dropped.load(Ordering::SeqCst));
        assert!(normalizer.err().is_none());
        assert_eq!(normalizer.accumulated().content, "a");
    }

    #[tokio::test]
    async fn fold_error_kills_stream_and_keeps_delivered_text() {
        let (body, dropped) = tracked(vec!["data: ok\n\ndata: bad\n\ndata: later\n\n"]);
        let mut normalizer = SseNormalizer::new(body, "echo", CancellationToken::new(), EchoFolder);

        assert!(normalizer.next().await);
        assert!(!normalizer.next().await);
        assert!(matches!(normalizer.err(), Some(LLMError::Decode { .. })));
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!normalizer.next().await, "dead stream must stay dead");
        assert_eq!(normalizer.accumulated().content, "ok");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (body, dropped) = tracked(vec!["data: a\n\n"]);
        let mut normalizer = SseNormalizer::new(body, "echo", CancellationToken::new(), EchoFolder);
        normalizer.close();
        assert!(dropped.load(Ordering::SeqCst));
        normalizer.close();
        assert!(!normalizer.next().await);
        assert!(normalizer.err().is_none());
    }

    #[tokio::test]
    async fn cancellation_unblocks_pending_read() {
        let body: HttpBodyStream = Box::pin(stream::pending());
        let cancel = CancellationToken::new();
        let mut normalizer = SseNormalizer::new(body, "echo", cancel.clone(), EchoFolder);

        let canceller = tokio::spawn(async move {
            tokio::task::yield_now().await;
            cancel.cancel();
        });
        assert!(!normalizer.next().await);
        assert!(matches!(normalizer.err(), Some(LLMError::Aborted { .. })));
        canceller.await.expect("canceller task");
    }

    #[tokio::test]
    async fn transport_error_is_surfaced_once() {
        let body: HttpBodyStream = Box::pin(stream::iter(vec![
            Ok(b"data: hi\n\n".to_vec()),
            Err(LLMError::transport(
                crate::error::TransportPhase::Read,
                "connection reset",
            )),
        ]));
        let mut normalizer = SseNormalizer::new(body, "echo", CancellationToken::new(), EchoFolder);
        assert!(normalizer.next().await);
        assert!(!normalizer.next().await);
        assert!(matches!(normalizer.err(), Some(LLMError::Transport { .. })));
        assert!(!normalizer.next().await);
    }
}

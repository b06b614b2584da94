//! Pull-based streaming: the [`ResponseStream`] contract and the [`ChatStream`] facade.
//!
//! Streams never decode ahead of the consumer. Each [`ChatStream::next`] call performs at
//! most the network reads needed for the next chunk, and returns `false` once the response
//! is complete or has failed.

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::LLMError;
use crate::types::{ChatResponse, StreamChunk};

pub(crate) mod accumulator;
pub(crate) mod normalizer;
pub(crate) mod sse;

/// Pull contract implemented by every streaming normalizer.
#[async_trait]
pub trait ResponseStream: Send {
    /// Advances to the next chunk. Returns `false` at end of stream or after an error;
    /// once `false` has been returned, later calls return `false` without further I/O.
    async fn next(&mut self) -> bool;

    /// Chunk produced by the last successful [`ResponseStream::next`].
    fn current(&self) -> Option<&StreamChunk>;

    /// Error that terminated the stream, if any.
    fn err(&self) -> Option<&LLMError>;

    /// Releases the response body. Idempotent.
    fn close(&mut self);

    /// Response accumulated so far; complete once `next` has returned `false` without error.
    fn accumulated(&self) -> &ChatResponse;
}

/// Vendor-independent stream handed to callers.
///
/// # Examples
///
/// ```no_run
/// # use hibiki_llm::stream::ChatStream;
/// # async fn demo(mut stream: ChatStream) {
/// while stream.next().await {
///     if let Some(chunk) = stream.current() {
///         print!("{}", chunk.delta);
///     }
/// }
/// if let Some(err) = stream.err() {
///     eprintln!("stream failed: {err}");
/// }
/// println!("\nusage: {:?}", stream.response().usage);
/// # }
/// ```
pub struct ChatStream {
    inner: Box<dyn ResponseStream>,
}

impl ChatStream {
    pub fn new(inner: impl ResponseStream + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    pub async fn next(&mut self) -> bool {
        self.inner.next().await
    }

    pub fn current(&self) -> Option<&StreamChunk> {
        self.inner.current()
    }

    pub fn err(&self) -> Option<&LLMError> {
        self.inner.err()
    }

    pub fn close(&mut self) {
        self.inner.close();
    }

    /// Accumulated response; final once iteration has ended.
    pub fn response(&self) -> &ChatResponse {
        self.inner.accumulated()
    }

    /// Drains the stream and returns the accumulated response.
    ///
    /// # Errors
    ///
    /// Returns the error that terminated the stream.
    pub async fn collect(mut self) -> Result<ChatResponse, LLMError> {
        while self.next().await {}
        match self.err() {
            Some(err) => Err(err.clone()),
            None => Ok(self.response().clone()),
        }
    }

    /// Adapts the pull contract into a [`Stream`] of chunks. The terminating error, if any,
    /// is yielded as the last item.
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamChunk, LLMError>> + Send {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            if stream.next().await {
                let chunk = stream.current().cloned().unwrap_or_default();
                Some((Ok(chunk), Some(stream)))
            } else {
                stream.err().cloned().map(|err| (Err(err), None))
            }
        })
    }
}

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::LLMError;
use crate::http::HttpBodyStream;

/// One dispatched SSE event: the optional `event:` name and the joined `data:` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub(crate) event: Option<String>,
    pub(crate) data: String,
}

/// Standardized SSE item yielded by [`StreamDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamEvent {
    Data(SseEvent),
    /// Terminal marker reported via `data: [DONE]`.
    Done,
}

/// Splits a raw HTTP body into SSE events.
///
/// Lines may end in `\n` or `\r\n` and may be split across body chunks at any byte. An
/// event is dispatched on a blank line, or at EOF for a trailing unterminated event.
/// Blank lines with nothing pending (keep-alives) and `:` comments are ignored.
pub(crate) struct StreamDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    event_name: Option<Vec<u8>>,
    data_lines: Vec<Vec<u8>>,
    pending: VecDeque<Result<StreamEvent, LLMError>>,
    provider: &'static str,
    stream_closed: bool,
    done_received: bool,
}

impl StreamDecoder {
    pub(crate) fn new(body: HttpBodyStream, provider: &'static str) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            event_name: None,
            data_lines: Vec::new(),
            pending: VecDeque::new(),
            provider,
            stream_closed: false,
            done_received: false,
        }
    }

    fn field_value(line: &[u8], prefix_len: usize) -> Vec<u8> {
        let mut value = line[prefix_len..].to_vec();
        if value.first() == Some(&b' ') {
            value.remove(0);
        }
        value
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        if line.starts_with(b"data:") {
            let data = Self::field_value(&line, 5);
            self.data_lines.push(data);
        } else if line.starts_with(b"event:") {
            self.event_name = Some(Self::field_value(&line, 6));
        }
    }

    fn decode_utf8(&self, bytes: Vec<u8>) -> Result<String, LLMError> {
        String::from_utf8(bytes).map_err(|err| {
            LLMError::decode(self.provider, format!("invalid UTF-8 in stream chunk: {err}"))
        })
    }

    fn flush_event(&mut self) -> Result<(), LLMError> {
        let event_name = self.event_name.take();
        if self.data_lines.is_empty() {
            return Ok(());
        }

        let mut joined = Vec::new();
        for (idx, mut segment) in self.data_lines.drain(..).enumerate() {
            if idx > 0 {
                joined.push(b'\n');
            }
            joined.append(&mut segment);
        }

        if joined.is_empty() {
            return Ok(());
        }

        let data = self.decode_utf8(joined)?;
        if data.trim() == "[DONE]" {
            if !self.done_received {
                self.done_received = true;
                self.pending.push_back(Ok(StreamEvent::Done));
            }
            return Ok(());
        }

        let event = match event_name {
            Some(name) if !name.is_empty() => Some(self.decode_utf8(name)?),
            _ => None,
        };
        self.pending.push_back(Ok(StreamEvent::Data(SseEvent { event, data })));
        Ok(())
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        buffer.iter().position(|b| *b == b'\n').map(|pos| {
            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    }
}

impl Stream for StreamDecoder {
    type Item = Result<StreamEvent, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(event) = this.pending.pop_front() {
            return Poll::Ready(Some(event));
        }

        if this.done_received {
            return Poll::Ready(None);
        }

        loop {
            if this.stream_closed {
                if !this.buffer.is_empty() {
                    let mut line = this.buffer.drain(..).collect::<Vec<u8>>();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    this.handle_line(line);
                }
                if let Err(err) = this.flush_event() {
                    return Poll::Ready(Some(Err(err)));
                }
                return this
                    .pending
                    .pop_front()
                    .map_or(Poll::Ready(None), |event| Poll::Ready(Some(event)));
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(chunk_result)) => match chunk_result {
                    Ok(bytes) => {
                        this.buffer.extend_from_slice(&bytes);
                        while let Some(line) = Self::drain_line(&mut this.buffer) {
                            if line.is_empty() {
                                if let Err(err) = this.flush_event() {
                                    return Poll::Ready(Some(Err(err)));
                                }
                            } else {
                                this.handle_line(line);
                            }
                        }
                        if let Some(event) = this.pending.pop_front() {
                            return Poll::Ready(Some(event));
                        }
                    }
                    Err(err) => return Poll::Ready(Some(Err(err))),
                },
                Poll::Ready(None) => {
                    this.stream_closed = true;
                    continue;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

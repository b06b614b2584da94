#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use hibiki_llm::error::{LLMError, TransportPhase};
use hibiki_llm::http::{
    DynHttpTransport, HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};
use hibiki_llm::types::StreamChunk;
use hibiki_llm::ChatStream;
use serde_json::Value;

/// One scripted reply.
pub enum Reply {
    Full { status: u16, body: String },
    Stream { status: u16, chunks: Vec<String> },
    /// Body chunks followed by a read failure.
    BrokenStream { chunks: Vec<String> },
    /// Body chunks after which the connection stays open and silent.
    StalledStream { chunks: Vec<String> },
    Fail(LLMError),
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Reply::Full {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Reply::Full {
            status,
            body: body.to_string(),
        }
    }

    pub fn sse(chunks: &[&str]) -> Self {
        Reply::Stream {
            status: 200,
            chunks: chunks.iter().map(|chunk| chunk.to_string()).collect(),
        }
    }
}

/// Transport that replays scripted replies and records every request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn dyn_transport(self: &Arc<Self>) -> DynHttpTransport {
        Arc::clone(self) as DynHttpTransport
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests().pop().expect("a request was sent")
    }

    pub fn last_body(&self) -> Value {
        serde_json::from_slice(&self.last_request().body).expect("request body is JSON")
    }

    fn next_reply(&self, request: HttpRequest) -> Reply {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left")
    }
}

fn body_stream(chunks: Vec<String>, trailing_error: Option<LLMError>) -> HttpBodyStream {
    let mut items: Vec<Result<Vec<u8>, LLMError>> =
        chunks.into_iter().map(|chunk| Ok(chunk.into_bytes())).collect();
    if let Some(err) = trailing_error {
        items.push(Err(err));
    }
    Box::pin(stream::iter(items))
}

fn stalled_body(chunks: Vec<String>) -> HttpBodyStream {
    let items: Vec<Result<Vec<u8>, LLMError>> =
        chunks.into_iter().map(|chunk| Ok(chunk.into_bytes())).collect();
    Box::pin(stream::iter(items).chain(stream::pending()))
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        match self.next_reply(request) {
            Reply::Full { status, body } => Ok(HttpResponse {
                status,
                headers: HashMap::new(),
                body: body.into_bytes(),
            }),
            Reply::Fail(err) => Err(err),
            _ => panic!("streaming reply scripted for a non-streaming call"),
        }
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
        let (status, body) = match self.next_reply(request) {
            Reply::Stream { status, chunks } => (status, body_stream(chunks, None)),
            Reply::Full { status, body } => (status, body_stream(vec![body], None)),
            Reply::BrokenStream { chunks } => (
                200,
                body_stream(
                    chunks,
                    Some(LLMError::transport(
                        TransportPhase::Read,
                        "body: connection reset",
                    )),
                ),
            ),
            Reply::StalledStream { chunks } => (200, stalled_body(chunks)),
            Reply::Fail(err) => return Err(err),
        };
        Ok(HttpStreamResponse {
            status,
            headers: HashMap::from([(
                "content-type".to_string(),
                "text/event-stream".to_string(),
            )]),
            body,
        })
    }
}

/// Pulls every chunk out of a stream.
pub async fn drain(stream: &mut ChatStream) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    while stream.next().await {
        chunks.push(stream.current().cloned().expect("current chunk after next()"));
    }
    chunks
}

/// Splits `text` into `parts` pieces of roughly equal length on char boundaries.
pub fn split_into(text: &str, parts: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = chars.len().div_ceil(parts.max(1)).max(1);
    chars.chunks(size).map(|chunk| chunk.iter().collect()).collect()
}

/// JSON-escapes `text` for embedding inside a string literal of a scripted payload.
pub fn escape(text: &str) -> String {
    let quoted = serde_json::to_string(text).expect("string encodes");
    quoted[1..quoted.len() - 1].to_string()
}

use std::collections::VecDeque;

use crate::types::{ChatResponse, FinishReason, StreamChunk, ToolCall, ToolCallDelta};

struct PendingToolCall {
    key: usize,
    call: ToolCall,
}

/// Running state of one streamed response.
///
/// Folds vendor events into the accumulated [`ChatResponse`] and queues the chunks that
/// the consumer has not pulled yet. In-progress tool calls are kept in first-seen order
/// and only move into the response when [`StreamAccumulator::flush_tool_calls`] runs.
#[derive(Default)]
pub(crate) struct StreamAccumulator {
    response: ChatResponse,
    in_progress: Vec<PendingToolCall>,
    ready: VecDeque<StreamChunk>,
    finish_seen: bool,
}

impl StreamAccumulator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a text delta; empty deltas surface nothing.
    pub(crate) fn push_text(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.response.content.push_str(delta);
        self.ready.push_back(StreamChunk::text(delta));
    }

    /// Appends an argument fragment to the call identified by `key`, creating it on first
    /// sight. A non-empty `id`/`name` replaces the stored value; fragments are appended.
    pub(crate) fn push_tool_fragment(
        &mut self,
        key: usize,
        id: Option<&str>,
        name: Option<&str>,
        fragment: &str,
    ) {
        let position = match self.in_progress.iter().position(|entry| entry.key == key) {
            Some(position) => position,
            None => {
                self.in_progress.push(PendingToolCall {
                    key,
                    call: ToolCall::new("", "", ""),
                });
                self.in_progress.len() - 1
            }
        };
        let call = &mut self.in_progress[position].call;
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            call.id = id.to_string();
        }
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            call.name = name.to_string();
        }
        if fragment.is_empty() {
            return;
        }
        call.arguments.push_str(fragment);
        self.ready.push_back(StreamChunk::tool_call(ToolCallDelta {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments_delta: fragment.to_string(),
        }));
    }

    /// Records the finish reason and queues the terminal chunk carrying it.
    pub(crate) fn finish(&mut self, reason: FinishReason) {
        self.response.finish_reason = reason;
        self.finish_seen = true;
        self.ready.push_back(StreamChunk::finish(reason));
    }

    /// Overwrites whichever usage figures are present. A missing total is recomputed.
    pub(crate) fn update_usage(
        &mut self,
        prompt: Option<u64>,
        completion: Option<u64>,
        total: Option<u64>,
    ) {
        if prompt.is_none() && completion.is_none() && total.is_none() {
            return;
        }
        let usage = &mut self.response.usage;
        if let Some(prompt) = prompt {
            usage.prompt_tokens = prompt;
        }
        if let Some(completion) = completion {
            usage.completion_tokens = completion;
        }
        usage.total_tokens =
            total.unwrap_or(usage.prompt_tokens.saturating_add(usage.completion_tokens));
    }

    /// Moves in-progress calls into the response in first-seen order.
    ///
    /// Calls whose arguments never received a fragment are completed as `{}`. When the
    /// vendor never sent a finish reason, flushed calls report [`FinishReason::ToolCalls`].
    pub(crate) fn flush_tool_calls(&mut self) {
        for PendingToolCall { mut call, .. } in self.in_progress.drain(..) {
            if call.arguments.trim().is_empty() {
                call.arguments = "{}".to_string();
            }
            self.response.tool_calls.push(call);
        }
        if !self.finish_seen && !self.response.tool_calls.is_empty() {
            self.response.finish_reason = FinishReason::ToolCalls;
        }
    }

    pub(crate) fn has_tool_calls(&self) -> bool {
        !self.in_progress.is_empty() || !self.response.tool_calls.is_empty()
    }

    pub(crate) fn pop_ready(&mut self) -> Option<StreamChunk> {
        self.ready.pop_front()
    }

    pub(crate) fn discard_ready(&mut self) {
        self.ready.clear();
    }

    pub(crate) fn response(&self) -> &ChatResponse {
        &self.response
    }
}

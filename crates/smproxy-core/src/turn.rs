use serde_json::Value as JsonValue;

use smproxy_protocol::openai::create_chat_completions::types::CompletionUsage;
use smproxy_protocol::smithery::chat::stream::{ChatStreamEvent, StreamUsage};

/// Markers demarcating the reasoning span inside the merged output text.
/// The outgoing stream has no separate reasoning channel, so reasoning and
/// plain text share one buffer.
pub const REASONING_OPEN: &str = "<think>";
pub const REASONING_CLOSE: &str = "</think>";

/// Output instruction produced by folding one upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnStep {
    /// Buffered text grew; the flush timer should be armed if it is not.
    ScheduleFlush,
    /// Text drained from the buffer; goes out as one content chunk.
    EmitText(String),
    /// Tool-call frame; goes out immediately, never coalesced.
    EmitToolCall(ToolCallFrame),
    /// The turn is complete. Emitted exactly once.
    Finished { usage: Option<CompletionUsage> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallFrame {
    pub index: i64,
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// Per-call accumulator. The index is the first-seen position and never
/// changes, no matter which event variant introduced the call id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallAccumulator {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// Folding state machine over the decoded upstream event sequence.
///
/// Pure state transitions: the caller interprets the returned steps, so the
/// same fold drives both the streaming emitter and the aggregator.
#[derive(Debug, Default)]
pub struct TurnState {
    pending: String,
    reasoning_open: bool,
    tool_calls: Vec<ToolCallAccumulator>,
    usage: Option<StreamUsage>,
    finished: bool,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool_calls(&self) -> &[ToolCallAccumulator] {
        &self.tool_calls
    }

    pub fn apply(&mut self, event: ChatStreamEvent) -> Vec<TurnStep> {
        if self.finished {
            return Vec::new();
        }
        match event {
            ChatStreamEvent::TextDelta { delta } => {
                if self.reasoning_open {
                    self.reasoning_open = false;
                    self.pending.push_str(REASONING_CLOSE);
                }
                self.pending.push_str(&delta);
                vec![TurnStep::ScheduleFlush]
            }
            ChatStreamEvent::ReasoningDelta { delta } => {
                if !self.reasoning_open {
                    self.reasoning_open = true;
                    self.pending.push_str(REASONING_OPEN);
                }
                self.pending.push_str(&delta);
                vec![TurnStep::ScheduleFlush]
            }
            ChatStreamEvent::ToolInputStart { call_id, name } => {
                let mut steps = self.flush_pending();
                let slot = self.ensure_call(call_id);
                let entry = &mut self.tool_calls[slot];
                if entry.name.is_empty() {
                    entry.name = name.clone();
                }
                steps.push(TurnStep::EmitToolCall(ToolCallFrame {
                    index: slot as i64,
                    call_id: entry.call_id.clone(),
                    name,
                    arguments: String::new(),
                }));
                steps
            }
            ChatStreamEvent::ToolInputDelta { call_id, fragment } => {
                let mut steps = self.flush_pending();
                let slot = self.ensure_call(call_id);
                let entry = &mut self.tool_calls[slot];
                entry.arguments.push_str(&fragment);
                steps.push(TurnStep::EmitToolCall(ToolCallFrame {
                    index: slot as i64,
                    call_id: entry.call_id.clone(),
                    name: String::new(),
                    arguments: fragment,
                }));
                steps
            }
            ChatStreamEvent::ToolInputAvailable {
                call_id,
                name,
                input,
            } => {
                let mut steps = self.flush_pending();
                let slot = self.ensure_call(call_id);
                let entry = &mut self.tool_calls[slot];
                if let Some(name) = name
                    && entry.name.is_empty()
                {
                    entry.name = name;
                }
                // This variant carries the complete arguments in one shot;
                // it only applies when no delta content arrived first.
                if entry.arguments.is_empty() {
                    let arguments = serialize_input(input);
                    entry.arguments = arguments.clone();
                    steps.push(TurnStep::EmitToolCall(ToolCallFrame {
                        index: slot as i64,
                        call_id: entry.call_id.clone(),
                        name: entry.name.clone(),
                        arguments,
                    }));
                }
                steps
            }
            ChatStreamEvent::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                let mut steps = self.flush_pending();
                let slot = self.ensure_call(call_id);
                let entry = &mut self.tool_calls[slot];
                if let Some(name) = &name
                    && entry.name.is_empty()
                {
                    entry.name = name.clone();
                }
                entry.arguments.push_str(&arguments);
                steps.push(TurnStep::EmitToolCall(ToolCallFrame {
                    index: slot as i64,
                    call_id: entry.call_id.clone(),
                    name: name.unwrap_or_default(),
                    arguments,
                }));
                steps
            }
            ChatStreamEvent::Finish { usage } => {
                self.usage = Some(usage);
                Vec::new()
            }
        }
    }

    /// Terminal transition, fired on the `[DONE]` sentinel or on premature
    /// end of input. Closes an open reasoning span, drains the buffer, and
    /// finishes the turn exactly once.
    pub fn end_of_stream(&mut self) -> Vec<TurnStep> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        if self.reasoning_open {
            self.reasoning_open = false;
            self.pending.push_str(REASONING_CLOSE);
        }
        let mut steps = self.flush_pending();
        steps.push(TurnStep::Finished {
            usage: self.usage.map(map_usage),
        });
        steps
    }

    /// Drain the text buffer on a flush-timer fire. Returns `None` when
    /// there is nothing buffered.
    pub fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    fn flush_pending(&mut self) -> Vec<TurnStep> {
        match self.take_pending() {
            Some(text) => vec![TurnStep::EmitText(text)],
            None => Vec::new(),
        }
    }

    fn ensure_call(&mut self, call_id: Option<String>) -> usize {
        let call_id = call_id.unwrap_or_else(|| format!("call_{}", self.tool_calls.len()));
        if let Some(slot) = self
            .tool_calls
            .iter()
            .position(|entry| entry.call_id == call_id)
        {
            return slot;
        }
        self.tool_calls.push(ToolCallAccumulator {
            call_id,
            name: String::new(),
            arguments: String::new(),
        });
        self.tool_calls.len() - 1
    }
}

fn serialize_input(input: JsonValue) -> String {
    if input.is_null() {
        "{}".to_string()
    } else {
        input.to_string()
    }
}

fn map_usage(usage: StreamUsage) -> CompletionUsage {
    let total = if usage.total_tokens != 0 {
        usage.total_tokens
    } else {
        usage.input_tokens + usage.output_tokens
    };
    CompletionUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: total,
    }
}

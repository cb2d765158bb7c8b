use serde::Deserialize;
use serde_json::Value as JsonValue;

/// One decoded upstream frame. Anything that does not match a known event
/// shape lands in `Unknown` and is dropped by normalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpstreamFrame {
    Known(RawStreamEvent),
    Unknown(JsonValue),
}

/// Raw upstream event payloads as they appear on the wire, including the
/// legacy `tool-call`/`tool-call-delta` spellings and their field aliases.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RawStreamEvent {
    #[serde(rename = "text-delta")]
    TextDelta {
        #[serde(default)]
        delta: JsonValue,
    },
    #[serde(rename = "reasoning-delta")]
    ReasoningDelta {
        #[serde(default)]
        delta: JsonValue,
    },
    #[serde(rename = "tool-input-start")]
    ToolInputStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: Option<String>,
        #[serde(rename = "toolName")]
        tool_name: Option<String>,
    },
    #[serde(rename = "tool-input-delta")]
    ToolInputDelta {
        #[serde(rename = "toolCallId")]
        tool_call_id: Option<String>,
        #[serde(rename = "inputTextDelta", default)]
        input_text_delta: JsonValue,
    },
    #[serde(rename = "tool-input-available")]
    ToolInputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: Option<String>,
        #[serde(rename = "toolName")]
        tool_name: Option<String>,
        #[serde(default)]
        input: JsonValue,
    },
    #[serde(rename = "tool-call", alias = "tool_call")]
    ToolCall(RawLegacyToolCall),
    #[serde(rename = "tool-call-delta", alias = "tool_call_delta")]
    ToolCallDelta(RawLegacyToolCall),
    #[serde(rename = "finish")]
    Finish {
        #[serde(rename = "messageMetadata", default)]
        message_metadata: FinishMetadata,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLegacyToolCall {
    pub id: Option<String>,
    #[serde(rename = "callId")]
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub tool: Option<String>,
    pub function: Option<String>,
    pub arguments: Option<JsonValue>,
    pub arguments_delta: Option<JsonValue>,
    #[serde(rename = "argumentsDelta")]
    pub arguments_delta_camel: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinishMetadata {
    #[serde(default)]
    pub usage: StreamUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUsage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

/// Canonical upstream events after alias normalization. The legacy
/// whole-arguments and delta-arguments variants collapse into `ToolCall`;
/// both append to the same accumulator downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatStreamEvent {
    TextDelta {
        delta: String,
    },
    ReasoningDelta {
        delta: String,
    },
    ToolInputStart {
        call_id: Option<String>,
        name: String,
    },
    ToolInputDelta {
        call_id: Option<String>,
        fragment: String,
    },
    ToolInputAvailable {
        call_id: Option<String>,
        name: Option<String>,
        input: JsonValue,
    },
    ToolCall {
        call_id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    Finish {
        usage: StreamUsage,
    },
}

impl UpstreamFrame {
    pub fn normalize(self) -> Option<ChatStreamEvent> {
        match self {
            UpstreamFrame::Known(event) => Some(event.normalize()),
            UpstreamFrame::Unknown(_) => None,
        }
    }
}

impl RawStreamEvent {
    pub fn normalize(self) -> ChatStreamEvent {
        match self {
            RawStreamEvent::TextDelta { delta } => ChatStreamEvent::TextDelta {
                delta: coerce_text(delta),
            },
            RawStreamEvent::ReasoningDelta { delta } => ChatStreamEvent::ReasoningDelta {
                delta: coerce_text(delta),
            },
            RawStreamEvent::ToolInputStart {
                tool_call_id,
                tool_name,
            } => ChatStreamEvent::ToolInputStart {
                call_id: tool_call_id,
                name: tool_name.unwrap_or_default(),
            },
            RawStreamEvent::ToolInputDelta {
                tool_call_id,
                input_text_delta,
            } => ChatStreamEvent::ToolInputDelta {
                call_id: tool_call_id,
                fragment: coerce_text(input_text_delta),
            },
            RawStreamEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => ChatStreamEvent::ToolInputAvailable {
                call_id: tool_call_id,
                name: tool_name,
                input,
            },
            RawStreamEvent::ToolCall(raw) | RawStreamEvent::ToolCallDelta(raw) => {
                raw.normalize()
            }
            RawStreamEvent::Finish { message_metadata } => ChatStreamEvent::Finish {
                usage: message_metadata.usage,
            },
        }
    }
}

impl RawLegacyToolCall {
    fn normalize(self) -> ChatStreamEvent {
        let call_id = self.id.or(self.call_id);
        let name = self.name.or(self.tool).or(self.function);
        let arguments = self
            .arguments_delta
            .or(self.arguments_delta_camel)
            .or(self.arguments)
            .map(coerce_text)
            .unwrap_or_default();
        ChatStreamEvent::ToolCall {
            call_id,
            name,
            arguments,
        }
    }
}

/// Text-bearing fields are strings on a well-behaved wire, but the decoder
/// is defensive: non-string values are re-serialized rather than dropped.
fn coerce_text(value: JsonValue) -> String {
    match value {
        JsonValue::String(text) => text,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

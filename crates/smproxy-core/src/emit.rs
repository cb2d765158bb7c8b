use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use smproxy_protocol::openai::create_chat_completions::stream::{
    ChatCompletionChunkObjectType, ChatCompletionStreamChoice, CreateChatCompletionStreamResponse,
};
use smproxy_protocol::openai::create_chat_completions::types::{
    ChatCompletionFinishReason, ChatCompletionStreamDelta, ChatCompletionToolCallChunk,
    ChatCompletionToolCallFunction, CompletionUsage, ToolCallType,
};
use smproxy_protocol::sse::{DONE_SENTINEL, encode_frame};

use crate::turn::ToolCallFrame;

/// Identity shared by every chunk of one turn: id, creation timestamp and
/// the echoed model name, all fixed at turn start.
#[derive(Debug, Clone)]
pub struct TurnMeta {
    pub chunk_id: String,
    pub created: i64,
    pub model: String,
}

impl TurnMeta {
    pub fn new(model: impl Into<String>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            chunk_id: format!("chatcmpl-{}", &id[..8]),
            created: OffsetDateTime::now_utc().unix_timestamp(),
            model: model.into(),
        }
    }
}

pub fn text_chunk(meta: &TurnMeta, text: &str) -> CreateChatCompletionStreamResponse {
    chunk(
        meta,
        ChatCompletionStreamDelta {
            content: Some(text.to_string()),
            ..ChatCompletionStreamDelta::default()
        },
        None,
        None,
    )
}

pub fn tool_call_chunk(meta: &TurnMeta, frame: &ToolCallFrame) -> CreateChatCompletionStreamResponse {
    let tool_call = ChatCompletionToolCallChunk {
        index: frame.index,
        id: if frame.call_id.is_empty() {
            None
        } else {
            Some(frame.call_id.clone())
        },
        kind: ToolCallType::Function,
        function: ChatCompletionToolCallFunction {
            name: frame.name.clone(),
            arguments: frame.arguments.clone(),
        },
    };
    chunk(
        meta,
        ChatCompletionStreamDelta {
            tool_calls: Some(vec![tool_call]),
            ..ChatCompletionStreamDelta::default()
        },
        None,
        None,
    )
}

/// The single terminal chunk: empty delta, stop reason, usage when known.
pub fn stop_chunk(
    meta: &TurnMeta,
    usage: Option<CompletionUsage>,
) -> CreateChatCompletionStreamResponse {
    chunk(
        meta,
        ChatCompletionStreamDelta::default(),
        Some(ChatCompletionFinishReason::Stop),
        usage,
    )
}

fn chunk(
    meta: &TurnMeta,
    delta: ChatCompletionStreamDelta,
    finish_reason: Option<ChatCompletionFinishReason>,
    usage: Option<CompletionUsage>,
) -> CreateChatCompletionStreamResponse {
    CreateChatCompletionStreamResponse {
        id: meta.chunk_id.clone(),
        object: ChatCompletionChunkObjectType::ChatCompletionChunk,
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![ChatCompletionStreamChoice {
            index: 0,
            delta,
            finish_reason,
        }],
        usage,
    }
}

pub fn chunk_frame(chunk: &CreateChatCompletionStreamResponse) -> String {
    encode_frame(&serde_json::to_string(chunk).unwrap_or_default())
}

pub fn done_frame() -> String {
    encode_frame(DONE_SENTINEL)
}

/// One-time padding comment forcing buffering intermediaries to flush the
/// response head promptly.
pub fn padding_frame() -> String {
    format!(":{}\n\n", " ".repeat(2048))
}

pub fn ping_frame() -> String {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    format!(": ping {now}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TurnMeta {
        TurnMeta {
            chunk_id: "chatcmpl-test0000".to_string(),
            created: 1_700_000_000,
            model: "claude-sonnet-4.5".to_string(),
        }
    }

    #[test]
    fn text_chunk_wire_shape() {
        let value = serde_json::to_value(text_chunk(&meta(), "hi")).unwrap();
        assert_eq!(value["object"], "chat.completion.chunk");
        assert_eq!(value["choices"][0]["delta"]["content"], "hi");
        assert_eq!(value["choices"][0]["finish_reason"], serde_json::Value::Null);
        assert!(value.get("usage").is_none());
    }

    #[test]
    fn stop_chunk_has_empty_delta_and_usage() {
        let usage = CompletionUsage {
            prompt_tokens: 5,
            completion_tokens: 3,
            total_tokens: 8,
        };
        let value = serde_json::to_value(stop_chunk(&meta(), Some(usage))).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(
            value["choices"][0]["delta"],
            serde_json::json!({})
        );
        assert_eq!(value["usage"]["total_tokens"], 8);
    }

    #[test]
    fn tool_call_chunk_wire_shape() {
        let frame = ToolCallFrame {
            index: 1,
            call_id: "c9".to_string(),
            name: "lookup".to_string(),
            arguments: "{\"q\":".to_string(),
        };
        let value = serde_json::to_value(tool_call_chunk(&meta(), &frame)).unwrap();
        let tc = &value["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(tc["index"], 1);
        assert_eq!(tc["id"], "c9");
        assert_eq!(tc["type"], "function");
        assert_eq!(tc["function"]["name"], "lookup");
        assert_eq!(tc["function"]["arguments"], "{\"q\":");
    }

    #[test]
    fn turn_meta_id_prefix() {
        let meta = TurnMeta::new("m");
        assert!(meta.chunk_id.starts_with("chatcmpl-"));
        assert_eq!(meta.chunk_id.len(), "chatcmpl-".len() + 8);
    }

    #[test]
    fn framing() {
        assert_eq!(done_frame(), "data: [DONE]\n\n");
        assert!(padding_frame().starts_with(':'));
        assert!(padding_frame().ends_with("\n\n"));
        assert!(ping_frame().starts_with(": ping "));
    }
}

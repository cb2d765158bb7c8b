use smproxy_protocol::openai::create_chat_completions::response::{
    ChatCompletionChoice, ChatCompletionObjectType, CreateChatCompletionResponse,
};
use smproxy_protocol::openai::create_chat_completions::types::{
    ChatCompletionFinishReason, ChatCompletionMessageToolCall, ChatCompletionResponseMessage,
    ChatCompletionRole, ChatCompletionToolCallFunction, ToolCallType,
};

use crate::decode::{DecodedItem, decode_buffered};
use crate::emit::TurnMeta;
use crate::turn::{TurnState, TurnStep};

/// Fold a fully-buffered upstream body into one chat-completion response.
///
/// Runs the same turn fold as the streaming path, so the content carries
/// reasoning markers exactly as a streamed turn would have produced them,
/// and tool calls come out in first-seen order.
pub fn aggregate_turn(body: &str, meta: &TurnMeta) -> CreateChatCompletionResponse {
    let mut state = TurnState::new();
    let mut content = String::new();
    let mut usage = None;

    // A body that never carried the sentinel still ends the turn normally.
    let mut consume = |steps: Vec<TurnStep>| {
        for step in steps {
            match step {
                TurnStep::EmitText(text) => content.push_str(&text),
                TurnStep::Finished { usage: turn_usage } => usage = turn_usage,
                TurnStep::ScheduleFlush | TurnStep::EmitToolCall(_) => {}
            }
        }
    };
    for item in decode_buffered(body) {
        let steps = match item {
            DecodedItem::Event(event) => state.apply(event),
            DecodedItem::Done => state.end_of_stream(),
        };
        consume(steps);
    }
    let steps = state.end_of_stream();
    consume(steps);

    let tool_calls: Vec<ChatCompletionMessageToolCall> = state
        .tool_calls()
        .iter()
        .map(|acc| ChatCompletionMessageToolCall {
            id: acc.call_id.clone(),
            kind: ToolCallType::Function,
            function: ChatCompletionToolCallFunction {
                name: acc.name.clone(),
                arguments: acc.arguments.clone(),
            },
        })
        .collect();

    CreateChatCompletionResponse {
        id: meta.chunk_id.clone(),
        object: ChatCompletionObjectType::ChatCompletion,
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatCompletionResponseMessage {
                role: ChatCompletionRole::Assistant,
                content,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
            },
            finish_reason: ChatCompletionFinishReason::Stop,
        }],
        usage: usage.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smproxy_protocol::openai::create_chat_completions::types::CompletionUsage;

    fn meta() -> TurnMeta {
        TurnMeta {
            chunk_id: "chatcmpl-agg00000".to_string(),
            created: 1_700_000_000,
            model: "claude-sonnet-4.5".to_string(),
        }
    }

    #[test]
    fn reasoning_markers_and_usage() {
        let body = concat!(
            "data: {\"type\":\"text-delta\",\"delta\":\"A\"}\n\n",
            "data: {\"type\":\"reasoning-delta\",\"delta\":\"B\"}\n\n",
            "data: {\"type\":\"text-delta\",\"delta\":\"C\"}\n\n",
            "data: {\"type\":\"finish\",\"messageMetadata\":{\"usage\":{\"inputTokens\":5,\"outputTokens\":3,\"totalTokens\":8}}}\n\n",
            "data: [DONE]\n\n",
        );
        let response = aggregate_turn(body, &meta());
        let message = &response.choices[0].message;
        assert_eq!(message.content, "A<think>B</think>C");
        assert_eq!(
            response.usage,
            CompletionUsage {
                prompt_tokens: 5,
                completion_tokens: 3,
                total_tokens: 8,
            }
        );
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn malformed_frame_does_not_interrupt_aggregation() {
        let body = concat!(
            "data: {\"type\":\"text-delta\",\"delta\":\"before\"}\n\n",
            "data: {broken json\n\n",
            "data: {\"type\":\"text-delta\",\"delta\":\" after\"}\n\n",
            "data: [DONE]\n\n",
        );
        let response = aggregate_turn(body, &meta());
        assert_eq!(response.choices[0].message.content, "before after");
    }

    #[test]
    fn tool_calls_in_first_seen_order() {
        let body = concat!(
            "data: {\"type\":\"tool-input-start\",\"toolCallId\":\"b\",\"toolName\":\"second\"}\n\n",
            "data: {\"type\":\"tool_call\",\"callId\":\"a\",\"tool\":\"first\",\"arguments\":\"{}\"}\n\n",
            "data: {\"type\":\"tool-input-delta\",\"toolCallId\":\"b\",\"inputTextDelta\":\"{\\\"q\\\":1}\"}\n\n",
            "data: [DONE]\n\n",
        );
        let response = aggregate_turn(body, &meta());
        let calls = response.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "b");
        assert_eq!(calls[0].function.name, "second");
        assert_eq!(calls[0].function.arguments, "{\"q\":1}");
        assert_eq!(calls[1].id, "a");
        assert_eq!(calls[1].function.name, "first");
    }

    #[test]
    fn body_without_sentinel_still_aggregates() {
        let body = "data: {\"type\":\"text-delta\",\"delta\":\"partial\"}\n\n";
        let response = aggregate_turn(body, &meta());
        assert_eq!(response.choices[0].message.content, "partial");
        assert_eq!(response.usage, CompletionUsage::default());
    }
}

use serde_json::Value as JsonValue;
use serde_json::json;
use uuid::Uuid;

use smproxy_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest;
use smproxy_protocol::openai::create_chat_completions::types::{
    ChatCompletionContent, ChatCompletionContentPart, ChatCompletionFunctionTool,
    ChatCompletionKnownPart, ChatCompletionRequestMessage, ChatCompletionRequestTool,
    ChatCompletionRequestToolCall, ChatCompletionTextMessage,
};
use smproxy_protocol::smithery::chat::request::{
    ChatMessage, ChatRequest, MessagePart, MessageRole, ToolDefinition, ToolDefinitionType,
    ToolUseState, UpstreamTool,
};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4.5";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Model-name suffixes that imply a reasoning effort level.
pub const REASONING_SUFFIXES: &[(&str, &str)] = &[
    ("-minimal", "minimal"),
    ("-low", "low"),
    ("-medium", "medium"),
    ("-high", "high"),
];

#[derive(Debug, Clone)]
pub struct MappedRequest {
    pub upstream: ChatRequest,
    /// The requested model string, echoed verbatim in every response.
    pub model: String,
}

pub fn to_upstream(request: &CreateChatCompletionRequest) -> MappedRequest {
    let requested = request
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let (base_model, inferred_effort) = split_reasoning_suffix(&requested);

    let (system_prompt, messages) = extract_system_and_messages(&request.messages);
    let tools = map_tools(request.tools.as_deref().unwrap_or(&[]));

    let reasoning_effort = request
        .reasoning_effort
        .clone()
        .or_else(|| inferred_effort.map(str::to_string));

    MappedRequest {
        upstream: ChatRequest {
            messages,
            tools,
            model: base_model.to_string(),
            system_prompt,
            reasoning_effort,
            tool_choice: request.tool_choice.clone(),
        },
        model: requested,
    }
}

/// `gpt-5-high` → (`gpt-5`, `high`). A bare suffix is a model name, not a
/// suffix.
pub fn split_reasoning_suffix(model: &str) -> (&str, Option<&'static str>) {
    for &(suffix, level) in REASONING_SUFFIXES {
        if let Some(base) = model.strip_suffix(suffix)
            && !base.is_empty()
        {
            return (base, Some(level));
        }
    }
    (model, None)
}

struct PendingCall {
    id: String,
    name: String,
    input: JsonValue,
    output: String,
}

fn extract_system_and_messages(
    messages: &[ChatCompletionRequestMessage],
) -> (String, Vec<ChatMessage>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut out: Vec<ChatMessage> = Vec::new();

    let mut i = 0;
    while i < messages.len() {
        match &messages[i] {
            ChatCompletionRequestMessage::Developer(message)
            | ChatCompletionRequestMessage::System(message) => {
                collect_system_text(message, &mut system_parts);
                i += 1;
            }
            ChatCompletionRequestMessage::Assistant(message)
                if message
                    .tool_calls
                    .as_ref()
                    .is_some_and(|calls| !calls.is_empty()) =>
            {
                let calls = message.tool_calls.as_deref().unwrap_or(&[]);
                let mut pending = build_pending_calls(calls, i);

                // Consume the run of tool results that answers these calls.
                let mut j = i + 1;
                while let Some(ChatCompletionRequestMessage::Tool(tool)) = messages.get(j) {
                    if let Some(call_id) = &tool.tool_call_id
                        && let Some(entry) = pending.iter_mut().find(|p| &p.id == call_id)
                    {
                        entry.output.push_str(&content_result_text(&tool.content));
                    }
                    j += 1;
                }

                let mut parts = vec![MessagePart::StepStart];
                for call in pending {
                    let (state, output_text) = if call.output.is_empty() {
                        (ToolUseState::InputAvailable, None)
                    } else {
                        (ToolUseState::OutputAvailable, Some(call.output))
                    };
                    parts.push(MessagePart::ToolUse {
                        name: call.name,
                        tool_call_id: call.id,
                        state,
                        input: call.input,
                        output_text,
                    });
                }
                out.push(ChatMessage {
                    id: message_id(),
                    role: MessageRole::Assistant,
                    parts,
                });
                i = j;
            }
            ChatCompletionRequestMessage::Assistant(message) => {
                out.push(ChatMessage {
                    id: message_id(),
                    role: MessageRole::Assistant,
                    parts: content_parts(&message.content),
                });
                i += 1;
            }
            ChatCompletionRequestMessage::User(message) => {
                out.push(ChatMessage {
                    id: message_id(),
                    role: MessageRole::User,
                    parts: content_parts(&message.content),
                });
                i += 1;
            }
            ChatCompletionRequestMessage::Tool(message) => {
                let mut parts = content_parts(&message.content);
                parts.push(MessagePart::ToolResult {
                    tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                    tool_name: message.name.clone(),
                    result: content_result_text(&message.content),
                });
                out.push(ChatMessage {
                    id: message_id(),
                    role: MessageRole::Tool,
                    parts,
                });
                i += 1;
            }
        }
    }

    let system_prompt = if system_parts.is_empty() {
        DEFAULT_SYSTEM_PROMPT.to_string()
    } else {
        system_parts.join("\n\n")
    };
    (system_prompt, out)
}

fn build_pending_calls(calls: &[ChatCompletionRequestToolCall], position: usize) -> Vec<PendingCall> {
    let mut pending = Vec::new();
    for (idx, call) in calls.iter().enumerate() {
        if call.kind.as_deref() != Some("function") {
            continue;
        }
        let function = call.function.as_ref();
        let name = function
            .and_then(|f| f.name.clone())
            .unwrap_or_default();
        let input = function
            .and_then(|f| f.arguments.clone())
            .map(parse_arguments)
            .unwrap_or_else(|| json!({}));
        let id = call
            .id
            .clone()
            .unwrap_or_else(|| format!("call_{position}_{idx}"));
        pending.push(PendingCall {
            id,
            name,
            input,
            output: String::new(),
        });
    }
    pending
}

/// Tool-call arguments arrive either as a JSON-encoded string or as an
/// inline object; both land on an object, defaulting to `{}` on bad input.
fn parse_arguments(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(text) => serde_json::from_str(&text).unwrap_or_else(|_| json!({})),
        JsonValue::Null => json!({}),
        other => other,
    }
}

fn collect_system_text(message: &ChatCompletionTextMessage, into: &mut Vec<String>) {
    let text = content_result_text(&message.content);
    if !text.is_empty() {
        into.push(text);
    }
}

fn content_parts(content: &Option<ChatCompletionContent>) -> Vec<MessagePart> {
    match content {
        Some(ChatCompletionContent::Text(text)) => vec![MessagePart::Text { text: text.clone() }],
        Some(ChatCompletionContent::Parts(parts)) => {
            parts.iter().filter_map(map_content_part).collect()
        }
        None => Vec::new(),
    }
}

fn content_result_text(content: &Option<ChatCompletionContent>) -> String {
    match content {
        Some(ChatCompletionContent::Text(text)) => text.clone(),
        Some(ChatCompletionContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                ChatCompletionContentPart::Known(
                    ChatCompletionKnownPart::Text { text }
                    | ChatCompletionKnownPart::InputText { text },
                ) => Some(text.as_str()),
                _ => None,
            })
            .collect(),
        None => String::new(),
    }
}

fn map_content_part(part: &ChatCompletionContentPart) -> Option<MessagePart> {
    let part = match part {
        ChatCompletionContentPart::Known(known) => known,
        ChatCompletionContentPart::Unknown(_) => return None,
    };
    match part {
        ChatCompletionKnownPart::Text { text } | ChatCompletionKnownPart::InputText { text } => {
            Some(MessagePart::Text { text: text.clone() })
        }
        ChatCompletionKnownPart::ImageUrl { image_url } => {
            Some(file_part(image_url.url(), "", ""))
        }
        ChatCompletionKnownPart::InputAudio { input_audio } => {
            if input_audio.data.is_empty() {
                return None;
            }
            let format = input_audio
                .format
                .as_deref()
                .unwrap_or("mp3")
                .to_ascii_lowercase();
            let media_type = if format.contains('/') {
                format.clone()
            } else {
                format!("audio/{format}")
            };
            let filename = format!(
                "audio.{}",
                ext_for_media_type(&media_type).unwrap_or(format.as_str())
            );
            let url = format!("data:{media_type};base64,{}", input_audio.data);
            Some(file_part(&url, &media_type, &filename))
        }
        ChatCompletionKnownPart::File { file } => {
            let data = file.file_data.as_deref()?;
            let url = format!("data:application/octet-stream;base64,{data}");
            Some(file_part(
                &url,
                "application/octet-stream",
                file.filename.as_deref().unwrap_or(""),
            ))
        }
    }
}

fn file_part(url: &str, media_type_hint: &str, name_hint: &str) -> MessagePart {
    let mut media_type = media_type_hint.to_string();
    let mut filename = name_hint.to_string();

    if let Some(rest) = url.strip_prefix("data:") {
        if media_type.is_empty() {
            let declared = rest.split(';').next().unwrap_or("");
            media_type = if declared.is_empty() {
                "application/octet-stream".to_string()
            } else {
                declared.to_string()
            };
        }
        if filename.is_empty() {
            filename = format!("file.{}", ext_for_media_type(&media_type).unwrap_or("bin"));
        }
    } else if filename.is_empty() {
        filename = infer_name_from_url(url, &media_type);
    }

    MessagePart::File {
        url: url.to_string(),
        media_type: if media_type.is_empty() {
            None
        } else {
            Some(media_type)
        },
        filename: if filename.is_empty() {
            None
        } else {
            Some(filename)
        },
    }
}

fn infer_name_from_url(url: &str, media_type: &str) -> String {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = after_scheme
        .split_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or("");
    let path = path.split(['?', '#']).next().unwrap_or("");
    if let Some(base) = path.rsplit('/').find(|segment| !segment.is_empty()) {
        return base.to_string();
    }
    match ext_for_media_type(media_type) {
        Some(ext) => format!("file.{ext}"),
        None => "file.bin".to_string(),
    }
}

fn ext_for_media_type(media_type: &str) -> Option<&'static str> {
    let ext = match media_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        "text/markdown" => "md",
        "application/json" => "json",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" | "video/webm" => "webm",
        "audio/ogg" => "ogg",
        "video/mp4" => "mp4",
        "video/ogg" => "ogv",
        "application/zip" | "application/x-zip-compressed" => "zip",
        _ => return None,
    };
    Some(ext)
}

fn map_tools(tools: &[ChatCompletionRequestTool]) -> Vec<UpstreamTool> {
    tools
        .iter()
        .map(|tool| match tool {
            ChatCompletionRequestTool::Function(ChatCompletionFunctionTool::Function {
                function,
            }) => {
                let schema = function.parameters.clone().unwrap_or_else(|| json!({}));
                UpstreamTool::Function(ToolDefinition {
                    kind: ToolDefinitionType::Function,
                    name: function.name.clone(),
                    description: function.description.clone().unwrap_or_default(),
                    input_schema: schema.clone(),
                    parameters: schema,
                })
            }
            ChatCompletionRequestTool::Other(raw) => UpstreamTool::Raw(raw.clone()),
        })
        .collect()
}

fn message_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(value: serde_json::Value) -> CreateChatCompletionRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn system_messages_join_into_system_prompt() {
        let mapped = to_upstream(&request(json!({
            "model": "claude-sonnet-4.5",
            "messages": [
                {"role": "system", "content": "one"},
                {"role": "user", "content": "hi"},
                {"role": "system", "content": "two"},
            ],
        })));
        assert_eq!(mapped.upstream.system_prompt, "one\n\ntwo");
        assert_eq!(mapped.upstream.messages.len(), 1);
        assert_eq!(mapped.upstream.messages[0].role, MessageRole::User);
    }

    #[test]
    fn missing_system_prompt_gets_default() {
        let mapped = to_upstream(&request(json!({
            "messages": [{"role": "user", "content": "hi"}],
        })));
        assert_eq!(mapped.upstream.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(mapped.model, DEFAULT_MODEL);
    }

    #[test]
    fn reasoning_suffix_strips_into_effort() {
        let mapped = to_upstream(&request(json!({
            "model": "gpt-5-high",
            "messages": [],
        })));
        assert_eq!(mapped.upstream.model, "gpt-5");
        assert_eq!(mapped.upstream.reasoning_effort.as_deref(), Some("high"));
        // The echoed model keeps the suffix.
        assert_eq!(mapped.model, "gpt-5-high");
    }

    #[test]
    fn explicit_reasoning_effort_wins_over_suffix() {
        let mapped = to_upstream(&request(json!({
            "model": "gpt-5-low",
            "reasoning_effort": "high",
            "messages": [],
        })));
        assert_eq!(mapped.upstream.reasoning_effort.as_deref(), Some("high"));
    }

    #[test]
    fn bare_suffix_is_a_model_name() {
        assert_eq!(split_reasoning_suffix("-low"), ("-low", None));
        assert_eq!(split_reasoning_suffix("claude"), ("claude", None));
    }

    #[test]
    fn tool_calls_merge_with_following_results() {
        let mapped = to_upstream(&request(json!({
            "model": "m",
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"id": "c1", "type": "function",
                     "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}},
                ]},
                {"role": "tool", "tool_call_id": "c1", "content": "result text"},
                {"role": "user", "content": "next"},
            ],
        })));
        assert_eq!(mapped.upstream.messages.len(), 2);

        let assistant = &mapped.upstream.messages[0];
        assert_eq!(assistant.role, MessageRole::Assistant);
        let value = serde_json::to_value(&assistant.parts).unwrap();
        assert_eq!(value[0]["type"], "step-start");
        assert_eq!(value[1]["type"], "tool-lookup");
        assert_eq!(value[1]["state"], "output-available");
        assert_eq!(value[1]["input"]["q"], "x");
        assert_eq!(value[1]["output"]["content"][0]["text"], "result text");

        assert_eq!(mapped.upstream.messages[1].role, MessageRole::User);
    }

    #[test]
    fn unanswered_tool_call_stays_input_available() {
        let mapped = to_upstream(&request(json!({
            "model": "m",
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"type": "function", "function": {"name": "probe", "arguments": {"a": 1}}},
                ]},
            ],
        })));
        let value = serde_json::to_value(&mapped.upstream.messages[0].parts).unwrap();
        assert_eq!(value[1]["state"], "input-available");
        assert_eq!(value[1]["input"]["a"], 1);
        // Synthesized id for a call that did not carry one.
        assert_eq!(value[1]["toolCallId"], "call_0_0");
    }

    #[test]
    fn standalone_tool_message_becomes_tool_result() {
        let mapped = to_upstream(&request(json!({
            "model": "m",
            "messages": [
                {"role": "tool", "tool_call_id": "c9", "name": "calc", "content": "42"},
            ],
        })));
        let value = serde_json::to_value(&mapped.upstream.messages[0].parts).unwrap();
        let result = value
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["type"] == "tool_result")
            .unwrap();
        assert_eq!(result["toolCallId"], "c9");
        assert_eq!(result["toolName"], "calc");
        assert_eq!(result["result"], "42");
    }

    #[test]
    fn function_tools_map_and_unknown_tools_pass_through() {
        let mapped = to_upstream(&request(json!({
            "model": "m",
            "messages": [],
            "tools": [
                {"type": "function", "function": {
                    "name": "sum", "description": "adds", "parameters": {"type": "object"}}},
                {"type": "web_search", "config": {"depth": 2}},
            ],
        })));
        let value = serde_json::to_value(&mapped.upstream.tools).unwrap();
        assert_eq!(value[0]["name"], "sum");
        assert_eq!(value[0]["inputSchema"]["type"], "object");
        assert_eq!(value[0]["parameters"]["type"], "object");
        assert_eq!(value[1]["type"], "web_search");
        assert_eq!(value[1]["config"]["depth"], 2);
    }

    #[test]
    fn image_data_url_gets_media_type_and_filename() {
        let mapped = to_upstream(&request(json!({
            "model": "m",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "look"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
            ]}],
        })));
        let value = serde_json::to_value(&mapped.upstream.messages[0].parts).unwrap();
        assert_eq!(value[1]["type"], "file");
        assert_eq!(value[1]["mediaType"], "image/png");
        assert_eq!(value[1]["filename"], "file.png");
    }

    #[test]
    fn remote_image_url_keeps_basename() {
        let mapped = to_upstream(&request(json!({
            "model": "m",
            "messages": [{"role": "user", "content": [
                {"type": "image_url", "image_url": "https://example.com/pics/cat.webp?s=1"},
            ]}],
        })));
        let value = serde_json::to_value(&mapped.upstream.messages[0].parts).unwrap();
        assert_eq!(value[0]["filename"], "cat.webp");
        assert!(value[0].get("mediaType").is_none());
    }

    #[test]
    fn unknown_content_parts_are_skipped() {
        let mapped = to_upstream(&request(json!({
            "model": "m",
            "messages": [{"role": "user", "content": [
                {"type": "mystery", "payload": 1},
                {"type": "text", "text": "kept"},
            ]}],
        })));
        let value = serde_json::to_value(&mapped.upstream.messages[0].parts).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["text"], "kept");
    }
}

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;
use serde_json::json;

/// Request body for `POST /api/chat` on the playground backend.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<UpstreamTool>,
    pub model: String,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<JsonValue>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MessageRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "tool")]
    Tool,
}

/// Function tools map onto the typed definition; anything else is forwarded
/// exactly as the client sent it.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum UpstreamTool {
    Function(ToolDefinition),
    Raw(JsonValue),
}

/// Tool definitions are forwarded with both `inputSchema` and `parameters`
/// carrying the same schema object; the backend accepts either spelling.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: ToolDefinitionType,
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
    pub parameters: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ToolDefinitionType {
    #[serde(rename = "function")]
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolUseState {
    InputAvailable,
    OutputAvailable,
}

/// Message content parts.
///
/// Tool-use parts are tagged `tool-<name>` on the wire, so the tag value is
/// data-dependent and the enum serializes by hand instead of through a
/// `#[serde(tag)]` derive.
#[derive(Debug, Clone)]
pub enum MessagePart {
    Text {
        text: String,
    },
    File {
        url: String,
        media_type: Option<String>,
        filename: Option<String>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: Option<String>,
        result: String,
    },
    StepStart,
    ToolUse {
        name: String,
        tool_call_id: String,
        state: ToolUseState,
        input: JsonValue,
        output_text: Option<String>,
    },
}

impl Serialize for MessagePart {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            MessagePart::Text { text } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", text)?;
                map.end()
            }
            MessagePart::File {
                url,
                media_type,
                filename,
            } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "file")?;
                map.serialize_entry("url", url)?;
                if let Some(media_type) = media_type {
                    map.serialize_entry("mediaType", media_type)?;
                }
                if let Some(filename) = filename {
                    map.serialize_entry("filename", filename)?;
                }
                map.end()
            }
            MessagePart::ToolResult {
                tool_call_id,
                tool_name,
                result,
            } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "tool_result")?;
                map.serialize_entry("toolCallId", tool_call_id)?;
                if let Some(tool_name) = tool_name {
                    map.serialize_entry("toolName", tool_name)?;
                }
                map.serialize_entry("result", result)?;
                map.end()
            }
            MessagePart::StepStart => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", "step-start")?;
                map.end()
            }
            MessagePart::ToolUse {
                name,
                tool_call_id,
                state,
                input,
                output_text,
            } => {
                let tag = if name.is_empty() {
                    "tool-call".to_string()
                } else {
                    format!("tool-{name}")
                };
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", &tag)?;
                map.serialize_entry("toolCallId", tool_call_id)?;
                match state {
                    ToolUseState::InputAvailable => {
                        map.serialize_entry("state", "input-available")?;
                        map.serialize_entry("input", input)?;
                    }
                    ToolUseState::OutputAvailable => {
                        map.serialize_entry("state", "output-available")?;
                        map.serialize_entry("input", input)?;
                        let output = json!({
                            "content": [{
                                "type": "text",
                                "text": output_text.as_deref().unwrap_or(""),
                            }],
                        });
                        map.serialize_entry("output", &output)?;
                    }
                }
                map.end()
            }
        }
    }
}

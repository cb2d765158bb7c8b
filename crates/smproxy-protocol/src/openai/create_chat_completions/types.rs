use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatCompletionRole {
    #[serde(rename = "assistant")]
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatCompletionFinishReason {
    #[serde(rename = "stop")]
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolCallType {
    #[serde(rename = "function")]
    Function,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CompletionUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

// ---- Request side ----

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatCompletionRequestMessage {
    Developer(ChatCompletionTextMessage),
    System(ChatCompletionTextMessage),
    User(ChatCompletionUserMessage),
    Assistant(ChatCompletionAssistantMessage),
    Tool(ChatCompletionToolMessage),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionTextMessage {
    #[serde(default)]
    pub content: Option<ChatCompletionContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionUserMessage {
    #[serde(default)]
    pub content: Option<ChatCompletionContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionAssistantMessage {
    #[serde(default)]
    pub content: Option<ChatCompletionContent>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatCompletionRequestToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionToolMessage {
    #[serde(default)]
    pub content: Option<ChatCompletionContent>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    /// Some clients echo the tool name alongside the result.
    #[serde(default, alias = "tool_name")]
    pub name: Option<String>,
}

/// Message content: a bare string or an array of typed parts. Parts this
/// proxy cannot place are preserved as raw JSON and skipped by the mapper
/// rather than failing the whole request.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatCompletionContent {
    Text(String),
    Parts(Vec<ChatCompletionContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatCompletionContentPart {
    Known(ChatCompletionKnownPart),
    Unknown(JsonValue),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatCompletionKnownPart {
    Text {
        #[serde(default)]
        text: String,
    },
    InputText {
        #[serde(default, alias = "input_text")]
        text: String,
    },
    ImageUrl {
        image_url: ChatCompletionImageUrl,
    },
    InputAudio {
        input_audio: ChatCompletionInputAudio,
    },
    File {
        file: ChatCompletionInputFile,
    },
}

/// `image_url` arrives either as `{url}` or as a bare URL string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatCompletionImageUrl {
    Object {
        url: String,
    },
    Url(String),
}

impl ChatCompletionImageUrl {
    pub fn url(&self) -> &str {
        match self {
            ChatCompletionImageUrl::Object { url } => url,
            ChatCompletionImageUrl::Url(url) => url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionInputAudio {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionInputFile {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequestToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<ChatCompletionRequestToolCallFunction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequestToolCallFunction {
    #[serde(default)]
    pub name: Option<String>,
    /// JSON-encoded string or an inline object; both are accepted.
    #[serde(default)]
    pub arguments: Option<JsonValue>,
}

/// Tool definitions: function tools are mapped, anything else is forwarded
/// untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatCompletionRequestTool {
    Function(ChatCompletionFunctionTool),
    Other(JsonValue),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatCompletionFunctionTool {
    Function { function: ChatCompletionFunctionDef },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionFunctionDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<JsonValue>,
}

// ---- Response side ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatCompletionResponseMessage {
    pub role: ChatCompletionRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatCompletionMessageToolCall>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatCompletionMessageToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ToolCallType,
    pub function: ChatCompletionToolCallFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatCompletionToolCallFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatCompletionStreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatCompletionToolCallChunk>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatCompletionToolCallChunk {
    pub index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ToolCallType,
    pub function: ChatCompletionToolCallFunction,
}

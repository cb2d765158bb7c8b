use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::openai::create_chat_completions::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestTool,
};

/// Incoming chat-completion request. Only the fields this proxy forwards are
/// modeled; everything else is accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CreateChatCompletionRequest {
    #[serde(default)]
    pub messages: Vec<ChatCompletionRequestMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<ChatCompletionRequestTool>>,
    #[serde(default)]
    pub tool_choice: Option<JsonValue>,
}

impl CreateChatCompletionRequest {
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

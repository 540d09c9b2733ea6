#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: &str) -> ChatMessage {
        return ChatMessage {
            role,
            content: content.to_string(),
        };
    }

    pub fn system(content: &str) -> ChatMessage {
        return ChatMessage::new(Role::System, content);
    }

    pub fn user(content: &str) -> ChatMessage {
        return ChatMessage::new(Role::User, content);
    }
}

/// A single request to a generation endpoint. `stream` decides which response
/// shape the backend should expect: one complete message, or a sequence of
/// newline delimited fragments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: &str, messages: Vec<ChatMessage>) -> ChatRequest {
        return ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            max_tokens: None,
        };
    }

    pub fn streaming(mut self, stream: bool) -> ChatRequest {
        self.stream = stream;
        return self;
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> ChatRequest {
        self.max_tokens = max_tokens;
        return self;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponseMessage {
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatResponseMessage,
    #[serde(default)]
    pub done: bool,
}

//! Wire payloads for the flat chat-completions dialect and the shared
//! transcription response.
//!
//! Request extras differ per provider (sampling parameters, stream
//! flags) and are flattened into the body verbatim from the catalog.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod gemini;

#[derive(Serialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatResponseChoice>,
}

#[derive(Deserialize)]
pub struct ChatResponseChoice {
    pub message: ChatResponseMessage,
}

#[derive(Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// First choice's content; an absent or null field reads as empty
    /// rather than failing the parse.
    pub fn message_text(&self) -> String {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
pub struct TranscriptionResponse {
    #[serde(default)]
    pub text: Option<String>,
}

use serde::{Deserialize, Serialize};

/// A single text message in provider wire order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Ask the provider for a JSON-object response (OpenAI-compatible
    /// `response_format`). Used for Q&A answers and quiz generation.
    pub json_object: bool,
}

impl LlmRequest {
    pub fn simple(model: String, system: Option<String>, user_text: String) -> Self {
        Self {
            model,
            system,
            messages: vec![LlmMessage::user(user_text)],
            max_tokens: 1024,
            temperature: None,
            json_object: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub model: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

/// One decoded streaming delta. The final chunk carries an empty delta.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub delta: String,
    pub is_final: bool,
}

/// Transcription result for one audio payload.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Transcription {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

pub mod groq;
pub mod types;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_core::Stream;
use tokio_stream::iter as stream_iter;

pub use groq::{GroqProvider, ProviderErrorKind, GROQ_API_BASE};
pub use types::*;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse>;
    async fn stream(
        &self,
        _request: LlmRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>> {
        anyhow::bail!("streaming not supported by this provider")
    }
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// Speech-to-text service. `model` selects the transcription model so the
/// caller can fall back from a fast model to a more accurate one.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, mime: &str, model: &str) -> Result<Transcription>;
}

// ============================================================
// Provider Registry
// ============================================================

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(id.into(), provider);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn LlmProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("provider not found: {id}"))
    }

    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Echo provider for tests and offline runs.
pub struct StubProvider;

#[async_trait]
impl LlmProvider for StubProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let user_text = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LlmResponse {
            text: format!("[stub:{}] {}", request.model, user_text),
            model: request.model,
            input_tokens: None,
            output_tokens: None,
        })
    }

    async fn stream(
        &self,
        request: LlmRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>> {
        let user_text = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let full_text = format!("[stub:stream:{}] {}", request.model, user_text);

        let mut chunks: Vec<Result<StreamChunk>> = full_text
            .split_whitespace()
            .map(|word| {
                Ok(StreamChunk {
                    delta: format!("{word} "),
                    is_final: false,
                })
            })
            .collect();
        chunks.push(Ok(StreamChunk {
            delta: String::new(),
            is_final: true,
        }));

        Ok(Box::pin(stream_iter(chunks)))
    }
}

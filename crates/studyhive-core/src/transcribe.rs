//! Voice transcription flow.
//!
//! Rejects bad input before any network call: only webm/ogg/wav audio, at
//! most 10 MB decoded. Transcription tries the fast Whisper distillation
//! first and falls back to the full model.

use std::sync::Arc;

use base64::Engine;
use studyhive_schema::{TranscribeRequest, TranscribeResponse};
use studyhive_provider::TranscriptionProvider;

use crate::events::EventSink;

pub const ALLOWED_AUDIO_MIMES: [&str; 3] = ["audio/webm", "audio/ogg", "audio/wav"];
pub const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

pub const PRIMARY_STT_MODEL: &str = "distil-whisper-large-v3";
pub const FALLBACK_STT_MODEL: &str = "whisper-large-v3";

#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("Unsupported media type")]
    UnsupportedMime,
    #[error("Bad base64")]
    InvalidBase64,
    #[error("File too large")]
    TooLarge,
    #[error("{0}")]
    Failed(String),
}

pub struct Transcriber {
    provider: Arc<dyn TranscriptionProvider>,
    events: Arc<dyn EventSink>,
}

impl Transcriber {
    pub fn new(provider: Arc<dyn TranscriptionProvider>, events: Arc<dyn EventSink>) -> Self {
        Self { provider, events }
    }

    pub async fn transcribe(
        &self,
        request: &TranscribeRequest,
    ) -> Result<TranscribeResponse, TranscribeError> {
        // Recorders report MIME with codec parameters; the whitelist matches
        // on the bare type.
        let mime = request
            .audio_mime
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        if !ALLOWED_AUDIO_MIMES.contains(&mime.as_str()) {
            return Err(TranscribeError::UnsupportedMime);
        }

        let audio = base64::engine::general_purpose::STANDARD
            .decode(request.base64.as_bytes())
            .map_err(|_| TranscribeError::InvalidBase64)?;
        if audio.len() > MAX_AUDIO_BYTES {
            return Err(TranscribeError::TooLarge);
        }

        let bytes = audio.len();
        let mut model = PRIMARY_STT_MODEL;
        let result = match self.provider.transcribe(audio.clone(), &mime, model).await {
            Ok(r) => r,
            Err(primary_err) => {
                tracing::warn!("primary transcription model failed: {primary_err}");
                model = FALLBACK_STT_MODEL;
                self.provider
                    .transcribe(audio, &mime, model)
                    .await
                    .map_err(|e| TranscribeError::Failed(e.to_string()))?
            }
        };

        self.events.record(
            "stt",
            serde_json::json!({ "model": model, "bytes": bytes }),
        );

        Ok(TranscribeResponse {
            text: result.text,
            language: result.language,
        })
    }
}

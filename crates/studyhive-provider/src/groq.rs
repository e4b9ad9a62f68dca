use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_core::Stream;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::StreamExt;

use crate::{LlmProvider, LlmRequest, LlmResponse, StreamChunk, Transcription, TranscriptionProvider};

pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Groq's OpenAI-compatible API: chat completions (plain and streaming)
/// plus Whisper audio transcription.
#[derive(Debug, Clone)]
pub struct GroqProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderErrorKind {
    RateLimit,
    ServerError,
    Timeout,
    AuthError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::RateLimit,
            401 | 403 => Self::AuthError,
            400 | 422 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::ServerError | Self::Timeout)
    }
}

impl GroqProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base(api_key, GROQ_API_BASE)
    }

    pub fn with_base(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn to_api_request(request: LlmRequest) -> ApiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system {
            messages.push(ApiMessage {
                role: "system".into(),
                content: system,
            });
        }
        messages.extend(request.messages.into_iter().map(|m| ApiMessage {
            role: m.role,
            content: m.content,
        }));

        ApiRequest {
            model: request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request
                .json_object
                .then(|| ApiResponseFormat { format_type: "json_object".into() }),
            stream: false,
        }
    }

    async fn post_completions(&self, payload: &ApiRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);
        let resp = match self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(anyhow!(
                    "groq api error (timeout) [retryable]: request timed out after 60s"
                ));
            }
            Err(e) if e.is_connect() => {
                return Err(anyhow!("groq api error (connect) [retryable]: {e}"));
            }
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await?;
            let parsed = serde_json::from_str::<ApiError>(&text).ok();
            return Err(format_api_error(status, parsed));
        }
        Ok(resp)
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let payload = Self::to_api_request(request);
        let resp = self.post_completions(&payload).await?;
        let body: ApiResponse = resp.json().await?;

        let text = body
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.clone())
            .unwrap_or_default();

        Ok(LlmResponse {
            text,
            model: body.model.unwrap_or(payload.model),
            input_tokens: body.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens: body.usage.as_ref().map(|u| u.completion_tokens),
        })
    }

    async fn stream(
        &self,
        request: LlmRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>> {
        let mut payload = Self::to_api_request(request);
        payload.stream = true;
        let resp = self.post_completions(&payload).await?;
        let sse_stream = parse_sse_stream(resp.bytes_stream());
        Ok(Box::pin(sse_stream))
    }
}

#[async_trait]
impl TranscriptionProvider for GroqProvider {
    async fn transcribe(&self, audio: Vec<u8>, mime: &str, model: &str) -> Result<Transcription> {
        let url = format!("{}/audio/transcriptions", self.api_base);
        let file_name = format!("audio.{}", ext_from_mime(mime));
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", model.to_string())
            .text("response_format", "verbose_json");

        let resp = match self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(anyhow!(
                    "groq api error (timeout) [retryable]: request timed out after 60s"
                ));
            }
            Err(e) if e.is_connect() => {
                return Err(anyhow!("groq api error (connect) [retryable]: {e}"));
            }
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await?;
            let parsed = serde_json::from_str::<ApiError>(&text).ok();
            return Err(format_api_error(status, parsed));
        }

        Ok(resp.json::<Transcription>().await?)
    }
}

fn ext_from_mime(mime: &str) -> &'static str {
    if mime.contains("webm") {
        "webm"
    } else if mime.contains("ogg") {
        "ogg"
    } else if mime.contains("wav") {
        "wav"
    } else {
        "dat"
    }
}

fn parse_sse_stream(
    byte_stream: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<StreamChunk>> + Send {
    async_stream::stream! {
        tokio::pin!(byte_stream);
        let mut buffer = String::new();

        while let Some(chunk_result) = byte_stream.next().await {
            match chunk_result {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));

                    while let Some(pos) = buffer.find("\n\n") {
                        let event_text = buffer[..pos].to_string();
                        buffer = buffer[pos + 2..].to_string();

                        for line in event_text.lines() {
                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };

                            if data == "[DONE]" {
                                yield Ok(StreamChunk { delta: String::new(), is_final: true });
                                return;
                            }

                            match serde_json::from_str::<serde_json::Value>(data) {
                                Ok(event) => {
                                    if let Some(chunk) = parse_sse_event(&event) {
                                        yield Ok(chunk);
                                    }
                                }
                                Err(e) => {
                                    yield Err(anyhow!("invalid sse event payload: {e}"));
                                    return;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    yield Err(anyhow!("stream error: {e}"));
                    return;
                }
            }
        }
    }
}

fn parse_sse_event(event: &serde_json::Value) -> Option<StreamChunk> {
    let choice = event.get("choices")?.get(0)?;
    if let Some(text) = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
    {
        if !text.is_empty() {
            return Some(StreamChunk {
                delta: text.to_string(),
                is_final: false,
            });
        }
    }
    if choice
        .get("finish_reason")
        .map(|r| !r.is_null())
        .unwrap_or(false)
    {
        return Some(StreamChunk {
            delta: String::new(),
            is_final: true,
        });
    }
    None
}

fn format_api_error(status: StatusCode, parsed: Option<ApiError>) -> anyhow::Error {
    let kind = ProviderErrorKind::from_status(status);
    let retryable = if kind.is_retryable() { " [retryable]" } else { "" };
    if let Some(api_error) = parsed {
        let detail = api_error.error;
        anyhow!(
            "groq api error ({status}){retryable}: {} ({})",
            detail.message,
            detail.error_type.unwrap_or_else(|| "unknown".into())
        )
    } else {
        anyhow!("groq api error ({status}){retryable}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ApiResponseFormat>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiResponse {
    pub choices: Vec<ApiChoice>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiChoice {
    #[serde(default)]
    pub message: Option<ApiMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    pub message: String,
}

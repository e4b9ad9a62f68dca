use std::convert::Infallible;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::post, Json, Router};
use bytes::Bytes;
use futures_core::Stream;
use studyhive_core::{build_rolling_context, TranscribeError};
use studyhive_provider::{LlmMessage, StreamChunk};
use studyhive_schema::{ChatRequest, ChatStreamChunk, TranscribeRequest};
use tokio_stream::StreamExt;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(chat))
        .route("/transcribe", post(transcribe))
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return (StatusCode::BAD_REQUEST, "Invalid body").into_response();
    };

    let history: Vec<LlmMessage> = request
        .messages
        .iter()
        .map(|m| LlmMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect();
    let prepared = build_rolling_context(&history);

    state.events.record(
        "chat_stream",
        serde_json::json!({ "sessionId": request.session_id }),
    );

    match state
        .router
        .stream(&state.chat_policy, None, prepared, 1024, Some(0.3))
        .await
    {
        Ok(stream) => ndjson_response(Body::from_stream(ndjson_lines(stream))),
        // Every fallback failed: still a 200 with a terminal error line, so
        // the client's stream loop ends cleanly.
        Err(_) => ndjson_response(Body::from(encode_line(&ChatStreamChunk::failed(
            "Model error",
        )))),
    }
}

fn ndjson_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response()
}

fn encode_line(chunk: &ChatStreamChunk) -> Bytes {
    let mut line = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string());
    line.push('\n');
    Bytes::from(line)
}

/// Re-encode provider deltas as newline-delimited JSON, always terminated by
/// a `done` line even when the provider stream errors mid-way.
fn ndjson_lines(
    stream: impl Stream<Item = anyhow::Result<StreamChunk>> + Send + 'static,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    async_stream::stream! {
        tokio::pin!(stream);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) if chunk.is_final => {
                    yield Ok(encode_line(&ChatStreamChunk::done()));
                    return;
                }
                Ok(chunk) => {
                    if !chunk.delta.is_empty() {
                        yield Ok(encode_line(&ChatStreamChunk::delta(chunk.delta)));
                    }
                }
                Err(e) => {
                    yield Ok(encode_line(&ChatStreamChunk::failed(e.to_string())));
                    return;
                }
            }
        }
        yield Ok(encode_line(&ChatStreamChunk::done()));
    }
}

async fn transcribe(
    State(state): State<AppState>,
    body: Result<Json<TranscribeRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
    };

    match state.transcriber.transcribe(&request).await {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))).into_response(),
        Err(err) => {
            let status = match &err {
                TranscribeError::UnsupportedMime => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                TranscribeError::InvalidBase64 => StatusCode::BAD_REQUEST,
                TranscribeError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                TranscribeError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, err.to_string()).into_response()
        }
    }
}

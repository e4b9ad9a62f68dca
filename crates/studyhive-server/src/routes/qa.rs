use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::post, Json, Router};
use studyhive_core::qa::ask_question;
use studyhive_schema::AskQuestionRequest;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(ask))
}

async fn ask(
    State(state): State<AppState>,
    body: Result<Json<AskQuestionRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(request)) = body else {
        return error_response("invalid request body");
    };

    match ask_question(&state.router, &state.qa_policy, &request).await {
        Ok(response) => {
            state.events.record(
                "answer_generated",
                serde_json::json!({
                    "latencyMs": response.metadata.latency_ms,
                    "model": response.metadata.model,
                    "qLen": request.question.chars().count(),
                }),
            );
            (StatusCode::OK, Json(serde_json::json!(response)))
        }
        Err(err) => error_response(&err.to_string()),
    }
}

fn error_response(details: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": "Invalid request or model error",
            "details": details,
        })),
    )
}

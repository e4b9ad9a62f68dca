use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::post, Json, Router};
use studyhive_core::quiz::generate_quiz;
use studyhive_core::QuizError;
use studyhive_schema::{QuizGenerateRequest, QuizGradeRequest};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate))
        .route("/grade", post(grade))
}

async fn generate(
    State(state): State<AppState>,
    body: Result<Json<QuizGenerateRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON body").into_response();
    };
    if let Err(err) = request.validate() {
        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
    }

    match generate_quiz(&state.router, &state.quiz_policy, &request).await {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))).into_response(),
        Err(err) => {
            // Validation and model failures both kill the attempt; a broken
            // quiz is never served.
            let message = match err.downcast_ref::<QuizError>() {
                Some(quiz_err) => quiz_err.to_string(),
                None => err.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
    }
}

/// Grading needs the authoritative quiz object, which only the client holds
/// (nothing is persisted server-side). The endpoint acknowledges the
/// submission for logging but does not fabricate a score.
async fn grade(
    State(state): State<AppState>,
    body: Result<Json<QuizGradeRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
    };

    state.events.record(
        "quiz_graded",
        serde_json::json!({
            "quizId": request.quiz_id,
            "answered": request.answers.len(),
            "total": studyhive_schema::QUIZ_QUESTION_COUNT,
        }),
    );

    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({
            "error": "grading happens client-side",
            "details": "no server-side quiz store exists; grade against the locally held quiz",
        })),
    )
        .into_response()
}

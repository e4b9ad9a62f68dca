pub mod chat;
pub mod qa;
pub mod quiz;

use axum::Router;

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/qa", qa::router())
        .nest("/quiz", quiz::router())
        .nest("/chat", chat::router())
}

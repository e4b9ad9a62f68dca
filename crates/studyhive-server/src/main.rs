use std::sync::Arc;

use anyhow::{Context, Result};
use studyhive_core::{models, LlmRouter, ModelPolicy, TracingEventSink, Transcriber};
use studyhive_provider::{GroqProvider, ProviderRegistry};
use studyhive_server::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let api_key = std::env::var("GROQ_API_KEY").context("GROQ_API_KEY is missing")?;
    let default_model =
        std::env::var("GROQ_MODEL_DEFAULT").unwrap_or_else(|_| models::DEFAULT_MODEL.to_string());
    let quiz_model = std::env::var("GROQ_MODEL_QUIZ").unwrap_or_else(|_| default_model.clone());
    let addr = std::env::var("STUDYHIVE_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let groq = Arc::new(GroqProvider::new(api_key));
    let mut registry = ProviderRegistry::new();
    registry.register("groq", groq.clone());

    let mut model_ids: Vec<&str> = vec![&default_model, &quiz_model, models::CHAT_PRIMARY];
    model_ids.extend(models::CHAT_FALLBACKS);
    let router = Arc::new(LlmRouter::single_provider(registry, "groq", &model_ids));

    let events = Arc::new(TracingEventSink);
    let state = AppState {
        router,
        transcriber: Arc::new(Transcriber::new(groq, events.clone())),
        events,
        qa_policy: ModelPolicy::single(&default_model),
        quiz_policy: ModelPolicy::single(&quiz_model),
        chat_policy: models::chat_policy(),
    };

    studyhive_server::serve(state, &addr).await
}

use std::sync::Arc;

use studyhive_core::{EventSink, LlmRouter, ModelPolicy, Transcriber};

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<LlmRouter>,
    pub transcriber: Arc<Transcriber>,
    pub events: Arc<dyn EventSink>,
    pub qa_policy: ModelPolicy,
    pub quiz_policy: ModelPolicy,
    pub chat_policy: ModelPolicy,
}

pub mod chat;
pub mod context;
pub mod events;
pub mod history;
pub mod prompts;
pub mod qa;
pub mod quiz;
pub mod resources;
pub mod router;
pub mod session;
pub mod transcribe;

pub use chat::{ChatSession, NdjsonDecoder};
pub use context::{build_rolling_context, SYSTEM_BRAINSTORM_PROMPT};
pub use events::{EventSink, NullEventSink, RecordingEventSink, TracingEventSink};
pub use history::{
    archive_chat_session, load_chat_history, load_qa_history, load_quiz_history, push_qa_history,
    push_quiz_history, upsert_chat_session, FileHistoryStore, HistoryStore, MemoryHistoryStore,
};
pub use prompts::{build_qa_prompt, build_quiz_prompt, SYSTEM_TUTOR_STYLE};
pub use qa::{ask_question, to_ask_question_response, ANSWER_FALLBACK_TEXT};
pub use quiz::{
    generate_quiz, grade, to_quiz, validate_quiz, validate_quiz_business_rules, QuizError,
};
pub use resources::sanitize_resources;
pub use router::{LlmRouter, ModelPolicy};
pub use session::{QuizSession, SessionPhase, QUESTION_TIME_LIMIT_SECS};
pub use transcribe::{
    TranscribeError, Transcriber, ALLOWED_AUDIO_MIMES, FALLBACK_STT_MODEL, MAX_AUDIO_BYTES,
    PRIMARY_STT_MODEL,
};

/// Default model line-up, matching the deployment this app ships with.
pub mod models {
    use super::ModelPolicy;

    pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
    pub const CHAT_PRIMARY: &str = "llama-3.1-70b-versatile";
    pub const CHAT_FALLBACKS: [&str; 2] = ["mixtral-8x7b-instruct", "llama-3.1-8b-instant"];

    pub fn chat_policy() -> ModelPolicy {
        ModelPolicy {
            primary: CHAT_PRIMARY.to_string(),
            fallbacks: CHAT_FALLBACKS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

//! Wire and domain types shared by every studyhive crate.
//!
//! Field names serialize in camelCase to match the JSON contracts of the
//! web client. Request types carry their own validation, collecting every
//! violation instead of stopping at the first one.

use serde::{Deserialize, Serialize};

// ============================================================
// Chat
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Excludes the system prompt; the server injects it.
    pub messages: Vec<ChatMessage>,
    pub session_id: String,
}

/// One newline-delimited JSON line of the chat response stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatStreamChunk {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatStreamChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: None,
            error: None,
        }
    }

    pub fn done() -> Self {
        Self {
            content: String::new(),
            done: Some(true),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            done: Some(true),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeRequest {
    pub audio_mime: String,
    /// Raw audio bytes in base64, no `data:` prefix.
    pub base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscribeResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Archived chat session, kept in the bounded local history list.
/// Never contains system-role messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionHistoryEntry {
    pub id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// ============================================================
// Q&A
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ReadingLevel {
    #[default]
    #[serde(rename = "grade6-8")]
    Grade6To8,
    #[serde(rename = "grade9-10")]
    Grade9To10,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResource {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub text: String,
    pub key_terms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
    pub reading_level: ReadingLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<AnswerResource>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskQuestionRequest {
    pub question: String,
    pub level: Level,
    pub locale: Locale,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AskQuestionResponse {
    pub answer: Answer,
    pub metadata: ResponseMetadata,
}

/// One ask, successful or not. Failed asks keep `response: None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaHistoryEntry {
    pub id: String,
    pub timestamp: i64,
    pub request: AskQuestionRequest,
    #[serde(default)]
    pub response: Option<AskQuestionResponse>,
}

// ============================================================
// Quiz
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Hi,
    Gu,
}

impl Locale {
    /// Human language name used in prompts.
    pub fn language_name(self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::Hi => "Hindi",
            Locale::Gu => "Gujarati",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OptionId {
    A,
    B,
    C,
    D,
}

impl OptionId {
    pub const ALL: [OptionId; 4] = [OptionId::A, OptionId::B, OptionId::C, OptionId::D];

    pub fn as_str(self) -> &'static str {
        match self {
            OptionId::A => "A",
            OptionId::B => "B",
            OptionId::C => "C",
            OptionId::D => "D",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(OptionId::A),
            "B" => Some(OptionId::B),
            "C" => Some(OptionId::C),
            "D" => Some(OptionId::D),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizOption {
    pub id: OptionId,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub stem: String,
    pub options: Vec<QuizOption>,
    pub correct_option_id: OptionId,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub topic: String,
    pub level: Level,
    pub locale: Locale,
    /// Epoch milliseconds, always synthesized locally.
    pub created_at: i64,
    pub questions: Vec<QuizQuestion>,
}

/// Number of questions every valid quiz carries.
pub const QUIZ_QUESTION_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizGenerateRequest {
    pub topic: String,
    pub level: Level,
    pub locale: Locale,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizGenerateResponse {
    pub quiz: Quiz,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub selected_option_id: OptionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizGradeRequest {
    pub quiz_id: String,
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeBreakdownEntry {
    pub question_id: String,
    pub correct: bool,
    pub correct_option_id: OptionId,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizGradeResponse {
    pub score: u32,
    pub breakdown: Vec<GradeBreakdownEntry>,
}

/// Outcome of locking in one question, by answer or by timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: String,
    pub correct: bool,
    pub correct_option_id: OptionId,
    #[serde(default)]
    pub selected_option_id: Option<OptionId>,
    pub timed_out: bool,
}

// ============================================================
// Request validation
// ============================================================

/// A rejected request, listing every violation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .issues.join("; "))]
pub struct RequestError {
    pub issues: Vec<String>,
}

fn check(issues: &mut Vec<String>, ok: bool, message: &str) {
    if !ok {
        issues.push(message.to_string());
    }
}

fn finish(issues: Vec<String>) -> Result<(), RequestError> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(RequestError { issues })
    }
}

impl AskQuestionRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        let mut issues = Vec::new();
        let len = self.question.chars().count();
        check(&mut issues, len >= 4, "question too short");
        check(&mut issues, len <= 500, "question too long");
        finish(issues)
    }
}

impl QuizGenerateRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        let mut issues = Vec::new();
        let len = self.topic.chars().count();
        check(&mut issues, len >= 3, "topic too short");
        check(&mut issues, len <= 120, "topic too long");
        if let Some(seed) = &self.seed {
            check(&mut issues, seed.chars().count() <= 60, "seed too long");
        }
        finish(issues)
    }
}

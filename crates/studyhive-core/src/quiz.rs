//! Quiz normalization, validation and grading.
//!
//! Model output has no structural guarantee, so candidates are parsed into
//! untyped JSON first and only become a typed [`Quiz`] after an explicit
//! validation pass that either fully accepts or reports every violation.
//! A quiz cannot safely degrade to placeholders the way a Q&A answer can:
//! downstream grading assumes a complete, valid 5-question object, so any
//! violation fails the whole generation attempt.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde_json::Value;
use studyhive_schema::{
    GradeBreakdownEntry, Level, Locale, OptionId, Quiz, QuizGenerateRequest, QuizGenerateResponse,
    QuizGradeResponse, QuizOption, QuizQuestion, ResponseMetadata, SubmittedAnswer,
    QUIZ_QUESTION_COUNT,
};

use crate::prompts::build_quiz_prompt;
use crate::router::{LlmRouter, ModelPolicy};

/// A quiz generation attempt rejected by validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QuizError {
    #[error("Model output failed validation: {}", .issues.join("; "))]
    Invalid { issues: Vec<String> },
    /// Business rule: no two questions may share a stem. Carries the
    /// offending stem truncated to 40 characters.
    #[error("duplicate question stem: {stem}")]
    DuplicateStem { stem: String },
}

/// Normalize raw model text into a validated quiz.
///
/// `id` and `created_at` are always synthesized locally, never trusted from
/// the model. Tolerates the model wrapping its answer in a `quiz` property
/// or not.
pub fn to_quiz(raw: &str, metadata: ResponseMetadata) -> Result<QuizGenerateResponse, QuizError> {
    let parsed: Value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}));
    let candidate = match parsed.get("quiz") {
        Some(inner) if inner.is_object() => inner,
        _ => &parsed,
    };

    let topic = candidate["topic"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string());
    let level = if candidate["level"].as_str() == Some("intermediate") {
        Level::Intermediate
    } else {
        Level::Beginner
    };
    let locale = match candidate["locale"].as_str() {
        Some("hi") => Locale::Hi,
        Some("gu") => Locale::Gu,
        _ => Locale::En,
    };
    let questions_value = candidate
        .get("questions")
        .filter(|q| q.is_array())
        .cloned()
        .unwrap_or_else(|| serde_json::json!([]));

    let mut issues = Vec::new();
    check_topic(&mut issues, &topic);
    let questions = collect_questions(&mut issues, &questions_value);
    if !issues.is_empty() {
        return Err(QuizError::Invalid { issues });
    }

    let quiz = Quiz {
        id: uuid::Uuid::new_v4().to_string(),
        topic,
        level,
        locale,
        created_at: chrono::Utc::now().timestamp_millis(),
        questions,
    };
    validate_quiz_business_rules(&quiz)?;

    Ok(QuizGenerateResponse { quiz, metadata })
}

/// Full generation flow: validate the request, prompt the model in JSON
/// mode, normalize and validate the output. No partial quiz ever escapes —
/// a structurally broken quiz fails the whole attempt.
pub async fn generate_quiz(
    router: &LlmRouter,
    policy: &ModelPolicy,
    request: &QuizGenerateRequest,
) -> Result<QuizGenerateResponse> {
    request.validate()?;
    let prompt = build_quiz_prompt(request);
    let started = std::time::Instant::now();
    let resp = router
        .chat(
            policy,
            Some(prompt),
            vec![studyhive_provider::LlmMessage::user("Return quiz JSON now.")],
            1200,
            Some(0.4),
            true,
        )
        .await?;
    let metadata = ResponseMetadata {
        model: Some(resp.model.clone()),
        latency_ms: Some(started.elapsed().as_millis() as u64),
        tokens: resp.output_tokens,
    };
    Ok(to_quiz(&resp.text, metadata)?)
}

/// Structural + business validation of an already-typed quiz.
pub fn validate_quiz(quiz: &Quiz) -> Result<(), QuizError> {
    let mut issues = Vec::new();
    check_topic(&mut issues, &quiz.topic);
    if quiz.created_at <= 0 {
        issues.push("createdAt must be a positive integer".to_string());
    }
    let questions_value = serde_json::to_value(&quiz.questions).unwrap_or(Value::Null);
    collect_questions(&mut issues, &questions_value);
    if !issues.is_empty() {
        return Err(QuizError::Invalid { issues });
    }
    validate_quiz_business_rules(quiz)
}

/// All stems must be pairwise distinct (exact string equality).
pub fn validate_quiz_business_rules(quiz: &Quiz) -> Result<(), QuizError> {
    let mut stems = HashSet::new();
    for q in &quiz.questions {
        if !stems.insert(q.stem.as_str()) {
            return Err(QuizError::DuplicateStem {
                stem: q.stem.chars().take(40).collect(),
            });
        }
    }
    Ok(())
}

fn check_topic(issues: &mut Vec<String>, topic: &str) {
    let len = topic.chars().count();
    if !(3..=120).contains(&len) {
        issues.push("topic must be 3-120 characters".to_string());
    }
}

/// Validate the untyped questions array, returning typed questions only when
/// no issue was found. Every violation lands in `issues`.
fn collect_questions(issues: &mut Vec<String>, value: &Value) -> Vec<QuizQuestion> {
    let Some(items) = value.as_array() else {
        issues.push("questions must be an array".to_string());
        return Vec::new();
    };
    if items.len() != QUIZ_QUESTION_COUNT {
        issues.push(format!(
            "quiz must contain exactly {QUIZ_QUESTION_COUNT} questions"
        ));
    }

    let mut questions = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if let Some(q) = collect_question(issues, i + 1, item) {
            questions.push(q);
        }
    }

    if issues.is_empty() {
        questions
    } else {
        Vec::new()
    }
}

fn collect_question(issues: &mut Vec<String>, n: usize, value: &Value) -> Option<QuizQuestion> {
    let before = issues.len();
    let Some(obj) = value.as_object() else {
        issues.push(format!("question {n}: not an object"));
        return None;
    };

    let id = obj.get("id").and_then(|v| v.as_str()).unwrap_or("");
    if id.is_empty() || id.chars().count() > 40 {
        issues.push(format!("question {n}: id must be 1-40 characters"));
    }

    let stem = obj.get("stem").and_then(|v| v.as_str()).unwrap_or("");
    if !(4..=180).contains(&stem.chars().count()) {
        issues.push(format!("question {n}: stem must be 4-180 characters"));
    }

    let mut options = Vec::new();
    match obj.get("options").and_then(|v| v.as_array()) {
        Some(raw_options) if raw_options.len() == 4 => {
            for raw in raw_options {
                let opt_id = raw
                    .get("id")
                    .and_then(|v| v.as_str())
                    .and_then(OptionId::parse);
                let text = raw.get("text").and_then(|v| v.as_str()).unwrap_or("");
                match opt_id {
                    Some(opt_id) if (1..=120).contains(&text.chars().count()) => {
                        options.push(QuizOption {
                            id: opt_id,
                            text: text.to_string(),
                        });
                    }
                    Some(_) => issues
                        .push(format!("question {n}: option text must be 1-120 characters")),
                    None => issues.push(format!("question {n}: option ids must be A-D")),
                }
            }
        }
        _ => issues.push(format!("question {n}: must have exactly 4 options")),
    }

    if options.len() == 4 {
        let ids: HashSet<OptionId> = options.iter().map(|o| o.id).collect();
        if ids.len() != 4 {
            issues.push(format!("question {n}: options must have unique ids A-D"));
        } else if !OptionId::ALL.iter().all(|id| ids.contains(id)) {
            issues.push(format!("question {n}: must include options A,B,C,D"));
        }
        let texts: HashSet<&str> = options.iter().map(|o| o.text.trim()).collect();
        if texts.len() != 4 {
            issues.push(format!("question {n}: option texts must be distinct"));
        }
    }

    let correct_option_id = obj
        .get("correctOptionId")
        .and_then(|v| v.as_str())
        .and_then(OptionId::parse);
    let correct_option_id = match correct_option_id {
        Some(id) if options.iter().any(|o| o.id == id) => Some(id),
        _ => {
            issues.push(format!("question {n}: correctOptionId must match an option"));
            None
        }
    };

    let explanation = obj.get("explanation").and_then(|v| v.as_str()).unwrap_or("");
    if !(4..=600).contains(&explanation.chars().count()) {
        issues.push(format!("question {n}: explanation must be 4-600 characters"));
    }
    if explanation.trim().split_whitespace().count() > 60 {
        issues.push(format!("question {n}: explanation exceeds 60 words"));
    }

    let tags = match obj.get("tags") {
        None | Some(Value::Null) => None,
        Some(Value::Array(raw_tags)) => {
            let tags: Vec<String> = raw_tags
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect();
            if tags.len() != raw_tags.len()
                || tags.len() > 5
                || tags.iter().any(|t| t.is_empty() || t.chars().count() > 30)
            {
                issues.push(format!("question {n}: tags must be at most 5 short strings"));
                None
            } else {
                Some(tags)
            }
        }
        Some(_) => {
            issues.push(format!("question {n}: tags must be at most 5 short strings"));
            None
        }
    };

    if issues.len() > before {
        return None;
    }
    Some(QuizQuestion {
        id: id.to_string(),
        stem: stem.to_string(),
        options,
        correct_option_id: correct_option_id?,
        explanation: explanation.to_string(),
        tags,
    })
}

/// Score a quiz against submitted answers.
///
/// Iterates in quiz order: every question appears exactly once in the
/// breakdown, unanswered ones counted incorrect.
pub fn grade(quiz: &Quiz, answers: &[SubmittedAnswer]) -> QuizGradeResponse {
    let submitted: HashMap<&str, OptionId> = answers
        .iter()
        .map(|a| (a.question_id.as_str(), a.selected_option_id))
        .collect();

    let breakdown: Vec<GradeBreakdownEntry> = quiz
        .questions
        .iter()
        .map(|q| {
            let selected = submitted.get(q.id.as_str()).copied();
            GradeBreakdownEntry {
                question_id: q.id.clone(),
                correct: selected == Some(q.correct_option_id),
                correct_option_id: q.correct_option_id,
                explanation: q.explanation.clone(),
            }
        })
        .collect();

    let score = breakdown.iter().filter(|b| b.correct).count() as u32;
    QuizGradeResponse { score, breakdown }
}

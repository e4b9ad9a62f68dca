//! Maps raw model output into a well-formed Q&A answer.
//!
//! This path never fails: the conversational UI always renders something, so
//! malformed model JSON degrades to safe defaults instead of propagating.

use anyhow::Result;
use studyhive_schema::{
    Answer, AskQuestionRequest, AskQuestionResponse, ReadingLevel, ResponseMetadata,
};

use crate::prompts::{build_qa_prompt, SYSTEM_TUTOR_STYLE};
use crate::resources::sanitize_resources;
use crate::router::{LlmRouter, ModelPolicy};

/// Shown when the model's answer cannot be parsed at all.
pub const ANSWER_FALLBACK_TEXT: &str = "I couldn't parse a valid answer.";

/// Normalize raw model text (expected JSON) into an `AskQuestionResponse`.
pub fn to_ask_question_response(raw: &str, metadata: ResponseMetadata) -> AskQuestionResponse {
    let parsed: serde_json::Value =
        serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}));
    let answer = &parsed["answer"];

    let text = answer["text"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| ANSWER_FALLBACK_TEXT.to_string());

    let key_terms = string_items(&answer["keyTerms"]).unwrap_or_default();
    let examples = string_items(&answer["examples"]);

    let reading_level = if answer["readingLevel"].as_str() == Some("grade9-10") {
        ReadingLevel::Grade9To10
    } else {
        ReadingLevel::Grade6To8
    };

    let resources = sanitize_resources(&answer["resources"]).filter(|r| !r.is_empty());

    AskQuestionResponse {
        answer: Answer {
            text,
            key_terms,
            examples,
            reading_level,
            resources,
        },
        metadata,
    }
}

/// Full tutoring flow for one question: validate, prompt, call the model,
/// normalize. Model output problems degrade to defaults; only request
/// validation and total model failure surface as errors.
pub async fn ask_question(
    router: &LlmRouter,
    policy: &ModelPolicy,
    request: &AskQuestionRequest,
) -> Result<AskQuestionResponse> {
    request.validate()?;
    let prompt = build_qa_prompt(request);
    let started = std::time::Instant::now();
    let resp = router
        .chat(
            policy,
            Some(SYSTEM_TUTOR_STYLE.to_string()),
            vec![studyhive_provider::LlmMessage::user(prompt)],
            400,
            Some(0.2),
            true,
        )
        .await?;
    let metadata = ResponseMetadata {
        model: Some(resp.model.clone()),
        latency_ms: Some(started.elapsed().as_millis() as u64),
        tokens: resp.output_tokens,
    };
    Ok(to_ask_question_response(&resp.text, metadata))
}

/// The string elements of an array value; `None` when not an array.
fn string_items(value: &serde_json::Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

//! Prompt builders for the tutor and quiz flows.

use studyhive_schema::{AskQuestionRequest, QuizGenerateRequest};

pub const SYSTEM_TUTOR_STYLE: &str = "You are a friendly, patient tutor. Explain concepts simply, avoid jargon, define new terms, include one concrete example. Keep to 120\u{2013}150 words. Output JSON with keys: answer.text, answer.keyTerms[], answer.examples[], answer.readingLevel.";

pub fn build_qa_prompt(input: &AskQuestionRequest) -> String {
    let lang = input.locale.language_name();
    [
        format!("Language: {lang} (respond entirely in {lang})"),
        format!("Learner level: {}", input.level.as_str()),
        format!("Question: {}", input.question),
        SYSTEM_TUTOR_STYLE.to_string(),
        "Return only JSON as specified.".to_string(),
    ]
    .join("\n")
}

pub fn build_quiz_prompt(req: &QuizGenerateRequest) -> String {
    let lang = req.locale.language_name();
    let mut lines = vec![
        format!("You are an expert quiz generator for {lang} learners. Output ONLY valid JSON matching the schema described below."),
        format!("Language: {lang} (ALL content must be in {lang})."),
        format!("Learner level: {}. Use simpler wording for beginner; slightly deeper reasoning for intermediate.", req.level.as_str()),
        format!("Topic: {}", req.topic),
        "Create exactly 5 multiple-choice questions (MCQs) covering: definition/recall, misconception check, simple application or calculation, scenario-based reasoning, and a varied style conceptual question.".to_string(),
        "Each question must have: id (short slug), stem, options (array of 4 each with id in [A,B,C,D] and text), correctOptionId, explanation (<=60 words teaching why correct and why others are wrong briefly), and optional tags (1-3 concise topical tags).".to_string(),
        "Rules:".to_string(),
        "- Exactly 4 distinct option texts per question.".to_string(),
        "- Exactly one correctOptionId.".to_string(),
        "- No duplicate stems; keep stems <= 180 chars.".to_string(),
        "- Option text <= 120 chars.".to_string(),
        "- No markdown formatting, no numbering outside JSON.".to_string(),
        "- Avoid phrases like 'Correct answer:' in explanation.".to_string(),
        r#"Schema (JSON object): { "quiz": { "topic": string, "level": "beginner"|"intermediate", "locale": "en"|"hi"|"gu", "questions": [ { "id": string, "stem": string, "options": [{"id":"A"|"B"|"C"|"D","text":string}], "correctOptionId":"A"|"B"|"C"|"D", "explanation": string, "tags"?: string[] } ] } }"#.to_string(),
        "Return ONLY JSON. Do not wrap in code fences.".to_string(),
    ];
    if let Some(seed) = &req.seed {
        lines.push(format!("Seed (for determinism hint): {seed}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyhive_schema::{Level, Locale};

    #[test]
    fn qa_prompt_names_language_and_question() {
        let prompt = build_qa_prompt(&AskQuestionRequest {
            question: "What is photosynthesis?".into(),
            level: Level::Beginner,
            locale: Locale::Hi,
        });
        assert!(prompt.contains("Language: Hindi"));
        assert!(prompt.contains("Question: What is photosynthesis?"));
        assert!(prompt.contains("Return only JSON"));
    }

    #[test]
    fn quiz_prompt_includes_seed_only_when_present() {
        let mut req = QuizGenerateRequest {
            topic: "Fractions".into(),
            level: Level::Intermediate,
            locale: Locale::En,
            seed: None,
        };
        let without = build_quiz_prompt(&req);
        assert!(!without.contains("Seed"));
        req.seed = Some("v2".into());
        let with = build_quiz_prompt(&req);
        assert!(with.contains("Seed (for determinism hint): v2"));
        assert!(with.contains("Topic: Fractions"));
    }
}

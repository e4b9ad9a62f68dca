//! Quiz session state machine.
//!
//! Drives question navigation, answer selection, the per-question countdown
//! and timeout handling for one loaded quiz. The countdown is an explicit
//! owned resource: at most one timer task exists at a time, and every
//! transition away from an active timer (manual check, timeout, navigation,
//! reset, drop) cancels it before anything else starts. A leaked timer would
//! attribute a timeout to the wrong question.
//!
//! State is wrapped in a mutex shared only with the timer task; all other
//! mutation happens through `&mut self`, so there is a single logical writer.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use studyhive_schema::{OptionId, QuestionResult, Quiz, QuizGenerateRequest, QuizGenerateResponse};

use crate::events::EventSink;
use crate::history::{push_quiz_history, HistoryStore};
use crate::quiz::generate_quiz;
use crate::router::{LlmRouter, ModelPolicy};

/// Seconds a learner gets per question.
pub const QUESTION_TIME_LIMIT_SECS: u32 = 45;
/// Pause after a timeout so the UI can show the timed-out state before the
/// session advances.
const TIMEOUT_ADVANCE_DELAY: Duration = Duration::from_millis(450);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    InProgress,
    Finished,
}

#[derive(Default)]
struct SessionState {
    quiz: Option<Quiz>,
    current_index: usize,
    answers: HashMap<String, OptionId>,
    checked: HashSet<String>,
    results: Vec<QuestionResult>,
    time_left: u32,
    is_timing: bool,
}

impl SessionState {
    fn current_question(&self) -> Option<&studyhive_schema::QuizQuestion> {
        self.quiz.as_ref()?.questions.get(self.current_index)
    }

    fn finished(&self) -> bool {
        self.quiz
            .as_ref()
            .map(|q| !q.questions.is_empty() && self.checked.len() == q.questions.len())
            .unwrap_or(false)
    }

    /// Lock in the current question. Idempotent: an already-checked question
    /// reports its recorded correctness without mutating anything.
    fn lock_in(&mut self, due_to_timeout: bool) -> bool {
        let Some(question) = self.current_question() else {
            return false;
        };
        let question_id = question.id.clone();
        let correct_option_id = question.correct_option_id;

        if self.checked.contains(&question_id) {
            return self.answers.get(&question_id) == Some(&correct_option_id);
        }

        let chosen = if due_to_timeout {
            None
        } else {
            self.answers.get(&question_id).copied()
        };
        let correct = chosen == Some(correct_option_id);
        self.checked.insert(question_id.clone());
        self.results.push(QuestionResult {
            question_id,
            correct,
            correct_option_id,
            selected_option_id: chosen,
            timed_out: due_to_timeout,
        });
        self.is_timing = false;
        correct
    }
}

pub struct QuizSession {
    state: Arc<Mutex<SessionState>>,
    timer: Option<tokio::task::JoinHandle<()>>,
    events: Arc<dyn EventSink>,
    history: Arc<dyn HistoryStore>,
}

impl QuizSession {
    pub fn new(events: Arc<dyn EventSink>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                time_left: QUESTION_TIME_LIMIT_SECS,
                ..SessionState::default()
            })),
            timer: None,
            events,
            history,
        }
    }

    /// Generate a quiz through the model and load it on success.
    ///
    /// On any failure (model error, validation rejection) the session state
    /// is left exactly as it was.
    pub async fn generate(
        &mut self,
        router: &LlmRouter,
        policy: &ModelPolicy,
        request: &QuizGenerateRequest,
    ) -> Result<QuizGenerateResponse> {
        let generated = generate_quiz(router, policy, request).await?;
        push_quiz_history(self.history.as_ref(), &generated.quiz);
        self.load_quiz(generated.quiz.clone());
        Ok(generated)
    }

    /// Load an already-validated quiz and start the first question's timer.
    pub fn load_quiz(&mut self, quiz: Quiz) {
        self.cancel_timer();
        {
            let mut s = lock(&self.state);
            *s = SessionState {
                quiz: Some(quiz),
                time_left: QUESTION_TIME_LIMIT_SECS,
                ..SessionState::default()
            };
        }
        self.start_timer();
    }

    /// Record a selection for a not-yet-checked question. At most one
    /// selection per question; later calls overwrite. Does not stop the
    /// timer.
    pub fn select_option(&mut self, question_id: &str, option_id: OptionId) {
        let mut s = lock(&self.state);
        if s.checked.contains(question_id) {
            return;
        }
        let known = s
            .quiz
            .as_ref()
            .map(|q| q.questions.iter().any(|qq| qq.id == question_id))
            .unwrap_or(false);
        if known {
            s.answers.insert(question_id.to_string(), option_id);
        }
    }

    /// Lock in the current question and stop its timer. Idempotent.
    pub fn check_current(&mut self, due_to_timeout: bool) -> bool {
        let correct = lock(&self.state).lock_in(due_to_timeout);
        self.cancel_timer();
        correct
    }

    pub fn next(&mut self) {
        self.move_to(|index, last| (index + 1).min(last));
    }

    pub fn prev(&mut self) {
        self.move_to(|index, _| index.saturating_sub(1));
    }

    fn move_to(&mut self, step: impl Fn(usize, usize) -> usize) {
        let target_unchecked = {
            let mut s = lock(&self.state);
            let Some(quiz) = s.quiz.as_ref() else {
                return;
            };
            let last = quiz.questions.len().saturating_sub(1);
            s.current_index = step(s.current_index, last);
            s.current_question()
                .map(|q| !s.checked.contains(&q.id))
                .unwrap_or(false)
        };

        if target_unchecked {
            self.start_timer();
        } else {
            // Checked question: no countdown, display resets.
            self.cancel_timer();
            lock(&self.state).time_left = QUESTION_TIME_LIMIT_SECS;
        }
    }

    /// Back to `Idle`: no quiz, no answers, no timer.
    pub fn reset(&mut self) {
        self.cancel_timer();
        let mut s = lock(&self.state);
        *s = SessionState {
            time_left: QUESTION_TIME_LIMIT_SECS,
            ..SessionState::default()
        };
    }

    pub fn phase(&self) -> SessionPhase {
        let s = lock(&self.state);
        if s.quiz.is_none() {
            SessionPhase::Idle
        } else if s.finished() {
            SessionPhase::Finished
        } else {
            SessionPhase::InProgress
        }
    }

    pub fn finished(&self) -> bool {
        lock(&self.state).finished()
    }

    pub fn quiz(&self) -> Option<Quiz> {
        lock(&self.state).quiz.clone()
    }

    pub fn current_index(&self) -> usize {
        lock(&self.state).current_index
    }

    pub fn time_left(&self) -> u32 {
        lock(&self.state).time_left
    }

    pub fn is_timing(&self) -> bool {
        lock(&self.state).is_timing
    }

    pub fn checked_count(&self) -> usize {
        lock(&self.state).checked.len()
    }

    pub fn results(&self) -> Vec<QuestionResult> {
        lock(&self.state).results.clone()
    }

    pub fn selected(&self, question_id: &str) -> Option<OptionId> {
        lock(&self.state).answers.get(question_id).copied()
    }

    pub fn quiz_history(&self) -> Vec<Quiz> {
        crate::history::load_quiz_history(self.history.as_ref())
    }

    /// Start the countdown for the current question, replacing any previous
    /// timer. The spawned task is the only other writer of session state and
    /// lives until it is cancelled or its question chain ends.
    fn start_timer(&mut self) {
        self.cancel_timer();
        {
            let mut s = lock(&self.state);
            if s.current_question().is_none() {
                return;
            }
            s.time_left = QUESTION_TIME_LIMIT_SECS;
            s.is_timing = true;
        }

        let state = Arc::clone(&self.state);
        let events = Arc::clone(&self.events);
        self.timer = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;

                let timed_out = {
                    let mut s = lock(&state);
                    if !s.is_timing {
                        return;
                    }
                    s.time_left = s.time_left.saturating_sub(1);
                    if s.time_left > 0 {
                        continue;
                    }
                    let question_id = match s.current_question() {
                        Some(q) => q.id.clone(),
                        None => return,
                    };
                    s.lock_in(true);
                    let at_last = s
                        .quiz
                        .as_ref()
                        .map(|q| s.current_index + 1 >= q.questions.len())
                        .unwrap_or(true);
                    (question_id, at_last)
                };

                let (question_id, at_last) = timed_out;
                events.record("timed_out", serde_json::json!({ "questionId": question_id }));

                tokio::time::sleep(TIMEOUT_ADVANCE_DELAY).await;
                if at_last {
                    // Last question: stay put; Finished falls out of the
                    // checked-set predicate.
                    return;
                }

                let mut s = lock(&state);
                s.current_index += 1;
                let next_unchecked = s
                    .current_question()
                    .map(|q| !s.checked.contains(&q.id))
                    .unwrap_or(false);
                s.time_left = QUESTION_TIME_LIMIT_SECS;
                if next_unchecked {
                    // Same task keeps counting for the next question.
                    s.is_timing = true;
                } else {
                    s.is_timing = false;
                    return;
                }
            }
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
        lock(&self.state).is_timing = false;
    }
}

impl Drop for QuizSession {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

/// Poison-tolerant lock: a panicked timer task must not wedge the session.
fn lock(state: &Arc<Mutex<SessionState>>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::history::MemoryHistoryStore;
    use crate::router::LlmRouter;
    use async_trait::async_trait;
    use studyhive_provider::{LlmProvider, LlmRequest, LlmResponse, ProviderRegistry};
    use studyhive_schema::{Level, Locale, Quiz, QuizOption, QuizQuestion};

    fn question(n: usize) -> QuizQuestion {
        QuizQuestion {
            id: format!("q{n}"),
            stem: format!("Stem for question number {n}?"),
            options: OptionId::ALL
                .iter()
                .map(|id| QuizOption {
                    id: *id,
                    text: format!("Option {id} for {n}"),
                })
                .collect(),
            correct_option_id: OptionId::B,
            explanation: "Because option B states the principle correctly.".into(),
            tags: None,
        }
    }

    fn quiz() -> Quiz {
        Quiz {
            id: "quiz-1".into(),
            topic: "Newton's laws".into(),
            level: Level::Beginner,
            locale: Locale::En,
            created_at: 1_700_000_000_000,
            questions: (1..=5).map(question).collect(),
        }
    }

    fn session() -> QuizSession {
        QuizSession::new(
            Arc::new(RecordingEventSink::default()),
            Arc::new(MemoryHistoryStore::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn load_starts_in_progress_with_full_clock() {
        let mut s = session();
        assert_eq!(s.phase(), SessionPhase::Idle);
        s.load_quiz(quiz());
        assert_eq!(s.phase(), SessionPhase::InProgress);
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.time_left(), QUESTION_TIME_LIMIT_SECS);
        assert!(s.is_timing());
    }

    #[tokio::test(start_paused = true)]
    async fn answering_correctly_checks_once() {
        let mut s = session();
        s.load_quiz(quiz());
        s.select_option("q1", OptionId::B);
        assert!(s.check_current(false));
        assert_eq!(s.checked_count(), 1);
        assert_eq!(s.results().len(), 1);
        assert!(!s.is_timing());

        // Second check: same verdict, no extra result record.
        assert!(s.check_current(false));
        assert_eq!(s.results().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_after_check_is_ignored() {
        let mut s = session();
        s.load_quiz(quiz());
        s.check_current(false);
        s.select_option("q1", OptionId::B);
        assert_eq!(s.selected("q1"), None);
        // The earlier check with no selection counts incorrect.
        assert!(!s.results()[0].correct);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_and_navigation_restarts_it() {
        let mut s = session();
        s.load_quiz(quiz());
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(s.time_left(), QUESTION_TIME_LIMIT_SECS - 10);

        s.next();
        assert_eq!(s.current_index(), 1);
        assert_eq!(s.time_left(), QUESTION_TIME_LIMIT_SECS);
        assert!(s.is_timing());
    }

    #[tokio::test(start_paused = true)]
    async fn moving_to_checked_question_stops_clock() {
        let mut s = session();
        s.load_quiz(quiz());
        s.select_option("q1", OptionId::A);
        s.check_current(false);
        s.next();
        assert!(s.is_timing());
        s.prev();
        assert!(!s.is_timing());
        assert_eq!(s.time_left(), QUESTION_TIME_LIMIT_SECS);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_clamps_to_bounds() {
        let mut s = session();
        s.load_quiz(quiz());
        s.prev();
        assert_eq!(s.current_index(), 0);
        for _ in 0..10 {
            s.next();
        }
        assert_eq!(s.current_index(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_marks_incorrect_and_advances() {
        let events = Arc::new(RecordingEventSink::default());
        let mut s = QuizSession::new(events.clone(), Arc::new(MemoryHistoryStore::default()));
        s.load_quiz(quiz());
        s.select_option("q1", OptionId::B); // selected but never checked

        tokio::time::sleep(Duration::from_secs(46)).await;

        let results = s.results();
        assert_eq!(results.len(), 1);
        assert!(results[0].timed_out);
        assert!(!results[0].correct);
        assert_eq!(results[0].selected_option_id, None);
        assert_eq!(s.current_index(), 1);
        assert!(s.is_timing());
        assert!(events.types().contains(&"timed_out".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_on_last_question_finishes_without_advancing() {
        let mut s = session();
        s.load_quiz(quiz());
        for q in 1..=4 {
            s.select_option(&format!("q{q}"), OptionId::B);
            s.check_current(false);
            s.next();
        }
        assert_eq!(s.current_index(), 4);
        assert_eq!(s.checked_count(), 4);

        tokio::time::sleep(Duration::from_secs(46)).await;

        assert_eq!(s.current_index(), 4);
        assert!(s.finished());
        assert_eq!(s.phase(), SessionPhase::Finished);
        assert!(!s.is_timing());
    }

    #[tokio::test(start_paused = true)]
    async fn five_checks_reach_finished() {
        let mut s = session();
        s.load_quiz(quiz());
        for q in 1..=5 {
            s.select_option(&format!("q{q}"), OptionId::B);
            assert!(s.check_current(false));
            s.next();
        }
        assert!(s.finished());
        assert_eq!(s.phase(), SessionPhase::Finished);
        assert_eq!(s.results().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_returns_to_idle() {
        let mut s = session();
        s.load_quiz(quiz());
        s.select_option("q1", OptionId::A);
        s.check_current(false);
        s.reset();
        assert_eq!(s.phase(), SessionPhase::Idle);
        assert_eq!(s.checked_count(), 0);
        assert!(s.results().is_empty());
        assert!(!s.is_timing());
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_after_manual_check() {
        let mut s = session();
        s.load_quiz(quiz());
        s.check_current(false);
        let before = s.time_left();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(s.time_left(), before);
    }

    struct CannedQuizProvider {
        body: String,
    }

    #[async_trait]
    impl LlmProvider for CannedQuizProvider {
        async fn chat(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
            Ok(LlmResponse {
                text: self.body.clone(),
                model: request.model,
                input_tokens: None,
                output_tokens: None,
            })
        }
    }

    fn router_with(body: String) -> LlmRouter {
        let mut registry = ProviderRegistry::new();
        registry.register("stub", Arc::new(CannedQuizProvider { body }));
        LlmRouter::single_provider(registry, "stub", &["quiz-model"])
    }

    fn request() -> QuizGenerateRequest {
        QuizGenerateRequest {
            topic: "Newton's laws".into(),
            level: Level::Beginner,
            locale: Locale::En,
            seed: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn generate_loads_quiz_and_pushes_history() {
        let body = serde_json::json!({ "quiz": quiz() }).to_string();
        let router = router_with(body);
        let mut s = session();

        let resp = s
            .generate(&router, &ModelPolicy::single("quiz-model"), &request())
            .await
            .unwrap();
        assert_eq!(resp.quiz.questions.len(), 5);
        assert_eq!(s.phase(), SessionPhase::InProgress);
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.time_left(), QUESTION_TIME_LIMIT_SECS);
        assert_eq!(s.quiz_history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_generate_leaves_state_unchanged() {
        let good = serde_json::json!({ "quiz": quiz() }).to_string();
        let router = router_with(good);
        let mut s = session();
        s.generate(&router, &ModelPolicy::single("quiz-model"), &request())
            .await
            .unwrap();
        s.select_option("q1", OptionId::B);
        s.check_current(false);

        // Second generation returns garbage: validation must reject it and
        // the in-progress session must be untouched.
        let bad_router = router_with("{\"quiz\": {\"questions\": []}}".to_string());
        let err = s
            .generate(&bad_router, &ModelPolicy::single("quiz-model"), &request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("validation"));
        assert_eq!(s.checked_count(), 1);
        assert_eq!(s.phase(), SessionPhase::InProgress);
        assert_eq!(s.quiz_history().len(), 1);
    }
}

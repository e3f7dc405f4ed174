//! Quiz session state machine.
//!
//! Everything here is synchronous: remote grading is split into a `begin_*`
//! step that hands out a ticket or plan tagged with the session generation,
//! and a `complete_*` step that merges the outcome. Restart, reset and load
//! bump the generation, so completions issued before them are discarded.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::grading::classify;
use crate::models::{AnswerRecord, Question, QuizMode, QuizResult, ValidationResult, ValidationStatus};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use tracing::{debug, info, warn};

/// Outstanding single-question check.
#[derive(Debug, Clone)]
pub struct CheckTicket {
    pub generation: u64,
    pub question: Question,
    pub selected_option_index: usize,
}

#[derive(Debug, Clone)]
pub struct GradingItem {
    pub question: Question,
    pub selected_option_index: Option<usize>,
}

/// Work produced by [`QuizSession::begin_finish`].
#[derive(Debug, Clone)]
pub struct FinishPlan {
    pub generation: u64,
    pub batches: Vec<Vec<GradingItem>>,
    pub answered: HashSet<String>,
    pub skipped: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FinishIntent {
    /// Every question has a selection.
    Ready,
    /// Some questions are unanswered; the user may go back or proceed.
    Confirm { unanswered: Vec<usize> },
    /// Time is up; finishing happens regardless.
    Forced { unanswered: Vec<usize> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Inactive,
    Ticked(u64),
    Expired,
}

/// Read-only projection handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub mode: QuizMode,
    pub question_count: usize,
    pub questions: Vec<AnswerRecord>,
    pub time_left: u64,
    pub is_time_expired: bool,
    pub has_submitted: bool,
    pub is_finishing: bool,
    pub result: Option<QuizResult>,
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    config: SessionConfig,
    mode: QuizMode,
    questions: Vec<AnswerRecord>,
    time_left: u64,
    is_time_expired: bool,
    has_submitted: bool,
    is_finishing: bool,
    result: Option<QuizResult>,
    generation: u64,
}

impl QuizSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            mode: QuizMode::Standard,
            questions: Vec::new(),
            time_left: config.challenge_seconds,
            is_time_expired: false,
            has_submitted: false,
            is_finishing: false,
            result: None,
            generation: 0,
        }
    }

    /// Installs freshly parsed questions. Challenge mode keeps only the configured count
    /// and arms the countdown. Returns the number of questions kept.
    pub fn load(&mut self, mut questions: Vec<Question>, mode: QuizMode) -> Result<usize, SessionError> {
        if !self.questions.is_empty() {
            return Err(SessionError::AlreadyLoaded);
        }
        if mode == QuizMode::Challenge {
            questions.truncate(self.config.challenge_question_count);
        }
        self.generation += 1;
        self.mode = mode;
        self.questions = questions.into_iter().map(AnswerRecord::new).collect();
        self.time_left = self.config.challenge_seconds;
        self.is_time_expired = false;
        self.has_submitted = false;
        self.is_finishing = false;
        self.result = None;
        info!(mode = ?mode, questions = self.questions.len(), "session loaded");
        Ok(self.questions.len())
    }

    pub fn mode(&self) -> QuizMode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn questions(&self) -> &[AnswerRecord] {
        &self.questions
    }

    pub fn record(&self, question_id: &str) -> Option<&AnswerRecord> {
        self.questions.iter().find(|r| r.id() == question_id)
    }

    pub fn time_left(&self) -> u64 {
        self.time_left
    }

    pub fn is_time_expired(&self) -> bool {
        self.is_time_expired
    }

    pub fn has_submitted(&self) -> bool {
        self.has_submitted
    }

    pub fn is_finishing(&self) -> bool {
        self.is_finishing
    }

    pub fn result(&self) -> Option<&QuizResult> {
        self.result.as_ref()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            mode: self.mode,
            question_count: self.questions.len(),
            questions: self.questions.clone(),
            time_left: self.time_left,
            is_time_expired: self.is_time_expired,
            has_submitted: self.has_submitted,
            is_finishing: self.is_finishing,
            result: self.result.clone(),
        }
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        if self.has_submitted {
            return Err(SessionError::Locked);
        }
        if self.is_finishing {
            return Err(SessionError::Finishing);
        }
        if self.is_time_expired {
            return Err(SessionError::TimeExpired);
        }
        Ok(())
    }

    fn record_mut(&mut self, question_id: &str) -> Result<&mut AnswerRecord, SessionError> {
        self.questions
            .iter_mut()
            .find(|r| r.id() == question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))
    }

    pub fn select_option(&mut self, question_id: &str, option_index: usize) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let record = self.record_mut(question_id)?;
        let len = record.question.options.len();
        if option_index >= len {
            return Err(SessionError::OptionOutOfRange { index: option_index, len });
        }
        match record.status {
            ValidationStatus::Validating => return Err(SessionError::AlreadyValidating),
            ValidationStatus::Validated => return Err(SessionError::AlreadyValidated),
            ValidationStatus::Idle | ValidationStatus::Error => {}
        }
        record.user_selected_option_index = Some(option_index);
        Ok(())
    }

    /// Moves a selected question to `validating` and returns what the grader needs.
    pub fn begin_check(&mut self, question_id: &str) -> Result<CheckTicket, SessionError> {
        self.ensure_editable()?;
        if self.mode == QuizMode::Challenge {
            return Err(SessionError::WrongMode("challenge"));
        }
        let generation = self.generation;
        let record = self.record_mut(question_id)?;
        match record.status {
            ValidationStatus::Validating => return Err(SessionError::AlreadyValidating),
            ValidationStatus::Validated => return Err(SessionError::AlreadyValidated),
            ValidationStatus::Idle | ValidationStatus::Error => {}
        }
        let selected = record.user_selected_option_index.ok_or(SessionError::NoSelection)?;
        record.status = ValidationStatus::Validating;
        Ok(CheckTicket {
            generation,
            question: record.question.clone(),
            selected_option_index: selected,
        })
    }

    /// Merges a single-question verdict. Returns false when the completion is stale:
    /// the session was restarted or reset, or a finish has taken over the question.
    pub fn complete_check<E: Display>(&mut self, ticket: &CheckTicket, outcome: Result<ValidationResult, E>) -> bool {
        if ticket.generation != self.generation {
            debug!(question = %ticket.question.id, "discarding check from an older session generation");
            return false;
        }
        if self.has_submitted || self.is_finishing {
            debug!(question = %ticket.question.id, "discarding check superseded by finish");
            return false;
        }
        let Ok(record) = self.record_mut(&ticket.question.id) else {
            return false;
        };
        if record.status != ValidationStatus::Validating {
            return false;
        }
        match outcome {
            Ok(result) => record.apply_verdict(&result),
            Err(err) => {
                warn!(question = %ticket.question.id, "answer check failed: {}", err);
                record.status = ValidationStatus::Error;
            }
        }
        true
    }

    pub fn unanswered_indices(&self) -> Vec<usize> {
        self.questions
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_answered())
            .map(|(i, _)| i)
            .collect()
    }

    /// Decides whether finishing needs the user's confirmation.
    pub fn finish_intent(&self) -> Result<FinishIntent, SessionError> {
        if self.has_submitted {
            return Err(SessionError::AlreadySubmitted);
        }
        if self.is_finishing {
            return Err(SessionError::Finishing);
        }
        if self.questions.is_empty() {
            return Err(SessionError::Empty);
        }
        let unanswered = self.unanswered_indices();
        Ok(if self.is_time_expired {
            FinishIntent::Forced { unanswered }
        } else if unanswered.is_empty() {
            FinishIntent::Ready
        } else {
            FinishIntent::Confirm { unanswered }
        })
    }

    /// Partitions every unvalidated question, marks them `validating` and groups the
    /// answered ones into grading batches.
    pub fn begin_finish(&mut self) -> Result<FinishPlan, SessionError> {
        if self.has_submitted {
            return Err(SessionError::AlreadySubmitted);
        }
        if self.is_finishing {
            return Err(SessionError::Finishing);
        }
        if self.questions.is_empty() {
            return Err(SessionError::Empty);
        }
        self.is_finishing = true;

        let mut answered_items = Vec::new();
        let mut answered = HashSet::new();
        let mut skipped = HashSet::new();
        for record in self
            .questions
            .iter_mut()
            .filter(|r| r.status != ValidationStatus::Validated)
        {
            record.status = ValidationStatus::Validating;
            match record.user_selected_option_index {
                Some(selected) => {
                    answered.insert(record.id().to_string());
                    answered_items.push(GradingItem {
                        question: record.question.clone(),
                        selected_option_index: Some(selected),
                    });
                }
                None => {
                    skipped.insert(record.id().to_string());
                }
            }
        }

        let batches = answered_items
            .chunks(self.config.batch_size.max(1))
            .map(<[GradingItem]>::to_vec)
            .collect();
        Ok(FinishPlan {
            generation: self.generation,
            batches,
            answered,
            skipped,
        })
    }

    /// Merges batch results, tallies the score and locks the session.
    ///
    /// Answered questions without a result (their batch group failed or the grader
    /// omitted them) end in `error` with no verdict: they count toward the total but
    /// neither as correct nor incorrect.
    pub fn complete_finish(
        &mut self,
        plan: &FinishPlan,
        results: &HashMap<String, ValidationResult>,
    ) -> Option<QuizResult> {
        if plan.generation != self.generation || !self.is_finishing {
            debug!("discarding finish results from an older session generation");
            return None;
        }

        for record in self.questions.iter_mut() {
            let id = record.id().to_string();
            if plan.answered.contains(&id) {
                match results.get(&id) {
                    Some(result) => record.apply_verdict(result),
                    None => record.status = ValidationStatus::Error,
                }
            } else if plan.skipped.contains(&id) {
                record.mark_skipped();
            }
        }

        let result = tally(&self.questions);
        info!(
            total = result.total,
            correct = result.correct_count,
            incorrect = result.incorrect_count,
            skipped = result.skipped_count,
            ungraded = result.ungraded_count,
            grade = result.grade_details.grade,
            "quiz finished"
        );
        self.result = Some(result.clone());
        self.has_submitted = true;
        self.is_finishing = false;
        Some(result)
    }

    fn countdown_active(&self) -> bool {
        self.mode == QuizMode::Challenge
            && !self.questions.is_empty()
            && self.time_left > 0
            && !self.has_submitted
            && !self.is_finishing
    }

    /// One second of challenge time.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.countdown_active() {
            return TickOutcome::Inactive;
        }
        self.time_left -= 1;
        if self.time_left == 0 {
            self.is_time_expired = true;
            info!("challenge time expired");
            TickOutcome::Expired
        } else {
            TickOutcome::Ticked(self.time_left)
        }
    }

    /// Same questions, same option order, fresh attempt.
    pub fn restart(&mut self) {
        self.generation += 1;
        for record in self.questions.iter_mut() {
            record.clear();
        }
        self.result = None;
        self.has_submitted = false;
        self.is_finishing = false;
        if self.mode == QuizMode::Challenge {
            self.time_left = self.config.challenge_seconds;
            self.is_time_expired = false;
        }
        info!(questions = self.questions.len(), "session restarted");
    }

    /// Drops the question set, back to the pre-load state.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.questions.clear();
        self.result = None;
        self.has_submitted = false;
        self.is_finishing = false;
        self.is_time_expired = false;
        self.time_left = self.config.challenge_seconds;
        info!("session reset");
    }
}

fn tally(questions: &[AnswerRecord]) -> QuizResult {
    let total = questions.len();
    let skipped = questions.iter().filter(|r| r.is_skipped == Some(true)).count();
    let correct = questions
        .iter()
        .filter(|r| r.is_correct == Some(true) && r.is_skipped != Some(true))
        .count();
    let incorrect = questions
        .iter()
        .filter(|r| r.is_correct == Some(false) && r.is_skipped != Some(true))
        .count();
    let ungraded = total - correct - incorrect - skipped;
    let score = if total > 0 {
        correct as f64 * 100.0 / total as f64
    } else {
        0.0
    };
    QuizResult {
        score,
        correct_count: correct,
        incorrect_count: incorrect,
        skipped_count: skipped,
        ungraded_count: ungraded,
        total,
        grade_details: classify(score),
        finished_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(n: usize) -> Question {
        Question {
            id: format!("q-{}", n),
            question_text: format!("Question {}", n),
            options: vec!["a".into(), "b".into(), "c".into()],
            raw_original: String::new(),
        }
    }

    fn loaded(n: usize, mode: QuizMode, config: SessionConfig) -> QuizSession {
        let mut session = QuizSession::new(config);
        session.load((0..n).map(question).collect(), mode).unwrap();
        session
    }

    fn verdict(id: &str, correct: bool) -> ValidationResult {
        ValidationResult {
            id: Some(id.to_string()),
            is_correct: correct,
            correct_option_index: 0,
            explanation: format!("because {}", id),
            reasoning_for_incorrect: None,
        }
    }

    /// Grades every planned item: correct iff option 0 was picked.
    fn grade_all(plan: &FinishPlan) -> HashMap<String, ValidationResult> {
        plan.batches
            .iter()
            .flatten()
            .map(|item| {
                let id = item.question.id.clone();
                let correct = item.selected_option_index == Some(0);
                (id.clone(), verdict(&id, correct))
            })
            .collect()
    }

    #[test]
    fn two_answered_one_skipped() {
        let mut s = loaded(3, QuizMode::Standard, SessionConfig::default());
        s.select_option("q-0", 0).unwrap();
        s.select_option("q-1", 2).unwrap();

        assert_eq!(s.finish_intent().unwrap(), FinishIntent::Confirm { unanswered: vec![2] });

        let plan = s.begin_finish().unwrap();
        assert!(s.is_finishing());
        assert!(s.questions().iter().all(|r| r.status == ValidationStatus::Validating));
        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.skipped.len(), 1);

        let result = s.complete_finish(&plan, &grade_all(&plan)).unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.correct_count, 1);
        assert_eq!(result.incorrect_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.ungraded_count, 0);
        assert!((result.score - 33.333).abs() < 0.01);
        assert_eq!(result.grade_details.grade, "E");
        assert!(s.has_submitted());
        assert!(!s.is_finishing());

        let skipped = s.record("q-2").unwrap();
        assert_eq!(skipped.status, ValidationStatus::Validated);
        assert_eq!(skipped.is_skipped, Some(true));
        assert!(skipped.explanation.is_none());
    }

    #[test]
    fn counts_always_add_up() {
        for answered in 0..=12 {
            let mut s = loaded(12, QuizMode::Standard, SessionConfig::default());
            for i in 0..answered {
                s.select_option(&format!("q-{}", i), i % 3).unwrap();
            }
            let plan = s.begin_finish().unwrap();
            let r = s.complete_finish(&plan, &grade_all(&plan)).unwrap();
            assert_eq!(r.correct_count + r.incorrect_count + r.skipped_count, r.total);
            assert_eq!(r.skipped_count, 12 - answered);
        }
    }

    #[test]
    fn batches_respect_configured_size() {
        let mut s = loaded(12, QuizMode::Standard, SessionConfig::default());
        for i in 0..12 {
            s.select_option(&format!("q-{}", i), 1).unwrap();
        }
        let plan = s.begin_finish().unwrap();
        let sizes: Vec<_> = plan.batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
    }

    #[test]
    fn failed_group_is_left_without_verdict() {
        let mut s = loaded(8, QuizMode::Standard, SessionConfig::default());
        for i in 0..7 {
            s.select_option(&format!("q-{}", i), 0).unwrap();
        }
        let plan = s.begin_finish().unwrap();
        assert_eq!(plan.batches.len(), 2);

        // first group failed: only the second one produced verdicts
        let results: HashMap<_, _> = plan.batches[1]
            .iter()
            .map(|item| (item.question.id.clone(), verdict(&item.question.id, true)))
            .collect();
        let r = s.complete_finish(&plan, &results).unwrap();

        assert!(s.has_submitted());
        assert_eq!(r.total, 8);
        assert_eq!(r.correct_count, 2);
        assert_eq!(r.incorrect_count, 0);
        assert_eq!(r.skipped_count, 1);
        assert_eq!(r.ungraded_count, 5);
        assert_eq!(r.score, 25.0);
        for item in &plan.batches[0] {
            let record = s.record(&item.question.id).unwrap();
            assert_eq!(record.status, ValidationStatus::Error);
            assert!(record.is_correct.is_none());
        }
    }

    #[test]
    fn finishing_twice_keeps_result() {
        let mut s = loaded(2, QuizMode::Standard, SessionConfig::default());
        s.select_option("q-0", 0).unwrap();
        let plan = s.begin_finish().unwrap();
        let first = s.complete_finish(&plan, &grade_all(&plan)).unwrap();

        assert_eq!(s.begin_finish().unwrap_err(), SessionError::AlreadySubmitted);
        assert_eq!(s.finish_intent().unwrap_err(), SessionError::AlreadySubmitted);
        assert!(s.complete_finish(&plan, &HashMap::new()).is_none());
        assert_eq!(s.result(), Some(&first));
    }

    #[test]
    fn already_validated_questions_are_untouched_by_finish() {
        let mut s = loaded(2, QuizMode::Standard, SessionConfig::default());
        s.select_option("q-0", 1).unwrap();
        let ticket = s.begin_check("q-0").unwrap();
        assert!(s.complete_check::<String>(&ticket, Ok(verdict("q-0", true))));

        s.select_option("q-1", 0).unwrap();
        let plan = s.begin_finish().unwrap();
        assert!(!plan.answered.contains("q-0"));
        assert_eq!(s.record("q-0").unwrap().status, ValidationStatus::Validated);

        let r = s.complete_finish(&plan, &grade_all(&plan)).unwrap();
        assert_eq!(r.correct_count, 2);
        assert_eq!(s.record("q-0").unwrap().explanation.as_deref(), Some("because q-0"));
    }

    #[test]
    fn check_answer_lifecycle() {
        let mut s = loaded(2, QuizMode::Standard, SessionConfig::default());
        assert_eq!(s.begin_check("q-0").unwrap_err(), SessionError::NoSelection);

        s.select_option("q-0", 2).unwrap();
        let ticket = s.begin_check("q-0").unwrap();
        assert_eq!(ticket.selected_option_index, 2);
        assert_eq!(s.record("q-0").unwrap().status, ValidationStatus::Validating);
        assert_eq!(s.begin_check("q-0").unwrap_err(), SessionError::AlreadyValidating);
        assert_eq!(s.select_option("q-0", 1).unwrap_err(), SessionError::AlreadyValidating);

        assert!(s.complete_check(&ticket, Err("upstream down")));
        let record = s.record("q-0").unwrap();
        assert_eq!(record.status, ValidationStatus::Error);
        assert!(record.is_correct.is_none());

        // retry after an error, with a different pick
        s.select_option("q-0", 1).unwrap();
        let ticket = s.begin_check("q-0").unwrap();
        assert!(s.complete_check::<String>(&ticket, Ok(verdict("q-0", false))));
        let record = s.record("q-0").unwrap();
        assert_eq!(record.status, ValidationStatus::Validated);
        assert_eq!(record.is_correct, Some(false));
        assert_eq!(record.user_selected_option_index, Some(1));
        assert_eq!(s.select_option("q-0", 0).unwrap_err(), SessionError::AlreadyValidated);
    }

    #[test]
    fn checks_complete_in_any_order() {
        let mut s = loaded(2, QuizMode::Standard, SessionConfig::default());
        s.select_option("q-0", 0).unwrap();
        s.select_option("q-1", 1).unwrap();
        let first = s.begin_check("q-0").unwrap();
        let second = s.begin_check("q-1").unwrap();

        assert!(s.complete_check::<String>(&second, Ok(verdict("q-1", false))));
        assert!(s.complete_check::<String>(&first, Ok(verdict("q-0", true))));
        assert_eq!(s.record("q-0").unwrap().is_correct, Some(true));
        assert_eq!(s.record("q-1").unwrap().is_correct, Some(false));
    }

    #[test]
    fn stale_completions_are_ignored() {
        let mut s = loaded(2, QuizMode::Standard, SessionConfig::default());
        s.select_option("q-0", 0).unwrap();
        let ticket = s.begin_check("q-0").unwrap();
        s.restart();
        assert!(!s.complete_check::<String>(&ticket, Ok(verdict("q-0", true))));
        assert_eq!(s.record("q-0").unwrap(), &AnswerRecord::new(question(0)));

        s.select_option("q-1", 0).unwrap();
        let plan = s.begin_finish().unwrap();
        s.reset();
        assert!(s.complete_finish(&plan, &grade_all(&plan)).is_none());
        assert!(s.questions().is_empty());
        assert!(!s.has_submitted());
    }

    #[test]
    fn check_in_flight_during_finish_defers_to_batch() {
        let mut s = loaded(1, QuizMode::Standard, SessionConfig::default());
        s.select_option("q-0", 0).unwrap();
        let ticket = s.begin_check("q-0").unwrap();
        let plan = s.begin_finish().unwrap();
        assert!(plan.answered.contains("q-0"));
        assert!(!s.complete_check::<String>(&ticket, Ok(verdict("q-0", false))));
        let r = s.complete_finish(&plan, &grade_all(&plan)).unwrap();
        assert_eq!(r.correct_count, 1);
    }

    #[test]
    fn selection_is_blocked_while_locked() {
        let mut s = loaded(2, QuizMode::Standard, SessionConfig::default());
        assert_eq!(
            s.select_option("q-0", 3).unwrap_err(),
            SessionError::OptionOutOfRange { index: 3, len: 3 }
        );
        assert_eq!(
            s.select_option("nope", 0).unwrap_err(),
            SessionError::UnknownQuestion("nope".into())
        );
        s.select_option("q-0", 0).unwrap();
        s.select_option("q-0", 2).unwrap();
        assert_eq!(s.record("q-0").unwrap().user_selected_option_index, Some(2));

        let plan = s.begin_finish().unwrap();
        assert_eq!(s.select_option("q-1", 0).unwrap_err(), SessionError::Finishing);
        s.complete_finish(&plan, &grade_all(&plan)).unwrap();
        assert_eq!(s.select_option("q-1", 0).unwrap_err(), SessionError::Locked);
        assert_eq!(s.begin_check("q-0").unwrap_err(), SessionError::Locked);
    }

    #[test]
    fn challenge_expiry_forces_finish() {
        let config = SessionConfig {
            challenge_seconds: 3,
            ..SessionConfig::default()
        };
        let mut s = loaded(60, QuizMode::Challenge, config);
        assert_eq!(s.questions().len(), 50);
        for i in 0..5 {
            s.select_option(&format!("q-{}", i), 0).unwrap();
        }
        assert_eq!(s.begin_check("q-0").unwrap_err(), SessionError::WrongMode("challenge"));

        assert_eq!(s.tick(), TickOutcome::Ticked(2));
        assert_eq!(s.tick(), TickOutcome::Ticked(1));
        assert_eq!(s.tick(), TickOutcome::Expired);
        assert!(s.is_time_expired());
        assert_eq!(s.tick(), TickOutcome::Inactive);
        assert_eq!(s.time_left(), 0);

        assert_eq!(s.select_option("q-10", 0).unwrap_err(), SessionError::TimeExpired);
        let intent = s.finish_intent().unwrap();
        match &intent {
            FinishIntent::Forced { unanswered } => assert_eq!(unanswered.len(), 45),
            other => panic!("expected forced finish, got {:?}", other),
        }

        let plan = s.begin_finish().unwrap();
        assert_eq!(plan.answered.len(), 5);
        let r = s.complete_finish(&plan, &grade_all(&plan)).unwrap();
        assert_eq!(r.total, 50);
        assert_eq!(r.skipped_count, 45);
        assert_eq!(r.correct_count, 5);
        assert_eq!(r.score, 10.0);
    }

    #[test]
    fn countdown_pauses_while_finishing_and_ignores_standard_mode() {
        let mut standard = loaded(2, QuizMode::Standard, SessionConfig::default());
        assert_eq!(standard.tick(), TickOutcome::Inactive);

        let mut s = loaded(2, QuizMode::Challenge, SessionConfig::default());
        assert_eq!(s.tick(), TickOutcome::Ticked(7199));
        let plan = s.begin_finish().unwrap();
        assert_eq!(s.tick(), TickOutcome::Inactive);
        s.complete_finish(&plan, &grade_all(&plan)).unwrap();
        assert_eq!(s.tick(), TickOutcome::Inactive);
        assert_eq!(s.time_left(), 7199);

        let mut empty = QuizSession::new(SessionConfig::default());
        assert_eq!(empty.tick(), TickOutcome::Inactive);
    }

    #[test]
    fn intent_lists_unanswered_questions() {
        let s = loaded(2, QuizMode::Standard, SessionConfig::default());
        let intent = s.finish_intent().unwrap();
        assert_eq!(intent, FinishIntent::Confirm { unanswered: vec![0, 1] });

        let mut all = loaded(1, QuizMode::Standard, SessionConfig::default());
        all.select_option("q-0", 1).unwrap();
        assert_eq!(all.finish_intent().unwrap(), FinishIntent::Ready);
    }

    #[test]
    fn restart_keeps_questions_and_rearms_timer() {
        let config = SessionConfig {
            challenge_seconds: 2,
            ..SessionConfig::default()
        };
        let mut s = loaded(3, QuizMode::Challenge, config);
        let before: Vec<Question> = s.questions().iter().map(|r| r.question.clone()).collect();
        s.select_option("q-1", 2).unwrap();
        s.tick();
        s.tick();
        assert!(s.is_time_expired());
        let plan = s.begin_finish().unwrap();
        s.complete_finish(&plan, &grade_all(&plan)).unwrap();
        let generation = s.generation();

        s.restart();
        assert!(s.generation() > generation);
        assert!(!s.has_submitted());
        assert!(!s.is_time_expired());
        assert!(s.result().is_none());
        assert_eq!(s.time_left(), 2);
        let after: Vec<Question> = s.questions().iter().map(|r| r.question.clone()).collect();
        assert_eq!(before, after);
        assert!(s
            .questions()
            .iter()
            .all(|r| *r == AnswerRecord::new(r.question.clone())));
        assert_eq!(s.tick(), TickOutcome::Ticked(1));
    }

    #[test]
    fn reset_and_reload() {
        let mut s = loaded(2, QuizMode::Standard, SessionConfig::default());
        assert_eq!(
            s.load(vec![question(9)], QuizMode::Standard).unwrap_err(),
            SessionError::AlreadyLoaded
        );
        s.reset();
        assert!(s.questions().is_empty());
        assert_eq!(s.finish_intent().unwrap_err(), SessionError::Empty);
        assert_eq!(s.begin_finish().unwrap_err(), SessionError::Empty);

        assert_eq!(s.load(vec![question(9)], QuizMode::Challenge).unwrap(), 1);
        assert_eq!(s.mode(), QuizMode::Challenge);
        assert!(s.record("q-9").is_some());
    }

    #[test]
    fn view_projects_state() {
        let mut s = loaded(2, QuizMode::Challenge, SessionConfig::default());
        s.select_option("q-0", 1).unwrap();
        let value = serde_json::to_value(s.view()).unwrap();
        assert_eq!(value["mode"], "challenge");
        assert_eq!(value["questionCount"], 2);
        assert_eq!(value["timeLeft"], 7200);
        assert_eq!(value["questions"][0]["userSelectedOptionIndex"], 1);
        assert!(value["result"].is_null());
    }
}

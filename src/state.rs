use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::grader::{grade_plan, GradingClient};
use crate::models::{AnswerRecord, QuizMode, QuizResult};
use crate::parser::parse_quiz_text;
use crate::session::{FinishIntent, QuizSession, TickOutcome};
use crate::ws_protocol::{self as ws, WsEnvelope};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct SessionSlot {
    pub session: RwLock<QuizSession>,
    pub events: broadcast::Sender<WsEnvelope>,
}

impl SessionSlot {
    fn new(session: QuizSession) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            session: RwLock::new(session),
            events,
        }
    }

    pub fn publish(&self, envelope: WsEnvelope) {
        // nobody listening is fine
        let _ = self.events.send(envelope);
    }

    fn publish_record(&self, record: &AnswerRecord) {
        self.publish(WsEnvelope::new(ws::EVENT_QUESTION_UPDATED, json!({ "question": record })));
    }
}

#[derive(Debug, Clone)]
pub enum FinishOutcome {
    Finished(QuizResult),
    /// Unanswered questions remain and the caller has not confirmed.
    NeedsConfirmation(Vec<usize>),
    /// The session was restarted or reset while grading was in flight.
    Superseded,
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<DashMap<String, Arc<SessionSlot>>>,
    pub grader: Arc<dyn GradingClient>,
    pub config: SessionConfig,
}

impl AppState {
    pub fn new(grader: Arc<dyn GradingClient>, config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            grader,
            config,
        }
    }

    pub fn slot(&self, id: &str) -> Option<Arc<SessionSlot>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Parses `text` into a new session. Text without any usable poll is refused.
    pub async fn create_session(&self, text: &str, mode: QuizMode) -> Result<(String, usize), SessionError> {
        let questions = parse_quiz_text(text);
        if questions.is_empty() {
            return Err(SessionError::Empty);
        }
        let mut session = QuizSession::new(self.config);
        let count = session.load(questions, mode)?;
        let generation = session.generation();

        let id = uuid::Uuid::new_v4().to_string();
        let slot = Arc::new(SessionSlot::new(session));
        self.sessions.insert(id.clone(), slot.clone());
        if mode == QuizMode::Challenge {
            spawn_countdown(&slot, generation);
        }
        info!(session = %id, questions = count, "session created");
        Ok((id, count))
    }

    /// Loads new text into a session that has been reset.
    pub async fn load(&self, slot: &Arc<SessionSlot>, text: &str, mode: QuizMode) -> Result<usize, SessionError> {
        let questions = parse_quiz_text(text);
        if questions.is_empty() {
            return Err(SessionError::Empty);
        }
        let mut session = slot.session.write().await;
        let count = session.load(questions, mode)?;
        if mode == QuizMode::Challenge {
            spawn_countdown(slot, session.generation());
        }
        slot.publish(WsEnvelope::new(ws::EVENT_LOADED, json!({ "mode": mode, "questionCount": count })));
        Ok(count)
    }

    pub async fn select_option(
        &self,
        slot: &SessionSlot,
        question_id: &str,
        option_index: usize,
    ) -> Result<AnswerRecord, SessionError> {
        let mut session = slot.session.write().await;
        session.select_option(question_id, option_index)?;
        let record = session
            .record(question_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
        slot.publish_record(&record);
        Ok(record)
    }

    /// Grades one question immediately. A grading failure is not an error here:
    /// the record comes back in `error` status and may be retried.
    pub async fn check_answer(&self, slot: &Arc<SessionSlot>, question_id: &str) -> Result<AnswerRecord, SessionError> {
        let ticket = {
            let mut session = slot.session.write().await;
            let ticket = session.begin_check(question_id)?;
            if let Some(record) = session.record(question_id) {
                slot.publish_record(record);
            }
            ticket
        };
        let pending = self
            .grader
            .validate_one(&ticket.question, ticket.selected_option_index);

        // Completion is detached from the caller: a dropped request must not leave
        // the question in `validating`.
        let slot = slot.clone();
        let question_id = question_id.to_string();
        let task = tokio::spawn(async move {
            let outcome = pending.await;
            let mut session = slot.session.write().await;
            let applied = session.complete_check(&ticket, outcome);
            let record = session
                .record(&question_id)
                .cloned()
                .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))?;
            if applied {
                slot.publish_record(&record);
            }
            Ok::<_, SessionError>(record)
        });
        joined(task).await?
    }

    pub async fn finish_intent(&self, slot: &SessionSlot) -> Result<FinishIntent, SessionError> {
        slot.session.read().await.finish_intent()
    }

    /// Runs the finish workflow. Unconfirmed finishes with unanswered questions are
    /// refused unless the countdown has expired.
    pub async fn finish(&self, slot: &Arc<SessionSlot>, confirmed: bool) -> Result<FinishOutcome, SessionError> {
        let plan = {
            let mut session = slot.session.write().await;
            match session.finish_intent()? {
                FinishIntent::Confirm { unanswered } if !confirmed => {
                    return Ok(FinishOutcome::NeedsConfirmation(unanswered));
                }
                _ => {}
            }
            session.begin_finish()?
        };
        slot.publish(WsEnvelope::new(
            ws::EVENT_FINISHING,
            json!({ "answered": plan.answered.len(), "skipped": plan.skipped.len(), "batches": plan.batches.len() }),
        ));

        // Once begun, a finish always runs to `submitted` (or is superseded), even if
        // the caller goes away.
        let grader = self.grader.clone();
        let slot = slot.clone();
        let task = tokio::spawn(async move {
            let results = grade_plan(grader.as_ref(), &plan).await;
            let mut session = slot.session.write().await;
            match session.complete_finish(&plan, &results) {
                Some(result) => {
                    slot.publish(WsEnvelope::new(ws::EVENT_FINISHED, json!({ "result": result })));
                    FinishOutcome::Finished(result)
                }
                None => FinishOutcome::Superseded,
            }
        });
        joined(task).await
    }

    pub async fn restart(&self, slot: &Arc<SessionSlot>) {
        let mut session = slot.session.write().await;
        session.restart();
        if session.mode() == QuizMode::Challenge && !session.questions().is_empty() {
            spawn_countdown(slot, session.generation());
        }
        slot.publish(WsEnvelope::new(ws::EVENT_RESTARTED, json!({ "session": session.view() })));
    }

    pub async fn reset(&self, slot: &SessionSlot) {
        slot.session.write().await.reset();
        slot.publish(WsEnvelope::new(ws::EVENT_RESET, json!({})));
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }
}

async fn joined<T>(task: JoinHandle<T>) -> Result<T, SessionError> {
    task.await.map_err(|err| {
        error!(error = %err, "grading task failed");
        SessionError::Interrupted
    })
}

/// Drives the one-second countdown for the given session generation. The task ends on
/// expiry, submission, a generation change, or when the session is dropped.
fn spawn_countdown(slot: &Arc<SessionSlot>, generation: u64) {
    let slot = Arc::downgrade(slot);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(slot) = slot.upgrade() else {
                break;
            };
            let mut session = slot.session.write().await;
            if session.generation() != generation {
                break;
            }
            match session.tick() {
                TickOutcome::Ticked(time_left) => {
                    slot.publish(WsEnvelope::new(ws::EVENT_TICK, json!({ "timeLeft": time_left })));
                }
                TickOutcome::Expired => {
                    let unanswered = session.unanswered_indices();
                    slot.publish(WsEnvelope::new(
                        ws::EVENT_TIME_EXPIRED,
                        json!({ "timeLeft": 0, "unanswered": unanswered }),
                    ));
                    break;
                }
                TickOutcome::Inactive if session.has_submitted() => break,
                TickOutcome::Inactive => {}
            }
        }
        debug!(generation, "countdown stopped");
    });
}

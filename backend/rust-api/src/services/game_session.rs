//! One team's game: the active question set plus per-question runtime state.
//!
//! Everything here is synchronous and side-effect free. The async orchestrator
//! in `game_service` drives it, runs the query executor between
//! [`GameSession::begin_submission`] and [`GameSession::complete_submission`],
//! and persists snapshots afterwards.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::attempt_tracker;
use super::query_executor::QueryError;
use super::result_validator;
use crate::models::game::{
    GameStats, QuestionOutcome, QuestionSummary, QuestionView, SessionSummary, SessionView,
    SubmissionResponse,
};
use crate::models::query::{ActualResult, QueryRows};
use crate::models::session::{QuestionPhase, QuestionRuntimeState, SessionSnapshot, Verdict};
use crate::models::{Question, QuestionId, QuestionSet};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Team not established; enter a team name first")]
    TeamRequired,
    #[error("Question {0} is not part of the active set")]
    UnknownQuestion(QuestionId),
    #[error("Question {0} is already solved")]
    QuestionSolved(QuestionId),
    #[error("Question {0} is locked: no attempts remaining")]
    QuestionLocked(QuestionId),
    #[error("A query for question {0} is already running")]
    SubmissionInFlight(QuestionId),
    #[error("Query cannot be empty")]
    EmptyQuery,
    #[error("Session changed while the query was running")]
    StaleSubmission,
}

/// Ticket handed out by [`GameSession::begin_submission`]; the question stays
/// in its loading state until the ticket is completed.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub session_id: Uuid,
    pub question_id: QuestionId,
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct GameSession {
    session_id: Uuid,
    team_id: String,
    set: Arc<QuestionSet>,
    selected_question: Option<QuestionId>,
    questions: BTreeMap<QuestionId, QuestionRuntimeState>,
    finished: bool,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GameSession {
    pub fn new(team_id: impl Into<String>, set: Arc<QuestionSet>) -> Self {
        let now = Utc::now();
        let questions = set
            .questions
            .iter()
            .map(|q| (q.id, QuestionRuntimeState::default()))
            .collect();

        Self {
            session_id: Uuid::new_v4(),
            team_id: team_id.into(),
            selected_question: set.first_question_id(),
            set,
            questions,
            finished: false,
            started_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a session from its cached snapshot. State for questions that
    /// are no longer in the set is dropped; new questions start fresh.
    pub fn restore(snapshot: SessionSnapshot, set: Arc<QuestionSet>) -> Self {
        let mut saved = snapshot.questions;
        let questions = set
            .questions
            .iter()
            .map(|q| {
                let mut state = saved.remove(&q.id).unwrap_or_default();
                state.loading = false;
                (q.id, state)
            })
            .collect();

        let selected_question = snapshot
            .selected_question
            .filter(|id| set.question(*id).is_some())
            .or_else(|| set.first_question_id());

        Self {
            session_id: snapshot.session_id,
            team_id: snapshot.team_id,
            set,
            selected_question,
            questions,
            finished: snapshot.finished,
            started_at: snapshot.started_at,
            updated_at: snapshot.updated_at,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            team_id: self.team_id.clone(),
            set_id: self.set.id.clone(),
            selected_question: self.selected_question,
            questions: self.questions.clone(),
            finished: self.finished,
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn question_set(&self) -> &QuestionSet {
        &self.set
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn selected_question(&self) -> Option<QuestionId> {
        self.selected_question
    }

    pub fn state(&self, id: QuestionId) -> Option<&QuestionRuntimeState> {
        self.questions.get(&id)
    }

    fn question_and_state(
        &self,
        id: QuestionId,
    ) -> Result<(&Question, &QuestionRuntimeState), GameError> {
        let question = self.set.question(id).ok_or(GameError::UnknownQuestion(id))?;
        let state = self
            .questions
            .get(&id)
            .ok_or(GameError::UnknownQuestion(id))?;
        Ok((question, state))
    }

    pub fn phase(&self, id: QuestionId) -> Option<QuestionPhase> {
        let (question, state) = self.question_and_state(id).ok()?;
        Some(attempt_tracker::phase(state, question.ceiling()))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Focus change only.
    pub fn select_question(&mut self, id: QuestionId) -> Result<(), GameError> {
        self.question_and_state(id)?;
        self.selected_question = Some(id);
        self.touch();
        Ok(())
    }

    /// Checks every precondition for a submission and marks the question as
    /// loading. Rejections leave the session untouched.
    pub fn begin_submission(
        &mut self,
        id: QuestionId,
        query: &str,
    ) -> Result<PendingSubmission, GameError> {
        let (question, state) = self.question_and_state(id)?;

        if query.trim().is_empty() {
            return Err(GameError::EmptyQuery);
        }
        if state.is_solved() {
            return Err(GameError::QuestionSolved(id));
        }
        if attempt_tracker::is_locked(state, question.ceiling()) {
            return Err(GameError::QuestionLocked(id));
        }
        if state.loading {
            return Err(GameError::SubmissionInFlight(id));
        }

        if let Some(state) = self.questions.get_mut(&id) {
            state.loading = true;
        }

        Ok(PendingSubmission {
            session_id: self.session_id,
            question_id: id,
            query: query.to_string(),
        })
    }

    /// Applies the executor's answer to the question in one transition:
    /// verdict, diagnostic, attempt count, last query and last result.
    pub fn complete_submission(
        &mut self,
        pending: &PendingSubmission,
        outcome: Result<QueryRows, QueryError>,
    ) -> Result<SubmissionResponse, GameError> {
        if pending.session_id != self.session_id {
            return Err(GameError::StaleSubmission);
        }

        let id = pending.question_id;
        let question = self
            .set
            .question(id)
            .ok_or(GameError::UnknownQuestion(id))?;
        let ceiling = question.ceiling();

        let (verdict, diagnostic, result) = match outcome {
            Ok(rows) => {
                let result = ActualResult::Rows(rows.rows);
                let passed = result_validator::validate(Some(&result), &question.expected);
                let diagnostic = result_validator::diagnose(Some(&result), &question.expected);
                let verdict = if passed {
                    Verdict::Correct
                } else {
                    Verdict::Incorrect
                };
                (verdict, diagnostic, result)
            }
            Err(err) => {
                let message = err.to_string();
                (Verdict::Error, message.clone(), ActualResult::Error(message))
            }
        };

        let state = self
            .questions
            .get_mut(&id)
            .ok_or(GameError::UnknownQuestion(id))?;
        if !state.loading {
            return Err(GameError::StaleSubmission);
        }

        attempt_tracker::record_attempt(state, verdict);
        state.last_query = Some(pending.query.clone());
        state.last_result = Some(result.clone());
        state.diagnostic = Some(diagnostic.clone());
        state.loading = false;

        let response = SubmissionResponse {
            question_id: id,
            verdict,
            diagnostic: Some(diagnostic),
            attempts: state.attempts,
            remaining_attempts: attempt_tracker::remaining_attempts(state.attempts, ceiling),
            locked: attempt_tracker::is_locked(state, ceiling),
            result,
        };
        self.touch();
        Ok(response)
    }

    /// Drops the loading flag without recording anything. Used when a
    /// submission is abandoned before the executor was reached.
    pub fn abandon_submission(&mut self, pending: &PendingSubmission) {
        if pending.session_id != self.session_id {
            return;
        }
        if let Some(state) = self.questions.get_mut(&pending.question_id) {
            state.loading = false;
        }
    }

    pub fn toggle_hint(&mut self, id: QuestionId) -> Result<bool, GameError> {
        self.question_and_state(id)?;
        let state = self
            .questions
            .get_mut(&id)
            .ok_or(GameError::UnknownQuestion(id))?;
        state.hint_shown = !state.hint_shown;
        let shown = state.hint_shown;
        self.touch();
        Ok(shown)
    }

    /// Returns true when this call flipped the flag.
    pub fn finish(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.touch();
        true
    }

    fn phases(&self) -> impl Iterator<Item = QuestionPhase> + '_ {
        self.set.questions.iter().map(|q| {
            let state = self.questions.get(&q.id).cloned().unwrap_or_default();
            attempt_tracker::phase(&state, q.ceiling())
        })
    }

    /// Every question solved.
    pub fn is_completed(&self) -> bool {
        self.phases().all(|phase| phase == QuestionPhase::Solved)
    }

    /// Nothing left to play and at least one question locked.
    pub fn is_stalled(&self) -> bool {
        let mut any_locked = false;
        for phase in self.phases() {
            match phase {
                QuestionPhase::Locked => any_locked = true,
                QuestionPhase::Solved => {}
                QuestionPhase::New | QuestionPhase::Investigating => return false,
            }
        }
        any_locked
    }

    pub fn stats(&self) -> GameStats {
        compute_stats(&self.set, &self.questions)
    }

    pub fn summary(&self) -> SessionSummary {
        build_summary(&self.team_id, &self.set, &self.questions)
    }

    pub fn view(&self) -> SessionView {
        let questions = self
            .set
            .questions
            .iter()
            .map(|q| {
                let state = self.questions.get(&q.id).cloned().unwrap_or_default();
                let ceiling = q.ceiling();
                QuestionView {
                    id: q.id,
                    prompt: q.prompt.clone(),
                    tables: q.tables.clone(),
                    hint: state.hint_shown.then(|| q.hint.clone()),
                    hint_shown: state.hint_shown,
                    phase: attempt_tracker::phase(&state, ceiling),
                    verdict: state.verdict,
                    diagnostic: state.diagnostic.clone(),
                    last_query: state.last_query.clone(),
                    last_result: state.last_result.clone(),
                    attempts: state.attempts,
                    max_attempts: ceiling,
                    remaining_attempts: attempt_tracker::remaining_attempts(
                        state.attempts,
                        ceiling,
                    ),
                    attempts_message: attempt_tracker::attempts_message(state.attempts, ceiling),
                    loading: state.loading,
                }
            })
            .collect();

        SessionView {
            session_id: self.session_id,
            team_id: self.team_id.clone(),
            question_set: self.set.as_ref().into(),
            selected_question: self.selected_question,
            questions,
            finished: self.finished,
            completed: self.is_completed(),
            stalled: self.is_stalled(),
            stats: self.stats(),
            started_at: self.started_at,
        }
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_one_decimal((part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0))
}

pub fn compute_stats(
    set: &QuestionSet,
    questions: &BTreeMap<QuestionId, QuestionRuntimeState>,
) -> GameStats {
    let total_questions = set.questions.len() as u32;
    let mut correct_answers = 0u32;
    let mut total_attempts = 0u32;
    let mut blocked_questions = 0u32;

    for question in &set.questions {
        let Some(state) = questions.get(&question.id) else {
            continue;
        };
        total_attempts = total_attempts.saturating_add(state.attempts);
        if state.is_solved() {
            correct_answers += 1;
        } else if attempt_tracker::is_locked(state, question.ceiling()) {
            blocked_questions += 1;
        }
    }

    let average_attempts_per_question = if total_attempts > 0 && total_questions > 0 {
        round_one_decimal(total_attempts as f64 / total_questions as f64)
    } else {
        0.0
    };

    GameStats {
        total_questions,
        correct_answers,
        total_attempts,
        incorrect_attempts: total_attempts.saturating_sub(correct_answers),
        blocked_questions,
        average_attempts_per_question,
        success_rate: percentage(correct_answers, total_questions),
        efficiency: percentage(correct_answers, total_attempts),
    }
}

/// Final result for the results collector. Pure: sending it is the caller's job.
pub fn build_summary(
    team_id: &str,
    set: &QuestionSet,
    questions: &BTreeMap<QuestionId, QuestionRuntimeState>,
) -> SessionSummary {
    let stats = compute_stats(set, questions);
    let per_question = set
        .questions
        .iter()
        .map(|q| {
            let state = questions.get(&q.id).cloned().unwrap_or_default();
            QuestionSummary {
                id: q.id,
                question_text: q.prompt.clone(),
                question_hint: q.hint.clone(),
                expected_output: q.expected.clone(),
                status: if state.is_solved() {
                    QuestionOutcome::Correct
                } else {
                    QuestionOutcome::Wrong
                },
                attempts: state.attempts,
                show_hint: state.hint_shown,
            }
        })
        .collect();

    SessionSummary {
        team_name: team_id.to_string(),
        set_id: set.id.clone(),
        total_questions: stats.total_questions,
        score: stats.correct_answers,
        total_attempts: stats.total_attempts,
        success_rate: stats.success_rate,
        efficiency: stats.efficiency,
        questions: per_question,
    }
}

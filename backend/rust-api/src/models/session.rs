use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::query::ActualResult;
use super::QuestionId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[default]
    Unattempted,
    Correct,
    Incorrect,
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Unattempted => "unattempted",
            Verdict::Correct => "correct",
            Verdict::Incorrect => "incorrect",
            Verdict::Error => "error",
        }
    }
}

/// Lifecycle of one question. Derived from verdict and attempts, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionPhase {
    New,
    Investigating,
    Locked,
    Solved,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionRuntimeState {
    #[serde(default)]
    pub last_query: Option<String>,
    #[serde(default)]
    pub last_result: Option<ActualResult>,
    #[serde(default)]
    pub verdict: Verdict,
    #[serde(default)]
    pub diagnostic: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub hint_shown: bool,
    /// Set while a submission for this question is in flight. Never persisted.
    #[serde(skip)]
    pub loading: bool,
}

impl QuestionRuntimeState {
    pub fn is_solved(&self) -> bool {
        self.verdict == Verdict::Correct
    }
}

/// Cached form of a team's session, keyed by team identifier in the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub team_id: String,
    pub set_id: String,
    #[serde(default)]
    pub selected_question: Option<QuestionId>,
    #[serde(default)]
    pub questions: BTreeMap<QuestionId, QuestionRuntimeState>,
    #[serde(default)]
    pub finished: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

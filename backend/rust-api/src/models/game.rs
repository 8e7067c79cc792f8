use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::query::ActualResult;
use super::session::{QuestionPhase, Verdict};
use super::{QuestionId, QuestionSetInfo, Row};

#[derive(Debug, Deserialize, Validate)]
pub struct EstablishTeamRequest {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 64, message = "Team name must be 1-64 characters"))]
    pub team_id: String,
}

fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

#[derive(Debug, Deserialize)]
pub struct SubmitQueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    pub total_questions: u32,
    pub correct_answers: u32,
    pub total_attempts: u32,
    pub incorrect_attempts: u32,
    pub blocked_questions: u32,
    pub average_attempts_per_question: f64,
    pub success_rate: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionOutcome {
    Correct,
    Wrong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    pub id: QuestionId,
    pub question_text: String,
    pub question_hint: String,
    pub expected_output: Vec<Row>,
    pub status: QuestionOutcome,
    pub attempts: u32,
    pub show_hint: bool,
}

/// Final result posted to the results collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub team_name: String,
    pub set_id: String,
    pub total_questions: u32,
    pub score: u32,
    pub total_attempts: u32,
    pub success_rate: f64,
    pub efficiency: f64,
    pub questions: Vec<QuestionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub prompt: String,
    pub tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub hint_shown: bool,
    pub phase: QuestionPhase,
    pub verdict: Verdict,
    pub diagnostic: Option<String>,
    pub last_query: Option<String>,
    pub last_result: Option<ActualResult>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub remaining_attempts: u32,
    pub attempts_message: String,
    pub loading: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub team_id: String,
    pub question_set: QuestionSetInfo,
    pub selected_question: Option<QuestionId>,
    pub questions: Vec<QuestionView>,
    pub finished: bool,
    pub completed: bool,
    pub stalled: bool,
    pub stats: GameStats,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResponse {
    pub question_id: QuestionId,
    pub verdict: Verdict,
    pub diagnostic: Option<String>,
    pub attempts: u32,
    pub remaining_attempts: u32,
    pub locked: bool,
    pub result: ActualResult,
}

use serde::{Deserialize, Serialize};

pub mod game;
pub mod query;
pub mod session;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// A single result row: column name to scalar value, in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub type QuestionId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub hint: String,
    /// Rows are compared by position, so order matters here.
    pub expected: Vec<Row>,
    #[serde(default)]
    pub tables: Vec<String>,
    /// Attempt ceiling. Filled in by the question bank at load time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Question {
    pub fn ceiling(&self) -> u32 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub difficulty: String,
    pub questions: Vec<Question>,
}

impl QuestionSet {
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn first_question_id(&self) -> Option<QuestionId> {
        self.questions.first().map(|q| q.id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionSetInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub difficulty: String,
    pub question_count: usize,
}

impl From<&QuestionSet> for QuestionSetInfo {
    fn from(set: &QuestionSet) -> Self {
        Self {
            id: set.id.clone(),
            name: set.name.clone(),
            description: set.description.clone(),
            difficulty: set.difficulty.clone(),
            question_count: set.questions.len(),
        }
    }
}

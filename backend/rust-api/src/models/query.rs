use serde::{Deserialize, Serialize};

use super::Row;

#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    #[serde(default)]
    pub query: Option<serde_json::Value>,
}

/// Wire shape of the query execution endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteQueryResponse {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

impl ExecuteQueryResponse {
    pub fn rows(rows: QueryRows) -> Self {
        Self {
            success: true,
            data: serde_json::Value::Array(
                rows.rows.into_iter().map(serde_json::Value::Object).collect(),
            ),
            error: None,
            columns: Some(rows.columns),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Array(Vec::new()),
            error: Some(message.into()),
            columns: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    /// Taken from the first row; empty when no rows came back.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryRows {
    pub fn new(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self { columns, rows }
    }
}

/// What the executor handed back for a submission: rows or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualResult {
    Rows(Vec<Row>),
    Error(String),
}

impl ActualResult {
    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            ActualResult::Rows(rows) => Some(rows),
            ActualResult::Error(_) => None,
        }
    }
}

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use rusqlite::{types::ValueRef, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::metrics::{QUERIES_EXECUTED_TOTAL, QUERY_DURATION_SECONDS};
use crate::models::query::{ExecuteQueryResponse, QueryRows};
use crate::models::Row;

pub const DISALLOWED_OPERATION_MESSAGE: &str = "Only SELECT queries are allowed";

const SEED_SQL: &str = include_str!("../../data/seed.sql");

const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(5);

/// Virtual machine steps between deadline checks.
const PROGRESS_CHECK_INTERVAL: i32 = 1_000;

lazy_static! {
    static ref LEADING_KEYWORD: Regex = Regex::new(r"^\s*([A-Za-z]+)").unwrap();
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("Query cannot be empty")]
    EmptyQuery,
    #[error("{}", DISALLOWED_OPERATION_MESSAGE)]
    DisallowedOperation,
    #[error("{0}")]
    Execution(String),
    #[error("Execution Error: query did not finish within {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Network Error: {0}")]
    Network(String),
}

impl QueryError {
    pub fn label(&self) -> &'static str {
        match self {
            QueryError::EmptyQuery => "empty",
            QueryError::DisallowedOperation => "disallowed",
            QueryError::Execution(_) => "execution_error",
            QueryError::Timeout(_) => "timeout",
            QueryError::Network(_) => "network_error",
        }
    }
}

/// Runs a player's query against the fixed sample dataset.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> Result<QueryRows, QueryError>;

    /// Cheap reachability check used by `/health`.
    async fn ping(&self) -> Result<(), QueryError>;
}

/// Accepts only statements whose leading keyword is SELECT, in any case.
pub fn ensure_read_only(query: &str) -> Result<(), QueryError> {
    if query.trim().is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let keyword = LEADING_KEYWORD
        .captures(query)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str());

    match keyword {
        Some(keyword) if keyword.eq_ignore_ascii_case("select") => Ok(()),
        _ => Err(QueryError::DisallowedOperation),
    }
}

fn record_outcome<T>(started: Instant, result: &Result<T, QueryError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.label(),
    };
    QUERIES_EXECUTED_TOTAL.with_label_values(&[outcome]).inc();
    QUERY_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());
}

/// Handle to the embedded sample database.
///
/// Built once per process with [`SqliteExecutor::open`] and released with
/// [`SqliteExecutor::shutdown`]. The connection is switched to `query_only`
/// after seeding, so the engine refuses writes even if one slipped past
/// [`ensure_read_only`].
///
/// Every statement runs under a time limit counted from the moment it gets
/// the connection. A statement over the limit is interrupted by the engine,
/// so it cannot hold the shared connection past its own budget.
pub struct SqliteExecutor {
    conn: Arc<Mutex<Option<Connection>>>,
    time_limit: Duration,
}

impl SqliteExecutor {
    pub fn open(path: Option<&Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let conn = match path {
            Some(path) => Connection::open(path)
                .with_context(|| format!("Failed to open dataset at {}", path.display()))?,
            None => Connection::open_in_memory().context("Failed to open in-memory dataset")?,
        };

        conn.execute_batch(SEED_SQL)
            .context("Failed to seed sample dataset")?;
        conn.execute_batch("PRAGMA query_only = ON;")
            .context("Failed to switch dataset to read-only")?;

        tracing::info!(
            "Sample dataset ready ({})",
            path.map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string())
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            time_limit: DEFAULT_TIME_LIMIT,
        })
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::open(None)
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    fn run_with_deadline(
        conn: &Connection,
        query: &str,
        time_limit: Duration,
    ) -> Result<QueryRows, QueryError> {
        let deadline = Instant::now() + time_limit;
        conn.progress_handler(
            PROGRESS_CHECK_INTERVAL,
            Some(move || Instant::now() >= deadline),
        );
        let result = Self::run_blocking(conn, query);
        conn.progress_handler(0, None::<fn() -> bool>);

        match result {
            Err(QueryError::Execution(_)) if Instant::now() >= deadline => {
                tracing::warn!("Interrupted query after {:?}", time_limit);
                Err(QueryError::Timeout(time_limit))
            }
            other => other,
        }
    }

    /// Closes the connection. Later queries fail with an execution error.
    pub fn shutdown(&self) {
        let taken = match self.conn.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(conn) = taken {
            if let Err((_, e)) = conn.close() {
                tracing::warn!("Failed to close sample dataset cleanly: {}", e);
            } else {
                tracing::info!("Sample dataset closed");
            }
        }
    }

    fn run_blocking(conn: &Connection, query: &str) -> Result<QueryRows, QueryError> {
        let mut statement = conn
            .prepare(query)
            .map_err(|e| QueryError::Execution(e.to_string()))?;
        let column_names: Vec<String> = statement
            .column_names()
            .iter()
            .map(ToString::to_string)
            .collect();

        let mut rows = statement
            .query([])
            .map_err(|e| QueryError::Execution(e.to_string()))?;

        let mut result = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| QueryError::Execution(e.to_string()))?
        {
            let mut record = Row::new();
            for (index, name) in column_names.iter().enumerate() {
                let value = row
                    .get_ref(index)
                    .map_err(|e| QueryError::Execution(e.to_string()))?;
                record.insert(name.clone(), json_from_sql(value));
            }
            result.push(record);
        }

        Ok(QueryRows::new(result))
    }
}

fn json_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(general_purpose::STANDARD.encode(bytes)),
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute(&self, query: &str) -> Result<QueryRows, QueryError> {
        let started = Instant::now();
        let result = match ensure_read_only(query) {
            Err(e) => Err(e),
            Ok(()) => {
                let conn = self.conn.clone();
                let query = query.to_string();
                let time_limit = self.time_limit;
                tokio::task::spawn_blocking(move || {
                    let guard = conn
                        .lock()
                        .map_err(|_| QueryError::Execution("Dataset lock poisoned".to_string()))?;
                    match guard.as_ref() {
                        Some(conn) => Self::run_with_deadline(conn, &query, time_limit),
                        None => Err(QueryError::Execution("Dataset is closed".to_string())),
                    }
                })
                .await
                .unwrap_or_else(|e| Err(QueryError::Execution(format!("Query task failed: {}", e))))
            }
        };

        record_outcome(started, &result);
        result
    }

    async fn ping(&self) -> Result<(), QueryError> {
        self.execute("SELECT 1 AS ok").await.map(|_| ())
    }
}

/// Talks to a remote query execution endpoint speaking the
/// `{query} -> {success, data, error?, columns?}` contract.
pub struct HttpQueryExecutor {
    http_client: Client,
    url: String,
    timeout: Duration,
}

impl HttpQueryExecutor {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            http_client: Client::new(),
            url,
            timeout,
        }
    }

    fn rows_from_data(data: Value) -> Result<Vec<Row>, QueryError> {
        let Value::Array(items) = data else {
            return Err(QueryError::Execution("Result is not an array".to_string()));
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                _ => Err(QueryError::Execution(
                    "Result row is not an object".to_string(),
                )),
            })
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for HttpQueryExecutor {
    async fn execute(&self, query: &str) -> Result<QueryRows, QueryError> {
        let started = Instant::now();
        let result: Result<QueryRows, QueryError> = async {
            ensure_read_only(query)?;

            let response = self
                .http_client
                .post(&self.url)
                .json(&serde_json::json!({ "query": query }))
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| QueryError::Network(e.to_string()))?;

            if !response.status().is_success() {
                return Err(QueryError::Network(format!(
                    "HTTP error! status: {}",
                    response.status().as_u16()
                )));
            }

            let payload: ExecuteQueryResponse = response
                .json()
                .await
                .map_err(|e| QueryError::Network(e.to_string()))?;

            if !payload.success {
                let message = payload
                    .error
                    .unwrap_or_else(|| "Query execution failed".to_string());
                return Err(if message == DISALLOWED_OPERATION_MESSAGE {
                    QueryError::DisallowedOperation
                } else {
                    QueryError::Execution(message)
                });
            }

            Self::rows_from_data(payload.data).map(QueryRows::new)
        }
        .await;

        record_outcome(started, &result);
        result
    }

    async fn ping(&self) -> Result<(), QueryError> {
        self.execute("SELECT 1 AS ok").await.map(|_| ())
    }
}

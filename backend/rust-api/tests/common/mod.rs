#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use sqlquest_api::{
    config::Config,
    create_router,
    models::session::SessionSnapshot,
    services::{
        query_executor::{QueryExecutor, SqliteExecutor},
        question_bank::{QuestionBank, ScriptedRandom},
        result_reporter::ResultReporter,
        session_store::{InMemorySessionStore, PersistenceError, SessionStore},
        AppState,
    },
};

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

/// App backed by the seeded in-memory dataset and an in-memory session store.
/// Set selection always picks index `picks[n % len]`, starting with set1.
pub fn create_test_app() -> TestApp {
    create_test_app_with(Arc::new(InMemorySessionStore::new()), vec![0])
}

pub fn create_test_app_with(store: Arc<dyn SessionStore>, picks: Vec<usize>) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let config = Config {
        metrics_auth: Some("metrics:secret".to_string()),
        ..Config::default()
    };
    let executor: Arc<dyn QueryExecutor> =
        Arc::new(SqliteExecutor::in_memory().expect("Failed to seed test dataset"));
    let bank = Arc::new(QuestionBank::builtin(config.default_max_attempts).unwrap());

    let state = Arc::new(AppState::from_parts(
        config,
        executor,
        store,
        bank,
        Arc::new(ScriptedRandom::new(picks)),
        ResultReporter::disabled(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
    }
}

pub async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

pub async fn establish(app: &TestApp, team: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/teams",
        Some(serde_json::json!({ "team_id": team })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "establish failed: {}", body);
    body
}

pub async fn submit(app: &TestApp, team: &str, question: u32, query: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        &format!("/api/v1/teams/{}/questions/{}/submit", team, question),
        Some(serde_json::json!({ "query": query })),
    )
    .await
}

pub fn answer_query(item: &str) -> String {
    format!(
        "SELECT item_name FROM exorcism_items WHERE item_name = '{}'",
        item
    )
}

/// Session store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl SessionStore for FailingStore {
    async fn load(&self, _team_id: &str) -> Result<Option<SessionSnapshot>, PersistenceError> {
        Err(PersistenceError::Backend("store offline".to_string()))
    }

    async fn save(
        &self,
        _team_id: &str,
        _snapshot: &SessionSnapshot,
    ) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend("store offline".to_string()))
    }

    async fn clear(&self, _team_id: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend("store offline".to_string()))
    }

    async fn remember_team(&self, _team_id: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend("store offline".to_string()))
    }

    async fn forget_team(&self, _team_id: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend("store offline".to_string()))
    }

    async fn has_team(&self, _team_id: &str) -> Result<bool, PersistenceError> {
        Err(PersistenceError::Backend("store offline".to_string()))
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend("store offline".to_string()))
    }
}

//! Orchestrates team sessions: restores them from the session store, runs
//! submissions through the executor and persists every transition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::game_session::{GameError, GameSession, PendingSubmission};
use super::query_executor::{QueryError, QueryExecutor};
use super::question_bank::{QuestionBank, RandomSource};
use super::result_reporter::ResultReporter;
use super::session_store::SessionStore;
use crate::metrics::{
    HINTS_TOGGLED_TOTAL, PERSISTENCE_FAILURES_TOTAL, QUESTIONS_LOCKED_TOTAL, SESSIONS_ACTIVE,
    SESSIONS_TOTAL, SUBMISSIONS_TOTAL,
};
use crate::models::game::{SessionSummary, SessionView, SubmissionResponse};
use crate::models::query::QueryRows;
use crate::models::QuestionId;

type SessionHandle = Arc<Mutex<GameSession>>;

pub struct GameService {
    bank: Arc<QuestionBank>,
    executor: Arc<dyn QueryExecutor>,
    store: Arc<dyn SessionStore>,
    random: Arc<dyn RandomSource>,
    reporter: ResultReporter,
    query_timeout: Duration,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl GameService {
    pub fn new(
        bank: Arc<QuestionBank>,
        executor: Arc<dyn QueryExecutor>,
        store: Arc<dyn SessionStore>,
        random: Arc<dyn RandomSource>,
        reporter: ResultReporter,
        query_timeout: Duration,
    ) -> Self {
        Self {
            bank,
            executor,
            store,
            random,
            reporter,
            query_timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    /// Registers the team and returns its session, restoring the cached one
    /// when present.
    pub async fn establish_team(&self, team_id: &str) -> Result<SessionView, GameError> {
        let team_id = normalize_team(team_id)?;

        if let Err(e) = self.store.remember_team(team_id).await {
            tracing::warn!("Failed to register team {}: {}", team_id, e);
            PERSISTENCE_FAILURES_TOTAL
                .with_label_values(&["remember_team"])
                .inc();
        }

        let handle = self.session_handle(team_id, true).await?;
        let session = handle.lock().await;
        tracing::info!(
            "Team {} established on question set {}",
            team_id,
            session.question_set().id
        );
        SESSIONS_TOTAL.with_label_values(&["established"]).inc();
        Ok(session.view())
    }

    pub async fn session_view(&self, team_id: &str) -> Result<SessionView, GameError> {
        let handle = self.session_handle(normalize_team(team_id)?, false).await?;
        let session = handle.lock().await;
        Ok(session.view())
    }

    pub async fn select_question(
        &self,
        team_id: &str,
        question_id: QuestionId,
    ) -> Result<SessionView, GameError> {
        let handle = self.session_handle(normalize_team(team_id)?, false).await?;
        let mut session = handle.lock().await;
        session.select_question(question_id)?;
        self.persist(&session).await;
        Ok(session.view())
    }

    /// Runs `query` for the question and records the verdict. Rejected
    /// submissions (empty, solved, locked, already running) change nothing.
    ///
    /// Once accepted, the submission runs on its own task: if the caller goes
    /// away, the result is still applied when it arrives.
    pub async fn submit_query(
        self: &Arc<Self>,
        team_id: &str,
        question_id: QuestionId,
        query: &str,
    ) -> Result<SubmissionResponse, GameError> {
        let team_id = normalize_team(team_id)?.to_string();
        let handle = self.session_handle(&team_id, false).await?;

        let pending = {
            let mut session = handle.lock().await;
            match session.begin_submission(question_id, query) {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::info!(
                        "Submission for team {} question {} rejected: {}",
                        team_id,
                        question_id,
                        e
                    );
                    return Err(e);
                }
            }
        };

        tracing::info!(
            "Running query for team {} question {}",
            team_id,
            question_id
        );
        let task = {
            let service = Arc::clone(self);
            let handle = handle.clone();
            let pending = pending.clone();
            tokio::spawn(async move { service.apply_submission(&team_id, &handle, &pending).await })
        };

        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    "Submission task for question {} failed: {}",
                    question_id,
                    e
                );
                handle.lock().await.abandon_submission(&pending);
                Err(GameError::StaleSubmission)
            }
        }
    }

    async fn apply_submission(
        &self,
        team_id: &str,
        handle: &SessionHandle,
        pending: &PendingSubmission,
    ) -> Result<SubmissionResponse, GameError> {
        let question_id = pending.question_id;
        let outcome = self.run_query(&pending.query).await;

        let mut session = handle.lock().await;
        if !self.is_current(team_id, handle).await {
            tracing::info!(
                "Discarding result for team {} question {}: session was closed",
                team_id,
                question_id
            );
            session.abandon_submission(pending);
            return Err(GameError::StaleSubmission);
        }

        let response = match session.complete_submission(pending, outcome) {
            Ok(response) => response,
            Err(e) => {
                tracing::info!(
                    "Discarding result for team {} question {}: {}",
                    team_id,
                    question_id,
                    e
                );
                return Err(e);
            }
        };

        SUBMISSIONS_TOTAL
            .with_label_values(&[response.verdict.as_str()])
            .inc();
        if response.locked {
            QUESTIONS_LOCKED_TOTAL.inc();
            tracing::info!(
                "Question {} locked for team {} after {} attempts",
                question_id,
                team_id,
                response.attempts
            );
        }
        tracing::info!(
            "Team {} question {} verdict {} ({} attempts)",
            team_id,
            question_id,
            response.verdict.as_str(),
            response.attempts
        );

        self.persist(&session).await;
        Ok(response)
    }

    pub async fn toggle_hint(
        &self,
        team_id: &str,
        question_id: QuestionId,
    ) -> Result<SessionView, GameError> {
        let team_id = normalize_team(team_id)?;
        let handle = self.session_handle(team_id, false).await?;
        let mut session = handle.lock().await;
        let shown = session.toggle_hint(question_id)?;

        HINTS_TOGGLED_TOTAL
            .with_label_values(&[if shown { "true" } else { "false" }])
            .inc();
        tracing::info!(
            "Hint for team {} question {} {}",
            team_id,
            question_id,
            if shown { "shown" } else { "hidden" }
        );

        self.persist(&session).await;
        Ok(session.view())
    }

    /// Marks the session finished and hands the summary to the results
    /// collector the first time it finishes.
    pub async fn finish_session(&self, team_id: &str) -> Result<SessionSummary, GameError> {
        let team_id = normalize_team(team_id)?;
        let handle = self.session_handle(team_id, false).await?;
        let mut session = handle.lock().await;

        let newly_finished = session.finish();
        let summary = session.summary();

        if newly_finished {
            tracing::info!(
                "Team {} finished with {}/{} solved",
                team_id,
                summary.score,
                summary.total_questions
            );
            SESSIONS_TOTAL.with_label_values(&["finished"]).inc();
            self.reporter.submit(summary.clone());
            self.persist(&session).await;
        }

        Ok(summary)
    }

    pub async fn summary(&self, team_id: &str) -> Result<SessionSummary, GameError> {
        let handle = self.session_handle(normalize_team(team_id)?, false).await?;
        let session = handle.lock().await;
        Ok(session.summary())
    }

    /// Starts over on a freshly drawn set. In-flight submissions against the
    /// old session are discarded when they complete.
    pub async fn reset_session(&self, team_id: &str) -> Result<SessionView, GameError> {
        let team_id = normalize_team(team_id)?;
        let handle = self.session_handle(team_id, false).await?;
        let mut session = handle.lock().await;

        *session = GameSession::new(team_id, self.bank.pick_random(self.random.as_ref()));
        tracing::info!(
            "Team {} reset onto question set {}",
            team_id,
            session.question_set().id
        );
        SESSIONS_TOTAL.with_label_values(&["reset"]).inc();

        self.persist(&session).await;
        Ok(session.view())
    }

    /// Forgets the team entirely: memory, cached snapshot and registration.
    pub async fn logout(&self, team_id: &str) -> Result<(), GameError> {
        let team_id = normalize_team(team_id)?;

        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(team_id);
            SESSIONS_ACTIVE.set(sessions.len() as i64);
        }

        if let Err(e) = self.store.clear(team_id).await {
            tracing::warn!("Failed to clear cached session for team {}: {}", team_id, e);
            PERSISTENCE_FAILURES_TOTAL.with_label_values(&["clear"]).inc();
        }
        if let Err(e) = self.store.forget_team(team_id).await {
            tracing::warn!("Failed to forget team {}: {}", team_id, e);
            PERSISTENCE_FAILURES_TOTAL
                .with_label_values(&["forget_team"])
                .inc();
        }

        tracing::info!("Team {} logged out", team_id);
        SESSIONS_TOTAL.with_label_values(&["logout"]).inc();
        Ok(())
    }

    async fn run_query(&self, query: &str) -> Result<QueryRows, QueryError> {
        match tokio::time::timeout(self.query_timeout, self.executor.execute(query)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Query timed out after {:?}", self.query_timeout);
                Err(QueryError::Timeout(self.query_timeout))
            }
        }
    }

    async fn is_current(&self, team_id: &str, handle: &SessionHandle) -> bool {
        self.sessions
            .read()
            .await
            .get(team_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Memory first, then the cached snapshot, then a new session if the team
    /// is known (or `create` is set).
    async fn session_handle(&self, team_id: &str, create: bool) -> Result<SessionHandle, GameError> {
        if let Some(handle) = self.sessions.read().await.get(team_id) {
            return Ok(handle.clone());
        }

        let (session, fresh) = match self.restore(team_id).await {
            Some(session) => (session, false),
            None => {
                let known = create
                    || match self.store.has_team(team_id).await {
                        Ok(known) => known,
                        Err(e) => {
                            tracing::warn!("Team lookup failed for {}: {}", team_id, e);
                            false
                        }
                    };
                if !known {
                    return Err(GameError::TeamRequired);
                }

                let set = self.bank.pick_random(self.random.as_ref());
                (GameSession::new(team_id, set), true)
            }
        };

        let handle = {
            let mut sessions = self.sessions.write().await;
            // Another request may have resolved the same team meanwhile; its
            // session wins and ours is dropped unsaved.
            if let Some(existing) = sessions.get(team_id) {
                return Ok(existing.clone());
            }
            let handle = Arc::new(Mutex::new(session));
            sessions.insert(team_id.to_string(), handle.clone());
            SESSIONS_ACTIVE.set(sessions.len() as i64);
            handle
        };

        if fresh {
            let session = handle.lock().await;
            tracing::info!(
                "Starting new session for team {} on question set {}",
                team_id,
                session.question_set().id
            );
            SESSIONS_TOTAL.with_label_values(&["started"]).inc();
            self.persist(&session).await;
        }
        Ok(handle)
    }

    async fn restore(&self, team_id: &str) -> Option<GameSession> {
        let snapshot = match self.store.load(team_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to load cached session for team {}: {}", team_id, e);
                PERSISTENCE_FAILURES_TOTAL.with_label_values(&["load"]).inc();
                return None;
            }
        };

        match self.bank.get(&snapshot.set_id) {
            Some(set) => {
                tracing::info!(
                    "Restored cached session for team {} on question set {}",
                    team_id,
                    set.id
                );
                SESSIONS_TOTAL.with_label_values(&["restored"]).inc();
                Some(GameSession::restore(snapshot, set))
            }
            None => {
                tracing::warn!(
                    "Cached session for team {} references unknown question set {}",
                    team_id,
                    snapshot.set_id
                );
                None
            }
        }
    }

    async fn persist(&self, session: &GameSession) {
        let snapshot = session.snapshot();
        if let Err(e) = self.store.save(session.team_id(), &snapshot).await {
            tracing::warn!(
                "Failed to persist session for team {}: {}",
                session.team_id(),
                e
            );
            PERSISTENCE_FAILURES_TOTAL.with_label_values(&["save"]).inc();
        }
    }
}

fn normalize_team(team_id: &str) -> Result<&str, GameError> {
    let team_id = team_id.trim();
    if team_id.is_empty() {
        return Err(GameError::TeamRequired);
    }
    Ok(team_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::models::session::Verdict;
    use crate::services::query_executor::SqliteExecutor;
    use crate::services::question_bank::ScriptedRandom;
    use crate::services::session_store::InMemorySessionStore;

    struct SlowExecutor;

    #[async_trait]
    impl QueryExecutor for SlowExecutor {
        async fn execute(&self, _query: &str) -> Result<QueryRows, QueryError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(QueryRows::default())
        }

        async fn ping(&self) -> Result<(), QueryError> {
            Ok(())
        }
    }

    struct DelayedExecutor {
        delay: Duration,
        inner: SqliteExecutor,
    }

    #[async_trait]
    impl QueryExecutor for DelayedExecutor {
        async fn execute(&self, query: &str) -> Result<QueryRows, QueryError> {
            tokio::time::sleep(self.delay).await;
            self.inner.execute(query).await
        }

        async fn ping(&self) -> Result<(), QueryError> {
            Ok(())
        }
    }

    fn service_with(executor: Arc<dyn QueryExecutor>, timeout: Duration) -> Arc<GameService> {
        service_with_store(executor, timeout, Arc::new(InMemorySessionStore::new()))
    }

    fn service_with_store(
        executor: Arc<dyn QueryExecutor>,
        timeout: Duration,
        store: Arc<dyn SessionStore>,
    ) -> Arc<GameService> {
        Arc::new(GameService::new(
            Arc::new(QuestionBank::builtin(5).unwrap()),
            executor,
            store,
            Arc::new(ScriptedRandom::new(vec![0])),
            ResultReporter::disabled(),
            timeout,
        ))
    }

    const COCONUT_QUERY: &str = "SELECT item_name FROM exorcism_items WHERE id = 1";

    #[tokio::test]
    async fn unknown_team_needs_to_be_established_first() {
        let service = service_with(
            Arc::new(SqliteExecutor::in_memory().unwrap()),
            Duration::from_secs(5),
        );
        assert_eq!(
            service.session_view("ghosts").await.unwrap_err(),
            GameError::TeamRequired
        );

        let view = service.establish_team("ghosts").await.unwrap();
        assert_eq!(view.question_set.id, "set1");
        assert!(service.session_view("ghosts").await.is_ok());
    }

    #[tokio::test]
    async fn slow_query_times_out_as_an_error_attempt() {
        let service = service_with(Arc::new(SlowExecutor), Duration::from_millis(20));
        service.establish_team("ghosts").await.unwrap();

        let response = service
            .submit_query("ghosts", 1, "SELECT * FROM exorcism_items")
            .await
            .unwrap();
        assert_eq!(response.verdict, Verdict::Error);
        assert_eq!(response.attempts, 1);
        assert!(response
            .diagnostic
            .unwrap_or_default()
            .contains("did not finish within 20ms"));
    }

    #[tokio::test]
    async fn result_arriving_after_reset_is_discarded() {
        let service = service_with(Arc::new(SlowExecutor), Duration::from_millis(200));
        service.establish_team("ghosts").await.unwrap();

        let running = {
            let service = service.clone();
            tokio::spawn(async move { service.submit_query("ghosts", 1, "SELECT 1").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.reset_session("ghosts").await.unwrap();

        assert_eq!(
            running.await.unwrap().unwrap_err(),
            GameError::StaleSubmission
        );
        let view = service.session_view("ghosts").await.unwrap();
        assert!(view.questions.iter().all(|q| q.attempts == 0 && !q.loading));
    }

    #[tokio::test]
    async fn dropped_caller_still_gets_its_result_applied() {
        let executor = DelayedExecutor {
            delay: Duration::from_millis(150),
            inner: SqliteExecutor::in_memory().unwrap(),
        };
        let service = service_with(Arc::new(executor), Duration::from_secs(5));
        service.establish_team("ghosts").await.unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(30),
            service.submit_query("ghosts", 1, "SELECT item_name FROM exorcism_items WHERE id = 2"),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let view = service.session_view("ghosts").await.unwrap();
        assert!(!view.questions[0].loading);
        assert_eq!(view.questions[0].attempts, 1);
        assert_eq!(view.questions[0].verdict, Verdict::Incorrect);

        let response = service.submit_query("ghosts", 1, COCONUT_QUERY).await.unwrap();
        assert_eq!(response.verdict, Verdict::Correct);
    }

    #[tokio::test]
    async fn runaway_query_from_one_team_does_not_fail_another() {
        let executor = SqliteExecutor::in_memory()
            .unwrap()
            .with_time_limit(Duration::from_millis(150));
        let service = service_with(Arc::new(executor), Duration::from_millis(300));
        service.establish_team("slow").await.unwrap();
        service.establish_team("quick").await.unwrap();

        let runaway = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .submit_query(
                        "slow",
                        1,
                        "SELECT COUNT(*) AS n FROM exorcism_items a, exorcism_items b, \
                         exorcism_items c, exorcism_items d, exorcism_items e, exorcism_items f",
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let quick = service.submit_query("quick", 1, COCONUT_QUERY).await.unwrap();
        assert_eq!(quick.verdict, Verdict::Correct);

        let slow = runaway.await.unwrap().unwrap();
        assert_eq!(slow.verdict, Verdict::Error);
        assert_eq!(slow.attempts, 1);
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_one_persisted_session() {
        let store = Arc::new(InMemorySessionStore::new());
        store.remember_team("ghosts").await.unwrap();
        let service = service_with_store(
            Arc::new(SqliteExecutor::in_memory().unwrap()),
            Duration::from_secs(5),
            store.clone(),
        );

        let (first, second) = tokio::join!(
            service.session_view("ghosts"),
            service.session_view("ghosts")
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.session_id, second.session_id);

        let saved = store.load("ghosts").await.unwrap().unwrap();
        assert_eq!(saved.session_id, first.session_id);
        assert_eq!(saved.set_id, first.question_set.id);
    }
}

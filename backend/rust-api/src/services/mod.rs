use crate::config::Config;
use anyhow::Context;
use redis::aio::ConnectionManager;
use std::sync::Arc;

use game_service::GameService;
use query_executor::{HttpQueryExecutor, QueryExecutor, SqliteExecutor};
use question_bank::{QuestionBank, RandomSource, StdRandomSource};
use result_reporter::ResultReporter;
use session_store::{RedisSessionStore, SessionStore};

pub struct AppState {
    pub config: Config,
    pub executor: Arc<dyn QueryExecutor>,
    pub store: Arc<dyn SessionStore>,
    pub game: Arc<GameService>,
    sqlite: Option<Arc<SqliteExecutor>>,
}

impl AppState {
    pub async fn connect(config: Config, redis_client: redis::Client) -> anyhow::Result<Self> {
        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let store: Arc<dyn SessionStore> =
            Arc::new(RedisSessionStore::new(redis, config.session_ttl_seconds));

        let bank = match &config.question_sets_path {
            Some(path) => QuestionBank::load(path, config.default_max_attempts)?,
            None => QuestionBank::builtin(config.default_max_attempts)?,
        };

        let random: Arc<dyn RandomSource> = match config.rng_seed {
            Some(seed) => {
                tracing::info!("Question set selection seeded with {}", seed);
                Arc::new(StdRandomSource::seeded(seed))
            }
            None => Arc::new(StdRandomSource::from_entropy()),
        };

        let (executor, sqlite): (Arc<dyn QueryExecutor>, Option<Arc<SqliteExecutor>>) =
            match &config.executor_url {
                Some(url) => {
                    tracing::info!("Forwarding queries to {}", url);
                    let remote: Arc<dyn QueryExecutor> =
                        Arc::new(HttpQueryExecutor::new(url.clone(), config.query_timeout()));
                    (remote, None)
                }
                None => {
                    let sqlite = Arc::new(
                        SqliteExecutor::open(config.dataset_path.as_deref())
                            .context("Failed to prepare sample dataset")?
                            .with_time_limit(config.query_timeout()),
                    );
                    let local: Arc<dyn QueryExecutor> = sqlite.clone();
                    (local, Some(sqlite))
                }
            };

        let reporter = ResultReporter::new(config.results_collector_url.clone());
        if !reporter.is_enabled() {
            tracing::warn!("RESULTS_COLLECTOR_URL not set, final summaries will not be submitted");
        }

        let mut state = Self::from_parts(config, executor, store, Arc::new(bank), random, reporter);
        state.sqlite = sqlite;
        Ok(state)
    }

    /// Wires a state from ready-made collaborators. Tests use this with the
    /// in-memory store and a scripted random source.
    pub fn from_parts(
        config: Config,
        executor: Arc<dyn QueryExecutor>,
        store: Arc<dyn SessionStore>,
        bank: Arc<QuestionBank>,
        random: Arc<dyn RandomSource>,
        reporter: ResultReporter,
    ) -> Self {
        let game = Arc::new(GameService::new(
            bank,
            executor.clone(),
            store.clone(),
            random,
            reporter,
            config.query_deadline(),
        ));

        Self {
            config,
            executor,
            store,
            game,
            sqlite: None,
        }
    }

    /// Releases the embedded dataset, if this process owns one.
    pub fn shutdown(&self) {
        if let Some(sqlite) = &self.sqlite {
            sqlite.shutdown();
        }
    }
}

pub mod attempt_tracker;
pub mod game_service;
pub mod game_session;
pub mod query_executor;
pub mod question_bank;
pub mod result_reporter;
pub mod result_validator;
pub mod session_store;

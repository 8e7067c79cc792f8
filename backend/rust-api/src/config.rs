use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::models::DEFAULT_MAX_ATTEMPTS;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8081";
const DEFAULT_REDIS_URI: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub redis_uri: String,
    /// SQLite file holding the sample dataset. `None` seeds an in-memory database.
    pub dataset_path: Option<PathBuf>,
    /// Remote query endpoint. When set, queries are forwarded instead of run locally.
    pub executor_url: Option<String>,
    pub question_sets_path: Option<PathBuf>,
    pub query_timeout_ms: u64,
    pub session_ttl_seconds: u64,
    pub default_max_attempts: u32,
    pub rng_seed: Option<u64>,
    pub results_collector_url: Option<String>,
    /// `user:password` for `/metrics`.
    pub metrics_auth: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            redis_uri: DEFAULT_REDIS_URI.to_string(),
            dataset_path: None,
            executor_url: None,
            question_sets_path: None,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
            rng_seed: None,
            results_collector_url: None,
            metrics_auth: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + ENV overrides (prefix: APP_)
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let string_setting = |key: &str, legacy: &str| -> Option<String> {
            settings
                .get_string(key)
                .or_else(|_| env::var(legacy))
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr =
            string_setting("server.bind_addr", "BIND_ADDR").unwrap_or(defaults.bind_addr);
        let redis_uri = string_setting("redis.uri", "REDIS_URI").unwrap_or(defaults.redis_uri);

        let dataset_path = string_setting("dataset.path", "DATASET_PATH").map(PathBuf::from);
        let executor_url = string_setting("executor.url", "QUERY_EXECUTOR_URL");
        let question_sets_path =
            string_setting("questions.path", "QUESTION_SETS_PATH").map(PathBuf::from);

        let query_timeout_ms = parse_or_default(
            "game.query_timeout_ms",
            string_setting("game.query_timeout_ms", "QUERY_TIMEOUT_MS"),
            defaults.query_timeout_ms,
        );
        let session_ttl_seconds = parse_or_default(
            "game.session_ttl_seconds",
            string_setting("game.session_ttl_seconds", "SESSION_TTL_SECONDS"),
            defaults.session_ttl_seconds,
        );
        let default_max_attempts = parse_or_default(
            "game.default_max_attempts",
            string_setting("game.default_max_attempts", "DEFAULT_MAX_ATTEMPTS"),
            defaults.default_max_attempts,
        );
        let rng_seed = string_setting("game.rng_seed", "RNG_SEED").and_then(|raw| {
            raw.parse::<u64>()
                .map_err(|_| tracing::warn!("Ignoring invalid game.rng_seed: {}", raw))
                .ok()
        });

        let results_collector_url =
            string_setting("results.collector_url", "RESULTS_COLLECTOR_URL");
        let metrics_auth = string_setting("metrics.auth", "METRICS_AUTH");

        Ok(Config {
            bind_addr,
            redis_uri,
            dataset_path,
            executor_url,
            question_sets_path,
            query_timeout_ms,
            session_ttl_seconds,
            default_max_attempts,
            rng_seed,
            results_collector_url,
            metrics_auth,
        })
    }

    /// Time a single statement may run once it reaches the dataset.
    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.query_timeout_ms)
    }

    /// Wall-clock bound on one executor call. Leaves room for queueing
    /// behind another statement on the shared dataset.
    pub fn query_deadline(&self) -> std::time::Duration {
        self.query_timeout() * 2
    }
}

fn parse_or_default<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default + Copy,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
            default
        }
    }
}

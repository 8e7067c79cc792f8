use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::metrics::track_cache_operation;
use crate::models::session::SessionSnapshot;

const SESSION_KEY_PREFIX: &str = "sqlquest:session:";
const TEAMS_KEY: &str = "sqlquest:teams";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("session store backend failed: {0}")]
    Backend(String),
    #[error("session snapshot could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for PersistenceError {
    fn from(err: redis::RedisError) -> Self {
        PersistenceError::Backend(err.to_string())
    }
}

/// Client-side cache of session snapshots, keyed by team identifier.
///
/// Team registration is tracked separately from the snapshot: clearing a
/// team's session keeps the team known, forgetting the team does not touch
/// its snapshot.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, team_id: &str) -> Result<Option<SessionSnapshot>, PersistenceError>;
    async fn save(&self, team_id: &str, snapshot: &SessionSnapshot)
        -> Result<(), PersistenceError>;
    async fn clear(&self, team_id: &str) -> Result<(), PersistenceError>;

    async fn remember_team(&self, team_id: &str) -> Result<(), PersistenceError>;
    async fn forget_team(&self, team_id: &str) -> Result<(), PersistenceError>;
    async fn has_team(&self, team_id: &str) -> Result<bool, PersistenceError>;

    async fn ping(&self) -> Result<(), PersistenceError>;
}

pub struct RedisSessionStore {
    redis: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    fn session_key(team_id: &str) -> String {
        format!("{}{}", SESSION_KEY_PREFIX, team_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, team_id: &str) -> Result<Option<SessionSnapshot>, PersistenceError> {
        let mut conn = self.redis.clone();
        let key = Self::session_key(team_id);

        let raw: Option<String> = track_cache_operation("get", async {
            redis::cmd("GET").arg(&key).query_async(&mut conn).await
        })
        .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        team_id: &str,
        snapshot: &SessionSnapshot,
    ) -> Result<(), PersistenceError> {
        let mut conn = self.redis.clone();
        let key = Self::session_key(team_id);
        let json = serde_json::to_string(snapshot)?;

        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(&key)
                .arg(self.ttl_seconds)
                .arg(json)
                .query_async::<()>(&mut conn)
                .await
        })
        .await?;

        Ok(())
    }

    async fn clear(&self, team_id: &str) -> Result<(), PersistenceError> {
        let mut conn = self.redis.clone();
        let key = Self::session_key(team_id);

        track_cache_operation("del", async {
            redis::cmd("DEL")
                .arg(&key)
                .query_async::<()>(&mut conn)
                .await
        })
        .await?;

        Ok(())
    }

    async fn remember_team(&self, team_id: &str) -> Result<(), PersistenceError> {
        let mut conn = self.redis.clone();
        track_cache_operation("sadd", async {
            redis::cmd("SADD")
                .arg(TEAMS_KEY)
                .arg(team_id)
                .query_async::<()>(&mut conn)
                .await
        })
        .await?;
        Ok(())
    }

    async fn forget_team(&self, team_id: &str) -> Result<(), PersistenceError> {
        let mut conn = self.redis.clone();
        track_cache_operation("srem", async {
            redis::cmd("SREM")
                .arg(TEAMS_KEY)
                .arg(team_id)
                .query_async::<()>(&mut conn)
                .await
        })
        .await?;
        Ok(())
    }

    async fn has_team(&self, team_id: &str) -> Result<bool, PersistenceError> {
        let mut conn = self.redis.clone();
        let known: bool = track_cache_operation("sismember", async {
            redis::cmd("SISMEMBER")
                .arg(TEAMS_KEY)
                .arg(team_id)
                .query_async(&mut conn)
                .await
        })
        .await?;
        Ok(known)
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        let mut conn = self.redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_millis(500),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| PersistenceError::Backend("Redis timeout after 500ms".to_string()))??;
        Ok(())
    }
}

/// Process-local store. Used by tests and when running without Redis.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, String>>,
    teams: RwLock<HashSet<String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, team_id: &str) -> Result<Option<SessionSnapshot>, PersistenceError> {
        let sessions = self.sessions.read().await;
        match sessions.get(team_id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        team_id: &str,
        snapshot: &SessionSnapshot,
    ) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(snapshot)?;
        self.sessions
            .write()
            .await
            .insert(team_id.to_string(), json);
        Ok(())
    }

    async fn clear(&self, team_id: &str) -> Result<(), PersistenceError> {
        self.sessions.write().await.remove(team_id);
        Ok(())
    }

    async fn remember_team(&self, team_id: &str) -> Result<(), PersistenceError> {
        self.teams.write().await.insert(team_id.to_string());
        Ok(())
    }

    async fn forget_team(&self, team_id: &str) -> Result<(), PersistenceError> {
        self.teams.write().await.remove(team_id);
        Ok(())
    }

    async fn has_team(&self, team_id: &str) -> Result<bool, PersistenceError> {
        Ok(self.teams.read().await.contains(team_id))
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

//! Session history and user memory persistence.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::memory::{same_memory, RunRecord, UserMemory};

/// Persistence contract for conversation runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_run(&self, run: &RunRecord) -> Result<()>;

    /// Runs of a session in chronological order; only the most recent `limit` when given.
    async fn load_runs(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<RunRecord>>;

    /// Session ids a user has talked in, most recently active first.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<String>>;

    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// Persistence contract for long-lived user memories.
#[async_trait]
pub trait UserMemoryStore: Send + Sync {
    /// Returns `false` when the user already has the same memory.
    async fn add_memory(&self, memory: &UserMemory) -> Result<bool>;

    async fn user_memories(&self, user_id: &str) -> Result<Vec<UserMemory>>;

    async fn clear_memories(&self, user_id: &str) -> Result<()>;
}

/// A backend holding both session runs and user memories, as handed to an agent.
pub trait AgentDb: SessionStore + UserMemoryStore {}

impl<T: SessionStore + UserMemoryStore> AgentDb for T {}

/// Process-local database, used when PostgreSQL is unavailable and in tests.
#[derive(Default)]
pub struct InMemoryDb {
    runs: RwLock<Vec<RunRecord>>,
    memories: RwLock<Vec<UserMemory>>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryDb {
    async fn save_run(&self, run: &RunRecord) -> Result<()> {
        self.runs.write().await.push(run.clone());
        Ok(())
    }

    async fn load_runs(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<RunRecord>> {
        let runs = self.runs.read().await;
        let matching: Vec<RunRecord> = runs
            .iter()
            .filter(|run| run.session_id == session_id)
            .cloned()
            .collect();
        let skip = limit.map_or(0, |limit| matching.len().saturating_sub(limit));
        Ok(matching.into_iter().skip(skip).collect())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut sessions: Vec<String> = Vec::new();
        for run in runs.iter().rev() {
            if run.user_id.as_deref() == Some(user_id) && !sessions.contains(&run.session_id) {
                sessions.push(run.session_id.clone());
            }
        }
        Ok(sessions)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.runs
            .write()
            .await
            .retain(|run| run.session_id != session_id);
        Ok(())
    }
}

#[async_trait]
impl UserMemoryStore for InMemoryDb {
    async fn add_memory(&self, memory: &UserMemory) -> Result<bool> {
        let mut memories = self.memories.write().await;
        if memories
            .iter()
            .any(|m| m.user_id == memory.user_id && same_memory(&m.memory, &memory.memory))
        {
            return Ok(false);
        }
        memories.push(memory.clone());
        Ok(true)
    }

    async fn user_memories(&self, user_id: &str) -> Result<Vec<UserMemory>> {
        Ok(self
            .memories
            .read()
            .await
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn clear_memories(&self, user_id: &str) -> Result<()> {
        self.memories
            .write()
            .await
            .retain(|m| m.user_id != user_id);
        Ok(())
    }
}

#[cfg(feature = "persistence")]
pub use postgres::{connect_pool, PostgresDb};

#[cfg(feature = "persistence")]
mod postgres {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
    use sqlx::Row;
    use tracing::info;
    use uuid::Uuid;

    use super::{SessionStore, UserMemoryStore};
    use crate::config::DatabaseConfig;
    use crate::error::{AgentError, Result};
    use crate::memory::{RunRecord, UserMemory};
    use crate::message::Message;

    /// One pool per process; session storage and vector tables can share it.
    pub async fn connect_pool(cfg: &DatabaseConfig) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.url)
            .await
            .map_err(|err| AgentError::Storage(format!("failed connecting to PostgreSQL: {err}")))?;
        info!(max_connections = cfg.max_connections, "connected to PostgreSQL");
        Ok(pool)
    }

    /// PostgreSQL-backed session and memory storage. Tables are created on connect.
    #[derive(Clone)]
    pub struct PostgresDb {
        pool: PgPool,
    }

    impl PostgresDb {
        const INIT_STATEMENTS: [&'static str; 4] = [
            r#"
            CREATE TABLE IF NOT EXISTS agent_sessions (
                id BIGSERIAL PRIMARY KEY,
                run_id UUID NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                user_id TEXT,
                messages TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS agent_sessions_session_idx ON agent_sessions (session_id)",
            r#"
            CREATE TABLE IF NOT EXISTS agent_memories (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                memory TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS agent_memories_user_memory_idx \
             ON agent_memories (user_id, lower(btrim(memory)))",
        ];

        pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
            Self::from_pool(connect_pool(cfg).await?).await
        }

        pub async fn from_pool(pool: PgPool) -> Result<Self> {
            for statement in Self::INIT_STATEMENTS {
                sqlx::query(statement)
                    .execute(&pool)
                    .await
                    .map_err(|err| AgentError::Storage(format!("failed initializing schema: {err}")))?;
            }
            Ok(Self { pool })
        }

        pub fn pool(&self) -> &PgPool {
            &self.pool
        }

        fn decode_run(row: &PgRow) -> Result<RunRecord> {
            let decode = |err: sqlx::Error| AgentError::Storage(format!("failed decoding run: {err}"));
            let payload: String = row.try_get("messages").map_err(decode)?;
            let messages: Vec<Message> = serde_json::from_str(&payload)
                .map_err(|err| AgentError::Storage(format!("invalid run payload: {err}")))?;
            Ok(RunRecord {
                run_id: row.try_get::<Uuid, _>("run_id").map_err(decode)?,
                session_id: row.try_get("session_id").map_err(decode)?,
                user_id: row.try_get("user_id").map_err(decode)?,
                messages,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode)?,
            })
        }
    }

    #[async_trait]
    impl SessionStore for PostgresDb {
        async fn save_run(&self, run: &RunRecord) -> Result<()> {
            let payload = serde_json::to_string(&run.messages)?;
            sqlx::query(
                "INSERT INTO agent_sessions (run_id, session_id, user_id, messages, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(run.run_id)
            .bind(&run.session_id)
            .bind(&run.user_id)
            .bind(payload)
            .bind(run.created_at)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|err| AgentError::Storage(format!("failed writing run: {err}")))
        }

        async fn load_runs(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<RunRecord>> {
            let rows = sqlx::query(
                "SELECT * FROM ( \
                     SELECT id, run_id, session_id, user_id, messages, created_at \
                     FROM agent_sessions WHERE session_id = $1 ORDER BY id DESC LIMIT $2 \
                 ) recent ORDER BY id ASC",
            )
            .bind(session_id)
            .bind(limit.map(|l| l as i64))
            .fetch_all(&self.pool)
            .await
            .map_err(|err| AgentError::Storage(format!("failed loading runs: {err}")))?;

            rows.iter().map(Self::decode_run).collect()
        }

        async fn list_sessions(&self, user_id: &str) -> Result<Vec<String>> {
            let rows = sqlx::query(
                "SELECT session_id FROM agent_sessions WHERE user_id = $1 \
                 GROUP BY session_id ORDER BY MAX(id) DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| AgentError::Storage(format!("failed listing sessions: {err}")))?;

            rows.iter()
                .map(|row| {
                    row.try_get("session_id")
                        .map_err(|err| AgentError::Storage(format!("failed decoding session: {err}")))
                })
                .collect()
        }

        async fn delete_session(&self, session_id: &str) -> Result<()> {
            sqlx::query("DELETE FROM agent_sessions WHERE session_id = $1")
                .bind(session_id)
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(|err| AgentError::Storage(format!("failed deleting session: {err}")))
        }
    }

    #[async_trait]
    impl UserMemoryStore for PostgresDb {
        async fn add_memory(&self, memory: &UserMemory) -> Result<bool> {
            let result = sqlx::query(
                "INSERT INTO agent_memories (id, user_id, memory, created_at) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(memory.id)
            .bind(&memory.user_id)
            .bind(memory.memory.trim())
            .bind(memory.created_at)
            .execute(&self.pool)
            .await
            .map_err(|err| AgentError::Storage(format!("failed writing memory: {err}")))?;
            Ok(result.rows_affected() == 1)
        }

        async fn user_memories(&self, user_id: &str) -> Result<Vec<UserMemory>> {
            let rows = sqlx::query(
                "SELECT id, user_id, memory, created_at FROM agent_memories \
                 WHERE user_id = $1 ORDER BY created_at ASC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| AgentError::Storage(format!("failed loading memories: {err}")))?;

            rows.iter()
                .map(|row| {
                    let decode =
                        |err: sqlx::Error| AgentError::Storage(format!("failed decoding memory: {err}"));
                    Ok(UserMemory {
                        id: row.try_get("id").map_err(decode)?,
                        user_id: row.try_get("user_id").map_err(decode)?,
                        memory: row.try_get("memory").map_err(decode)?,
                        created_at: row.try_get("created_at").map_err(decode)?,
                    })
                })
                .collect()
        }

        async fn clear_memories(&self, user_id: &str) -> Result<()> {
            sqlx::query("DELETE FROM agent_memories WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(|err| AgentError::Storage(format!("failed clearing memories: {err}")))
        }
    }
}

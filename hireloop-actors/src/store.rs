//! SQLite-backed persistence actor: a small key/value table plus the set of
//! listing identities that have already been evaluated.
//!
//! Messages are handled one at a time, so writes never interleave. Callers
//! normally go through [`StoreHandle`], whose getters are best effort: a
//! missing key or a failed read yields the type's empty value and a warning.
use crate::actor::{Actor, Addr, Context};
use anyhow::{Context as _, Result};
use chrono::Utc;
use hireloop_common::HireloopError;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Well-known keys of the `kv` table.
pub mod keys {
    pub const APPLICATION_COUNTER: &str = "application_counter";
    pub const LAST_SEARCH_URL: &str = "last_search_url";
    pub const USER_PROFILE: &str = "user_profile";
    pub const USER_PREFERENCES: &str = "user_preferences";
    pub const API_CREDENTIAL: &str = "api_credential";
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS processed (
    identity     TEXT PRIMARY KEY,
    processed_at TEXT NOT NULL
);
"#;

pub enum StoreMsg {
    Get {
        key: String,
        reply: oneshot::Sender<Result<Option<String>>>,
    },
    Set {
        key: String,
        value: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Increment {
        key: String,
        by: i64,
        reply: oneshot::Sender<Result<i64>>,
    },
    /// Replies `true` when the identity was not recorded before.
    MarkProcessed {
        identity: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    LoadProcessed {
        reply: oneshot::Sender<Result<HashSet<String>>>,
    },
    ProcessedCount {
        reply: oneshot::Sender<Result<i64>>,
    },
}

pub struct StoreActor {
    pool: SqlitePool,
}

impl StoreActor {
    /// Open (creating if needed) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url: {database_url}"))?
            .create_if_missing(true);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create database directory {}", parent.display())
                    })?;
                }
            }
        }

        // An in-memory database lives and dies with its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database {database_url}"))?;

        Self::with_pool(pool).await
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to apply store schema")?;
        info!("store.schema.ready");
        Ok(Self { pool })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(r) => Some(r.try_get::<String, _>("value")?),
            None => None,
        })
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
               ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        debug!(%key, "store.set");
        Ok(())
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"INSERT INTO kv (key, value, updated_at) VALUES (?1, CAST(?2 AS TEXT), ?3)
               ON CONFLICT(key) DO UPDATE SET
                 value = CAST(CAST(kv.value AS INTEGER) + ?2 AS TEXT),
                 updated_at = excluded.updated_at
               RETURNING CAST(value AS INTEGER) AS value"#,
        )
        .bind(key)
        .bind(by)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        let value: i64 = row.try_get("value")?;
        debug!(%key, value, "store.increment");
        Ok(value)
    }

    async fn mark_processed(&self, identity: &str) -> Result<bool> {
        let res = sqlx::query(
            "INSERT INTO processed (identity, processed_at) VALUES (?1, ?2) ON CONFLICT(identity) DO NOTHING",
        )
        .bind(identity)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn load_processed(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT identity FROM processed")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| r.try_get::<String, _>("identity").map_err(Into::into))
            .collect()
    }

    async fn processed_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM processed")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

#[async_trait::async_trait]
impl Actor for StoreActor {
    type Msg = StoreMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
        let delivered = match msg {
            StoreMsg::Get { key, reply } => reply.send(self.get(&key).await).is_ok(),
            StoreMsg::Set { key, value, reply } => reply.send(self.set(&key, &value).await).is_ok(),
            StoreMsg::Increment { key, by, reply } => {
                reply.send(self.increment(&key, by).await).is_ok()
            }
            StoreMsg::MarkProcessed { identity, reply } => {
                reply.send(self.mark_processed(&identity).await).is_ok()
            }
            StoreMsg::LoadProcessed { reply } => reply.send(self.load_processed().await).is_ok(),
            StoreMsg::ProcessedCount { reply } => {
                reply.send(self.processed_count().await).is_ok()
            }
        };
        if !delivered {
            debug!("store.reply_dropped");
        }
        Ok(())
    }
}

/// Typed, cloneable front for the store actor.
#[derive(Clone)]
pub struct StoreHandle {
    addr: Addr<StoreActor>,
}

fn store_err(e: anyhow::Error) -> HireloopError {
    HireloopError::Store(format!("{e:#}"))
}

impl StoreHandle {
    pub fn new(addr: Addr<StoreActor>) -> Self {
        Self { addr }
    }

    pub async fn try_get_string(&self, key: &str) -> hireloop_common::Result<Option<String>> {
        self.addr
            .ask(|reply| StoreMsg::Get {
                key: key.to_string(),
                reply,
            })
            .await?
            .map_err(store_err)
    }

    /// Missing or unreadable keys read as `None`.
    pub async fn get_string(&self, key: &str) -> Option<String> {
        match self.try_get_string(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(%key, error = %e, "store.get.failed");
                None
            }
        }
    }

    pub async fn set_string(&self, key: &str, value: &str) -> hireloop_common::Result<()> {
        self.addr
            .ask(|reply| StoreMsg::Set {
                key: key.to_string(),
                value: value.to_string(),
                reply,
            })
            .await?
            .map_err(store_err)
    }

    /// Decode a JSON value; anything missing or malformed yields `T::default()`.
    pub async fn get_json<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(raw) = self.get_string(key).await else {
            return T::default();
        };
        match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(%key, error = %e, "store.get_json.decode_failed");
                T::default()
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> hireloop_common::Result<()> {
        let raw = serde_json::to_string(value).map_err(|e| HireloopError::Store(e.to_string()))?;
        self.set_string(key, &raw).await
    }

    /// Integer value of `key`, `0` when absent or unreadable.
    pub async fn get_counter(&self, key: &str) -> i64 {
        self.get_string(key)
            .await
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0)
    }

    pub async fn increment(&self, key: &str) -> hireloop_common::Result<i64> {
        self.addr
            .ask(|reply| StoreMsg::Increment {
                key: key.to_string(),
                by: 1,
                reply,
            })
            .await?
            .map_err(store_err)
    }

    pub async fn mark_processed(&self, identity: &str) -> hireloop_common::Result<bool> {
        self.addr
            .ask(|reply| StoreMsg::MarkProcessed {
                identity: identity.to_string(),
                reply,
            })
            .await?
            .map_err(store_err)
    }

    /// Empty set when the store cannot be read.
    pub async fn load_processed(&self) -> HashSet<String> {
        match self.addr.ask(|reply| StoreMsg::LoadProcessed { reply }).await {
            Ok(Ok(set)) => set,
            Ok(Err(e)) => {
                warn!(error = %e, "store.load_processed.failed");
                HashSet::new()
            }
            Err(e) => {
                warn!(error = %e, "store.load_processed.mailbox");
                HashSet::new()
            }
        }
    }

    pub async fn processed_count(&self) -> i64 {
        match self.addr.ask(|reply| StoreMsg::ProcessedCount { reply }).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(error = %e, "store.processed_count.failed");
                0
            }
            Err(e) => {
                warn!(error = %e, "store.processed_count.mailbox");
                0
            }
        }
    }
}

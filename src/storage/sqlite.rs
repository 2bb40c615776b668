use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::subscriber::SubscriptionRepository;
use crate::subscription::{Subscription, SubscriptionMark};

/// Errors opening the subscription database.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Another process holds the database lock
    #[error("database is locked by another process")]
    Locked,
    #[error("database migration failed: {0}")]
    Migration(String),
    #[error("database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StorageError {
    fn from_sqlx(err: sqlx::Error) -> Self {
        let message = err.to_string().to_lowercase();
        // SQLITE_BUSY (5), SQLITE_LOCKED (6)
        if message.contains("database is locked") || message.contains("database table is locked") {
            return StorageError::Locked;
        }
        StorageError::Other(err)
    }
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    callback: String,
    topic: String,
    hubs: String,
    lease_seconds: Option<i64>,
    state: Option<String>,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Result<Subscription> {
        let callback = Url::parse(&self.callback)
            .with_context(|| format!("invalid stored callback {}", self.callback))?;
        let topic = Url::parse(&self.topic)
            .with_context(|| format!("invalid stored topic for {}", self.callback))?;
        let hubs: Vec<Url> = serde_json::from_str(&self.hubs)
            .with_context(|| format!("invalid stored hubs for {}", self.callback))?;
        let lease_seconds = self
            .lease_seconds
            .map(u32::try_from)
            .transpose()
            .with_context(|| format!("invalid stored lease for {}", self.callback))?;
        let state: Option<SubscriptionMark> = self
            .state
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .with_context(|| format!("invalid stored state for {}", self.callback))?;

        Ok(Subscription {
            callback,
            topic,
            hubs,
            lease_seconds,
            state,
        })
    }
}

/// SQLite-backed repository, one row per callback.
///
/// Hubs and the latest mark are stored as JSON text. Each mark is a single
/// `UPDATE`, so SQLite's write lock serializes concurrent marks.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens (creating if needed) the database at `path` and runs migrations.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// [`StorageError::Locked`] when another process holds the lock,
    /// [`StorageError::Migration`] when the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() {
                // Pre-create with owner-only permissions; SQLite reports any failure on connect
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StorageError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StorageError::from_sqlx)?;

        let repository = Self { pool };
        repository
            .migrate()
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        Ok(repository)
    }

    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                callback TEXT PRIMARY KEY NOT NULL,
                topic TEXT NOT NULL,
                hubs TEXT NOT NULL,
                lease_seconds INTEGER,
                state TEXT,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_subscriptions_topic ON subscriptions(topic)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteRepository {
    async fn store(
        &self,
        callback: &Url,
        topic: &Url,
        hubs: &[Url],
        lease_seconds: Option<u32>,
    ) -> Result<Subscription> {
        let subscription = Subscription::new(
            callback.clone(),
            topic.clone(),
            hubs.to_vec(),
            lease_seconds,
        );
        let hubs_json = serde_json::to_string(&subscription.hubs)?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (callback, topic, hubs, lease_seconds, state, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?)
            ON CONFLICT(callback) DO UPDATE SET
                topic = excluded.topic,
                hubs = excluded.hubs,
                lease_seconds = excluded.lease_seconds,
                state = NULL,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(callback.as_str())
        .bind(topic.as_str())
        .bind(&hubs_json)
        .bind(lease_seconds.map(i64::from))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn mark(&self, subscription: &Subscription, mark: SubscriptionMark) -> Result<()> {
        let state_json = serde_json::to_string(&mark)?;
        let next = subscription.with_mark(mark);

        let result = sqlx::query(
            "UPDATE subscriptions SET state = ?, lease_seconds = ?, updated_at = ? WHERE callback = ?",
        )
        .bind(&state_json)
        .bind(next.lease_seconds.map(i64::from))
        .bind(chrono::Utc::now().timestamp())
        .bind(next.callback.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("no subscription for callback {}", next.callback));
        }
        Ok(())
    }

    async fn subscription(&self, callback: &Url) -> Result<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            "SELECT callback, topic, hubs, lease_seconds, state FROM subscriptions WHERE callback = ?",
        )
        .bind(callback.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubscriptionRow::into_subscription).transpose()
    }

    async fn subscriptions(&self, topic: &Url) -> Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            "SELECT callback, topic, hubs, lease_seconds, state FROM subscriptions WHERE topic = ? ORDER BY callback",
        )
        .bind(topic.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(SubscriptionRow::into_subscription)
            .collect()
    }
}

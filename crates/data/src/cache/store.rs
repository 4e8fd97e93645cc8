use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::CacheError;

/// Value read back from a persistent store, with its remaining lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub value: String,
    pub ttl_remaining: Duration,
}

/// Type-agnostic key/value store with expiry.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Unexpired value for `key`.
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Deletes expired rows, returning how many went.
    async fn purge_expired(&self) -> Result<u64, CacheError>;
}

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS cache_entries (
        key        TEXT PRIMARY KEY,
        value      TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    )
";

/// `SQLite`-backed persistent tier.
///
/// Tolerates concurrent writers: a busy or locked database is retried with
/// linear backoff before giving up with `CacheError::Busy`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    busy_attempts: u32,
    busy_delay: Duration,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `database_url`,
    /// e.g. `sqlite://data/cache.db`.
    ///
    /// # Errors
    /// Returns error if the URL is invalid, the connection fails or the
    /// schema cannot be created.
    pub async fn connect(database_url: &str) -> Result<Self, CacheError> {
        // every pooled connection would get its own private memory database
        if database_url.contains(":memory:") {
            return Self::in_memory().await;
        }
        let options = database_url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database on a single connection.
    ///
    /// # Errors
    /// Returns error if the connection fails.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, CacheError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self {
            pool,
            busy_attempts: 5,
            busy_delay: Duration::from_millis(50),
        })
    }

    #[must_use]
    pub fn with_busy_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.busy_attempts = attempts.max(1);
        self.busy_delay = delay;
        self
    }

    async fn retry_busy<T, F, Fut>(&self, mut op: F) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) => {
                    if attempt >= self.busy_attempts {
                        tracing::warn!(attempts = attempt, "Cache store still busy, giving up");
                        return Err(CacheError::Busy { attempts: attempt });
                    }
                    tracing::debug!(attempt, error = %e, "Cache store busy, retrying");
                    tokio::time::sleep(self.busy_delay * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5" | "6"))
                || db.message().contains("database is locked")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let pool = &self.pool;
        let row = self
            .retry_busy(move || async move {
                let now = Utc::now().timestamp_millis();
                sqlx::query_as::<_, (String, i64)>(
                    "SELECT value, expires_at FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                )
                .bind(key)
                .bind(now)
                .fetch_optional(pool)
                .await
                .map(|row| row.map(|(value, expires_at)| (value, expires_at - now)))
            })
            .await?;

        Ok(row.map(|(value, remaining_ms)| StoredEntry {
            value,
            ttl_remaining: Duration::from_millis(u64::try_from(remaining_ms).unwrap_or(0)),
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let pool = &self.pool;
        self.retry_busy(move || async move {
            let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_millis(ttl));
            sqlx::query(
                r"
                INSERT INTO cache_entries (key, value, expires_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at
                ",
            )
            .bind(key)
            .bind(value)
            .bind(expires_at)
            .execute(pool)
            .await
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let pool = &self.pool;
        self.retry_busy(move || async move {
            sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
                .bind(key)
                .execute(pool)
                .await
        })
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let pool = &self.pool;
        let result = self
            .retry_busy(move || async move {
                sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?1")
                    .bind(Utc::now().timestamp_millis())
                    .execute(pool)
                    .await
            })
            .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired cache rows");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn set_then_get() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set("quote:AAPL", "187.5", HOUR).await.unwrap();

        let entry = store.get("quote:AAPL").await.unwrap().unwrap();
        assert_eq!(entry.value, "187.5");
        assert!(entry.ttl_remaining <= HOUR);
        assert!(entry.ttl_remaining > HOUR - Duration::from_secs(60));
        assert!(store.get("quote:MSFT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_overwrites() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set("k", "old", HOUR).await.unwrap();
        store.set("k", "new", HOUR).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap().value, "new");
    }

    #[tokio::test]
    async fn expired_rows_are_invisible_and_purged() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set("gone", "x", Duration::ZERO).await.unwrap();
        store.set("kept", "y", HOUR).await.unwrap();

        assert!(store.get("gone").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("kept").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set("k", "v", HOUR).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[test]
    fn pool_timeout_counts_as_busy() {
        assert!(is_busy(&sqlx::Error::PoolTimedOut));
        assert!(!is_busy(&sqlx::Error::RowNotFound));
    }
}

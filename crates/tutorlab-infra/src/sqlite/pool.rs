//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows only one writer at a time. `DatabasePool` keeps a
//! multi-connection reader pool for concurrent reads and a single-connection
//! writer pool, so every transaction on the writer is serialized. Both use WAL
//! journal mode and enforce foreign keys.

use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{info, warn};
use tutorlab_types::config::StoreConfig;
use tutorlab_types::error::StoreError;

/// Split read/write pool for SQLite with WAL mode.
///
/// - `reader`: multi-connection pool for SELECT queries.
/// - `writer`: single-connection pool for INSERT/UPDATE and transactions.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
    call_timeout: Duration,
}

impl DatabasePool {
    /// Open both pools once and run migrations on the writer.
    pub async fn new(database_url: &str, max_readers: u32) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let read_opts = base_opts.clone().read_only(true);
        let write_opts = base_opts;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(write_opts)
            .await?;

        // Run migrations on writer before opening reader pool
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(max_readers.max(1))
            .connect_with(read_opts)
            .await?;

        Ok(Self {
            reader,
            writer,
            call_timeout: Duration::from_millis(StoreConfig::default().call_timeout_ms),
        })
    }

    /// Open the pool, retrying with a fixed delay while the store is unreachable.
    ///
    /// Exhausting `connect_retries` yields `StoreError::Unavailable`. This is
    /// the only place a store operation is retried.
    pub async fn connect(database_url: &str, config: &StoreConfig) -> Result<Self, StoreError> {
        let attempts = config.connect_retries.max(1);
        let delay = Duration::from_millis(config.connect_retry_delay_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match Self::new(database_url, config.max_readers).await {
                Ok(pool) => {
                    info!(attempt, "database pool ready");
                    return Ok(pool.with_call_timeout(Duration::from_millis(config.call_timeout_ms)));
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "failed to open database pool");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(StoreError::Unavailable(format!(
            "gave up after {attempts} attempts: {last_error}"
        )))
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Run one store call under the per-call deadline.
    ///
    /// A call that misses the deadline is abandoned and reported as
    /// `StoreError::Timeout`; it is never retried.
    pub(crate) async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, after_ms = self.call_timeout.as_millis() as u64, "store call timed out");
                Err(StoreError::Timeout {
                    operation,
                    after_ms: self.call_timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Map a driver error into the store taxonomy without leaking pool internals upward.
pub(crate) fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE") => {
            StoreError::Conflict(db_err.message().to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

/// `sqlite://` URL for a database file, creating it on first open.
pub fn database_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

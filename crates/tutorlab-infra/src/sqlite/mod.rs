//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools. Every call runs under the pool's per-call
//! deadline.

pub mod message;
pub mod pool;
pub mod session;
pub mod sweep;
pub mod user;

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use tutorlab_types::error::StoreError;

/// UTC instants are stored with a fixed precision so text comparison orders them.
pub(crate) fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_utc(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Query(format!("invalid datetime: {e}")))
}

/// Local instants keep their offset.
pub(crate) fn format_local(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

pub(crate) fn parse_local(s: &str) -> Result<DateTime<FixedOffset>, StoreError> {
    DateTime::parse_from_rfc3339(s).map_err(|e| StoreError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| StoreError::Query(format!("invalid date: {e}")))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (tempfile::TempDir, pool::DatabasePool) {
    let dir = tempfile::tempdir().unwrap();
    let url = pool::database_url(&dir.path().join("test.db"));
    let pool = pool::DatabasePool::new(&url, 4).await.unwrap();
    (dir, pool)
}

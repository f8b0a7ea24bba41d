//! SQLite sweep bookkeeping.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use tutorlab_core::repository::SweepRepository;
use tutorlab_types::error::StoreError;
use tutorlab_types::sweep::{SweepReport, SweepRun, SweepTrigger};

use super::pool::{DatabasePool, map_sqlx};
use super::{format_date, format_utc, parse_date, parse_utc};

#[derive(Clone)]
pub struct SqliteSweepRepository {
    pool: DatabasePool,
}

impl SqliteSweepRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct SweepRunRow {
    id: i64,
    target_date: String,
    trigger_kind: String,
    reset_count: i64,
    error_count: i64,
    started_at: String,
    elapsed_ms: i64,
}

impl SweepRunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            target_date: row.try_get("target_date")?,
            trigger_kind: row.try_get("trigger_kind")?,
            reset_count: row.try_get("reset_count")?,
            error_count: row.try_get("error_count")?,
            started_at: row.try_get("started_at")?,
            elapsed_ms: row.try_get("elapsed_ms")?,
        })
    }

    fn into_run(self) -> Result<SweepRun, StoreError> {
        let trigger: SweepTrigger = self
            .trigger_kind
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;
        Ok(SweepRun {
            id: self.id,
            target_date: parse_date(&self.target_date)?,
            trigger,
            reset_count: self.reset_count as u32,
            error_count: self.error_count as u32,
            started_at: parse_utc(&self.started_at)?,
            elapsed_ms: self.elapsed_ms as u64,
        })
    }
}

impl SweepRepository for SqliteSweepRepository {
    async fn last_run_for(&self, target_date: NaiveDate) -> Result<Option<SweepRun>, StoreError> {
        self.pool
            .bounded("last_run_for", async {
                let row = sqlx::query("SELECT * FROM sweep_runs WHERE target_date = ? ORDER BY id DESC LIMIT 1")
                    .bind(format_date(target_date))
                    .fetch_optional(&self.pool.reader)
                    .await
                    .map_err(map_sqlx)?;
                match row {
                    Some(row) => Ok(Some(SweepRunRow::from_row(&row).map_err(map_sqlx)?.into_run()?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn record_run(&self, report: &SweepReport, started_at: DateTime<Utc>) -> Result<SweepRun, StoreError> {
        self.pool
            .bounded("record_run", async {
                let row = sqlx::query(
                    r#"INSERT INTO sweep_runs (target_date, trigger_kind, reset_count, error_count, started_at, elapsed_ms)
                       VALUES (?, ?, ?, ?, ?, ?)
                       RETURNING *"#,
                )
                .bind(format_date(report.target_date))
                .bind(report.trigger.to_string())
                .bind(i64::from(report.reset_count))
                .bind(i64::from(report.error_count))
                .bind(format_utc(&started_at))
                .bind(report.elapsed_ms as i64)
                .fetch_one(&self.pool.writer)
                .await
                .map_err(map_sqlx)?;
                SweepRunRow::from_row(&row).map_err(map_sqlx)?.into_run()
            })
            .await
    }
}

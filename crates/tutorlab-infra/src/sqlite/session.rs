//! SQLite session repository.
//!
//! `turn_count` and `is_completed` are only ever rewritten by `recount` (one
//! conditional UPDATE deriving both from the message log) or by an explicit
//! override.

use chrono::{DateTime, FixedOffset, NaiveDate};
use sqlx::Row;
use tutorlab_core::repository::SessionRepository;
use tutorlab_types::error::StoreError;
use tutorlab_types::session::{NewSession, Progress, Reconciliation, Session, SessionId};
use tutorlab_types::user::UserId;

use super::pool::{DatabasePool, map_sqlx};
use super::{format_date, format_local, parse_date, parse_local};

/// Derive the count from the log and completion from the owner's quota.
/// Completion is sticky. `?1` is the session id, `?2` is 1 to leave a session
/// under an active override alone.
const RECOUNT_SQL: &str = r#"
WITH derived AS (
    SELECT
        (SELECT COUNT(DISTINCT m.turn_index) FROM messages m
          WHERE m.session_id = s.id AND m.role = 'user') AS turns,
        u.max_turns AS max_turns,
        u.target_turns AS target_turns,
        s.is_completed AS was_completed
    FROM sessions s
    JOIN users u ON u.id = s.user_id
    WHERE s.id = ?1
),
next AS (
    SELECT
        turns,
        CASE
            WHEN was_completed = 1 THEN 1
            WHEN max_turns IS NOT NULL THEN turns >= max_turns
            WHEN target_turns IS NOT NULL THEN turns >= target_turns
            ELSE 0
        END AS completed
    FROM derived
)
UPDATE sessions
SET turn_count = (SELECT turns FROM next),
    is_completed = (SELECT completed FROM next),
    override_active = 0
WHERE id = ?1
  AND NOT (?2 = 1 AND override_active = 1)
  AND (
        turn_count != (SELECT turns FROM next)
     OR is_completed != (SELECT completed FROM next)
     OR override_active = 1
  )
RETURNING turn_count, is_completed
"#;

/// SQLite-backed implementation of `SessionRepository`.
#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, executor: &sqlx::SqlitePool, id: SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.0)
            .fetch_optional(executor)
            .await
            .map_err(map_sqlx)?;
        match row {
            Some(row) => Ok(Some(SessionRow::from_row(&row).map_err(map_sqlx)?.into_session()?)),
            None => Ok(None),
        }
    }

    async fn fetch_many(&self, sql: &str, session_date: NaiveDate) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(sql)
            .bind(format_date(session_date))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(SessionRow::from_row(row).map_err(map_sqlx)?.into_session()?);
        }
        Ok(sessions)
    }
}

struct SessionRow {
    id: i64,
    user_id: i64,
    topic_id: String,
    session_date: String,
    start_time: String,
    end_time: Option<String>,
    turn_count: i64,
    is_completed: bool,
    override_active: bool,
    satisfaction: Option<i64>,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            topic_id: row.try_get("topic_id")?,
            session_date: row.try_get("session_date")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            turn_count: row.try_get("turn_count")?,
            is_completed: row.try_get("is_completed")?,
            override_active: row.try_get("override_active")?,
            satisfaction: row.try_get("satisfaction")?,
        })
    }

    fn into_session(self) -> Result<Session, StoreError> {
        Ok(Session {
            id: SessionId(self.id),
            user_id: UserId(self.user_id),
            topic_id: self.topic_id,
            session_date: parse_date(&self.session_date)?,
            start_time: parse_local(&self.start_time)?,
            end_time: self.end_time.as_deref().map(parse_local).transpose()?,
            turn_count: self.turn_count as u32,
            is_completed: self.is_completed,
            override_active: self.override_active,
            satisfaction: self.satisfaction.map(|v| v as u8),
        })
    }
}

impl SessionRepository for SqliteSessionRepository {
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        self.pool
            .bounded("get_session", self.fetch(&self.pool.reader, id))
            .await
    }

    async fn find_session(
        &self,
        user_id: UserId,
        topic_id: &str,
        session_date: NaiveDate,
    ) -> Result<Option<Session>, StoreError> {
        self.pool
            .bounded("find_session", async {
                let row = sqlx::query(
                    "SELECT * FROM sessions WHERE user_id = ? AND topic_id = ? AND session_date = ?",
                )
                .bind(user_id.0)
                .bind(topic_id)
                .bind(format_date(session_date))
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(map_sqlx)?;
                match row {
                    Some(row) => Ok(Some(SessionRow::from_row(&row).map_err(map_sqlx)?.into_session()?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn insert_session(&self, new: &NewSession) -> Result<Session, StoreError> {
        self.pool
            .bounded("insert_session", async {
                let result = sqlx::query(
                    r#"INSERT INTO sessions (user_id, topic_id, session_date, start_time, turn_count, is_completed, override_active)
                       VALUES (?, ?, ?, ?, 0, 0, 0)"#,
                )
                .bind(new.user_id.0)
                .bind(&new.topic_id)
                .bind(format_date(new.session_date))
                .bind(format_local(&new.start_time))
                .execute(&self.pool.writer)
                .await
                .map_err(map_sqlx)?;

                Ok(Session {
                    id: SessionId(result.last_insert_rowid()),
                    user_id: new.user_id,
                    topic_id: new.topic_id.clone(),
                    session_date: new.session_date,
                    start_time: new.start_time,
                    end_time: None,
                    turn_count: 0,
                    is_completed: false,
                    override_active: false,
                    satisfaction: None,
                })
            })
            .await
    }

    async fn recount(&self, id: SessionId, respect_override: bool) -> Result<Option<Reconciliation>, StoreError> {
        self.pool
            .bounded("recount", async {
                let updated = sqlx::query(RECOUNT_SQL)
                    .bind(id.0)
                    .bind(i64::from(respect_override))
                    .fetch_optional(&self.pool.writer)
                    .await
                    .map_err(map_sqlx)?;

                if let Some(row) = updated {
                    let turn_count: i64 = row.try_get("turn_count").map_err(map_sqlx)?;
                    let completed: i64 = row.try_get("is_completed").map_err(map_sqlx)?;
                    return Ok(Some(Reconciliation {
                        progress: Progress {
                            turn_count: turn_count as u32,
                            completed: completed != 0,
                        },
                        changed: true,
                    }));
                }

                // Nothing written: already consistent, under a respected override, or missing.
                Ok(self.fetch(&self.pool.writer, id).await?.map(|s| Reconciliation {
                    progress: s.progress(),
                    changed: false,
                }))
            })
            .await
    }

    async fn apply_override(
        &self,
        id: SessionId,
        progress: Progress,
        end_time: Option<DateTime<FixedOffset>>,
    ) -> Result<Session, StoreError> {
        self.pool
            .bounded("apply_override", async {
                let row = sqlx::query(
                    r#"UPDATE sessions
                       SET turn_count = ?, is_completed = ?, override_active = 1,
                           end_time = COALESCE(end_time, ?)
                       WHERE id = ?
                       RETURNING *"#,
                )
                .bind(i64::from(progress.turn_count))
                .bind(progress.completed)
                .bind(end_time.as_ref().map(format_local))
                .bind(id.0)
                .fetch_optional(&self.pool.writer)
                .await
                .map_err(map_sqlx)?
                .ok_or(StoreError::NotFound)?;
                SessionRow::from_row(&row).map_err(map_sqlx)?.into_session()
            })
            .await
    }

    async fn list_open_sessions(&self, session_date: NaiveDate) -> Result<Vec<Session>, StoreError> {
        self.pool
            .bounded(
                "list_open_sessions",
                self.fetch_many(
                    "SELECT * FROM sessions WHERE session_date = ? AND end_time IS NULL ORDER BY id",
                    session_date,
                ),
            )
            .await
    }

    async fn stamp_end_time(&self, id: SessionId, end_time: DateTime<FixedOffset>) -> Result<bool, StoreError> {
        self.pool
            .bounded("stamp_end_time", async {
                let result = sqlx::query("UPDATE sessions SET end_time = ? WHERE id = ? AND end_time IS NULL")
                    .bind(format_local(&end_time))
                    .bind(id.0)
                    .execute(&self.pool.writer)
                    .await
                    .map_err(map_sqlx)?;
                Ok(result.rows_affected() > 0)
            })
            .await
    }

    async fn list_sessions_on(&self, session_date: NaiveDate) -> Result<Vec<Session>, StoreError> {
        self.pool
            .bounded(
                "list_sessions_on",
                self.fetch_many(
                    "SELECT * FROM sessions WHERE session_date = ? ORDER BY id",
                    session_date,
                ),
            )
            .await
    }

    async fn completed_dates(&self, user_id: UserId) -> Result<Vec<NaiveDate>, StoreError> {
        self.pool
            .bounded("completed_dates", async {
                let rows = sqlx::query(
                    "SELECT DISTINCT session_date FROM sessions WHERE user_id = ? AND is_completed = 1 ORDER BY session_date",
                )
                .bind(user_id.0)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(map_sqlx)?;
                let mut dates = Vec::with_capacity(rows.len());
                for row in &rows {
                    let raw: String = row.try_get("session_date").map_err(map_sqlx)?;
                    dates.push(parse_date(&raw)?);
                }
                Ok(dates)
            })
            .await
    }
}

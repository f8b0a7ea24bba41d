//! SQLite message log repository.
//!
//! Appends run on the single writer connection inside a transaction, so the
//! duplicate check and the insert cannot interleave with another append.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tutorlab_core::repository::MessageRepository;
use tutorlab_types::error::StoreError;
use tutorlab_types::message::{AppendOutcome, Message, MessageId, MessageRole, NewMessage};
use tutorlab_types::session::SessionId;

use super::pool::{DatabasePool, map_sqlx};
use super::{format_utc, parse_utc};

/// SQLite-backed implementation of `MessageRepository`.
#[derive(Clone)]
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct MessageRow {
    id: i64,
    session_id: i64,
    role: String,
    turn_index: i64,
    content: String,
    response_time_ms: Option<i64>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            role: row.try_get("role")?,
            turn_index: row.try_get("turn_index")?,
            content: row.try_get("content")?,
            response_time_ms: row.try_get("response_time_ms")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<Message, StoreError> {
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;
        Ok(Message {
            id: MessageId(self.id),
            session_id: SessionId(self.session_id),
            role,
            turn_index: self.turn_index as u32,
            content: self.content,
            response_time_ms: self.response_time_ms.map(|v| v as u64),
            created_at: parse_utc(&self.created_at)?,
        })
    }
}

fn stored(message: &NewMessage, id: i64, turn_index: u32, at: DateTime<Utc>) -> Message {
    Message {
        id: MessageId(id),
        session_id: message.session_id,
        role: message.role,
        turn_index,
        content: message.content.clone(),
        response_time_ms: message.response_time_ms,
        created_at: at,
    }
}

impl MessageRepository for SqliteMessageRepository {
    async fn append_user_message(
        &self,
        message: &NewMessage,
        at: DateTime<Utc>,
        dedup_since: DateTime<Utc>,
        turn_cap: Option<u32>,
    ) -> Result<AppendOutcome, StoreError> {
        self.pool
            .bounded("append_user_message", async {
                let mut tx = self.pool.writer.begin().await.map_err(map_sqlx)?;

                let existing = sqlx::query(
                    r#"SELECT * FROM messages
                       WHERE session_id = ? AND role = 'user' AND content = ? AND created_at >= ?
                       ORDER BY id LIMIT 1"#,
                )
                .bind(message.session_id.0)
                .bind(&message.content)
                .bind(format_utc(&dedup_since))
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx)?;
                if let Some(row) = existing {
                    tx.rollback().await.map_err(map_sqlx)?;
                    let message = MessageRow::from_row(&row).map_err(map_sqlx)?.into_message()?;
                    return Ok(AppendOutcome::Duplicate(message));
                }

                if let Some(cap) = turn_cap {
                    let turns: i64 = sqlx::query_scalar(
                        "SELECT COUNT(DISTINCT turn_index) FROM messages WHERE session_id = ? AND role = 'user'",
                    )
                    .bind(message.session_id.0)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx)?;
                    if turns >= i64::from(cap) {
                        tx.rollback().await.map_err(map_sqlx)?;
                        return Ok(AppendOutcome::LimitReached {
                            turn_count: turns as u32,
                        });
                    }
                }

                let taken: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM messages WHERE session_id = ? AND role = 'user' AND turn_index = ?",
                )
                .bind(message.session_id.0)
                .bind(i64::from(message.turn_index))
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx)?;

                let turn_index = if taken == 0 {
                    message.turn_index
                } else {
                    let max: i64 = sqlx::query_scalar(
                        "SELECT COALESCE(MAX(turn_index), 0) FROM messages WHERE session_id = ? AND role = 'user'",
                    )
                    .bind(message.session_id.0)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx)?;
                    max as u32 + 1
                };

                let result = sqlx::query(
                    r#"INSERT INTO messages (session_id, role, turn_index, content, response_time_ms, created_at)
                       VALUES (?, 'user', ?, ?, NULL, ?)"#,
                )
                .bind(message.session_id.0)
                .bind(i64::from(turn_index))
                .bind(&message.content)
                .bind(format_utc(&at))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;

                tx.commit().await.map_err(map_sqlx)?;
                Ok(AppendOutcome::Recorded(stored(
                    message,
                    result.last_insert_rowid(),
                    turn_index,
                    at,
                )))
            })
            .await
    }

    async fn append_ai_message(&self, message: &NewMessage, at: DateTime<Utc>) -> Result<AppendOutcome, StoreError> {
        self.pool
            .bounded("append_ai_message", async {
                // The partial unique index on (session_id, turn_index) WHERE role = 'ai'
                // turns a second reply for the same turn into a no-op.
                let result = sqlx::query(
                    r#"INSERT OR IGNORE INTO messages (session_id, role, turn_index, content, response_time_ms, created_at)
                       VALUES (?, 'ai', ?, ?, ?, ?)"#,
                )
                .bind(message.session_id.0)
                .bind(i64::from(message.turn_index))
                .bind(&message.content)
                .bind(message.response_time_ms.map(|v| v as i64))
                .bind(format_utc(&at))
                .execute(&self.pool.writer)
                .await
                .map_err(map_sqlx)?;

                if result.rows_affected() == 0 {
                    return Ok(AppendOutcome::Skipped);
                }
                Ok(AppendOutcome::Recorded(stored(
                    message,
                    result.last_insert_rowid(),
                    message.turn_index,
                    at,
                )))
            })
            .await
    }

    async fn count_user_turns(&self, session_id: SessionId) -> Result<u32, StoreError> {
        self.pool
            .bounded("count_user_turns", async {
                let count: i64 = sqlx::query_scalar(
                    "SELECT COUNT(DISTINCT turn_index) FROM messages WHERE session_id = ? AND role = 'user'",
                )
                .bind(session_id.0)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(map_sqlx)?;
                Ok(count as u32)
            })
            .await
    }

    async fn next_turn_index(&self, session_id: SessionId) -> Result<u32, StoreError> {
        self.pool
            .bounded("next_turn_index", async {
                let max: i64 = sqlx::query_scalar(
                    "SELECT COALESCE(MAX(turn_index), 0) FROM messages WHERE session_id = ? AND role = 'user'",
                )
                .bind(session_id.0)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(map_sqlx)?;
                Ok(max as u32 + 1)
            })
            .await
    }

    async fn list_messages(&self, session_id: SessionId) -> Result<Vec<Message>, StoreError> {
        self.pool
            .bounded("list_messages", async {
                let rows = sqlx::query(
                    r#"SELECT * FROM messages WHERE session_id = ?
                       ORDER BY turn_index, CASE role WHEN 'user' THEN 0 ELSE 1 END, id"#,
                )
                .bind(session_id.0)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(map_sqlx)?;
                let mut messages = Vec::with_capacity(rows.len());
                for row in &rows {
                    messages.push(MessageRow::from_row(row).map_err(map_sqlx)?.into_message()?);
                }
                Ok(messages)
            })
            .await
    }
}

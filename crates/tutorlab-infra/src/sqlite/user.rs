//! SQLite participant repository.

use sqlx::Row;
use tutorlab_core::repository::UserRepository;
use tutorlab_types::error::StoreError;
use tutorlab_types::user::{ExperimentGroup, NewUser, User, UserCredentials, UserId};

use super::pool::{DatabasePool, map_sqlx};
use super::{format_utc, parse_utc};

/// SQLite-backed implementation of `UserRepository`.
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: DatabasePool,
}

impl SqliteUserRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch_by_student_id(&self, student_id: &str) -> Result<Option<UserRow>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE student_id = ?")
            .bind(student_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(UserRow::from_row).transpose().map_err(map_sqlx)
    }
}

struct UserRow {
    id: i64,
    student_id: String,
    experiment_group: String,
    max_turns: Option<i64>,
    target_turns: Option<i64>,
    consent_agreed: bool,
    password_hash: Option<String>,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            experiment_group: row.try_get("experiment_group")?,
            max_turns: row.try_get("max_turns")?,
            target_turns: row.try_get("target_turns")?,
            consent_agreed: row.try_get("consent_agreed")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_credentials(self) -> Result<UserCredentials, StoreError> {
        let group: ExperimentGroup = self
            .experiment_group
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;
        Ok(UserCredentials {
            user: User {
                id: UserId(self.id),
                student_id: self.student_id,
                group,
                max_turns: self.max_turns.map(|v| v as u32),
                target_turns: self.target_turns.map(|v| v as u32),
                consent_agreed: self.consent_agreed,
                created_at: parse_utc(&self.created_at)?,
            },
            password_hash: self.password_hash,
        })
    }

    fn into_user(self) -> Result<User, StoreError> {
        Ok(self.into_credentials()?.user)
    }
}

impl UserRepository for SqliteUserRepository {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.pool
            .bounded("get_user", async {
                let row = sqlx::query("SELECT * FROM users WHERE id = ?")
                    .bind(id.0)
                    .fetch_optional(&self.pool.reader)
                    .await
                    .map_err(map_sqlx)?;
                match row {
                    Some(row) => Ok(Some(UserRow::from_row(&row).map_err(map_sqlx)?.into_user()?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn find_by_student_id(&self, student_id: &str) -> Result<Option<User>, StoreError> {
        self.pool
            .bounded("find_by_student_id", async {
                self.fetch_by_student_id(student_id)
                    .await?
                    .map(UserRow::into_user)
                    .transpose()
            })
            .await
    }

    async fn find_credentials(&self, student_id: &str) -> Result<Option<UserCredentials>, StoreError> {
        self.pool
            .bounded("find_credentials", async {
                self.fetch_by_student_id(student_id)
                    .await?
                    .map(UserRow::into_credentials)
                    .transpose()
            })
            .await
    }

    async fn seed_user(&self, new: &NewUser, password_hash: Option<String>) -> Result<(User, bool), StoreError> {
        self.pool
            .bounded("seed_user", async {
                let result = sqlx::query(
                    r#"INSERT INTO users (student_id, experiment_group, max_turns, target_turns, consent_agreed, password_hash, created_at)
                       VALUES (?, ?, ?, ?, 0, ?, ?)
                       ON CONFLICT(student_id) DO NOTHING"#,
                )
                .bind(&new.student_id)
                .bind(new.group.to_string())
                .bind(new.max_turns.map(i64::from))
                .bind(new.target_turns.map(i64::from))
                .bind(&password_hash)
                .bind(format_utc(&chrono::Utc::now()))
                .execute(&self.pool.writer)
                .await
                .map_err(map_sqlx)?;

                let inserted = result.rows_affected() > 0;
                // Read through the writer so the row just inserted is visible.
                let row = sqlx::query("SELECT * FROM users WHERE student_id = ?")
                    .bind(&new.student_id)
                    .fetch_one(&self.pool.writer)
                    .await
                    .map_err(map_sqlx)?;
                let user = UserRow::from_row(&row).map_err(map_sqlx)?.into_user()?;
                Ok((user, inserted))
            })
            .await
    }

    async fn update_quota(
        &self,
        student_id: &str,
        max_turns: Option<u32>,
        target_turns: Option<u32>,
    ) -> Result<User, StoreError> {
        self.pool
            .bounded("update_quota", async {
                let row = sqlx::query(
                    "UPDATE users SET max_turns = ?, target_turns = ? WHERE student_id = ? RETURNING *",
                )
                .bind(max_turns.map(i64::from))
                .bind(target_turns.map(i64::from))
                .bind(student_id)
                .fetch_optional(&self.pool.writer)
                .await
                .map_err(map_sqlx)?
                .ok_or(StoreError::NotFound)?;
                UserRow::from_row(&row).map_err(map_sqlx)?.into_user()
            })
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.pool
            .bounded("list_users", async {
                let rows = sqlx::query("SELECT * FROM users ORDER BY student_id")
                    .fetch_all(&self.pool.reader)
                    .await
                    .map_err(map_sqlx)?;
                let mut users = Vec::with_capacity(rows.len());
                for row in &rows {
                    users.push(UserRow::from_row(row).map_err(map_sqlx)?.into_user()?);
                }
                Ok(users)
            })
            .await
    }
}

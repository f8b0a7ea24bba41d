//! Finds or creates the session scoping a participant's conversation to today.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};
use tutorlab_types::error::{DirectoryError, StoreError};
use tutorlab_types::session::{NewSession, Session};
use tutorlab_types::user::UserId;

use crate::clock::Clock;
use crate::repository::SessionRepository;

/// Lazily creates one session per (user, topic, calendar day).
///
/// Concurrent first messages race on the UNIQUE key; the loser re-reads the
/// winner's row, so every caller converges on the same session.
pub struct SessionDirectory<S: SessionRepository> {
    sessions: S,
    clock: Arc<dyn Clock>,
}

impl<S: SessionRepository> SessionDirectory<S> {
    pub fn new(sessions: S, clock: Arc<dyn Clock>) -> Self {
        Self { sessions, clock }
    }

    pub async fn get_or_create_today_session(
        &self,
        user_id: UserId,
        topic_id: &str,
    ) -> Result<Session, DirectoryError> {
        self.get_or_create_session_on(user_id, topic_id, self.clock.today())
            .await
    }

    /// Session for `date`, created if missing.
    ///
    /// Callers that already derived the topic from a date pass that same
    /// date, so topic and session day agree across midnight.
    pub async fn get_or_create_session_on(
        &self,
        user_id: UserId,
        topic_id: &str,
        today: NaiveDate,
    ) -> Result<Session, DirectoryError> {
        let now = self.clock.now();

        if let Some(session) = self.sessions.find_session(user_id, topic_id, today).await? {
            return Ok(session);
        }

        let new = NewSession {
            user_id,
            topic_id: topic_id.to_string(),
            session_date: today,
            start_time: now,
        };
        match self.sessions.insert_session(&new).await {
            Ok(session) => {
                info!(session_id = %session.id, user_id = %user_id, topic_id, date = %today, "session created");
                Ok(session)
            }
            Err(StoreError::Conflict(_)) => {
                debug!(user_id = %user_id, topic_id, "session insert lost race, re-fetching");
                self.sessions
                    .find_session(user_id, topic_id, today)
                    .await?
                    .ok_or_else(|| DirectoryError::Unresolved {
                        user_id,
                        topic_id: topic_id.to_string(),
                    })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::clock::ManualClock;
    use crate::test_support::MemoryStore;

    fn clock(at: &str) -> Arc<ManualClock> {
        Arc::new(ManualClock::at(
            NaiveDateTime::parse_from_str(at, "%Y-%m-%d %H:%M:%S").unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_creates_then_reuses() {
        let store = MemoryStore::new();
        let user = store.add_user("s1", Some(2), None);
        let directory = SessionDirectory::new(store.clone(), clock("2024-03-04 10:00:00"));

        let first = directory.get_or_create_today_session(user.id, "day_1").await.unwrap();
        assert_eq!(first.turn_count, 0);
        assert!(!first.is_completed);
        assert!(first.end_time.is_none());

        let second = directory.get_or_create_today_session(user.id, "day_1").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_insert_race_refetches() {
        let store = MemoryStore::new();
        let user = store.add_user("s1", Some(2), None);
        store.race_next_insert();
        let directory = SessionDirectory::new(store.clone(), clock("2024-03-04 10:00:00"));

        let session = directory.get_or_create_today_session(user.id, "day_1").await.unwrap();
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.sessions()[0].id, session.id);
    }

    #[tokio::test]
    async fn test_after_midnight_opens_new_session() {
        let store = MemoryStore::new();
        let user = store.add_user("s1", Some(2), None);
        let clock = clock("2024-03-04 23:59:58");
        let directory = SessionDirectory::new(store.clone(), clock.clone());

        let before = directory.get_or_create_today_session(user.id, "day_1").await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
        let after = directory.get_or_create_today_session(user.id, "day_1").await.unwrap();

        assert_ne!(before.id, after.id);
        assert_eq!(after.session_date.to_string(), "2024-03-05");
    }

    #[tokio::test]
    async fn test_session_date_follows_caller_date() {
        let store = MemoryStore::new();
        let user = store.add_user("s1", Some(2), None);
        let clock = clock("2024-03-05 00:00:01");
        let directory = SessionDirectory::new(store.clone(), clock);

        // Topic was resolved just before midnight; the session must match it.
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let session = directory.get_or_create_session_on(user.id, "day_4", date).await.unwrap();
        assert_eq!(session.session_date, date);

        let again = directory.get_or_create_session_on(user.id, "day_4", date).await.unwrap();
        assert_eq!(again.id, session.id);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_surfaced() {
        let store = MemoryStore::new();
        let user = store.add_user("s1", Some(2), None);
        store.set_unavailable(true);
        let directory = SessionDirectory::new(store.clone(), clock("2024-03-04 10:00:00"));

        let err = directory.get_or_create_today_session(user.id, "day_1").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Store(StoreError::Unavailable(_))));
        store.set_unavailable(false);
        assert!(store.sessions().is_empty(), "no session fabricated");
    }
}

//! Progress reads, overrides, and quota edits.
//!
//! Every read of a session that already exists goes through the ledger so a
//! stale cached turn count is healed before it is served.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use tutorlab_types::error::{ProgressError, StoreError};
use tutorlab_types::message::Message;
use tutorlab_types::session::{OverrideSource, Progress, Session, UserProgress};
use tutorlab_types::user::{User, UserId};

use crate::clock::Clock;
use crate::directory::SessionDirectory;
use crate::ledger::TurnLedger;
use crate::repository::{MessageRepository, SessionRepository, UserRepository};
use crate::topic::TopicCalendar;

pub struct ProgressService<U, S, M>
where
    U: UserRepository,
    S: SessionRepository + 'static,
    M: MessageRepository + 'static,
{
    users: U,
    sessions: S,
    directory: Arc<SessionDirectory<S>>,
    ledger: Arc<TurnLedger<S, M>>,
    calendar: TopicCalendar,
    clock: Arc<dyn Clock>,
}

impl<U, S, M> ProgressService<U, S, M>
where
    U: UserRepository,
    S: SessionRepository + 'static,
    M: MessageRepository + 'static,
{
    pub fn new(
        users: U,
        sessions: S,
        directory: Arc<SessionDirectory<S>>,
        ledger: Arc<TurnLedger<S, M>>,
        calendar: TopicCalendar,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            sessions,
            directory,
            ledger,
            calendar,
            clock,
        }
    }

    async fn require_user(&self, user_id: UserId) -> Result<User, ProgressError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or(ProgressError::UserNotFound(user_id))
    }

    async fn require_student(&self, student_id: &str) -> Result<User, ProgressError> {
        self.users
            .find_by_student_id(student_id)
            .await?
            .ok_or_else(|| ProgressError::UnknownStudent(student_id.to_string()))
    }

    /// Today's session for the user without creating one.
    async fn today_session(&self, user_id: UserId) -> Result<Option<Session>, ProgressError> {
        let today = self.clock.today();
        let topic = self.calendar.topic_for(today);
        Ok(self
            .sessions
            .find_session(user_id, &topic.topic_id, today)
            .await?)
    }

    async fn today_or_create(&self, user_id: UserId) -> Result<Session, ProgressError> {
        let today = self.clock.today();
        let topic = self.calendar.topic_for(today);
        Ok(self
            .directory
            .get_or_create_session_on(user_id, &topic.topic_id, today)
            .await?)
    }

    /// Progress of today's session; zero when none was opened yet.
    pub async fn get_progress(&self, user_id: UserId) -> Result<Progress, ProgressError> {
        match self.today_session(user_id).await? {
            Some(session) => Ok(self.ledger.current_progress(session.id).await?),
            None => Ok(Progress::default()),
        }
    }

    /// Self-reported progress. Cannot take back a completion.
    pub async fn save_progress(&self, user_id: UserId, progress: Progress) -> Result<Progress, ProgressError> {
        self.require_user(user_id).await?;
        let session = self.today_or_create(user_id).await?;
        let updated = self
            .ledger
            .override_progress(session.id, progress, OverrideSource::SelfReport)
            .await?;
        Ok(updated.progress())
    }

    /// Calendar days on which the user completed a session.
    pub async fn completed_dates(&self, user_id: UserId) -> Result<Vec<NaiveDate>, ProgressError> {
        Ok(self.sessions.completed_dates(user_id).await?)
    }

    /// Today's conversation, oldest turn first.
    pub async fn today_messages(&self, user_id: UserId) -> Result<Vec<Message>, ProgressError> {
        match self.today_session(user_id).await? {
            Some(session) => Ok(self.ledger.messages(session.id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Every participant with today's progress.
    pub async fn list_users_with_progress(&self) -> Result<Vec<UserProgress>, ProgressError> {
        let today = self.clock.today();
        let users = self.users.list_users().await?;
        let sessions = self.sessions.list_sessions_on(today).await?;

        let mut listed = Vec::with_capacity(users.len());
        for user in users {
            let session = sessions.iter().find(|s| s.user_id == user.id);
            let progress = match session {
                Some(s) => self.ledger.current_progress(s.id).await?,
                None => Progress::default(),
            };
            listed.push(UserProgress {
                session_id: session.map(|s| s.id),
                user,
                progress,
            });
        }
        Ok(listed)
    }

    /// Operator override of a participant's progress for today.
    pub async fn admin_set_progress(&self, student_id: &str, progress: Progress) -> Result<Session, ProgressError> {
        let user = self.require_student(student_id).await?;
        let session = self.today_or_create(user.id).await?;
        Ok(self
            .ledger
            .override_progress(session.id, progress, OverrideSource::Admin)
            .await?)
    }

    /// Replace a participant's quota columns.
    pub async fn set_quota(
        &self,
        student_id: &str,
        max_turns: Option<u32>,
        target_turns: Option<u32>,
    ) -> Result<User, ProgressError> {
        let user = self
            .users
            .update_quota(student_id, max_turns, target_turns)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ProgressError::UnknownStudent(student_id.to_string()),
                other => other.into(),
            })?;
        info!(student_id, ?max_turns, ?target_turns, "quota updated");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;
    use tutorlab_types::message::MessageRole;

    use super::*;
    use crate::clock::ManualClock;
    use crate::test_support::MemoryStore;

    struct Fixture {
        store: MemoryStore,
        clock: Arc<ManualClock>,
        ledger: Arc<TurnLedger<MemoryStore, MemoryStore>>,
        directory: Arc<SessionDirectory<MemoryStore>>,
        service: ProgressService<MemoryStore, MemoryStore, MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::at(
            NaiveDateTime::parse_from_str("2024-01-01 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        ));
        let directory = Arc::new(SessionDirectory::new(store.clone(), clock.clone()));
        let ledger = Arc::new(TurnLedger::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            std::time::Duration::from_secs(5),
        ));
        let calendar = TopicCalendar::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 7, "C++ 编程");
        let service = ProgressService::new(
            store.clone(),
            store.clone(),
            Arc::clone(&directory),
            Arc::clone(&ledger),
            calendar,
            clock.clone(),
        );
        Fixture {
            store,
            clock,
            ledger,
            directory,
            service,
        }
    }

    #[tokio::test]
    async fn test_progress_without_session_is_zero_and_creates_nothing() {
        let f = fixture();
        let user = f.store.add_user("s1", Some(2), None);
        assert_eq!(f.service.get_progress(user.id).await.unwrap(), Progress::default());
        assert!(f.store.sessions().is_empty());
        assert!(f.service.today_messages(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_progress_heals_stale_cache() {
        let f = fixture();
        let user = f.store.add_user("s1", None, Some(6));
        let session = f.directory.get_or_create_today_session(user.id, "day_1").await.unwrap();
        f.ledger
            .record_turn(session.id, MessageRole::User, "q1", 1, None)
            .await
            .unwrap();
        f.store.push_raw_message(session.id, MessageRole::User, 2, "q2");

        let progress = f.service.get_progress(user.id).await.unwrap();
        assert_eq!(progress.turn_count, 2);
        assert_eq!(f.store.sessions()[0].turn_count, 2);
    }

    #[tokio::test]
    async fn test_save_progress_opens_session_and_sticks() {
        let f = fixture();
        let user = f.store.add_user("s1", None, Some(6));
        let saved = f
            .service
            .save_progress(
                user.id,
                Progress {
                    turn_count: 6,
                    completed: true,
                },
            )
            .await
            .unwrap();
        assert!(saved.completed);
        assert_eq!(f.service.get_progress(user.id).await.unwrap().turn_count, 6);
        assert_eq!(
            f.service.completed_dates(user.id).await.unwrap(),
            vec![NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()]
        );
    }

    #[tokio::test]
    async fn test_save_progress_unknown_user() {
        let f = fixture();
        assert!(matches!(
            f.service.save_progress(UserId(42), Progress::default()).await.unwrap_err(),
            ProgressError::UserNotFound(UserId(42))
        ));
    }

    #[tokio::test]
    async fn test_admin_listing_and_override() {
        let f = fixture();
        let a = f.store.add_user("a", Some(2), None);
        f.store.add_user("b", None, Some(6));
        let session = f.directory.get_or_create_today_session(a.id, "day_1").await.unwrap();
        f.ledger
            .record_turn(session.id, MessageRole::User, "q1", 1, None)
            .await
            .unwrap();

        let listed = f.service.list_users_with_progress().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].progress.turn_count, 1);
        assert_eq!(listed[0].session_id, Some(session.id));
        assert!(listed[1].session_id.is_none());

        let updated = f
            .service
            .admin_set_progress(
                "b",
                Progress {
                    turn_count: 3,
                    completed: true,
                },
            )
            .await
            .unwrap();
        assert!(updated.is_completed);
        assert!(updated.end_time.is_some());

        assert!(matches!(
            f.service.admin_set_progress("nobody", Progress::default()).await.unwrap_err(),
            ProgressError::UnknownStudent(_)
        ));
    }

    #[tokio::test]
    async fn test_set_quota() {
        let f = fixture();
        f.store.add_user("a", Some(2), None);
        let user = f.service.set_quota("a", None, Some(8)).await.unwrap();
        assert_eq!(user.target_turns, Some(8));
        assert!(user.max_turns.is_none());
        assert!(matches!(
            f.service.set_quota("zz", Some(1), None).await.unwrap_err(),
            ProgressError::UnknownStudent(_)
        ));
    }

    #[tokio::test]
    async fn test_new_day_reads_fresh_progress() {
        let f = fixture();
        let user = f.store.add_user("s1", Some(2), None);
        f.service
            .save_progress(
                user.id,
                Progress {
                    turn_count: 2,
                    completed: true,
                },
            )
            .await
            .unwrap();
        f.clock.advance(chrono::Duration::days(1));
        assert_eq!(f.service.get_progress(user.id).await.unwrap(), Progress::default());
    }
}

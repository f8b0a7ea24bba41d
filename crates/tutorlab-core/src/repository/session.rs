//! SessionRepository trait definition.

use chrono::{DateTime, FixedOffset, NaiveDate};
use tutorlab_types::error::StoreError;
use tutorlab_types::session::{NewSession, Progress, Reconciliation, Session, SessionId};
use tutorlab_types::user::UserId;

/// Repository trait for daily session rows.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait SessionRepository: Send + Sync {
    fn get_session(
        &self,
        id: SessionId,
    ) -> impl std::future::Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Find the session keyed by (user, topic, day).
    fn find_session(
        &self,
        user_id: UserId,
        topic_id: &str,
        session_date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Insert a fresh session with zero turns.
    ///
    /// Returns `StoreError::Conflict` when the (user, topic, day) key is taken.
    fn insert_session(
        &self,
        session: &NewSession,
    ) -> impl std::future::Future<Output = Result<Session, StoreError>> + Send;

    /// Recompute `turn_count` from the message log in one atomic statement.
    ///
    /// The derived count is `COUNT(DISTINCT turn_index)` over user messages.
    /// `is_completed` becomes true when the owner's quota is reached and is
    /// never lowered. With `respect_override` set, a session under an active
    /// override is left alone; otherwise the override is cleared. Writes only
    /// when something changed. `None` if the session does not exist.
    fn recount(
        &self,
        id: SessionId,
        respect_override: bool,
    ) -> impl std::future::Future<Output = Result<Option<Reconciliation>, StoreError>> + Send;

    /// Force turn count and completion, marking the override active.
    ///
    /// `end_time`, when given, replaces a missing end time only.
    fn apply_override(
        &self,
        id: SessionId,
        progress: Progress,
        end_time: Option<DateTime<FixedOffset>>,
    ) -> impl std::future::Future<Output = Result<Session, StoreError>> + Send;

    /// Sessions dated `session_date` that still have no end time.
    fn list_open_sessions(
        &self,
        session_date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Vec<Session>, StoreError>> + Send;

    /// Set `end_time` if it is still missing. Returns whether a row changed.
    fn stamp_end_time(
        &self,
        id: SessionId,
        end_time: DateTime<FixedOffset>,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// All sessions dated `session_date`.
    fn list_sessions_on(
        &self,
        session_date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Vec<Session>, StoreError>> + Send;

    /// Distinct days on which the user completed a session, ascending.
    fn completed_dates(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<NaiveDate>, StoreError>> + Send;
}

//! MessageRepository trait definition.
//!
//! The message log is append-only. Each append runs its checks and its
//! insert inside one write transaction, so concurrent submissions of the
//! same turn converge and a capped session never grows past its cap.

use chrono::{DateTime, Utc};
use tutorlab_types::error::StoreError;
use tutorlab_types::message::{AppendOutcome, Message, NewMessage};
use tutorlab_types::session::SessionId;

pub trait MessageRepository: Send + Sync {
    /// Append a user message.
    ///
    /// - If a user message with the same session and content was stored at or
    ///   after `dedup_since`, nothing is written and the existing row comes
    ///   back as `Duplicate`. The requested turn index is not compared: a
    ///   double-submit computes its index after the first one landed.
    /// - Otherwise, if `turn_cap` is set and the session already holds that
    ///   many distinct user turns, nothing is written (`LimitReached`).
    /// - If the turn index is already taken by different content, the message
    ///   moves to the next free index.
    fn append_user_message(
        &self,
        message: &NewMessage,
        at: DateTime<Utc>,
        dedup_since: DateTime<Utc>,
        turn_cap: Option<u32>,
    ) -> impl std::future::Future<Output = Result<AppendOutcome, StoreError>> + Send;

    /// Append a tutor reply unless the turn already has one (`Skipped`).
    fn append_ai_message(
        &self,
        message: &NewMessage,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<AppendOutcome, StoreError>> + Send;

    /// `COUNT(DISTINCT turn_index)` over the session's user messages.
    fn count_user_turns(
        &self,
        session_id: SessionId,
    ) -> impl std::future::Future<Output = Result<u32, StoreError>> + Send;

    /// One past the highest user turn index (1 for an empty session).
    fn next_turn_index(
        &self,
        session_id: SessionId,
    ) -> impl std::future::Future<Output = Result<u32, StoreError>> + Send;

    /// Messages in a session ordered by turn, then user before ai.
    fn list_messages(
        &self,
        session_id: SessionId,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, StoreError>> + Send;
}

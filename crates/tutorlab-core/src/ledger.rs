//! Authoritative turn counting.
//!
//! `sessions.turn_count` is a cache. The message log is the ground truth:
//! the count is always `COUNT(DISTINCT turn_index)` over user messages and is
//! rewritten by a single conditional statement in the store, so a reconcile
//! racing an in-flight recording can never persist a stale value.

use std::sync::Arc;

use tracing::{info, warn};
use tutorlab_types::error::{LedgerError, StoreError};
use tutorlab_types::message::{AppendOutcome, Message, MessageRole, NewMessage};
use tutorlab_types::session::{OverrideSource, Progress, Reconciliation, Session, SessionId};

use crate::clock::Clock;
use crate::repository::{MessageRepository, SessionRepository};

/// Result of recording one message.
#[derive(Debug, Clone)]
pub struct RecordedTurn {
    pub outcome: AppendOutcome,
    /// Turn index the message was actually stored under.
    pub turn_index: u32,
    /// Session progress after the write.
    pub progress: Progress,
}

pub struct TurnLedger<S: SessionRepository, M: MessageRepository> {
    sessions: S,
    messages: M,
    clock: Arc<dyn Clock>,
    dedup_window: chrono::Duration,
}

impl<S: SessionRepository, M: MessageRepository> TurnLedger<S, M> {
    pub fn new(sessions: S, messages: M, clock: Arc<dyn Clock>, dedup_window: std::time::Duration) -> Self {
        Self {
            sessions,
            messages,
            clock,
            dedup_window: chrono::Duration::from_std(dedup_window).unwrap_or(chrono::Duration::seconds(5)),
        }
    }

    async fn require_session(&self, session_id: SessionId) -> Result<Session, LedgerError> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or(LedgerError::SessionNotFound(session_id))
    }

    /// Append a message to the log and keep the cached counters in step.
    ///
    /// User messages recompute `turn_count` before returning. Tutor replies
    /// never change it; they only carry `response_time_ms`. A duplicate user
    /// submission inside the dedup window returns the existing row.
    pub async fn record_turn(
        &self,
        session_id: SessionId,
        role: MessageRole,
        content: &str,
        turn_index: u32,
        response_time_ms: Option<u64>,
    ) -> Result<RecordedTurn, LedgerError> {
        match role {
            MessageRole::User => self.record_user_turn(session_id, content, turn_index, None).await,
            MessageRole::Ai => {
                let session = self.require_session(session_id).await?;
                let now = self.clock.now_utc();
                let message = NewMessage {
                    session_id,
                    role: MessageRole::Ai,
                    turn_index,
                    content: content.to_string(),
                    response_time_ms,
                };
                let outcome = self.messages.append_ai_message(&message, now).await?;
                if matches!(outcome, AppendOutcome::Skipped) {
                    warn!(session_id = %session_id, turn_index, "turn already has a reply, not stored");
                } else {
                    info!(session_id = %session_id, turn_index, response_time_ms = ?response_time_ms, "reply recorded");
                }
                Ok(RecordedTurn {
                    outcome,
                    turn_index,
                    progress: session.progress(),
                })
            }
        }
    }

    /// Append a user message, refusing it once the session holds `turn_cap`
    /// turns.
    ///
    /// The duplicate check runs before the cap, so a resend of the last
    /// allowed turn still comes back as `Duplicate`. Both checks and the
    /// insert are one store transaction.
    pub async fn record_user_turn(
        &self,
        session_id: SessionId,
        content: &str,
        turn_index: u32,
        turn_cap: Option<u32>,
    ) -> Result<RecordedTurn, LedgerError> {
        let session = self.require_session(session_id).await?;
        let now = self.clock.now_utc();

        let message = NewMessage::user(session_id, turn_index, content);
        let outcome = self
            .messages
            .append_user_message(&message, now, now - self.dedup_window, turn_cap)
            .await?;
        let stored_index = outcome.message().map_or(turn_index, |m| m.turn_index);

        let progress = match &outcome {
            AppendOutcome::Recorded(m) => {
                if m.turn_index != turn_index {
                    warn!(
                        session_id = %session_id,
                        requested = turn_index,
                        assigned = m.turn_index,
                        "turn index already taken, message moved to next free index"
                    );
                }
                let recount = self
                    .sessions
                    .recount(session_id, false)
                    .await?
                    .ok_or(LedgerError::SessionNotFound(session_id))?;
                info!(
                    session_id = %session_id,
                    turn_index = stored_index,
                    turn_count = recount.progress.turn_count,
                    completed = recount.progress.completed,
                    "user turn recorded"
                );
                recount.progress
            }
            AppendOutcome::Duplicate(m) => {
                warn!(session_id = %session_id, message_id = %m.id, turn_index = m.turn_index, "duplicate submission ignored");
                session.progress()
            }
            AppendOutcome::LimitReached { turn_count } => {
                info!(session_id = %session_id, turn_count = *turn_count, cap = ?turn_cap, "turn cap reached, message not stored");
                session.progress()
            }
            AppendOutcome::Skipped => session.progress(),
        };

        Ok(RecordedTurn {
            outcome,
            turn_index: stored_index,
            progress,
        })
    }

    /// Recompute from the log and write only if the cache diverged.
    ///
    /// A session under an active override is left as is.
    pub async fn reconcile(&self, session_id: SessionId) -> Result<Reconciliation, LedgerError> {
        let result = self
            .sessions
            .recount(session_id, true)
            .await?
            .ok_or(LedgerError::SessionNotFound(session_id))?;
        if result.changed {
            warn!(
                session_id = %session_id,
                turn_count = result.progress.turn_count,
                completed = result.progress.completed,
                "cached turn count diverged from message log, healed"
            );
        }
        Ok(result)
    }

    /// Like [`reconcile`](Self::reconcile) but also clears an active override.
    pub async fn force_reconcile(&self, session_id: SessionId) -> Result<Reconciliation, LedgerError> {
        let result = self
            .sessions
            .recount(session_id, false)
            .await?
            .ok_or(LedgerError::SessionNotFound(session_id))?;
        if result.changed {
            info!(session_id = %session_id, turn_count = result.progress.turn_count, "session recounted");
        }
        Ok(result)
    }

    /// Progress with lazy self-healing of a stale cache.
    pub async fn current_progress(&self, session_id: SessionId) -> Result<Progress, LedgerError> {
        Ok(self.reconcile(session_id).await?.progress)
    }

    pub async fn current_turn_count(&self, session_id: SessionId) -> Result<u32, LedgerError> {
        Ok(self.current_progress(session_id).await?.turn_count)
    }

    /// Index for the next user turn of the session.
    pub async fn next_turn_index(&self, session_id: SessionId) -> Result<u32, LedgerError> {
        Ok(self.messages.next_turn_index(session_id).await?)
    }

    pub async fn messages(&self, session_id: SessionId) -> Result<Vec<Message>, LedgerError> {
        Ok(self.messages.list_messages(session_id).await?)
    }

    /// Explicitly set progress, suspending reconciliation until the next
    /// recorded user turn.
    ///
    /// A self-report can only raise `completed`; an admin may lower it.
    /// Completing stamps a missing `end_time` with the end of the session day.
    pub async fn override_progress(
        &self,
        session_id: SessionId,
        requested: Progress,
        source: OverrideSource,
    ) -> Result<Session, LedgerError> {
        let session = self.require_session(session_id).await?;
        let completed = match source {
            OverrideSource::SelfReport => requested.completed || session.is_completed,
            OverrideSource::Admin => requested.completed,
        };
        let end_time = if completed {
            self.clock.end_of_day(session.session_date)
        } else {
            None
        };
        let progress = Progress {
            turn_count: requested.turn_count,
            completed,
        };
        let updated = self
            .sessions
            .apply_override(session_id, progress, end_time)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => LedgerError::SessionNotFound(session_id),
                other => other.into(),
            })?;
        info!(
            session_id = %session_id,
            turn_count = progress.turn_count,
            completed,
            ?source,
            "progress overridden"
        );
        Ok(updated)
    }
}

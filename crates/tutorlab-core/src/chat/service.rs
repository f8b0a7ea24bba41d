//! Chat service: one tutoring turn from request to persisted reply.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};
use tutorlab_types::error::ChatError;
use tutorlab_types::llm::HistoryEntry;
use tutorlab_types::message::{AppendOutcome, MessageId, MessageRole};
use tutorlab_types::session::{Progress, SessionId};
use tutorlab_types::user::UserId;

use crate::clock::Clock;
use crate::directory::SessionDirectory;
use crate::ledger::TurnLedger;
use crate::relay::upstream::CompletionUpstream;
use crate::relay::{ChatRelay, FrameStream, RelayRequest, RelayStatus};
use crate::repository::{MessageRepository, SessionRepository, UserRepository};
use crate::topic::TopicCalendar;

/// Body of a chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<HistoryEntry>,
    pub regenerate: bool,
}

/// A started chat turn.
pub struct ChatStream {
    /// Upstream bytes for the response body.
    pub frames: FrameStream,
    pub session_id: SessionId,
    pub turn_index: u32,
    /// The user message was a duplicate submission of an existing turn.
    pub duplicate: bool,
    /// Progress after the user message was recorded.
    pub progress: Progress,
    /// Resolves after the tutor reply was persisted (or skipped).
    pub persisted: JoinHandle<Option<MessageId>>,
}

/// Orchestrates a chat turn across directory, ledger, and relay.
///
/// Generic over the repositories and upstream so tutorlab-core never depends
/// on tutorlab-infra.
pub struct ChatService<U, S, M, P>
where
    U: UserRepository,
    S: SessionRepository + 'static,
    M: MessageRepository + 'static,
    P: CompletionUpstream,
{
    users: U,
    directory: Arc<SessionDirectory<S>>,
    ledger: Arc<TurnLedger<S, M>>,
    relay: ChatRelay<P>,
    calendar: TopicCalendar,
    clock: Arc<dyn Clock>,
}

impl<U, S, M, P> ChatService<U, S, M, P>
where
    U: UserRepository,
    S: SessionRepository + 'static,
    M: MessageRepository + 'static,
    P: CompletionUpstream,
{
    pub fn new(
        users: U,
        directory: Arc<SessionDirectory<S>>,
        ledger: Arc<TurnLedger<S, M>>,
        relay: ChatRelay<P>,
        calendar: TopicCalendar,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            directory,
            ledger,
            relay,
            calendar,
            clock,
        }
    }

    /// Record the user turn and start relaying the tutor reply.
    ///
    /// Everything that can fail synchronously (unknown user, exhausted quota,
    /// store errors) fails here, before any byte is streamed. The user message
    /// and its turn-count update are committed before the upstream is opened.
    ///
    /// A resend of an already recorded turn is answered as a duplicate even
    /// when the quota is used up. The cap itself is checked by the store in
    /// the same transaction as the insert.
    pub async fn chat(&self, user_id: UserId, request: ChatRequest) -> Result<ChatStream, ChatError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(ChatError::UserNotFound(user_id))?;
        let today = self.clock.today();
        let topic = self.calendar.topic_for(today);
        let session = self
            .directory
            .get_or_create_session_on(user.id, &topic.topic_id, today)
            .await?;

        let quota = user.quota();
        let turn_index = self.ledger.next_turn_index(session.id).await?;
        let recorded = self
            .ledger
            .record_user_turn(session.id, message, turn_index, quota.turn_cap())
            .await?;
        if let AppendOutcome::LimitReached { turn_count } = recorded.outcome {
            let max_turns = quota.turn_cap().unwrap_or(turn_count);
            info!(user_id = %user.id, session_id = %session.id, turn_count, max_turns, "turn limit reached");
            return Err(ChatError::TurnLimitReached { turn_count, max_turns });
        }
        let turn_index = recorded.turn_index;
        let duplicate = recorded.outcome.is_duplicate();

        let handle = self.relay.start(RelayRequest {
            topic_name: topic.name.clone(),
            history: request.history,
            message: message.to_string(),
            regenerate: request.regenerate,
        });

        let session_id = session.id;
        let ledger = Arc::clone(&self.ledger);
        let completion = handle.completion;
        let span = tracing::info_span!("persist_reply", session_id = %session_id, turn_index);
        let persisted = tokio::spawn(
            async move {
                let outcome = completion.wait().await;
                if let RelayStatus::UpstreamError(e) = &outcome.status {
                    warn!(error = %e, partial_len = outcome.text.len(), "upstream ended with error");
                }
                if outcome.text.is_empty() {
                    warn!("empty reply, nothing persisted");
                    return None;
                }
                match ledger
                    .record_turn(
                        session_id,
                        MessageRole::Ai,
                        &outcome.text,
                        turn_index,
                        Some(outcome.latency_ms),
                    )
                    .await
                {
                    Ok(r) => r.outcome.message().map(|m| m.id),
                    Err(e) => {
                        error!(error = %e, "failed to persist reply");
                        None
                    }
                }
            }
            .instrument(span),
        );

        Ok(ChatStream {
            frames: handle.frames,
            session_id,
            turn_index,
            duplicate,
            progress: recorded.progress,
            persisted,
        })
    }
}

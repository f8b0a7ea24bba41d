//! Append-only conversation log types.
//!
//! The ordered message sequence per session is the ground truth for turn
//! counting. A user message and the tutor reply to it share a `turn_index`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::session::SessionId;

/// Row identifier of a message in the `messages` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Speaker of a stored message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('user', 'ai'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Ai,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Ai => write!(f, "ai"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "ai" | "assistant" => Ok(MessageRole::Ai),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single stored utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: MessageRole,
    /// 1-based turn this message belongs to.
    pub turn_index: u32,
    pub content: String,
    /// Upstream latency in milliseconds (tutor replies only).
    pub response_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: SessionId,
    pub role: MessageRole,
    pub turn_index: u32,
    pub content: String,
    pub response_time_ms: Option<u64>,
}

impl NewMessage {
    pub fn user(session_id: SessionId, turn_index: u32, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role: MessageRole::User,
            turn_index,
            content: content.into(),
            response_time_ms: None,
        }
    }

    pub fn ai(
        session_id: SessionId,
        turn_index: u32,
        content: impl Into<String>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            session_id,
            role: MessageRole::Ai,
            turn_index,
            content: content.into(),
            response_time_ms: Some(response_time_ms),
        }
    }
}

/// What happened when a message was appended.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    /// A new row was written.
    Recorded(Message),
    /// An equivalent row already existed; nothing was written.
    Duplicate(Message),
    /// The message was not written (tutor reply for a turn that already has one).
    Skipped,
    /// The session already holds `turn_count` user turns, at or over the cap.
    LimitReached { turn_count: u32 },
}

impl AppendOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppendOutcome::Duplicate(_))
    }

    /// The stored message, whether freshly written or pre-existing.
    pub fn message(&self) -> Option<&Message> {
        match self {
            AppendOutcome::Recorded(m) | AppendOutcome::Duplicate(m) => Some(m),
            AppendOutcome::Skipped | AppendOutcome::LimitReached { .. } => None,
        }
    }
}

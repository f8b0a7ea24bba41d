use thiserror::Error;

use crate::session::SessionId;
use crate::user::UserId;

/// Errors from store operations (used by repository traits in tutorlab-core).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (pool exhausted, closed, or never opened).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A call exceeded its deadline. Never retried.
    #[error("storage call '{operation}' timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    #[error("entity not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("query error: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors from the turn ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from resolving a participant's session for today.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Insert lost a uniqueness race but the winning row could not be read back.
    #[error("session for user {user_id} topic '{topic_id}' could not be resolved")]
    Unresolved { user_id: UserId, topic_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the upstream completion provider.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream API key is not configured")]
    MissingApiKey,

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream stream error: {0}")]
    Stream(String),
}

/// Errors surfaced to a chat caller before the stream starts.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("turn limit reached ({turn_count}/{max_turns})")]
    TurnLimitReached { turn_count: u32, max_turns: u32 },

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from progress reads, overrides, and quota edits.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("student '{0}' not found")]
    UnknownStudent(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that abort a whole sweep run (per-session failures are counted instead).
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("end-of-day instant for {0} does not exist in the local time zone")]
    UnresolvableEndOfDay(chrono::NaiveDate),
}

/// Errors from login and bearer-token resolution.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("admin access required")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Timeout {
            operation: "find_session",
            after_ms: 1000,
        };
        assert_eq!(
            err.to_string(),
            "storage call 'find_session' timed out after 1000ms"
        );
    }

    #[test]
    fn test_ledger_error_wraps_store_transparently() {
        let err: LedgerError = StoreError::Query("syntax error".to_string()).into();
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_chat_error_turn_limit_display() {
        let err = ChatError::TurnLimitReached {
            turn_count: 2,
            max_turns: 2,
        };
        assert!(err.to_string().contains("2/2"));
    }
}

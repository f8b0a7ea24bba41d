//! Daily tutoring session types.
//!
//! A session scopes one participant's conversation to one experiment day.
//! `turn_count` is a cache over the message log; see `Progress` for the
//! shape served to callers.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::user::{User, UserId};

/// Row identifier of a session in the `sessions` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// One row per (user, topic, calendar day).
///
/// Unique on `(user_id, topic_id, session_date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    /// Experiment day identifier, e.g. `day_3`.
    pub topic_id: String,
    /// Local calendar day the session belongs to.
    pub session_date: NaiveDate,
    pub start_time: DateTime<FixedOffset>,
    /// Stamped by the nightly sweep or a completion override.
    pub end_time: Option<DateTime<FixedOffset>>,
    pub turn_count: u32,
    pub is_completed: bool,
    /// Set while an explicit progress override is in effect. Suspends
    /// lazy reconciliation until the next recorded user turn.
    pub override_active: bool,
    pub satisfaction: Option<u8>,
}

impl Session {
    pub fn progress(&self) -> Progress {
        Progress {
            turn_count: self.turn_count,
            completed: self.is_completed,
        }
    }
}

/// Fields for lazily creating today's session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: UserId,
    pub topic_id: String,
    pub session_date: NaiveDate,
    pub start_time: DateTime<FixedOffset>,
}

/// A participant with today's progress, as listed for admins.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub user: User,
    /// Today's session, if the participant has opened one.
    pub session_id: Option<SessionId>,
    pub progress: Progress,
}

/// Turn count and completion flag as served by `/progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub turn_count: u32,
    pub completed: bool,
}

/// Who is applying a progress override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideSource {
    /// The participant themself. May raise `completed` but never lower it.
    SelfReport,
    /// An administrator. Free to set either value.
    Admin,
}

/// Result of a reconcile pass over one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub progress: Progress,
    /// Whether a write was issued.
    pub changed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_serializes_camel_case() {
        let progress = Progress {
            turn_count: 3,
            completed: true,
        };
        let json = serde_json::to_value(progress).unwrap();
        assert_eq!(json["turnCount"], 3);
        assert_eq!(json["completed"], true);
    }

    #[test]
    fn test_session_id_parse() {
        let id: SessionId = "42".parse().unwrap();
        assert_eq!(id, SessionId(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<SessionId>().is_err());
    }
}

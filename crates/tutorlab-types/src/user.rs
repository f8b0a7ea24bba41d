use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Row identifier of a participant in the `users` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Experimental condition a participant is assigned to.
///
/// The four cells of the 2x2 design (depth x turns). Stored in its display
/// form, matching `CHECK (experiment_group IN ('group1', .. 'group4'))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperimentGroup {
    /// Low depth, low turns. Capped at a maximum number of turns.
    #[serde(rename = "1")]
    LowDepthLowTurns,
    /// Low depth, high turns. Completes on reaching a target number of turns.
    #[serde(rename = "2")]
    LowDepthHighTurns,
    #[serde(rename = "3")]
    HighDepthLowTurns,
    #[serde(rename = "4")]
    HighDepthHighTurns,
}

impl ExperimentGroup {
    /// Bare group number.
    pub fn as_id(&self) -> &'static str {
        match self {
            ExperimentGroup::LowDepthLowTurns => "1",
            ExperimentGroup::LowDepthHighTurns => "2",
            ExperimentGroup::HighDepthLowTurns => "3",
            ExperimentGroup::HighDepthHighTurns => "4",
        }
    }

    /// Whether the depth manipulation is on for this group.
    pub fn condition_depth(&self) -> bool {
        matches!(
            self,
            ExperimentGroup::HighDepthLowTurns | ExperimentGroup::HighDepthHighTurns
        )
    }

    /// Whether the high-turns manipulation is on for this group.
    pub fn condition_turns(&self) -> bool {
        matches!(
            self,
            ExperimentGroup::LowDepthHighTurns | ExperimentGroup::HighDepthHighTurns
        )
    }

    /// Quota applied when a user is seeded without explicit quota columns.
    pub fn default_quota(&self) -> (Option<u32>, Option<u32>) {
        match self {
            ExperimentGroup::LowDepthLowTurns => (Some(2), None),
            ExperimentGroup::LowDepthHighTurns => (None, Some(6)),
            _ => (None, None),
        }
    }

    /// Infer the group from a legacy username like `group2_user1`.
    pub fn infer_from_username(username: &str) -> Option<Self> {
        ["group1", "group2", "group3", "group4"]
            .iter()
            .position(|prefix| username.contains(prefix))
            .and_then(|idx| ((idx + 1).to_string()).parse().ok())
    }
}

impl fmt::Display for ExperimentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group{}", self.as_id())
    }
}

impl FromStr for ExperimentGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().trim_start_matches("group") {
            "1" => Ok(ExperimentGroup::LowDepthLowTurns),
            "2" => Ok(ExperimentGroup::LowDepthHighTurns),
            "3" => Ok(ExperimentGroup::HighDepthLowTurns),
            "4" => Ok(ExperimentGroup::HighDepthHighTurns),
            other => Err(format!("invalid experiment group: '{other}'")),
        }
    }
}

/// How a participant's daily session reaches completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "turns", rename_all = "snake_case")]
pub enum Quota {
    /// Capped condition: no more turns once `max_turns` is reached.
    Capped(u32),
    /// Goal condition: complete once `target_turns` is reached, chatting may continue.
    Goal(u32),
    /// No quota configured; completion only via explicit override.
    Unbounded,
}

impl Quota {
    /// Whether `turn_count` satisfies this quota.
    pub fn is_reached(&self, turn_count: u32) -> bool {
        match *self {
            Quota::Capped(max) => turn_count >= max,
            Quota::Goal(target) => turn_count >= target,
            Quota::Unbounded => false,
        }
    }

    /// Turn threshold at which the session counts as complete, if any.
    pub fn threshold(&self) -> Option<u32> {
        match *self {
            Quota::Capped(n) | Quota::Goal(n) => Some(n),
            Quota::Unbounded => None,
        }
    }

    /// Hard cap on user turns, if this quota refuses turns past it.
    pub fn turn_cap(&self) -> Option<u32> {
        match *self {
            Quota::Capped(max) => Some(max),
            Quota::Goal(_) | Quota::Unbounded => None,
        }
    }
}

/// A study participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Login identity; doubles as the username.
    pub student_id: String,
    pub group: ExperimentGroup,
    pub max_turns: Option<u32>,
    pub target_turns: Option<u32>,
    pub consent_agreed: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Effective quota. `max_turns` wins when both columns are set.
    pub fn quota(&self) -> Quota {
        match (self.max_turns, self.target_turns) {
            (Some(max), _) => Quota::Capped(max),
            (None, Some(target)) => Quota::Goal(target),
            (None, None) => Quota::Unbounded,
        }
    }
}

/// A participant together with their stored password hash.
///
/// A missing hash means the student id doubles as the password.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: Option<String>,
}

/// Input for seeding or importing a participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub student_id: String,
    pub group: ExperimentGroup,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub target_turns: Option<u32>,
    /// Plain password; absent means the student id is the password.
    #[serde(default)]
    pub password: Option<String>,
}

impl NewUser {
    /// Fill missing quota columns from the group defaults.
    pub fn with_group_defaults(mut self) -> Self {
        let (max, target) = self.group.default_quota();
        self.max_turns = self.max_turns.or(max);
        self.target_turns = self.target_turns.or(target);
        self
    }
}

/// Who a bearer token speaks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Principal {
    Student { user: User },
    Admin { username: String },
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin { .. })
    }

    /// The participant behind a student principal.
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Student { user } => Some(user),
            Principal::Admin { .. } => None,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Principal::Student { user } => &user.student_id,
            Principal::Admin { username } => username,
        }
    }
}

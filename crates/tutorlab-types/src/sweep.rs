//! Nightly rollover sweep types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// What started a sweep.
///
/// Maps to `CHECK (trigger_kind IN ('scheduled', 'manual', 'catch_up'))` on `sweep_runs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepTrigger {
    Scheduled,
    Manual,
    CatchUp,
}

impl fmt::Display for SweepTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepTrigger::Scheduled => write!(f, "scheduled"),
            SweepTrigger::Manual => write!(f, "manual"),
            SweepTrigger::CatchUp => write!(f, "catch_up"),
        }
    }
}

impl FromStr for SweepTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(SweepTrigger::Scheduled),
            "manual" => Ok(SweepTrigger::Manual),
            "catch_up" => Ok(SweepTrigger::CatchUp),
            other => Err(format!("invalid sweep trigger: '{other}'")),
        }
    }
}

/// A per-session failure inside a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub session_id: i64,
    pub error: String,
}

/// Outcome of one sweep over a target day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub target_date: NaiveDate,
    pub trigger: SweepTrigger,
    /// Sessions whose `end_time` was stamped by this run.
    pub reset_count: u32,
    /// Sessions already stamped by someone else between listing and update.
    pub skipped_count: u32,
    pub error_count: u32,
    pub errors: Vec<SweepFailure>,
    pub elapsed_ms: u64,
}

impl SweepReport {
    pub fn success(&self) -> bool {
        self.error_count == 0
    }
}

/// A recorded sweep in `sweep_runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRun {
    pub id: i64,
    pub target_date: NaiveDate,
    pub trigger: SweepTrigger,
    pub reset_count: u32,
    pub error_count: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Running totals kept by the scheduler across occurrences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepTotals {
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
}

//! Experiment day and topic identifiers.

use serde::{Deserialize, Serialize};

/// The topic assigned to one experiment day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// 1-based position inside the experiment cycle.
    pub day_id: u32,
    /// Stored `sessions.topic_id`, e.g. `day_3`.
    pub topic_id: String,
    /// Human readable subject embedded in the tutor prompt.
    pub name: String,
}

impl Topic {
    pub fn for_day(day_id: u32, name: impl Into<String>) -> Self {
        Self {
            day_id,
            topic_id: format!("day_{day_id}"),
            name: name.into(),
        }
    }
}

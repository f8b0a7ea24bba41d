//! Experiment day calendar.
//!
//! Maps a calendar date to the day of the topic cycle and to the topic the
//! tutor should teach that day.

use std::collections::HashMap;

use chrono::NaiveDate;
use tutorlab_types::config::ExperimentConfig;
use tutorlab_types::topic::Topic;

#[derive(Debug, Clone)]
pub struct TopicCalendar {
    start_date: NaiveDate,
    cycle_days: u32,
    names: HashMap<u32, String>,
    default_name: String,
}

impl TopicCalendar {
    pub fn new(start_date: NaiveDate, cycle_days: u32, default_name: impl Into<String>) -> Self {
        Self {
            start_date,
            cycle_days: cycle_days.max(1),
            names: HashMap::new(),
            default_name: default_name.into(),
        }
    }

    pub fn from_config(config: &ExperimentConfig) -> Self {
        let mut calendar = Self::new(
            config.start_date,
            config.cycle_days,
            config.default_topic.clone(),
        );
        for entry in &config.topics {
            calendar.names.insert(entry.day_id, entry.name.clone());
        }
        calendar
    }

    pub fn with_topic(mut self, day_id: u32, name: impl Into<String>) -> Self {
        self.names.insert(day_id, name.into());
        self
    }

    /// 1-based day of the cycle. Dates before the start wrap backwards.
    pub fn day_id(&self, date: NaiveDate) -> u32 {
        let elapsed = (date - self.start_date).num_days();
        elapsed.rem_euclid(i64::from(self.cycle_days)) as u32 + 1
    }

    pub fn topic_for(&self, date: NaiveDate) -> Topic {
        let day_id = self.day_id(date);
        let name = self
            .names
            .get(&day_id)
            .cloned()
            .unwrap_or_else(|| self.default_name.clone());
        Topic::for_day(day_id, name)
    }
}

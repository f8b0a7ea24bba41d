//! The nightly sweep: finalize a day's sessions without deleting anything.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tutorlab_types::error::SweepError;
use tutorlab_types::sweep::{SweepFailure, SweepReport, SweepTrigger};

use crate::clock::Clock;
use crate::repository::{SessionRepository, SweepRepository};

/// Stamps `end_time` on every still-open session of a target day.
///
/// Only sessions with a missing `end_time` are touched, so running twice is
/// harmless. Messages and turn counts are never modified.
pub struct Sweeper<S: SessionRepository, W: SweepRepository> {
    sessions: S,
    runs: W,
    clock: Arc<dyn Clock>,
}

impl<S: SessionRepository, W: SweepRepository> Sweeper<S, W> {
    pub fn new(sessions: S, runs: W, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions,
            runs,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Yesterday relative to the clock.
    pub fn default_target(&self) -> NaiveDate {
        let today = self.clock.today();
        today.pred_opt().unwrap_or(today)
    }

    /// Whether a sweep for `target_date` has already been recorded.
    pub async fn already_swept(&self, target_date: NaiveDate) -> Result<bool, SweepError> {
        Ok(self.runs.last_run_for(target_date).await?.is_some())
    }

    pub async fn run(&self, target_date: NaiveDate, trigger: SweepTrigger) -> Result<SweepReport, SweepError> {
        let started = Instant::now();
        let started_at = self.clock.now_utc();
        let end_time = self
            .clock
            .end_of_day(target_date)
            .ok_or(SweepError::UnresolvableEndOfDay(target_date))?;

        let open = self.sessions.list_open_sessions(target_date).await?;
        info!(%target_date, %trigger, open = open.len(), "sweep started");

        let mut report = SweepReport {
            target_date,
            trigger,
            reset_count: 0,
            skipped_count: 0,
            error_count: 0,
            errors: Vec::new(),
            elapsed_ms: 0,
        };

        for session in open {
            match self.sessions.stamp_end_time(session.id, end_time).await {
                Ok(true) => report.reset_count += 1,
                Ok(false) => report.skipped_count += 1,
                Err(e) => {
                    error!(session_id = %session.id, error = %e, "failed to stamp end time");
                    report.error_count += 1;
                    report.errors.push(SweepFailure {
                        session_id: session.id.0,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = self.runs.record_run(&report, started_at).await {
            warn!(error = %e, "failed to record sweep run");
        }

        info!(
            %target_date,
            %trigger,
            reset_count = report.reset_count,
            skipped_count = report.skipped_count,
            error_count = report.error_count,
            elapsed_ms = report.elapsed_ms,
            "sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::SessionDirectory;
    use crate::test_support::MemoryStore;

    fn at(s: &str) -> Arc<ManualClock> {
        Arc::new(ManualClock::at(
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap(),
        ))
    }

    async fn seed_yesterday(store: &MemoryStore, n: usize) {
        let clock = at("2024-03-03 15:00:00");
        let directory = SessionDirectory::new(store.clone(), clock);
        for i in 0..n {
            let user = store.add_user(&format!("s{i}"), Some(2), None);
            directory.get_or_create_today_session(user.id, "day_7").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sweep_stamps_end_of_day() {
        let store = MemoryStore::new();
        seed_yesterday(&store, 3).await;
        let sweeper = Sweeper::new(store.clone(), store.clone(), at("2024-03-04 00:00:00"));

        let report = sweeper
            .run(sweeper.default_target(), SweepTrigger::Manual)
            .await
            .unwrap();
        assert_eq!(report.reset_count, 3);
        assert!(report.success());
        for s in store.sessions() {
            assert_eq!(s.end_time.unwrap().to_rfc3339(), "2024-03-03T23:59:59+00:00");
        }
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = MemoryStore::new();
        seed_yesterday(&store, 2).await;
        let sweeper = Sweeper::new(store.clone(), store.clone(), at("2024-03-04 00:00:00"));
        let target = sweeper.default_target();

        sweeper.run(target, SweepTrigger::Scheduled).await.unwrap();
        let writes = store.writes();
        let second = sweeper.run(target, SweepTrigger::Manual).await.unwrap();
        assert_eq!(second.reset_count, 0);
        assert_eq!(store.writes(), writes);
        assert!(sweeper.already_swept(target).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_leaves_today_and_counts_alone() {
        let store = MemoryStore::new();
        seed_yesterday(&store, 1).await;
        let today_clock = at("2024-03-04 00:00:05");
        let user = store.add_user("late", Some(2), None);
        SessionDirectory::new(store.clone(), today_clock.clone())
            .get_or_create_today_session(user.id, "day_1")
            .await
            .unwrap();
        store.corrupt_turn_count(tutorlab_types::session::SessionId(1), 2);

        let sweeper = Sweeper::new(store.clone(), store.clone(), today_clock);
        let report = sweeper.run(sweeper.default_target(), SweepTrigger::Manual).await.unwrap();
        assert_eq!(report.reset_count, 1);

        let sessions = store.sessions();
        assert!(sessions[0].end_time.is_some());
        assert_eq!(sessions[0].turn_count, 2, "turn count untouched");
        assert!(sessions[1].end_time.is_none(), "today's session stays open");
    }

    #[tokio::test]
    async fn test_sweep_counts_failures_and_continues() {
        let store = MemoryStore::new();
        seed_yesterday(&store, 3).await;
        store.fail_stamp_for(tutorlab_types::session::SessionId(2));
        let sweeper = Sweeper::new(store.clone(), store.clone(), at("2024-03-04 00:00:00"));

        let report = sweeper.run(sweeper.default_target(), SweepTrigger::Manual).await.unwrap();
        assert_eq!(report.reset_count, 2);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].session_id, 2);
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_sweep_unavailable_store_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let sweeper = Sweeper::new(store.clone(), store.clone(), at("2024-03-04 00:00:00"));
        assert!(sweeper.run(sweeper.default_target(), SweepTrigger::Manual).await.is_err());
    }
}

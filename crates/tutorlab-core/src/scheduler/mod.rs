//! Daily rollover scheduler.
//!
//! A self-rescheduling loop: compute the next local `hour:minute`, sleep until
//! then, sweep the day that just ended, repeat. The wait is recomputed every
//! iteration so wake-ups stay pinned to local wall-clock time across DST shifts.

pub mod sweep;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tutorlab_types::error::SweepError;
use tutorlab_types::sweep::{SweepReport, SweepTotals, SweepTrigger};

use crate::clock::Clock;
use crate::repository::{SessionRepository, SweepRepository};

pub use self::sweep::Sweeper;

/// Next instant strictly after now at local `at`, looking up to two days ahead
/// to step over a DST gap.
pub fn next_occurrence(clock: &dyn Clock, at: NaiveTime) -> Option<DateTime<FixedOffset>> {
    let now = clock.now();
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = clock.resolve_local(date.and_time(at)) {
            if candidate > now {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// Time to sleep until the next occurrence of `at` (tomorrow if already passed).
pub fn duration_until_next(clock: &dyn Clock, at: NaiveTime) -> Duration {
    next_occurrence(clock, at)
        .and_then(|next| (next - clock.now()).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}

pub struct ResetScheduler<S: SessionRepository, W: SweepRepository> {
    sweeper: Arc<Sweeper<S, W>>,
    at: NaiveTime,
    totals: Mutex<SweepTotals>,
}

impl<S, W> ResetScheduler<S, W>
where
    S: SessionRepository + 'static,
    W: SweepRepository + 'static,
{
    /// Schedule daily sweeps at local `hour:minute`. Out-of-range values fall
    /// back to midnight.
    pub fn new(sweeper: Arc<Sweeper<S, W>>, hour: u32, minute: u32) -> Self {
        let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_else(|| {
            warn!(hour, minute, "invalid sweep time, using 00:00");
            NaiveTime::MIN
        });
        Self {
            sweeper,
            at,
            totals: Mutex::new(SweepTotals::default()),
        }
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// Successes and failures so far.
    pub fn totals(&self) -> SweepTotals {
        match self.totals.lock() {
            Ok(t) => *t,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn tally(&self, result: &Result<SweepReport, SweepError>) {
        let mut totals = match self.totals.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        totals.runs += 1;
        match result {
            Ok(report) if report.success() => totals.successes += 1,
            _ => totals.failures += 1,
        }
    }

    async fn execute(&self, target: NaiveDate, trigger: SweepTrigger) -> Result<SweepReport, SweepError> {
        let result = self.sweeper.run(target, trigger).await;
        self.tally(&result);
        if let Err(e) = &result {
            error!(%target, %trigger, error = %e, "sweep failed");
        }
        result
    }

    /// Sweep yesterday immediately, sharing the scheduled sweep logic.
    pub async fn execute_now(&self) -> Result<SweepReport, SweepError> {
        let target = self.sweeper.default_target();
        self.execute(target, SweepTrigger::Manual).await
    }

    /// Sweep yesterday if no run was recorded for it (e.g. the process was
    /// down at the scheduled time). Returns `None` when nothing was due.
    pub async fn catch_up(&self) -> Result<Option<SweepReport>, SweepError> {
        let target = self.sweeper.default_target();
        if self.sweeper.already_swept(target).await? {
            info!(%target, "sweep already recorded, no catch-up needed");
            return Ok(None);
        }
        self.execute(target, SweepTrigger::CatchUp).await.map(Some)
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let clock = Arc::clone(self.sweeper.clock());
        loop {
            let next = next_occurrence(clock.as_ref(), self.at);
            let wait = duration_until_next(clock.as_ref(), self.at);
            // Target the day that ends at the wake-up, fixed before sleeping.
            let target = next
                .map(|n| n.date_naive())
                .unwrap_or_else(|| clock.today())
                .pred_opt()
                .unwrap_or_else(|| clock.today());
            info!(next_in_secs = wait.as_secs(), %target, "next sweep scheduled");

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("reset scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            // Failures are tallied and logged; the loop always continues.
            let _ = self.execute(target, SweepTrigger::Scheduled).await;
        }
    }

    /// Spawn the loop, optionally preceded by a catch-up sweep.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken, catch_up: bool) -> JoinHandle<()> {
        tokio::spawn(async move {
            if catch_up {
                if let Err(e) = self.catch_up().await {
                    warn!(error = %e, "catch-up sweep failed");
                }
            }
            self.run(shutdown).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::SessionDirectory;
    use crate::test_support::MemoryStore;

    fn clock(s: &str) -> Arc<ManualClock> {
        Arc::new(ManualClock::at(
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap(),
        ))
    }

    fn scheduler(store: &MemoryStore, clock: Arc<ManualClock>, hour: u32, minute: u32) -> Arc<ResetScheduler<MemoryStore, MemoryStore>> {
        let sweeper = Arc::new(Sweeper::new(store.clone(), store.clone(), clock));
        Arc::new(ResetScheduler::new(sweeper, hour, minute))
    }

    #[test]
    fn test_duration_until_later_today() {
        let c = clock("2024-03-04 22:30:00");
        let at = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        assert_eq!(duration_until_next(c.as_ref(), at), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_duration_rolls_to_tomorrow_when_passed() {
        let c = clock("2024-03-04 00:00:01");
        assert_eq!(
            duration_until_next(c.as_ref(), NaiveTime::MIN),
            Duration::from_secs(24 * 60 * 60 - 1)
        );
    }

    #[test]
    fn test_exact_boundary_schedules_tomorrow() {
        let c = clock("2024-03-04 00:00:00");
        let next = next_occurrence(c.as_ref(), NaiveTime::MIN).unwrap();
        assert_eq!(next.date_naive().to_string(), "2024-03-05");
    }

    #[test]
    fn test_invalid_time_falls_back_to_midnight() {
        let store = MemoryStore::new();
        let s = scheduler(&store, clock("2024-03-04 10:00:00"), 25, 0);
        assert_eq!(s.at(), NaiveTime::MIN);
    }

    #[tokio::test]
    async fn test_execute_now_tallies() {
        let store = MemoryStore::new();
        let s = scheduler(&store, clock("2024-03-04 09:00:00"), 0, 0);
        let report = s.execute_now().await.unwrap();
        assert_eq!(report.trigger, SweepTrigger::Manual);
        assert_eq!(report.target_date.to_string(), "2024-03-03");
        assert_eq!(s.totals().successes, 1);

        store.set_unavailable(true);
        assert!(s.execute_now().await.is_err());
        let totals = s.totals();
        assert_eq!(totals.runs, 2);
        assert_eq!(totals.failures, 1);
    }

    #[tokio::test]
    async fn test_catch_up_runs_once() {
        let store = MemoryStore::new();
        let s = scheduler(&store, clock("2024-03-04 09:00:00"), 0, 0);
        let first = s.catch_up().await.unwrap();
        assert_eq!(first.unwrap().trigger, SweepTrigger::CatchUp);
        assert!(s.catch_up().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_sweeps_at_boundary_and_stops_on_cancel() {
        let store = MemoryStore::new();
        let c = clock("2024-03-04 23:59:00");
        let user = store.add_user("s1", Some(2), None);
        SessionDirectory::new(store.clone(), c.clone())
            .get_or_create_today_session(user.id, "day_1")
            .await
            .unwrap();

        let s = scheduler(&store, c, 0, 0);
        let shutdown = CancellationToken::new();
        let handle = Arc::clone(&s).spawn(shutdown.clone(), false);

        tokio::time::sleep(Duration::from_secs(90)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(s.totals().runs, 1);
        let session = &store.sessions()[0];
        assert_eq!(
            session.end_time.unwrap().to_rfc3339(),
            "2024-03-04T23:59:59+00:00"
        );
    }
}

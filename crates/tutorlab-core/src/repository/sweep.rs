//! SweepRepository trait definition.

use chrono::{DateTime, NaiveDate, Utc};
use tutorlab_types::error::StoreError;
use tutorlab_types::sweep::{SweepReport, SweepRun};

/// Bookkeeping for sweeps, used to detect a missed nightly run.
pub trait SweepRepository: Send + Sync {
    /// Most recent recorded run for `target_date`, if any.
    fn last_run_for(
        &self,
        target_date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Option<SweepRun>, StoreError>> + Send;

    fn record_run(
        &self,
        report: &SweepReport,
        started_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<SweepRun, StoreError>> + Send;
}

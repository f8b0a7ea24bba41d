//! Wall-clock abstraction.
//!
//! Session days, sweep targets, and scheduler wake-ups are all computed in
//! local time. Services take an `Arc<dyn Clock>` so tests can pin "now".

use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

pub trait Clock: Send + Sync + 'static {
    /// Current local instant.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Resolve a local wall-clock reading to an instant.
    ///
    /// Returns `None` when the reading falls in a DST gap. Ambiguous
    /// readings resolve to the earlier instant.
    fn resolve_local(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>>;

    /// Current local calendar day.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }

    /// Last representable second of `date` (`23:59:59` local).
    fn end_of_day(&self, date: NaiveDate) -> Option<DateTime<FixedOffset>> {
        let last_second = NaiveTime::from_hms_opt(23, 59, 59)?;
        self.resolve_local(date.and_time(last_second))
    }
}

/// The host's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn resolve_local(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.fixed_offset())
    }
}

/// A clock that only moves when told to.
///
/// Uses the fixed offset of its starting instant for every local reading.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Build from a local wall-clock reading in UTC+00:00.
    pub fn at(naive: NaiveDateTime) -> Self {
        Self::new(naive.and_utc().fixed_offset())
    }

    pub fn set(&self, to: DateTime<FixedOffset>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn resolve_local(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        self.now().offset().from_local_datetime(&naive).single()
    }
}

//! Wall-clock implementations.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::domain::Clock;

/// The host clock, with calendar days in the host's local zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock that only moves when told to. Calendar days are taken in UTC so
/// results do not depend on the host zone.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_millis: AtomicI64,
}

impl ManualClock {
    pub fn at_millis(now_millis: i64) -> Self {
        Self {
            now_millis: AtomicI64::new(now_millis),
        }
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::at_millis(instant.timestamp_millis())
    }

    pub fn set_millis(&self, now_millis: i64) {
        self.now_millis.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, delta: i64) {
        self.now_millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now_millis.load(Ordering::SeqCst)
    }

    fn today(&self) -> NaiveDate {
        DateTime::from_timestamp_millis(self.now_millis())
            .map(|t| t.date_naive())
            .unwrap_or_default()
    }
}

pub(crate) fn to_utc(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

//! Credit for time that passed while the process was not running.

use rust_decimal::Decimal;

use crate::domain::ActivityState;

const MILLIS_PER_HOUR: i64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUp {
    /// Hours credited, after capping.
    pub elapsed_hours: Decimal,
    pub owed: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct CatchUpPolicy {
    pub cap_hours: Decimal,
    /// Credits must exceed this to be applied.
    pub threshold: Decimal,
}

/// What is owed for the gap between `last_observed` and `now`.
///
/// Only an engine that was left active earns while away, and only if there
/// is a previous observation to measure from. Time running backwards counts
/// as no time at all. An amount too large to represent is not owed.
pub fn resolve(
    activity: ActivityState,
    last_observed: Option<i64>,
    now: i64,
    rate_per_hour: Decimal,
    policy: CatchUpPolicy,
) -> Option<CatchUp> {
    if !activity.is_active() {
        return None;
    }
    let last_observed = last_observed?;

    let elapsed_ms = now.saturating_sub(last_observed).max(0);
    let elapsed_hours =
        (Decimal::from(elapsed_ms) / Decimal::from(MILLIS_PER_HOUR)).min(policy.cap_hours);
    let owed = elapsed_hours.checked_mul(rate_per_hour)?;

    (owed > policy.threshold).then_some(CatchUp {
        elapsed_hours,
        owed,
    })
}

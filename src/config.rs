//! Engine configuration.
//!
//! Defaults match the dashboard constants. Selected values can be
//! overridden from the environment with [`EngineConfig::from_env`].

use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::money::parse_amount;
use crate::domain::{Error, GapPolicy};
use crate::tracing::prelude::*;

/// Hourly rate used when the host application configures none.
pub const DEFAULT_RATE_PER_HOUR: Decimal = Decimal::from_parts(2000, 0, 0, false, 0);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Bounds for the wait before each tick, in milliseconds. Half-open.
    pub tick_interval_ms: Range<u64>,

    /// Bounds for the per-tick rate multiplier, in basis points
    /// (10_000 = 1.0). Half-open.
    pub multiplier_bps: Range<u32>,

    /// Longest absence credited by a single catch-up.
    pub catch_up_cap_hours: Decimal,

    /// Catch-up credits at or below this are dropped.
    pub catch_up_threshold: Decimal,

    /// Entries kept in the activity log.
    pub log_capacity: usize,

    /// Time between an accepted withdrawal and its debit.
    pub settlement_delay: Duration,

    pub minimum_withdrawal: Decimal,

    /// Seed for tick sampling. `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,

    pub gap_policy: GapPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2_000..5_000,
            multiplier_bps: 8_000..12_000,
            catch_up_cap_hours: Decimal::from(24),
            catch_up_threshold: Decimal::new(1, 2),
            log_capacity: 30,
            settlement_delay: Duration::from_millis(2_500),
            minimum_withdrawal: Decimal::from(3_000_000),
            rng_seed: None,
            gap_policy: GapPolicy::Collapse,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `EARNINGS_SEED`: tick sampling seed (u64)
    /// - `EARNINGS_MIN_WITHDRAWAL`: minimum withdrawal amount
    /// - `EARNINGS_SETTLEMENT_MS`: settlement delay in milliseconds
    /// - `EARNINGS_CATCH_UP_CAP_HOURS`: catch-up cap in hours
    /// - `EARNINGS_GAP_POLICY`: `collapse` or `zero-fill`
    ///
    /// Unparseable values are logged and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(seed) = env_value("EARNINGS_SEED", u64::from_str) {
            config.rng_seed = Some(seed);
        }
        if let Some(min) = env_value("EARNINGS_MIN_WITHDRAWAL", parse_amount) {
            config.minimum_withdrawal = min;
        }
        if let Some(ms) = env_value("EARNINGS_SETTLEMENT_MS", u64::from_str) {
            config.settlement_delay = Duration::from_millis(ms);
        }
        if let Some(cap) = env_value("EARNINGS_CATCH_UP_CAP_HOURS", parse_amount) {
            config.catch_up_cap_hours = cap;
        }
        if let Some(policy) = env_value("EARNINGS_GAP_POLICY", GapPolicy::from_str) {
            config.gap_policy = policy;
        }

        config
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.tick_interval_ms.is_empty() || self.tick_interval_ms.start == 0 {
            return Err(Error::Config(format!(
                "tick interval range {:?} must be non-empty and start above zero",
                self.tick_interval_ms
            )));
        }
        if self.multiplier_bps.is_empty() {
            return Err(Error::Config(format!(
                "multiplier range {:?} must be non-empty",
                self.multiplier_bps
            )));
        }
        if self.catch_up_cap_hours.is_sign_negative() {
            return Err(Error::Config("catch-up cap must not be negative".to_string()));
        }
        if self.catch_up_threshold.is_sign_negative() {
            return Err(Error::Config("catch-up threshold must not be negative".to_string()));
        }
        if self.minimum_withdrawal.is_sign_negative() {
            return Err(Error::Config("minimum withdrawal must not be negative".to_string()));
        }
        Ok(())
    }
}

/// Read and parse an environment variable, warning on bad values.
pub fn env_value<T, E: std::fmt::Display>(
    name: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match parse(raw.trim()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(variable = name, value = %raw, error = %e, "Ignoring invalid setting");
            None
        }
    }
}

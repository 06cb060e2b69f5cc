//! Rolling seven-day earnings window.
//!
//! The ledger always holds exactly [`HISTORY_DAYS`] entries, oldest first,
//! the last one normally being today. It records earnings only: withdrawals
//! never touch it.

use std::str::FromStr;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const HISTORY_DAYS: usize = 7;

/// How the window advances when today is not in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapPolicy {
    /// Evict the oldest day and append today, however many days were
    /// skipped.
    #[default]
    Collapse,
    /// Append a zero entry for every skipped day before today.
    ZeroFill,
}

impl FromStr for GapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collapse" => Ok(Self::Collapse),
            "zero-fill" | "zerofill" | "zero_fill" => Ok(Self::ZeroFill),
            other => Err(format!("unknown gap policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyEarning {
    pub date: NaiveDate,
    pub amount: Decimal,
}

impl DailyEarning {
    fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            amount: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DailyEarning>", into = "Vec<DailyEarning>")]
pub struct HistoryLedger {
    days: Vec<DailyEarning>,
}

impl HistoryLedger {
    /// A zeroed window covering the six days before `today` and `today`.
    pub fn ending(today: NaiveDate) -> Self {
        let days = (0..HISTORY_DAYS as u64)
            .rev()
            .map(|back| today.checked_sub_days(Days::new(back)).unwrap_or(today))
            .map(DailyEarning::zero)
            .collect();
        Self { days }
    }

    pub fn entries(&self) -> &[DailyEarning] {
        &self.days
    }

    pub fn total(&self) -> Decimal {
        self.days
            .iter()
            .fold(Decimal::ZERO, |acc, d| acc.saturating_add(d.amount))
    }

    /// Add `amount` to today's entry, advancing the window if today is not
    /// in it yet. Non-positive amounts are ignored. Returns whether the
    /// ledger changed.
    pub fn record_delta(&mut self, today: NaiveDate, amount: Decimal, policy: GapPolicy) -> bool {
        if amount <= Decimal::ZERO {
            return false;
        }

        if let Some(entry) = self.days.iter_mut().find(|d| d.date == today) {
            entry.amount = entry.amount.saturating_add(amount);
            return true;
        }

        let newest = self.days.last().map(|d| d.date);
        match (policy, newest) {
            (GapPolicy::ZeroFill, Some(newest)) if today > newest => {
                let gap = (today - newest).num_days() as u64;
                if gap >= HISTORY_DAYS as u64 {
                    *self = Self::ending(today);
                } else {
                    for step in 1..gap {
                        if let Some(date) = newest.checked_add_days(Days::new(step)) {
                            self.days.push(DailyEarning::zero(date));
                        }
                    }
                    self.days.push(DailyEarning::zero(today));
                    let excess = self.days.len().saturating_sub(HISTORY_DAYS);
                    self.days.drain(..excess);
                }
                if let Some(last) = self.days.last_mut() {
                    last.amount = last.amount.saturating_add(amount);
                }
            }
            _ => {
                self.days.remove(0);
                self.days.push(DailyEarning {
                    date: today,
                    amount,
                });
            }
        }

        true
    }
}

impl TryFrom<Vec<DailyEarning>> for HistoryLedger {
    type Error = String;

    fn try_from(days: Vec<DailyEarning>) -> Result<Self, Self::Error> {
        if days.len() != HISTORY_DAYS {
            return Err(format!(
                "expected {} history entries, found {}",
                HISTORY_DAYS,
                days.len()
            ));
        }
        if days.iter().any(|d| d.amount.is_sign_negative() && !d.amount.is_zero()) {
            return Err("negative history amount".to_string());
        }
        Ok(Self { days })
    }
}

impl From<HistoryLedger> for Vec<DailyEarning> {
    fn from(ledger: HistoryLedger) -> Self {
        ledger.days
    }
}

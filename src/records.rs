//! Typed access to one user's persisted records.
//!
//! | key                  | value                         |
//! |----------------------|-------------------------------|
//! | `balance:{user}`     | decimal string                |
//! | `status:{user}`      | `true` / `false`              |
//! | `history:{user}`     | JSON array of 7 `{date, amount}` |
//! | `last_update:{user}` | milliseconds since the epoch  |
//!
//! Loaders never fail. A missing record yields the default; a record that
//! cannot be read or parsed is logged and also yields the default.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::money::parse_amount;
use crate::domain::{ActivityState, Error, HistoryLedger, KeyValueStore};
use crate::tracing::prelude::*;

pub struct UserRecords {
    user: String,
    store: Arc<dyn KeyValueStore>,
}

impl UserRecords {
    pub fn new(store: Arc<dyn KeyValueStore>, user: &str) -> Self {
        Self {
            user: user.to_string(),
            store,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn balance_key(&self) -> String {
        format!("balance:{}", self.user)
    }

    pub fn status_key(&self) -> String {
        format!("status:{}", self.user)
    }

    pub fn history_key(&self) -> String {
        format!("history:{}", self.user)
    }

    pub fn last_update_key(&self) -> String {
        format!("last_update:{}", self.user)
    }

    pub fn load_balance(&self) -> Decimal {
        self.load(&self.balance_key(), |raw| {
            parse_amount(raw).map_err(|e| e.to_string())
        })
        .unwrap_or(Decimal::ZERO)
    }

    pub fn load_activity(&self) -> ActivityState {
        self.load(&self.status_key(), |raw| match raw.trim() {
            "true" => Ok(ActivityState::Active),
            "false" => Ok(ActivityState::Inactive),
            other => Err(format!("expected true or false, found {:?}", other)),
        })
        .unwrap_or_default()
    }

    /// The stored window, or a zeroed one ending `today`.
    pub fn load_history(&self, today: NaiveDate) -> HistoryLedger {
        self.load(&self.history_key(), |raw| {
            serde_json::from_str::<HistoryLedger>(raw).map_err(|e| e.to_string())
        })
        .unwrap_or_else(|| HistoryLedger::ending(today))
    }

    pub fn load_last_observed(&self) -> Option<i64> {
        self.load(&self.last_update_key(), |raw| {
            raw.trim().parse::<i64>().map_err(|e| e.to_string())
        })
    }

    pub fn save_balance(&self, balance: Decimal) -> Result<(), Error> {
        self.store.set(&self.balance_key(), &balance.normalize().to_string())
    }

    pub fn save_activity(&self, activity: ActivityState) -> Result<(), Error> {
        let flag = if activity.is_active() { "true" } else { "false" };
        self.store.set(&self.status_key(), flag)
    }

    pub fn save_history(&self, history: &HistoryLedger) -> Result<(), Error> {
        self.store
            .set(&self.history_key(), &serde_json::to_string(history)?)
    }

    pub fn save_last_observed(&self, millis: i64) -> Result<(), Error> {
        self.store.set(&self.last_update_key(), &millis.to_string())
    }

    fn load<T>(&self, key: &str, parse: impl FnOnce(&str) -> Result<T, String>) -> Option<T> {
        match self.read(key, parse) {
            Ok(value) => value,
            Err(e) => {
                warn!(user = %self.user, key, error = %e, "Discarding unreadable record");
                None
            }
        }
    }

    fn read<T>(
        &self,
        key: &str,
        parse: impl FnOnce(&str) -> Result<T, String>,
    ) -> Result<Option<T>, Error> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };

        parse(&raw)
            .map(Some)
            .map_err(|reason| Error::MalformedPersistedState {
                key: key.to_string(),
                reason,
            })
    }
}

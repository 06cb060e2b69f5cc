use chrono::NaiveDate;

use crate::domain::Error;

/// Durable string storage addressed by namespaced keys.
///
/// Writes overwrite by key, so repeating one is harmless.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    fn set(&self, key: &str, value: &str) -> Result<(), Error>;
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// The current calendar day in the user's local zone.
    fn today(&self) -> NaiveDate;
}

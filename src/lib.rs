//! Simulated earnings accrual with offline catch-up, a rolling seven-day
//! ledger and a withdrawal workflow, persisted through a pluggable
//! key-value store.

pub mod catch_up;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod records;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod tracing;
pub mod workflow;

pub use clock::{ManualClock, SystemClock};
pub use config::EngineConfig;
pub use domain::{
    ActivityState, DailyEarning, Error, GapPolicy, HistoryLedger, KeyValueStore, LogEntry,
    LogKind, WithdrawalError, WithdrawalRequest, WithdrawalStep,
};
pub use engine::{Engine, EngineEvent};
pub use store::{JsonFileStore, MemoryStore};
pub use workflow::{SettlementHandle, WithdrawalWorkflow};

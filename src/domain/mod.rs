pub mod activity;
pub mod error;
pub mod history;
pub mod logbook;
pub mod money;
pub mod traits;
pub mod withdrawal;

pub use activity::ActivityState;
pub use error::{Error, WithdrawalError};
pub use history::{DailyEarning, GapPolicy, HistoryLedger};
pub use logbook::{ActivityLog, LogEntry, LogKind};
pub use traits::{Clock, KeyValueStore};
pub use withdrawal::{PayoutMethod, WithdrawalRequest, WithdrawalStep};

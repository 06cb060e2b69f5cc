use rust_decimal::Decimal;

/// Reasons a withdrawal is refused. These are shown on the withdrawal form
/// and never change the balance or the history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WithdrawalError {
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Amount {amount} is below the minimum withdrawal of {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unsupported bank: {0}")]
    UnknownBank(String),

    #[error("Withdrawal form is not accepting submissions")]
    NotAccepting,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Withdrawal(#[from] WithdrawalError),

    #[error("Malformed persisted state at {key}: {reason}")]
    MalformedPersistedState { key: String, reason: String },

    #[error("Store failed with: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Settlement did not complete: {0}")]
    Settlement(String),
}

//! Withdrawal workflow: Form -> Processing -> Success.
//!
//! A submitted request is validated against the balance at that moment.
//! Once accepted, the settlement timer runs to completion no matter what
//! the form does afterwards: reopening the form starts a new session, and
//! the old settlement still debits but no longer drives the form.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;

use crate::domain::money::format_whole;
use crate::domain::{Error, LogKind, WithdrawalError, WithdrawalRequest, WithdrawalStep};
use crate::engine::Engine;
use crate::tracing::prelude::*;

#[derive(Debug, Default)]
struct Session {
    generation: u64,
    step: WithdrawalStep,
}

pub struct WithdrawalWorkflow {
    engine: Engine,
    session: Arc<Mutex<Session>>,
}

/// A settlement in flight.
#[derive(Debug)]
pub struct SettlementHandle {
    handle: JoinHandle<Result<Decimal, Error>>,
}

impl SettlementHandle {
    /// Wait for the debit. Resolves with the balance after it.
    pub async fn wait(self) -> Result<Decimal, Error> {
        self.handle
            .await
            .map_err(|e| Error::Settlement(e.to_string()))?
    }
}

impl WithdrawalWorkflow {
    pub fn open(engine: Engine) -> Self {
        Self {
            engine,
            session: Arc::new(Mutex::new(Session::default())),
        }
    }

    pub fn step(&self) -> WithdrawalStep {
        lock(&self.session).step.clone()
    }

    /// Back to an empty form, whatever state the previous session was in.
    pub fn reopen(&self) {
        let mut session = lock(&self.session);
        session.generation += 1;
        session.step = WithdrawalStep::default();
    }

    /// Validate `request` and, if it passes, start settlement. A rejected
    /// request leaves the form open with the error attached.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: WithdrawalRequest) -> Result<SettlementHandle, WithdrawalError> {
        let mut session = lock(&self.session);
        if !matches!(session.step, WithdrawalStep::Form { .. }) {
            return Err(WithdrawalError::NotAccepting);
        }

        let config = self.engine.config();
        let available = self.engine.current_balance();
        if let Err(e) = request.validate(available, config.minimum_withdrawal) {
            debug!(user = self.engine.user(), error = %e, "Withdrawal rejected");
            session.step = WithdrawalStep::Form {
                error: Some(e.clone()),
            };
            return Err(e);
        }

        session.step = WithdrawalStep::Processing;
        info!(
            user = self.engine.user(),
            amount = %request.amount,
            bank = %request.bank,
            "Withdrawal accepted"
        );
        self.engine.log(
            LogKind::Info,
            format!(
                "Withdrawal of {} to {} submitted",
                format_whole(request.amount),
                request.bank
            ),
        );

        let handle = tokio::spawn(settle(
            self.engine.clone(),
            self.session.clone(),
            session.generation,
            request.amount,
            config.settlement_delay,
        ));
        Ok(SettlementHandle { handle })
    }
}

async fn settle(
    engine: Engine,
    session: Arc<Mutex<Session>>,
    generation: u64,
    amount: Decimal,
    delay: Duration,
) -> Result<Decimal, Error> {
    tokio::time::sleep(delay).await;

    let result = engine.debit(amount);
    let mut session = lock(&session);
    let current = session.generation == generation;

    match &result {
        Ok(balance) => {
            info!(user = engine.user(), %amount, %balance, "Withdrawal settled");
            engine.log(
                LogKind::Success,
                format!("Withdrawal settled: -{}", format_whole(amount)),
            );
            if current {
                session.step = WithdrawalStep::Success;
            }
        }
        Err(e) => {
            engine.log(LogKind::Warning, format!("Withdrawal failed: {}", e));
            if current {
                let error = match e {
                    Error::Withdrawal(w) => w.clone(),
                    _ => WithdrawalError::InsufficientFunds {
                        requested: amount,
                        available: engine.current_balance(),
                    },
                };
                session.step = WithdrawalStep::Form { error: Some(error) };
            }
        }
    }

    result
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

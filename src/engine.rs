//! The accrual engine.
//!
//! [`Engine`] is a cheap, cloneable handle. All balance mutations happen
//! synchronously under one state lock, so a tick, a catch-up credit and a
//! withdrawal debit can never interleave. The only background activity is
//! the tick loop, which holds the engine weakly: dropping the last handle
//! tears the loop down.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use futures::stream;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::catch_up::{self, CatchUp, CatchUpPolicy};
use crate::clock::to_utc;
use crate::config::EngineConfig;
use crate::domain::money::format_whole;
use crate::domain::{
    ActivityLog, ActivityState, Clock, Error, HistoryLedger, KeyValueStore, LogEntry, LogKind,
    WithdrawalError,
};
use crate::records::UserRecords;
use crate::scheduler::{Tick, TickSampler, TickSink, Ticker};
use crate::tracing::prelude::*;

const EVENT_CAPACITY: usize = 64;

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A live tick was credited. Doubles as the activity pulse.
    Tick { amount: Decimal, balance: Decimal },
    /// Offline earnings were credited at startup.
    CatchUp {
        owed: Decimal,
        elapsed_hours: Decimal,
        balance: Decimal,
    },
    /// An increment was credited through [`Engine::apply_increment`].
    Credited { amount: Decimal, balance: Decimal },
    Debited { amount: Decimal, balance: Decimal },
    ActivityChanged(ActivityState),
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    records: UserRecords,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    sampler: Mutex<TickSampler>,
    state: Mutex<State>,
    events: broadcast::Sender<EngineEvent>,
}

struct State {
    balance: Decimal,
    activity: ActivityState,
    rate_per_hour: Decimal,
    history: HistoryLedger,
    logs: ActivityLog,
    ticker: Option<Ticker>,
    closed: bool,
}

impl Engine {
    /// Load `user_id`'s records, credit any offline catch-up once, and
    /// resume ticking if the user left the engine active.
    ///
    /// The last-observed instant is rewritten to now whether or not a
    /// credit was applied, so a catch-up is never applied twice. Must be
    /// called from within a Tokio runtime.
    pub fn initialize(
        user_id: &str,
        rate_per_hour: Decimal,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        check_rate(rate_per_hour, &config)?;

        let records = UserRecords::new(store, user_id);
        let now = clock.now_millis();
        let state = State {
            balance: records.load_balance(),
            activity: records.load_activity(),
            rate_per_hour,
            history: records.load_history(clock.today()),
            logs: ActivityLog::with_capacity(config.log_capacity),
            ticker: None,
            closed: false,
        };
        let last_observed = records.load_last_observed();

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let sampler = TickSampler::new(
            config.rng_seed,
            config.tick_interval_ms.clone(),
            config.multiplier_bps.clone(),
        );
        let engine = Self {
            inner: Arc::new(Inner {
                records,
                clock,
                config,
                sampler: Mutex::new(sampler),
                state: Mutex::new(state),
                events,
            }),
        };

        {
            let inner = &engine.inner;
            let mut state = inner.state();
            let policy = CatchUpPolicy {
                cap_hours: inner.config.catch_up_cap_hours,
                threshold: inner.config.catch_up_threshold,
            };

            if let Some(CatchUp {
                elapsed_hours,
                owed,
            }) = catch_up::resolve(state.activity, last_observed, now, rate_per_hour, policy)
                && inner.credit(&mut state, owed)
            {
                info!(
                    user = inner.records.user(),
                    %owed,
                    %elapsed_hours,
                    balance = %state.balance,
                    "Credited offline earnings"
                );
                inner.log(
                    &mut state,
                    LogKind::Success,
                    format!("Offline sync: +{} while away", format_whole(owed)),
                );
                inner.emit(EngineEvent::CatchUp {
                    owed,
                    elapsed_hours,
                    balance: state.balance,
                });
            }

            inner.persist(inner.records.save_last_observed(now));

            if state.activity.is_active() {
                state.ticker = Some(Ticker::spawn(Arc::downgrade(inner)));
            }

            info!(
                user = inner.records.user(),
                balance = %state.balance,
                activity = %state.activity,
                "Engine initialized"
            );
        }

        Ok(engine)
    }

    /// Start or stop accrual. Stopping cancels the pending tick before it
    /// can apply; starting again begins a fresh cycle.
    pub fn set_active(&self, active: bool) {
        let inner = &self.inner;
        let mut state = inner.state();

        if state.closed {
            warn!(user = inner.records.user(), "Ignoring activity change after shutdown");
            return;
        }

        let activity = ActivityState::from_flag(active);
        if active {
            if state.ticker.as_ref().is_none_or(Ticker::is_finished) {
                state.ticker = Some(Ticker::spawn(Arc::downgrade(inner)));
            }
        } else if let Some(ticker) = state.ticker.take() {
            ticker.cancel();
        }

        let changed = state.activity != activity;
        state.activity = activity;
        inner.persist(inner.records.save_activity(activity));
        inner.persist(inner.records.save_last_observed(inner.clock.now_millis()));

        if changed {
            info!(user = inner.records.user(), %activity, "Activity changed");
            let message = if active { "Node started" } else { "Node paused" };
            inner.log(&mut state, LogKind::Info, message);
            inner.emit(EngineEvent::ActivityChanged(activity));
        }
    }

    /// Change the hourly rate. An active engine drops its pending tick and
    /// starts a fresh cycle at the new rate.
    pub fn set_rate_per_hour(&self, rate_per_hour: Decimal) -> Result<(), Error> {
        check_rate(rate_per_hour, &self.inner.config)?;

        let inner = &self.inner;
        let mut state = inner.state();
        if state.rate_per_hour == rate_per_hour {
            return Ok(());
        }
        state.rate_per_hour = rate_per_hour;

        if let Some(ticker) = state.ticker.take() {
            ticker.cancel();
            state.ticker = Some(Ticker::spawn(Arc::downgrade(inner)));
        }
        info!(user = inner.records.user(), %rate_per_hour, "Rate changed");
        Ok(())
    }

    /// Credit `amount`. Non-positive amounts are ignored.
    pub fn apply_increment(&self, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }

        let inner = &self.inner;
        let mut state = inner.state();
        if !inner.credit(&mut state, amount) {
            return;
        }
        inner.emit(EngineEvent::Credited {
            amount,
            balance: state.balance,
        });
    }

    /// Take `amount` out of the balance. Returns the new balance.
    pub fn debit(&self, amount: Decimal) -> Result<Decimal, Error> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!("cannot debit {}", amount)));
        }

        let inner = &self.inner;
        let mut state = inner.state();
        if amount > state.balance {
            return Err(WithdrawalError::InsufficientFunds {
                requested: amount,
                available: state.balance,
            }
            .into());
        }

        state.balance -= amount;
        inner.persist(inner.records.save_balance(state.balance));
        info!(user = inner.records.user(), %amount, balance = %state.balance, "Debited");
        inner.emit(EngineEvent::Debited {
            amount,
            balance: state.balance,
        });

        Ok(state.balance)
    }

    /// Tear down: cancel the pending tick without recording the engine as
    /// inactive, so the next initialization can catch up.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let mut state = inner.state();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(ticker) = state.ticker.take() {
            ticker.cancel();
        }
        inner.persist(inner.records.save_last_observed(inner.clock.now_millis()));
        debug!(user = inner.records.user(), "Engine shut down");
    }

    pub fn current_balance(&self) -> Decimal {
        self.inner.state().balance
    }

    pub fn current_activity_state(&self) -> ActivityState {
        self.inner.state().activity
    }

    pub fn current_history(&self) -> HistoryLedger {
        self.inner.state().history.clone()
    }

    /// Activity log, newest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.inner.state().logs.newest_first()
    }

    pub fn rate_per_hour(&self) -> Decimal {
        self.inner.state().rate_per_hour
    }

    pub fn user(&self) -> &str {
        self.inner.records.user()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Events as a stream. Ends when the engine is dropped; events missed
    /// by a slow consumer are skipped.
    pub fn events(&self) -> impl Stream<Item = EngineEvent> + Send + use<> {
        stream::unfold(self.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Event consumer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    pub(crate) fn log(&self, kind: LogKind, message: impl Into<String>) {
        let mut state = self.inner.state();
        self.inner.log(&mut state, kind, message);
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false`, leaving everything untouched, if the new balance
    /// would not be representable.
    fn credit(&self, state: &mut State, amount: Decimal) -> bool {
        let Some(balance) = state.balance.checked_add(amount) else {
            warn!(
                user = self.records.user(),
                %amount,
                balance = %state.balance,
                "Dropping credit that would overflow the balance"
            );
            return false;
        };
        state.balance = balance;
        state
            .history
            .record_delta(self.clock.today(), amount, self.config.gap_policy);

        self.persist(self.records.save_balance(state.balance));
        self.persist(self.records.save_last_observed(self.clock.now_millis()));
        self.persist(self.records.save_history(&state.history));
        true
    }

    fn log(&self, state: &mut State, kind: LogKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            LogKind::Warning => warn!(user = self.records.user(), "{}", message),
            LogKind::Info | LogKind::Success => {
                debug!(user = self.records.user(), "{}", message)
            }
        }
        state
            .logs
            .push(to_utc(self.clock.now_millis()), kind, message);
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Persistence failures never stop accrual; memory stays authoritative.
    fn persist(&self, result: Result<(), Error>) {
        if let Err(e) = result {
            warn!(user = self.records.user(), error = %e, "Failed to persist engine state");
        }
    }
}

impl TickSink for Inner {
    fn next_tick(&self) -> Tick {
        let rate = self.state().rate_per_hour;
        self.sampler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample(rate)
    }

    fn apply_tick(&self, token: &CancellationToken, tick: Tick) -> bool {
        let mut state = self.state();
        if token.is_cancelled() || state.closed {
            return false;
        }
        if tick.amount <= Decimal::ZERO {
            return true;
        }

        if !self.credit(&mut state, tick.amount) {
            return true;
        }
        self.log(
            &mut state,
            LogKind::Info,
            format!("Packet processed: +{}", tick.amount.round_dp(2)),
        );
        self.emit(EngineEvent::Tick {
            amount: tick.amount,
            balance: state.balance,
        });
        true
    }
}

/// A rate must be non-negative, and a full catch-up at it must fit in a
/// `Decimal`.
fn check_rate(rate_per_hour: Decimal, config: &EngineConfig) -> Result<(), Error> {
    if rate_per_hour.is_sign_negative() && !rate_per_hour.is_zero() {
        return Err(Error::Config(format!(
            "rate per hour must not be negative, got {}",
            rate_per_hour
        )));
    }
    let cap_hours = config.catch_up_cap_hours.max(Decimal::ONE);
    if cap_hours.checked_mul(rate_per_hour).is_none() {
        return Err(Error::Config(format!(
            "rate per hour {} is too large",
            rate_per_hour
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use futures::StreamExt;

    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    const HOUR: i64 = 3_600_000;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let start = Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap();
            Self {
                store: Arc::new(MemoryStore::new()),
                clock: Arc::new(ManualClock::at(start)),
            }
        }

        fn engine(&self, rate: i64, config: EngineConfig) -> Engine {
            Engine::initialize(
                "alice",
                Decimal::from(rate),
                self.store.clone(),
                self.clock.clone(),
                config,
            )
            .unwrap()
        }

        fn get(&self, key: &str) -> Option<String> {
            self.store.get(key).unwrap()
        }

        fn set(&self, key: &str, value: &str) {
            self.store.set(key, value).unwrap();
        }
    }

    fn seeded(seed: u64) -> EngineConfig {
        EngineConfig {
            rng_seed: Some(seed),
            ..Default::default()
        }
    }

    fn expected_sampler(seed: u64) -> TickSampler {
        let config = EngineConfig::default();
        TickSampler::new(Some(seed), config.tick_interval_ms, config.multiplier_bps)
    }

    #[tokio::test]
    async fn first_access_creates_defaults() {
        let f = Fixture::new();
        let engine = f.engine(2000, EngineConfig::default());

        assert_eq!(engine.current_balance(), Decimal::ZERO);
        assert_eq!(engine.current_activity_state(), ActivityState::Inactive);
        assert_eq!(
            engine.current_history(),
            HistoryLedger::ending(f.clock.today())
        );
        assert_eq!(
            f.get("last_update:alice"),
            Some(f.clock.now_millis().to_string())
        );
        assert!(engine.logs().is_empty());
    }

    #[tokio::test]
    async fn rejects_negative_rate() {
        let f = Fixture::new();
        let result = Engine::initialize(
            "alice",
            Decimal::NEGATIVE_ONE,
            f.store.clone(),
            f.clock.clone(),
            EngineConfig::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_add_exactly_their_increments() {
        let f = Fixture::new();
        let engine = f.engine(3600, seeded(1));
        let mut rx = engine.subscribe();
        engine.set_active(true);

        let mut total = Decimal::ZERO;
        let mut ticks = 0;
        while ticks < 5 {
            if let EngineEvent::Tick { amount, balance } = rx.recv().await.unwrap() {
                assert!(amount >= Decimal::new(16, 1) && amount < Decimal::from(6));
                total += amount;
                assert_eq!(balance, total);
                ticks += 1;
            }
        }

        assert_eq!(engine.current_balance(), total);
        assert_eq!(engine.current_history().entries()[6].amount, total);
        assert_eq!(f.get("balance:alice"), Some(total.normalize().to_string()));
        assert_eq!(f.get("status:alice").as_deref(), Some("true"));
        // "Node started" plus one entry per tick
        assert_eq!(engine.logs().len(), 6);
        assert!(engine.logs()[0].message.starts_with("Packet processed"));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_ticks_are_reproducible() {
        let f = Fixture::new();
        let engine = f.engine(2000, seeded(42));
        let mut expected = expected_sampler(42);
        let first = expected.sample(Decimal::from(2000));
        let second = expected.sample(Decimal::from(2000));

        engine.set_active(true);
        tokio::time::sleep(first.interval + Duration::from_millis(1)).await;
        assert_eq!(engine.current_balance(), first.amount);

        tokio::time::sleep(second.interval).await;
        assert_eq!(engine.current_balance(), first.amount + second.amount);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivating_mid_cycle_discards_the_pending_tick() {
        let f = Fixture::new();
        let engine = f.engine(2000, seeded(7));

        engine.set_active(true);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        engine.set_active(false);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(engine.current_balance(), Decimal::ZERO);
        assert_eq!(engine.current_activity_state(), ActivityState::Inactive);
        assert_eq!(f.get("status:alice").as_deref(), Some("false"));
        assert_eq!(f.get("balance:alice"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reactivating_starts_a_fresh_cycle() {
        let f = Fixture::new();
        let engine = f.engine(2000, seeded(8));
        let mut expected = expected_sampler(8);
        let _cancelled = expected.sample(Decimal::from(2000));
        let fresh = expected.sample(Decimal::from(2000));

        engine.set_active(true);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        engine.set_active(false);
        engine.set_active(true);

        tokio::time::sleep(fresh.interval + Duration::from_millis(1)).await;
        assert_eq!(engine.current_balance(), fresh.amount);
    }

    #[tokio::test(start_paused = true)]
    async fn activating_twice_keeps_one_loop() {
        let f = Fixture::new();
        let engine = f.engine(2000, seeded(9));
        let mut expected = expected_sampler(9);
        let first = expected.sample(Decimal::from(2000));

        engine.set_active(true);
        engine.set_active(true);
        tokio::time::sleep(first.interval + Duration::from_millis(1)).await;

        assert_eq!(engine.current_balance(), first.amount);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_change_restarts_the_cycle_at_the_new_rate() {
        let f = Fixture::new();
        let engine = f.engine(2000, seeded(10));
        let mut expected = expected_sampler(10);
        let tick = expected.sample(Decimal::from(9000));

        engine.set_active(true);
        engine.set_rate_per_hour(Decimal::from(9000)).unwrap();
        tokio::time::sleep(tick.interval + Duration::from_millis(1)).await;

        assert_eq!(engine.current_balance(), tick.amount);
        assert_eq!(engine.rate_per_hour(), Decimal::from(9000));
        assert!(engine.set_rate_per_hour(Decimal::NEGATIVE_ONE).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_ticking_but_stays_active_on_disk() {
        let f = Fixture::new();
        let engine = f.engine(2000, seeded(11));

        engine.set_active(true);
        engine.shutdown();
        engine.set_active(false);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(engine.current_balance(), Decimal::ZERO);
        assert_eq!(f.get("status:alice").as_deref(), Some("true"));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_engine_stops_accrual() {
        let f = Fixture::new();
        let engine = f.engine(2000, seeded(12));
        engine.set_active(true);
        drop(engine);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.get("balance:alice"), None);
    }

    #[tokio::test]
    async fn catches_up_on_time_spent_away_while_active() {
        let f = Fixture::new();
        let now = f.clock.now_millis();
        f.set("status:alice", "true");
        f.set("balance:alice", "500");
        f.set("last_update:alice", &(now - 2 * HOUR).to_string());

        let engine = f.engine(1000, seeded(13));

        assert_eq!(engine.current_balance(), Decimal::from(2500));
        assert_eq!(engine.current_history().entries()[6].amount, Decimal::from(2000));
        assert_eq!(f.get("last_update:alice"), Some(now.to_string()));
        assert_eq!(engine.logs()[0].kind, LogKind::Success);

        // Re-initializing right away must not credit the same gap again.
        engine.shutdown();
        let again = f.engine(1000, seeded(13));
        assert_eq!(again.current_balance(), Decimal::from(2500));
        assert!(again.logs().is_empty());
    }

    #[tokio::test]
    async fn catch_up_is_capped_at_a_day() {
        let f = Fixture::new();
        f.set("status:alice", "true");
        f.set("last_update:alice", "0");

        let engine = f.engine(1000, EngineConfig::default());
        assert_eq!(engine.current_balance(), Decimal::from(24_000));
    }

    #[tokio::test]
    async fn no_catch_up_when_left_inactive() {
        let f = Fixture::new();
        let now = f.clock.now_millis();
        f.set("status:alice", "false");
        f.set("last_update:alice", &(now - 5 * HOUR).to_string());

        let engine = f.engine(1000, EngineConfig::default());
        assert_eq!(engine.current_balance(), Decimal::ZERO);
        assert_eq!(f.get("last_update:alice"), Some(now.to_string()));
    }

    #[tokio::test]
    async fn malformed_records_start_from_defaults() {
        let f = Fixture::new();
        f.set("balance:alice", "plenty");
        f.set("status:alice", "yes");
        f.set("history:alice", "{not json");

        let engine = f.engine(1000, EngineConfig::default());
        assert_eq!(engine.current_balance(), Decimal::ZERO);
        assert_eq!(engine.current_activity_state(), ActivityState::Inactive);
        assert_eq!(engine.current_history(), HistoryLedger::ending(f.clock.today()));
    }

    #[tokio::test]
    async fn increments_persist_and_ignore_non_positive_amounts() {
        let f = Fixture::new();
        let engine = f.engine(1000, EngineConfig::default());

        engine.apply_increment(Decimal::ZERO);
        engine.apply_increment(Decimal::NEGATIVE_ONE);
        assert_eq!(f.get("balance:alice"), None);

        f.clock.advance_millis(5_000);
        engine.apply_increment(Decimal::new(125, 1));
        assert_eq!(engine.current_balance(), Decimal::new(125, 1));
        assert_eq!(f.get("balance:alice").as_deref(), Some("12.5"));
        assert_eq!(
            f.get("last_update:alice"),
            Some(f.clock.now_millis().to_string())
        );

        let stored: HistoryLedger =
            serde_json::from_str(&f.get("history:alice").unwrap()).unwrap();
        assert_eq!(stored, engine.current_history());
    }

    #[tokio::test]
    async fn debit_checks_funds_and_leaves_history_alone() {
        let f = Fixture::new();
        let engine = f.engine(1000, EngineConfig::default());
        engine.apply_increment(Decimal::from(100));

        let err = engine.debit(Decimal::from(101)).unwrap_err();
        assert!(matches!(
            err,
            Error::Withdrawal(WithdrawalError::InsufficientFunds { .. })
        ));
        assert_eq!(engine.current_balance(), Decimal::from(100));
        assert!(matches!(
            engine.debit(Decimal::ZERO),
            Err(Error::InvalidAmount(_))
        ));

        assert_eq!(engine.debit(Decimal::from(40)).unwrap(), Decimal::from(60));
        assert_eq!(f.get("balance:alice").as_deref(), Some("60"));
        assert_eq!(engine.current_history().total(), Decimal::from(100));
    }

    #[tokio::test]
    async fn events_stream_yields_mutations() {
        let f = Fixture::new();
        let engine = f.engine(1000, EngineConfig::default());
        let mut events = Box::pin(engine.events());

        engine.apply_increment(Decimal::from(5));
        engine.debit(Decimal::from(2)).unwrap();

        assert_eq!(
            events.next().await,
            Some(EngineEvent::Credited {
                amount: Decimal::from(5),
                balance: Decimal::from(5)
            })
        );
        assert_eq!(
            events.next().await,
            Some(EngineEvent::Debited {
                amount: Decimal::from(2),
                balance: Decimal::from(3)
            })
        );
    }

    #[tokio::test]
    async fn rejects_rate_whose_catch_up_would_overflow() {
        let f = Fixture::new();
        f.set("status:alice", "true");
        f.set("last_update:alice", "0");

        let result = Engine::initialize(
            "alice",
            Decimal::MAX / Decimal::from(10),
            f.store.clone(),
            f.clock.clone(),
            EngineConfig::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));

        let engine = f.engine(1000, EngineConfig::default());
        assert!(matches!(
            engine.set_rate_per_hour(Decimal::MAX),
            Err(Error::Config(_))
        ));
        assert_eq!(engine.rate_per_hour(), Decimal::from(1000));
        engine.shutdown();
    }

    #[tokio::test]
    async fn credit_past_the_largest_balance_is_dropped() {
        let f = Fixture::new();
        f.set("balance:alice", &Decimal::MAX.to_string());
        let engine = f.engine(1000, EngineConfig::default());
        let mut rx = engine.subscribe();

        engine.apply_increment(Decimal::ONE);

        assert_eq!(engine.current_balance(), Decimal::MAX);
        assert_eq!(engine.current_history().total(), Decimal::ZERO);
        assert!(rx.try_recv().is_err());
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, Error> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), Error> {
            Err(Error::Store("disk full".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_accruing_in_memory_when_writes_fail() {
        let f = Fixture::new();
        let engine = Engine::initialize(
            "alice",
            Decimal::from(3600),
            Arc::new(FailingStore),
            f.clock.clone(),
            seeded(4),
        )
        .unwrap();

        engine.set_active(true);
        assert_eq!(engine.current_activity_state(), ActivityState::Active);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let balance = engine.current_balance();
        assert!(balance > Decimal::ZERO);
        assert_eq!(engine.current_history().entries()[6].amount, balance);

        engine.set_active(false);
        assert_eq!(engine.current_activity_state(), ActivityState::Inactive);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(engine.current_balance(), balance);
    }
}

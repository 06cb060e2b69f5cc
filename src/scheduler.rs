//! Accrual tick loop.
//!
//! While a [`Ticker`] is alive it repeatedly waits a random interval and
//! then hands a [`Tick`] to its sink. The interval and the rate multiplier
//! are drawn fresh for every cycle so the balance does not grow in a
//! visible rhythm.
//!
//! Cancelling the ticker (or dropping it) stops the pending wait. A sink
//! must re-check the token while it holds its own state lock, so that a
//! tick racing a cancellation is discarded rather than applied.

use std::ops::Range;
use std::sync::Weak;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::tracing::prelude::*;

const MILLIS_PER_HOUR: u64 = 3_600_000;
const AMOUNT_DECIMALS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub interval: Duration,
    pub multiplier: Decimal,
    pub amount: Decimal,
}

/// Seedable source of tick intervals and multipliers.
#[derive(Debug)]
pub struct TickSampler {
    rng: StdRng,
    interval_ms: Range<u64>,
    multiplier_bps: Range<u32>,
}

impl TickSampler {
    pub fn new(seed: Option<u64>, interval_ms: Range<u64>, multiplier_bps: Range<u32>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            interval_ms,
            multiplier_bps,
        }
    }

    /// Draw the next cycle: `amount = rate * interval / 1h * multiplier`.
    /// An amount that cannot be represented comes out as zero.
    pub fn sample(&mut self, rate_per_hour: Decimal) -> Tick {
        let interval_ms = self.rng.gen_range(self.interval_ms.clone());
        let bps = self.rng.gen_range(self.multiplier_bps.clone());
        let multiplier = Decimal::new(i64::from(bps), 4);

        let share_of_hour = Decimal::from(interval_ms) / Decimal::from(MILLIS_PER_HOUR);
        let amount = match rate_per_hour
            .checked_mul(share_of_hour)
            .and_then(|a| a.checked_mul(multiplier))
        {
            Some(amount) => amount.round_dp(AMOUNT_DECIMALS),
            None => {
                warn!(%rate_per_hour, "Tick amount overflowed, crediting nothing");
                Decimal::ZERO
            }
        };

        Tick {
            interval: Duration::from_millis(interval_ms),
            multiplier,
            amount,
        }
    }
}

/// Receiver of ticks. Held weakly by the loop, so dropping the sink ends
/// the loop at its next wake-up.
pub trait TickSink: Send + Sync + 'static {
    fn next_tick(&self) -> Tick;

    /// Apply `tick` unless `token` has been cancelled. Returns `false` to
    /// stop the loop.
    fn apply_tick(&self, token: &CancellationToken, tick: Tick) -> bool;
}

/// Handle to a running tick loop.
#[derive(Debug)]
pub struct Ticker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Start a fresh cycle. Must be called from within a Tokio runtime.
    pub fn spawn<S: TickSink>(sink: Weak<S>) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(sink, token.clone()));
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run<S: TickSink>(sink: Weak<S>, token: CancellationToken) {
    loop {
        // A loop cancelled before its first poll must not consume a sample.
        if token.is_cancelled() {
            break;
        }
        let Some(tick) = sink.upgrade().map(|s| s.next_tick()) else {
            break;
        };
        trace!(interval_ms = tick.interval.as_millis() as u64, "Waiting for next tick");

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(tick.interval) => {}
        }

        let Some(sink) = sink.upgrade() else {
            break;
        };
        if !sink.apply_tick(&token, tick) {
            break;
        }
    }
    debug!("Tick loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn sampler(seed: u64) -> TickSampler {
        TickSampler::new(Some(seed), 2_000..5_000, 8_000..12_000)
    }

    #[test]
    fn same_seed_same_sequence() {
        let rate = Decimal::from(2000);
        let mut a = sampler(7);
        let mut b = sampler(7);
        for _ in 0..20 {
            assert_eq!(a.sample(rate), b.sample(rate));
        }
    }

    #[test]
    fn samples_stay_within_bounds() {
        let rate = Decimal::from(3600);
        let mut sampler = sampler(11);
        for _ in 0..500 {
            let tick = sampler.sample(rate);
            let ms = tick.interval.as_millis() as u64;
            assert!((2_000..5_000).contains(&ms));
            assert!(tick.multiplier >= Decimal::new(8, 1) && tick.multiplier < Decimal::new(12, 1));

            // 3600/h is exactly one unit per second of interval
            let nominal = Decimal::from(ms) / Decimal::from(1000);
            assert_eq!(tick.amount, (nominal * tick.multiplier).round_dp(AMOUNT_DECIMALS));
            assert!(tick.amount >= Decimal::new(16, 1));
            assert!(tick.amount < Decimal::from(6));
        }
    }

    struct Recorder {
        ticks: Mutex<Vec<Tick>>,
        sampler: Mutex<TickSampler>,
    }

    impl TickSink for Recorder {
        fn next_tick(&self) -> Tick {
            self.sampler.lock().unwrap().sample(Decimal::from(2000))
        }

        fn apply_tick(&self, token: &CancellationToken, tick: Tick) -> bool {
            if token.is_cancelled() {
                return false;
            }
            self.ticks.lock().unwrap().push(tick);
            true
        }
    }

    fn recorder(seed: u64) -> Arc<Recorder> {
        Arc::new(Recorder {
            ticks: Mutex::new(Vec::new()),
            sampler: Mutex::new(sampler(seed)),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_fire_after_their_intervals() {
        let sink = recorder(3);
        let mut expected = sampler(3);
        let first = expected.sample(Decimal::from(2000));
        let second = expected.sample(Decimal::from(2000));

        let _ticker = Ticker::spawn(Arc::downgrade(&sink));

        tokio::time::sleep(first.interval - Duration::from_millis(1)).await;
        assert!(sink.ticks.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(2) + second.interval).await;
        assert_eq!(*sink.ticks.lock().unwrap(), vec![first, second]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_the_pending_tick() {
        let sink = recorder(5);
        let ticker = Ticker::spawn(Arc::downgrade(&sink));

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        ticker.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(sink.ticks.lock().unwrap().is_empty());
        assert!(ticker.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_sink_ends_the_loop() {
        let sink = recorder(9);
        let ticker = Ticker::spawn(Arc::downgrade(&sink));
        drop(sink);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(ticker.is_finished());
    }
}

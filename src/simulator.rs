//! Synthetic market data
//!
//! Random-walk order books with occasional liquidity withdrawals, used for
//! demos, load tests and benchmarks when no live feed is available.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::engine::{Level, Snapshot};

const START_PRICE: f64 = 100.0;
const TIME_STEP_MS: i64 = 100;
const PRICE_SHOCK_STD: f64 = 0.1;
const SPREAD_MEAN: f64 = 0.05;
const SPREAD_STD: f64 = 0.02;
/// Probability that a tick widens the spread
const SHOCK_PROBABILITY: f64 = 0.05;
const TICK_SIZE: f64 = 0.01;
const DEPTH_LEVELS: usize = 10;
const MIN_LEVEL_VOLUME: f64 = 10.0;

/// Generates a stream of plausible order book snapshots
#[derive(Debug)]
pub struct MarketSimulator {
    rng: StdRng,
    current_price: f64,
    current_time: i64,
}

impl MarketSimulator {
    /// Create a simulator starting now, seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            current_price: START_PRICE,
            current_time: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a reproducible simulator starting at `start_ms`
    pub fn with_seed(seed: u64, start_ms: i64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            current_price: START_PRICE,
            current_time: start_ms,
        }
    }

    fn normal(&mut self, mean: f64, std: f64) -> f64 {
        let z: f64 = StandardNormal.sample(&mut self.rng);
        mean + std * z
    }

    /// Advance one time step and return the new snapshot
    pub fn next_snapshot(&mut self) -> Snapshot {
        self.current_time += TIME_STEP_MS;

        let shock = self.normal(0.0, PRICE_SHOCK_STD);
        self.current_price += shock;

        let mut spread = self.normal(SPREAD_MEAN, SPREAD_STD).max(TICK_SIZE);
        if self.rng.gen::<f64>() < SHOCK_PROBABILITY {
            spread *= self.rng.gen_range(3.0..5.0);
        }

        let mid_price = self.current_price;
        let best_bid = mid_price - spread / 2.0;
        let best_ask = mid_price + spread / 2.0;

        // Price moving up thickens bids and thins asks
        let pressure = (shock * 2.0).clamp(-0.5, 0.5);

        let mut bids = Vec::with_capacity(DEPTH_LEVELS);
        let mut asks = Vec::with_capacity(DEPTH_LEVELS);

        for i in 0..DEPTH_LEVELS {
            let offset = i as f64 * TICK_SIZE;
            // Liquidity is thickest a couple of ticks behind the touch
            let shape = 1000.0 * (1.0 + (-0.5 * (i as f64 - 2.0).powi(2)).exp());

            let bid_vol = (self.normal(shape, shape * 0.2).max(MIN_LEVEL_VOLUME) * (1.0 + pressure)).trunc();
            let ask_vol = (self.normal(shape, shape * 0.2).max(MIN_LEVEL_VOLUME) * (1.0 - pressure)).trunc();

            bids.push(Level::new(round_cents(best_bid - offset), bid_vol));
            asks.push(Level::new(round_cents(best_ask + offset), ask_vol));
        }

        Snapshot {
            timestamp: self.current_time,
            mid_price: round_cents(mid_price),
            bids,
            asks,
        }
    }
}

impl Default for MarketSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for MarketSimulator {
    type Item = Snapshot;

    fn next(&mut self) -> Option<Snapshot> {
        Some(self.next_snapshot())
    }
}

fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

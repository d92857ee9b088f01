//! Running statistics carried between snapshots of one instrument

/// Smoothing coefficient for every exponential average
pub const DEFAULT_ALPHA: f64 = 0.05;

const SEED_AVG_SPREAD: f64 = 0.05;
const SEED_AVG_SPREAD_SQ: f64 = 0.0025;
const SEED_AVG_L1_VOL: f64 = 10.0;

/// Per-instrument engine state
///
/// Owned by exactly one engine. The metric computer is the only writer;
/// the anomaly detector only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    /// Top of book from the previous accepted snapshot
    pub prev_best_bid: f64,
    pub prev_best_ask: f64,
    pub prev_bid_qty: f64,
    pub prev_ask_qty: f64,

    /// Exponentially smoothed spread
    pub avg_spread: f64,
    /// Exponentially smoothed squared spread, kept for variance estimates
    pub avg_spread_sq: f64,
    /// Exponentially smoothed average of best bid and best ask quantity
    pub avg_l1_vol: f64,

    alpha: f64,
}

impl EngineState {
    /// Create state with the seed averages
    pub fn new() -> Self {
        Self {
            prev_best_bid: 0.0,
            prev_best_ask: 0.0,
            prev_bid_qty: 0.0,
            prev_ask_qty: 0.0,
            avg_spread: SEED_AVG_SPREAD,
            avg_spread_sq: SEED_AVG_SPREAD_SQ,
            avg_l1_vol: SEED_AVG_L1_VOL,
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Whether a previous accepted tick exists to diff order flow against
    pub fn has_previous_tick(&self) -> bool {
        self.prev_best_bid > 0.0 && self.prev_best_ask > 0.0
    }

    /// Fold a valid spread into the spread averages
    pub(crate) fn update_spread(&mut self, spread: f64) {
        self.avg_spread = ewma(self.avg_spread, spread, self.alpha);
        self.avg_spread_sq = ewma(self.avg_spread_sq, spread * spread, self.alpha);
    }

    /// Fold the current average touch volume into `avg_l1_vol`
    pub(crate) fn update_l1_volume(&mut self, l1_volume: f64) {
        self.avg_l1_vol = ewma(self.avg_l1_vol, l1_volume, self.alpha);
    }

    pub(crate) fn remember_top(&mut self, bid: f64, ask: f64, bid_qty: f64, ask_qty: f64) {
        self.prev_best_bid = bid;
        self.prev_best_ask = ask;
        self.prev_bid_qty = bid_qty;
        self.prev_ask_qty = ask_qty;
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn ewma(current: f64, sample: f64, alpha: f64) -> f64 {
    (1.0 - alpha) * current + alpha * sample
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_values() {
        let state = EngineState::new();
        assert_eq!(state.avg_spread, 0.05);
        assert_eq!(state.avg_spread_sq, 0.0025);
        assert_eq!(state.avg_l1_vol, 10.0);
        assert_eq!(state.alpha(), 0.05);
        assert!(!state.has_previous_tick());
    }

    #[test]
    fn test_spread_average_converges() {
        let mut state = EngineState::new();
        for _ in 0..200 {
            state.update_spread(0.2);
        }
        // 0.95^200 leaves ~3.5e-5 of the seed gap
        assert!((state.avg_spread - 0.2).abs() < 1e-4);
        assert!((state.avg_spread_sq - 0.04).abs() < 1e-4);
    }

    #[test]
    fn test_l1_volume_update() {
        let mut state = EngineState::new();
        state.update_l1_volume(30.0);
        assert!((state.avg_l1_vol - 11.0).abs() < 1e-12);
    }
}

//! Snapshot validation and metric computation

use tracing::{debug, trace};

use super::{EngineState, ProcessedResult, Regime, Snapshot, TopOfBook};

/// Volume change that saturates order flow imbalance
const OFI_NORMALIZER: f64 = 1000.0;
/// Smallest top-of-book volume treated as non-empty
const MIN_TOTAL_VOLUME: f64 = 1e-9;
/// Divergence beyond which a directional bias is reported
const DIVERGENCE_THRESHOLD: f64 = 0.01;
const PROB_NEUTRAL: f64 = 50.0;
const PROB_UP: f64 = 60.0;
const PROB_DOWN: f64 = 40.0;
/// Spread above this multiple of its average is a stressed regime
const STRESS_MULTIPLIER: f64 = 2.0;

/// Compute the indicators for one snapshot and advance `state`
///
/// Never fails: empty or corrupt books produce [`ProcessedResult::neutral`]
/// and leave `state` untouched. A crossed or locked book reports a zero
/// spread but still yields flow, imbalance and microprice values.
pub fn process(snapshot: &Snapshot, state: &mut EngineState) -> ProcessedResult {
    evaluate(snapshot, state).0
}

/// Like [`process`], also returning the top of book when the snapshot was accepted
pub(crate) fn evaluate(
    snapshot: &Snapshot,
    state: &mut EngineState,
) -> (ProcessedResult, Option<TopOfBook>) {
    let mut result = ProcessedResult::neutral(snapshot);

    let Some(top) = TopOfBook::read(snapshot) else {
        debug!(
            timestamp = snapshot.timestamp,
            bid_levels = snapshot.bids.len(),
            ask_levels = snapshot.asks.len(),
            "Empty or corrupt top of book"
        );
        return (result, None);
    };

    if top.is_crossed() {
        debug!(
            best_bid = top.bid_price,
            best_ask = top.ask_price,
            "Crossed book, spread left at zero"
        );
    } else {
        let spread = top.ask_price - top.bid_price;
        result.spread = spread;
        state.update_spread(spread);
    }

    if state.has_previous_tick() {
        let bid_change = top.bid_qty - state.prev_bid_qty;
        let ask_change = top.ask_qty - state.prev_ask_qty;
        result.ofi = ((bid_change - ask_change) / OFI_NORMALIZER).clamp(-1.0, 1.0);
    }

    let total_qty = top.total_qty();
    if total_qty > MIN_TOTAL_VOLUME {
        result.obi = (top.bid_qty - top.ask_qty) / total_qty;
        // Equals (bid_qty * ask + ask_qty * bid) / total without overflowing the products
        let bid_weight = top.bid_qty / total_qty;
        result.microprice = top.bid_price + (top.ask_price - top.bid_price) * bid_weight;
    }

    result.divergence = result.microprice - snapshot.mid_price;
    result.directional_prob = directional_probability(result.divergence);

    // Compared against the average that already includes this tick's spread
    if result.spread > state.avg_spread * STRESS_MULTIPLIER {
        result.set_regime(Regime::Stressed);
    }

    state.remember_top(top.bid_price, top.ask_price, top.bid_qty, top.ask_qty);
    state.update_l1_volume(top.l1_volume());

    trace!(
        spread = result.spread,
        ofi = result.ofi,
        obi = result.obi,
        microprice = result.microprice,
        regime = result.regime_label.as_str(),
        "Snapshot processed"
    );

    (result, Some(top))
}

/// Coarse directional bias from microprice divergence
fn directional_probability(divergence: f64) -> f64 {
    if divergence.abs() > DIVERGENCE_THRESHOLD {
        if divergence > 0.0 {
            PROB_UP
        } else {
            PROB_DOWN
        }
    } else {
        PROB_NEUTRAL
    }
}

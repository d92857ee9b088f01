//! Anomaly detection on a processed snapshot
//!
//! Checks run in a fixed order which is also the order anomalies appear in
//! the result: liquidity gap, heavy imbalance, spread shock, large order.

use tracing::debug;

use super::{Anomaly, AnomalyKind, EngineState, ProcessedResult, Severity, Snapshot};

/// Levels inspected for thin liquidity
const GAP_SCAN_LEVELS: usize = 10;
/// Volume below this on either side makes a level a gap
const GAP_VOLUME: f64 = 50.0;
const GAP_COUNT_HIGH: usize = 3;
const GAP_COUNT_CRITICAL: usize = 6;
const HEAVY_IMBALANCE: f64 = 0.5;
const SPREAD_SHOCK_MULTIPLIER: f64 = 3.0;
const LARGE_ORDER_MULTIPLIER: f64 = 4.0;

/// Append anomalies for `snapshot` to `result.anomalies`
///
/// Reads the running averages in `state` without modifying them.
pub fn detect(
    snapshot: &Snapshot,
    result: &mut ProcessedResult,
    spread: f64,
    obi: f64,
    best_bid_qty: f64,
    best_ask_qty: f64,
    state: &EngineState,
) {
    let start = result.anomalies.len();

    let gaps = count_liquidity_gaps(snapshot);
    if gaps > GAP_COUNT_HIGH {
        let severity = if gaps > GAP_COUNT_CRITICAL {
            Severity::Critical
        } else {
            Severity::High
        };
        result.anomalies.push(Anomaly::new(
            AnomalyKind::LiquidityGap,
            severity,
            format!("Liquidity gaps detected at {} levels", gaps),
        ));
    }

    if obi.abs() > HEAVY_IMBALANCE {
        let message = if obi > 0.0 {
            "Heavy BUY pressure"
        } else {
            "Heavy SELL pressure"
        };
        result
            .anomalies
            .push(Anomaly::new(AnomalyKind::HeavyImbalance, Severity::High, message));
    }

    if spread > 0.0 && spread > state.avg_spread * SPREAD_SHOCK_MULTIPLIER {
        result.anomalies.push(Anomaly::new(
            AnomalyKind::SpreadShock,
            Severity::Medium,
            format!("Wide spread detected: {:.6}", spread),
        ));
    }

    let l1_volume = (best_bid_qty + best_ask_qty) / 2.0;
    if l1_volume > state.avg_l1_vol * LARGE_ORDER_MULTIPLIER {
        result.anomalies.push(Anomaly::new(
            AnomalyKind::LargeOrder,
            Severity::Medium,
            "Unusually large L1 volume detected",
        ));
    }

    for anomaly in &result.anomalies[start..] {
        debug!(
            kind = anomaly.kind.as_str(),
            severity = anomaly.severity.as_str(),
            message = %anomaly.message,
            "Anomaly detected"
        );
    }
}

/// Count level pairs among the first few where either side is thin
fn count_liquidity_gaps(snapshot: &Snapshot) -> usize {
    snapshot
        .bids
        .iter()
        .zip(&snapshot.asks)
        .take(GAP_SCAN_LEVELS)
        .filter(|(bid, ask)| bid.volume < GAP_VOLUME || ask.volume < GAP_VOLUME)
        .count()
}

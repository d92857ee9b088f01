//! Analytics engine module
//!
//! Turns sequential order book snapshots for one instrument into
//! microstructure indicators and anomaly flags.

mod compute;
mod detect;
mod manager;
mod state;

pub use compute::process;
pub use detect::detect;
pub use manager::{AnomalyEvent, EngineManager, DEFAULT_HISTORY_LEN};
pub use state::EngineState;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single price level in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub volume: f64,
}

impl Level {
    pub fn new(price: f64, volume: f64) -> Self {
        Self { price, volume }
    }
}

/// Order book snapshot as supplied by the caller
///
/// Bids are expected best (highest) first, asks best (lowest) first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub mid_price: f64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Best bid and ask of a snapshot that passed the sanity checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopOfBook {
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
}

impl TopOfBook {
    /// Read the top of book, rejecting empty sides and corrupt values
    pub fn read(snapshot: &Snapshot) -> Option<Self> {
        let bid = snapshot.bids.first()?;
        let ask = snapshot.asks.first()?;

        let top = Self {
            bid_price: bid.price,
            bid_qty: bid.volume,
            ask_price: ask.price,
            ask_qty: ask.volume,
        };

        let finite = [top.bid_price, top.bid_qty, top.ask_price, top.ask_qty]
            .iter()
            .all(|v| v.is_finite());

        // Finite volumes can still overflow when summed
        if !finite
            || !top.total_qty().is_finite()
            || top.bid_price <= 0.0
            || top.ask_price <= 0.0
            || top.bid_qty < 0.0
            || top.ask_qty < 0.0
        {
            return None;
        }

        Some(top)
    }

    /// Best ask at or below best bid
    pub fn is_crossed(&self) -> bool {
        self.ask_price <= self.bid_price
    }

    pub fn total_qty(&self) -> f64 {
        self.bid_qty + self.ask_qty
    }

    /// Average resting size at the touch
    pub fn l1_volume(&self) -> f64 {
        self.total_qty() / 2.0
    }
}

/// Liquidity regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Regime {
    #[default]
    Calm,
    Stressed,
}

impl Regime {
    pub fn code(&self) -> u8 {
        match self {
            Regime::Calm => 0,
            Regime::Stressed => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Regime::Calm => "Calm",
            Regime::Stressed => "Stressed",
        }
    }
}

/// Kind of anomaly flagged on a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    LiquidityGap,
    HeavyImbalance,
    SpreadShock,
    LargeOrder,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::LiquidityGap => "LIQUIDITY_GAP",
            AnomalyKind::HeavyImbalance => "HEAVY_IMBALANCE",
            AnomalyKind::SpreadShock => "SPREAD_SHOCK",
            AnomalyKind::LargeOrder => "LARGE_ORDER",
        }
    }
}

/// Anomaly severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// A flagged anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
}

impl Anomaly {
    pub fn new(kind: AnomalyKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }
}

/// Indicators derived from one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedResult {
    pub timestamp: i64,
    pub mid_price: f64,
    pub spread: f64,
    /// Order flow imbalance, clamped to [-1, 1]
    pub ofi: f64,
    /// Top-of-book order book imbalance in [-1, 1]
    pub obi: f64,
    pub microprice: f64,
    /// Microprice minus mid price
    pub divergence: f64,
    /// One of 40.0, 50.0 or 60.0
    pub directional_prob: f64,
    pub regime: u8,
    pub regime_label: String,
    /// Reserved on the wire, always zero
    pub vpin: f64,
    pub anomalies: Vec<Anomaly>,
}

impl ProcessedResult {
    /// Neutral result returned whenever the snapshot cannot be trusted
    pub fn neutral(snapshot: &Snapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            mid_price: snapshot.mid_price,
            spread: 0.0,
            ofi: 0.0,
            obi: 0.0,
            microprice: snapshot.mid_price,
            divergence: 0.0,
            directional_prob: 50.0,
            regime: Regime::Calm.code(),
            regime_label: Regime::Calm.label().to_string(),
            vpin: 0.0,
            anomalies: Vec::new(),
        }
    }

    pub fn set_regime(&mut self, regime: Regime) {
        self.regime = regime.code();
        self.regime_label = regime.label().to_string();
    }

    pub fn is_stressed(&self) -> bool {
        self.regime == Regime::Stressed.code()
    }
}

/// Analytics engine for a single instrument
#[derive(Debug, Clone, Default)]
pub struct AnalyticsEngine {
    state: EngineState,
}

impl AnalyticsEngine {
    /// Create an engine with seed state
    pub fn new() -> Self {
        Self {
            state: EngineState::new(),
        }
    }

    /// Compute metrics for a snapshot, then flag anomalies on it
    pub fn process_snapshot(&mut self, snapshot: &Snapshot) -> ProcessedResult {
        self.evaluate(snapshot).0
    }

    /// Like [`Self::process_snapshot`], also reporting whether the snapshot
    /// passed validation
    pub fn evaluate(&mut self, snapshot: &Snapshot) -> (ProcessedResult, bool) {
        let (mut result, top) = compute::evaluate(snapshot, &mut self.state);

        match top {
            Some(top) => {
                let spread = result.spread;
                let obi = result.obi;
                detect(snapshot, &mut result, spread, obi, top.bid_qty, top.ask_qty, &self.state);
                (result, true)
            }
            None => {
                debug!(timestamp = snapshot.timestamp, "Snapshot rejected, returning neutral result");
                (result, false)
            }
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }
}

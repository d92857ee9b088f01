//! Engine manager
//!
//! Keeps one analytics engine, and a short result history, per symbol.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AnalyticsEngine, AnomalyKind, EngineState, ProcessedResult, Severity, Snapshot};

/// Results kept per symbol when no length is given
pub const DEFAULT_HISTORY_LEN: usize = 100;

/// An anomaly together with the snapshot time it was raised at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug)]
struct SymbolEngine {
    engine: AnalyticsEngine,
    history: VecDeque<ProcessedResult>,
}

/// Manages analytics engines for multiple symbols
#[derive(Debug)]
pub struct EngineManager {
    engines: HashMap<String, SymbolEngine>,
    history_len: usize,
}

impl Default for EngineManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineManager {
    /// Create a new engine manager
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY_LEN)
    }

    /// Create with a custom history length
    pub fn with_history(history_len: usize) -> Self {
        Self {
            engines: HashMap::new(),
            history_len: history_len.max(1),
        }
    }

    /// Process a snapshot with the symbol's engine, creating it on first use
    pub fn process(&mut self, symbol: &str, snapshot: &Snapshot) -> ProcessedResult {
        self.evaluate(symbol, snapshot).0
    }

    /// Like [`Self::process`], also reporting whether the snapshot passed validation
    pub fn evaluate(&mut self, symbol: &str, snapshot: &Snapshot) -> (ProcessedResult, bool) {
        let history_len = self.history_len;
        let entry = self.engines.entry(symbol.to_string()).or_insert_with(|| {
            info!(symbol = %symbol, "Creating analytics engine");
            SymbolEngine {
                engine: AnalyticsEngine::new(),
                history: VecDeque::with_capacity(history_len),
            }
        });

        let (result, accepted) = entry.engine.evaluate(snapshot);

        if entry.history.len() == history_len {
            entry.history.pop_front();
        }
        entry.history.push_back(result.clone());

        (result, accepted)
    }

    /// Recent results for a symbol, oldest first
    pub fn history(&self, symbol: &str) -> Option<Vec<ProcessedResult>> {
        self.engines
            .get(symbol)
            .map(|e| e.history.iter().cloned().collect())
    }

    /// Most recent result for a symbol
    pub fn latest(&self, symbol: &str) -> Option<&ProcessedResult> {
        self.engines.get(symbol).and_then(|e| e.history.back())
    }

    /// Anomaly timeline across the retained history, oldest first
    pub fn anomalies(&self, symbol: &str) -> Option<Vec<AnomalyEvent>> {
        self.engines.get(symbol).map(|e| {
            e.history
                .iter()
                .flat_map(|result| {
                    result.anomalies.iter().map(move |a| AnomalyEvent {
                        timestamp: result.timestamp,
                        kind: a.kind,
                        severity: a.severity,
                        message: a.message.clone(),
                    })
                })
                .collect()
        })
    }

    /// Running state of a symbol's engine
    pub fn state(&self, symbol: &str) -> Option<&EngineState> {
        self.engines.get(symbol).map(|e| e.engine.state())
    }

    /// Drop a symbol's engine and history; returns whether it existed
    pub fn reset(&mut self, symbol: &str) -> bool {
        let removed = self.engines.remove(symbol).is_some();
        if removed {
            info!(symbol = %symbol, "Analytics engine reset");
        }
        removed
    }

    /// Get list of symbols being tracked
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.engines.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Check if a symbol exists
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.engines.contains_key(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Level;

    fn snapshot(ts: i64, bid_qty: f64, ask_qty: f64) -> Snapshot {
        Snapshot {
            timestamp: ts,
            mid_price: 100.05,
            bids: vec![Level::new(100.0, bid_qty)],
            asks: vec![Level::new(100.1, ask_qty)],
        }
    }

    #[test]
    fn test_symbols_have_independent_state() {
        let mut manager = EngineManager::new();
        manager.process("BTCUSDT", &snapshot(1, 10.0, 10.0));
        manager.process("BTCUSDT", &snapshot(2, 510.0, 10.0));
        let eth = manager.process("ETHUSDT", &snapshot(2, 510.0, 10.0));

        // First tick for ETHUSDT, so no flow imbalance yet
        assert_eq!(eth.ofi, 0.0);
        assert!((manager.latest("BTCUSDT").unwrap().ofi - 0.5).abs() < 1e-12);
        assert_eq!(manager.symbols(), vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
        assert_ne!(manager.state("BTCUSDT"), manager.state("ETHUSDT"));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut manager = EngineManager::with_history(3);
        for ts in 0..5 {
            manager.process("BTCUSDT", &snapshot(ts, 10.0, 10.0));
        }

        let history = manager.history("BTCUSDT").unwrap();
        let stamps: Vec<i64> = history.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![2, 3, 4]);
        assert!(manager.history("SOLUSDT").is_none());
    }

    #[test]
    fn test_anomaly_timeline() {
        let mut manager = EngineManager::new();
        manager.process("BTCUSDT", &snapshot(1, 10.0, 10.0));
        manager.process("BTCUSDT", &snapshot(2, 90.0, 10.0));

        let events = manager.anomalies("BTCUSDT").unwrap();
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.timestamp == 2 || e.timestamp == 1));
        assert!(events
            .iter()
            .any(|e| e.kind == AnomalyKind::HeavyImbalance && e.timestamp == 2));
    }

    #[test]
    fn test_reset_restarts_from_seed() {
        let mut manager = EngineManager::new();
        manager.process("BTCUSDT", &snapshot(1, 10.0, 10.0));
        assert!(manager.reset("BTCUSDT"));
        assert!(!manager.has_symbol("BTCUSDT"));
        assert!(!manager.reset("BTCUSDT"));

        manager.process("BTCUSDT", &snapshot(2, 10.0, 10.0));
        assert_eq!(manager.history("BTCUSDT").unwrap().len(), 1);
    }

    #[test]
    fn test_evaluate_reports_rejected_snapshots() {
        let mut manager = EngineManager::new();
        let (_, accepted) = manager.evaluate("BTCUSDT", &snapshot(1, 10.0, 10.0));
        assert!(accepted);

        let (_, accepted) = manager.evaluate("BTCUSDT", &snapshot(2, -1.0, 10.0));
        assert!(!accepted);
        // Rejected results still land in the history
        assert_eq!(manager.history("BTCUSDT").unwrap().len(), 2);
    }
}

//! Prometheus metrics for the analytics pipeline

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::engine::ProcessedResult;
use crate::error::Result;

/// Pipeline counters, registered on a private registry
pub struct Telemetry {
    registry: Registry,
    snapshots_processed: IntCounterVec,
    snapshots_rejected: IntCounterVec,
    anomalies: IntCounterVec,
    regime: IntGaugeVec,
}

impl Telemetry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let snapshots_processed = IntCounterVec::new(
            Opts::new("analytics_snapshots_processed_total", "Snapshots processed"),
            &["symbol"],
        )?;
        let snapshots_rejected = IntCounterVec::new(
            Opts::new(
                "analytics_snapshots_rejected_total",
                "Snapshots that failed top-of-book validation",
            ),
            &["symbol"],
        )?;
        let anomalies = IntCounterVec::new(
            Opts::new("analytics_anomalies_total", "Anomalies flagged"),
            &["symbol", "type", "severity"],
        )?;
        let regime = IntGaugeVec::new(
            Opts::new("analytics_regime", "Current regime code (0 calm, 1 stressed)"),
            &["symbol"],
        )?;

        registry.register(Box::new(snapshots_processed.clone()))?;
        registry.register(Box::new(snapshots_rejected.clone()))?;
        registry.register(Box::new(anomalies.clone()))?;
        registry.register(Box::new(regime.clone()))?;

        Ok(Self {
            registry,
            snapshots_processed,
            snapshots_rejected,
            anomalies,
            regime,
        })
    }

    /// Record one processed snapshot
    pub fn record(&self, symbol: &str, result: &ProcessedResult, accepted: bool) {
        self.snapshots_processed.with_label_values(&[symbol]).inc();
        if !accepted {
            self.snapshots_rejected.with_label_values(&[symbol]).inc();
        }
        for anomaly in &result.anomalies {
            self.anomalies
                .with_label_values(&[symbol, anomaly.kind.as_str(), anomaly.severity.as_str()])
                .inc();
        }
        self.regime
            .with_label_values(&[symbol])
            .set(i64::from(result.regime));
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

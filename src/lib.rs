//! Phantom Flow - Order Book Analytics Library
//!
//! This crate turns order book snapshots into microstructure indicators
//! (spread, order flow and book imbalance, microprice, regime) and anomaly
//! flags, and serves them over HTTP, a live exchange feed and IPC.

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod parser;
pub mod publisher;
pub mod simulator;
pub mod telemetry;
pub mod websocket;

pub use config::Config;
pub use engine::{AnalyticsEngine, EngineManager, EngineState, ProcessedResult, Snapshot, TopOfBook};
pub use error::{AnalyticsError, Result};
pub use publisher::{PublishedResult, Publisher};
pub use simulator::MarketSimulator;
pub use telemetry::Telemetry;
pub use websocket::WebSocketManager;

/// Results buffered per live subscriber before it starts lagging
pub const LIVE_CHANNEL_CAPACITY: usize = 1024;

/// Application state shared across components
pub struct AppState {
    pub engines: Arc<RwLock<EngineManager>>,
    pub publisher: Arc<Publisher>,
    pub telemetry: Arc<Telemetry>,
    /// Every ingested result, for live WebSocket subscribers
    pub live: broadcast::Sender<PublishedResult>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build state from configuration, connecting the publisher if possible
    pub async fn new(config: Config) -> Result<Self> {
        let publisher = Publisher::new(&config.ipc_socket_path).await;
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);

        Ok(Self {
            engines: Arc::new(RwLock::new(EngineManager::with_history(config.history_len))),
            publisher: Arc::new(publisher),
            telemetry: Arc::new(Telemetry::new()?),
            live,
            config: Arc::new(config),
        })
    }

    /// Run a snapshot through the symbol's engine, record it, publish it and
    /// push it to live subscribers
    ///
    /// The engine manager lock is held only while the engine runs, so each
    /// symbol's state sees one snapshot at a time.
    pub async fn ingest(&self, symbol: &str, snapshot: &Snapshot) -> Result<ProcessedResult> {
        let (result, accepted) = {
            let mut engines = self.engines.write().await;
            engines.evaluate(symbol, snapshot)
        };

        self.telemetry.record(symbol, &result, accepted);
        self.publisher.publish(symbol, &result).await?;

        // Err only means nobody is subscribed
        let _ = self.live.send(PublishedResult {
            symbol: symbol.to_string(),
            result: result.clone(),
        });

        Ok(result)
    }
}

//! Phantom Flow - Order Book Analytics Service
//!
//! Serves the analytics engines over HTTP, and optionally feeds them from a
//! live Binance depth stream or the built-in market simulator.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use phantom_flow_analytics::{api, AppState, Config, MarketSimulator, WebSocketManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Phantom Flow analytics engine");

    let config = Config::load()?;
    info!(
        symbols = ?config.symbols,
        listen_addr = %config.listen_addr,
        feed = config.feed_enabled,
        simulator = config.simulator_enabled,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(config).await?);

    if state.config.simulator_enabled {
        tokio::spawn(run_simulator(state.clone()));
    }

    if state.config.feed_enabled {
        let feed_state = state.clone();
        tokio::spawn(async move {
            let mut ws_manager = WebSocketManager::new(feed_state);
            if let Err(e) = ws_manager.run().await {
                error!(error = %e, "Feed stopped");
            }
        });
    }

    api::serve(state.config.listen_addr, state.clone()).await
}

/// Push synthetic snapshots through the pipeline at a fixed interval
async fn run_simulator(state: Arc<AppState>) {
    let symbol = state.config.simulator_symbol.clone();
    let mut simulator = MarketSimulator::new();
    let mut ticker = interval(Duration::from_millis(state.config.simulator_interval_ms.max(1)));

    info!(symbol = %symbol, "Starting market simulator");

    loop {
        ticker.tick().await;
        let snapshot = simulator.next_snapshot();
        if let Err(e) = state.ingest(&symbol, &snapshot).await {
            warn!(error = %e, "Failed to ingest simulated snapshot");
        }
    }
}

//! WebSocket connection manager
//!
//! Handles reconnection logic and feeds depth snapshots into the engines.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, sleep, timeout};
use tracing::{error, info, trace, warn};

use super::WebSocketClient;
use crate::error::{AnalyticsError, Result};
use crate::parser::ParsedMessage;
use crate::AppState;

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;
/// Cooldown period after which reconnect attempts are reset (5 minutes)
const RECONNECT_COOLDOWN_SECS: u64 = 300;
const STATUS_INTERVAL_SECS: u64 = 30;
const KEEPALIVE_SECS: u64 = 30;
const RECV_TIMEOUT_SECS: u64 = 45;

/// Manages WebSocket connections with automatic reconnection
pub struct WebSocketManager {
    state: Arc<AppState>,
    client: WebSocketClient,
    reconnect_attempts: u32,
    last_successful_connection: Option<Instant>,
}

impl WebSocketManager {
    /// Create a new WebSocket manager
    pub fn new(state: Arc<AppState>) -> Self {
        let client = WebSocketClient::new(
            &state.config.ws_endpoint,
            state.config.symbols.clone(),
            state.config.depth_levels,
        );

        Self {
            state,
            client,
            reconnect_attempts: 0,
            last_successful_connection: None,
        }
    }

    /// Run the WebSocket manager - runs indefinitely with automatic reconnection
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting WebSocket manager with infinite retry");

        tokio::spawn(log_status(self.state.clone()));

        loop {
            // Reset reconnect attempts if we've been stable for a while
            if let Some(last_success) = self.last_successful_connection {
                if last_success.elapsed() > Duration::from_secs(RECONNECT_COOLDOWN_SECS)
                    && self.reconnect_attempts > 0
                {
                    info!(
                        previous_attempts = self.reconnect_attempts,
                        "Resetting reconnect counter after cooldown period"
                    );
                    self.reconnect_attempts = 0;
                }
            }

            match self.connect_and_process().await {
                Ok(()) => {
                    info!("WebSocket processing completed normally, reconnecting...");
                    sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    error!(error = %e, "WebSocket error");
                    self.reconnect_attempts += 1;

                    let delay = backoff_delay(self.state.config.reconnect_delay_ms, self.reconnect_attempts);

                    warn!(
                        attempt = self.reconnect_attempts,
                        delay_secs = delay.as_secs(),
                        "Reconnecting after error..."
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Connect and process messages
    async fn connect_and_process(&mut self) -> Result<()> {
        self.client.connect().await?;

        self.last_successful_connection = Some(Instant::now());
        self.reconnect_attempts = 0;
        info!("WebSocket connected successfully, resetting reconnect counter");

        let mut last_message = Instant::now();
        let keepalive_timeout = Duration::from_secs(KEEPALIVE_SECS);
        let recv_timeout = Duration::from_secs(RECV_TIMEOUT_SECS);

        loop {
            // Use timeout to detect stale connections
            match timeout(recv_timeout, self.client.recv()).await {
                Ok(Ok(Some(text))) => {
                    last_message = Instant::now();
                    if let Err(e) = self.process_message(&text).await {
                        warn!(error = %e, "Failed to process message");
                    }
                }
                Ok(Ok(None)) => {
                    if last_message.elapsed() > keepalive_timeout {
                        if let Err(e) = self.client.ping().await {
                            warn!(error = %e, "Failed to send keepalive ping");
                        }
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        last_message_secs = last_message.elapsed().as_secs(),
                        "No message received within timeout, sending keepalive"
                    );
                    if let Err(e) = self.client.ping().await {
                        warn!(error = %e, "Failed to send keepalive ping, reconnecting");
                        self.client.close().await;
                        return Err(AnalyticsError::ConnectionTimeout);
                    }
                }
            }
        }
    }

    /// Process a single WebSocket message
    async fn process_message(&self, raw: &str) -> Result<()> {
        match ParsedMessage::parse(raw)? {
            ParsedMessage::Depth { symbol, depth } => {
                // Bare payloads only arrive on single-symbol connections
                let symbol = match symbol.or_else(|| self.single_symbol()) {
                    Some(symbol) => symbol,
                    None => {
                        warn!("Depth message without a symbol on a multi-symbol stream");
                        return Ok(());
                    }
                };

                let snapshot = depth.into_snapshot(chrono::Utc::now().timestamp_millis());
                self.state.ingest(&symbol, &snapshot).await?;
            }
            ParsedMessage::Unknown(msg) => {
                trace!(msg = %msg, "Unknown message type");
            }
        }

        Ok(())
    }

    fn single_symbol(&self) -> Option<String> {
        match self.state.config.symbols.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        }
    }
}

/// Exponential backoff, capped at [`MAX_BACKOFF_MS`]
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let delay = base_ms.saturating_mul(2u64.pow(attempt.min(6)));
    Duration::from_millis(delay.min(MAX_BACKOFF_MS))
}

/// Periodically log the latest indicators per symbol
async fn log_status(state: Arc<AppState>) {
    let mut status_interval = interval(Duration::from_secs(STATUS_INTERVAL_SECS));
    loop {
        status_interval.tick().await;
        let engines = state.engines.read().await;
        for symbol in engines.symbols() {
            if let Some(latest) = engines.latest(&symbol) {
                info!(
                    symbol = %symbol,
                    mid_price = latest.mid_price,
                    spread = latest.spread,
                    obi = latest.obi,
                    regime = %latest.regime_label,
                    "Analytics status"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1000, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(1000, 5), Duration::from_millis(32_000));
        assert_eq!(backoff_delay(1000, 6), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(1000, 40), Duration::from_millis(MAX_BACKOFF_MS));
    }
}

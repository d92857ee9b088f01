//! Configuration module for the analytics service

use serde::Deserialize;
use std::env;
use std::net::SocketAddr;

use crate::engine::DEFAULT_HISTORY_LEN;
use crate::error::{AnalyticsError, Result};

/// Depth levels Binance offers for partial book streams
const SUPPORTED_DEPTHS: [usize; 3] = [5, 10, 20];

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Trading symbols to stream from the exchange (e.g., ["BTCUSDT", "ETHUSDT"])
    pub symbols: Vec<String>,

    /// Address the HTTP API listens on
    pub listen_addr: SocketAddr,

    /// WebSocket endpoint for Binance
    pub ws_endpoint: String,

    /// IPC socket path for publishing results
    pub ipc_socket_path: String,

    /// Partial depth levels to subscribe to (5, 10 or 20)
    pub depth_levels: usize,

    /// Results retained per symbol for the history endpoints
    pub history_len: usize,

    /// Base reconnection delay
    pub reconnect_delay_ms: u64,

    /// Stream live depth from the exchange
    pub feed_enabled: bool,

    /// Feed synthetic snapshots through the engine
    pub simulator_enabled: bool,
    pub simulator_symbol: String,
    pub simulator_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let symbols: Vec<String> = env::var("SYMBOLS")
            .unwrap_or_else(|_| "BTCUSDT".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let listen_addr = match env::var("LISTEN_ADDR") {
            Ok(raw) => raw.parse().map_err(|e| {
                AnalyticsError::ConfigError(format!("Invalid LISTEN_ADDR {}: {}", raw, e))
            })?,
            Err(_) => defaults.listen_addr,
        };

        let depth_levels = parse_or("DEPTH_LEVELS", defaults.depth_levels);
        if !SUPPORTED_DEPTHS.contains(&depth_levels) {
            return Err(AnalyticsError::ConfigError(format!(
                "DEPTH_LEVELS must be one of {:?}, got {}",
                SUPPORTED_DEPTHS, depth_levels
            )));
        }

        Ok(Self {
            symbols,
            listen_addr,
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            ipc_socket_path: env::var("IPC_SOCKET_PATH").unwrap_or(defaults.ipc_socket_path),
            depth_levels,
            history_len: parse_or("HISTORY_LEN", defaults.history_len),
            reconnect_delay_ms: parse_or("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            feed_enabled: parse_or("FEED_ENABLED", defaults.feed_enabled),
            simulator_enabled: parse_or("SIMULATOR_ENABLED", defaults.simulator_enabled),
            simulator_symbol: env::var("SIMULATOR_SYMBOL")
                .map(|s| s.trim().to_uppercase())
                .unwrap_or(defaults.simulator_symbol),
            simulator_interval_ms: parse_or("SIMULATOR_INTERVAL_MS", defaults.simulator_interval_ms),
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid
fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            ws_endpoint: "wss://stream.binance.com:9443".to_string(),
            ipc_socket_path: "/tmp/phantom-flow-analytics.sock".to_string(),
            depth_levels: 10,
            history_len: DEFAULT_HISTORY_LEN,
            reconnect_delay_ms: 1000,
            feed_enabled: false,
            simulator_enabled: false,
            simulator_symbol: "SIM".to_string(),
            simulator_interval_ms: 100,
        }
    }
}

//! Error types for the analytics service
//!
//! The analytics core never fails; these cover the I/O around it.

use thiserror::Error;

/// Analytics service errors
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Telemetry error: {0}")]
    TelemetryError(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Connection timeout")]
    ConnectionTimeout,
}

impl From<tokio_tungstenite::tungstenite::Error> for AnalyticsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AnalyticsError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        AnalyticsError::ParseError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for AnalyticsError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        AnalyticsError::SerializationError(err.to_string())
    }
}

impl From<prometheus::Error> for AnalyticsError {
    fn from(err: prometheus::Error) -> Self {
        AnalyticsError::TelemetryError(err.to_string())
    }
}

impl From<std::io::Error> for AnalyticsError {
    fn from(err: std::io::Error) -> Self {
        AnalyticsError::IpcError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

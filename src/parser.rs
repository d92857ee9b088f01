//! Parser module for Binance WebSocket messages
//!
//! Decodes partial book depth messages into engine snapshots.

use serde::{Deserialize, Deserializer};

use crate::engine::{Level, Snapshot};

/// Binance partial book depth message (`<symbol>@depth<N>@100ms`)
#[derive(Debug, Clone, Deserialize)]
pub struct DepthSnapshot {
    /// Last update ID
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,

    /// Bids, best first
    #[serde(deserialize_with = "deserialize_levels")]
    pub bids: Vec<Level>,

    /// Asks, best first
    #[serde(deserialize_with = "deserialize_levels")]
    pub asks: Vec<Level>,
}

impl DepthSnapshot {
    /// Build an engine snapshot stamped with `timestamp` (epoch ms)
    ///
    /// The mid price is taken from the touch; a one-sided book gets 0.0.
    pub fn into_snapshot(self, timestamp: i64) -> Snapshot {
        let mid_price = match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => (bid.price + ask.price) / 2.0,
            _ => 0.0,
        };

        Snapshot {
            timestamp,
            mid_price,
            bids: self.bids,
            asks: self.asks,
        }
    }
}

/// Combined stream message wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    /// Stream name
    pub stream: String,

    /// Data payload
    pub data: serde_json::Value,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    /// Depth snapshot, with the symbol when the stream name carried one
    Depth {
        symbol: Option<String>,
        depth: DepthSnapshot,
    },
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        // Try to parse as stream message first (combined streams)
        if let Ok(stream_msg) = serde_json::from_str::<StreamMessage>(raw) {
            return Self::parse_stream_data(&stream_msg.stream, stream_msg.data);
        }

        // Single-stream connections deliver the payload bare
        if let Ok(depth) = serde_json::from_str::<DepthSnapshot>(raw) {
            return Ok(ParsedMessage::Depth { symbol: None, depth });
        }

        Ok(ParsedMessage::Unknown(raw.to_string()))
    }

    fn parse_stream_data(stream: &str, data: serde_json::Value) -> Result<Self, serde_json::Error> {
        if stream.contains("@depth") {
            let depth: DepthSnapshot = serde_json::from_value(data)?;
            Ok(ParsedMessage::Depth {
                symbol: symbol_from_stream(stream),
                depth,
            })
        } else {
            Ok(ParsedMessage::Unknown(data.to_string()))
        }
    }
}

/// Extract the upper-cased symbol from a stream name like `btcusdt@depth10@100ms`
pub fn symbol_from_stream(stream: &str) -> Option<String> {
    stream
        .split('@')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_uppercase())
}

/// Stream name for a symbol's partial depth feed
pub fn depth_stream_name(symbol: &str, levels: usize) -> String {
    format!("{}@depth{}@100ms", symbol.to_lowercase(), levels)
}

/// Custom deserializer for price levels from array of string pairs
fn deserialize_levels<'de, D>(deserializer: D) -> Result<Vec<Level>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() != 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            Ok(Level {
                price: pair[0].parse::<f64>().map_err(serde::de::Error::custom)?,
                volume: pair[1].parse::<f64>().map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}

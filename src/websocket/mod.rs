//! Live depth feed from Binance partial book streams

mod client;
mod manager;

pub use client::WebSocketClient;
pub use manager::WebSocketManager;

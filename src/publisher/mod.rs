//! Publisher module for IPC communication
//!
//! Publishes processed results to other system components.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::ProcessedResult;
use crate::error::{AnalyticsError, Result};

/// Frames buffered for the writer before new ones are dropped
pub const QUEUE_CAPACITY: usize = 1024;

/// Upper bound on a single connect or frame write
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Frame payload: a result tagged with its symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedResult {
    pub symbol: String,
    pub result: ProcessedResult,
}

/// Publisher for sending processed results via Unix socket
///
/// Frames are handed to a background writer through a bounded queue, so a
/// slow or stalled consumer never holds up the caller.
pub struct Publisher {
    frames: mpsc::Sender<BytesMut>,
    dropped: AtomicU64,
}

impl Publisher {
    /// Create a new publisher and spawn its writer task
    pub async fn new(socket_path: &str) -> Self {
        let (frames, rx) = mpsc::channel(QUEUE_CAPACITY);
        let mut writer = IpcWriter {
            socket_path: socket_path.to_string(),
            stream: None,
        };

        // Try initial connection (the consumer may not be up yet)
        if let Err(e) = writer.connect().await {
            warn!(error = %e, "Initial IPC connection failed, will retry on publish");
        }
        tokio::spawn(writer.run(rx));

        Self {
            frames,
            dropped: AtomicU64::new(0),
        }
    }

    /// Publish a processed result
    ///
    /// Delivery is best effort: when the queue is full or the consumer is
    /// missing the result is dropped and logged.
    pub async fn publish(&self, symbol: &str, result: &ProcessedResult) -> Result<()> {
        let message = encode_frame(&PublishedResult {
            symbol: symbol.to_string(),
            result: result.clone(),
        })?;

        match self.frames.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(symbol = %symbol, dropped, "IPC queue full, dropping result");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("IPC writer stopped, dropping result");
            }
        }

        Ok(())
    }

    /// Results dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Owns the socket and drains the frame queue
struct IpcWriter {
    socket_path: String,
    stream: Option<UnixStream>,
}

impl IpcWriter {
    /// Connect to the Unix socket
    async fn connect(&mut self) -> Result<()> {
        let path = Path::new(&self.socket_path);

        if !path.exists() {
            return Err(AnalyticsError::IpcError(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = timeout(WRITE_TIMEOUT, UnixStream::connect(path))
            .await
            .map_err(|_| AnalyticsError::IpcError(format!("Timed out connecting to {}", self.socket_path)))?
            .map_err(|e| AnalyticsError::IpcError(format!("Failed to connect to {}: {}", self.socket_path, e)))?;

        self.stream = Some(stream);
        info!(path = %self.socket_path, "Connected to IPC socket");
        Ok(())
    }

    async fn run(mut self, mut frames: mpsc::Receiver<BytesMut>) {
        while let Some(frame) = frames.recv().await {
            if self.stream.is_none() {
                if let Err(e) = self.connect().await {
                    debug!(error = %e, "Failed to reconnect to IPC socket");
                    continue;
                }
            }

            if let Some(stream) = self.stream.as_mut() {
                match timeout(WRITE_TIMEOUT, stream.write_all(&frame)).await {
                    Ok(Ok(())) => debug!(bytes = frame.len(), "Published result"),
                    Ok(Err(e)) => {
                        warn!(error = %e, "Failed to write to IPC socket");
                        self.stream = None; // Mark as disconnected
                    }
                    Err(_) => {
                        warn!(path = %self.socket_path, "IPC consumer stalled, dropping connection");
                        self.stream = None;
                    }
                }
            }
        }

        debug!("IPC writer stopped");
    }
}

/// MessagePack payload behind a 4-byte big-endian length prefix
pub fn encode_frame(payload: &PublishedResult) -> Result<BytesMut> {
    let data = rmp_serde::to_vec_named(payload)?;

    let mut frame = BytesMut::with_capacity(4 + data.len());
    frame.put_u32(data.len() as u32);
    frame.put_slice(&data);
    Ok(frame)
}

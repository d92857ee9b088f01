//! HTTP API
//!
//! Request/response access to the engines, a live result stream over
//! WebSocket, plus health and metrics.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::engine::{AnomalyEvent, ProcessedResult, Snapshot};
use crate::error::{AnalyticsError, Result};
use crate::AppState;

impl IntoResponse for AnalyticsError {
    fn into_response(self) -> Response {
        let status = match &self {
            AnalyticsError::UnknownSymbol(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/symbols", get(symbols))
        .route("/snapshots/:symbol", post(process_snapshot))
        .route("/features/:symbol", get(features))
        .route("/anomalies/:symbol", get(anomalies))
        .route("/snapshot/:symbol/latest", get(latest_result))
        .route("/engines/:symbol", delete(reset_engine))
        .route("/ws/:symbol", get(live_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until the listener fails
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting analytics API server");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let symbols = state.engines.read().await.symbols();
    Json(serde_json::json!({
        "status": "healthy",
        "component": "analytics",
        "symbols": symbols,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String> {
    state.telemetry.render()
}

async fn symbols(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.engines.read().await.symbols())
}

async fn process_snapshot(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Json(snapshot): Json<Snapshot>,
) -> Result<Json<ProcessedResult>> {
    let result = state.ingest(&normalize(&symbol), &snapshot).await?;
    Ok(Json(result))
}

async fn features(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<Vec<ProcessedResult>>> {
    let symbol = normalize(&symbol);
    let engines = state.engines.read().await;
    engines
        .history(&symbol)
        .map(Json)
        .ok_or(AnalyticsError::UnknownSymbol(symbol))
}

async fn anomalies(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<Vec<AnomalyEvent>>> {
    let symbol = normalize(&symbol);
    let engines = state.engines.read().await;
    engines
        .anomalies(&symbol)
        .map(Json)
        .ok_or(AnalyticsError::UnknownSymbol(symbol))
}

async fn latest_result(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<ProcessedResult>> {
    let symbol = normalize(&symbol);
    let engines = state.engines.read().await;
    engines
        .latest(&symbol)
        .cloned()
        .map(Json)
        .ok_or(AnalyticsError::UnknownSymbol(symbol))
}

async fn reset_engine(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<StatusCode> {
    let symbol = normalize(&symbol);
    if state.engines.write().await.reset(&symbol) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AnalyticsError::UnknownSymbol(symbol))
    }
}

async fn live_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Response {
    let symbol = normalize(&symbol);
    ws.on_upgrade(move |socket| stream_results(socket, state, symbol))
}

/// Send the symbol's history, then every new result for it until the client leaves
async fn stream_results(socket: WebSocket, state: Arc<AppState>, symbol: String) {
    // Subscribe first so no result falls between the history and the stream
    let mut live = state.live.subscribe();
    let history = state.engines.read().await.history(&symbol).unwrap_or_default();

    let (mut sender, mut receiver) = socket.split();

    let frame = serde_json::json!({ "type": "history", "data": history });
    if sender.send(Message::Text(frame.to_string())).await.is_err() {
        return;
    }
    info!(symbol = %symbol, "Live subscriber connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            update = live.recv() => match update {
                Ok(update) if update.symbol == symbol => {
                    let text = match serde_json::to_string(&update.result) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode live result");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(symbol = %symbol, skipped, "Live subscriber lagging, results skipped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    debug!(symbol = %symbol, "Live subscriber disconnected");
}

//! HTTP API tests, driven through the router or, for the live stream, a
//! local listener

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use futures_util::StreamExt;
use phantom_flow_analytics::engine::{AnomalyEvent, ProcessedResult, Snapshot};
use phantom_flow_analytics::{api, AppState, Config};
use serde_json::json;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

async fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        ipc_socket_path: dir.path().join("none.sock").to_string_lossy().into_owned(),
        history_len: 5,
        ..Config::default()
    };
    (Arc::new(AppState::new(config).await.unwrap()), dir)
}

fn post_snapshot(symbol: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/snapshots/{}", symbol))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn book(bid_qty: f64, ask_qty: f64) -> serde_json::Value {
    json!({
        "timestamp": 1_700_000_000_000i64,
        "mid_price": 100.05,
        "bids": [{"price": 100.0, "volume": bid_qty}],
        "asks": [{"price": 100.1, "volume": ask_qty}]
    })
}

#[tokio::test]
async fn test_process_snapshot_returns_result() {
    let (state, _dir) = test_state().await;

    let response = api::router(state.clone())
        .oneshot(post_snapshot("btcusdt", book(10.0, 10.0)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result: ProcessedResult = body_json(response).await;
    assert!((result.spread - 0.1).abs() < 1e-9);
    assert_eq!(result.regime_label, "Calm");
    assert_eq!(result.directional_prob, 50.0);

    // Symbol is normalised to upper case
    assert!(state.engines.read().await.has_symbol("BTCUSDT"));
}

#[tokio::test]
async fn test_degenerate_snapshot_gets_neutral_result() {
    let (state, _dir) = test_state().await;
    let body = json!({"timestamp": 5, "mid_price": 42.0, "bids": [], "asks": []});

    let response = api::router(state)
        .oneshot(post_snapshot("BTCUSDT", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result: serde_json::Value = body_json(response).await;
    assert_eq!(result["microprice"], 42.0);
    assert_eq!(result["regime"], 0);
    assert_eq!(result["anomalies"], json!([]));
}

#[tokio::test]
async fn test_malformed_body_is_rejected_by_transport() {
    let (state, _dir) = test_state().await;

    let response = api::router(state)
        .oneshot(post_snapshot("BTCUSDT", json!({"mid_price": "oops"})))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_history_and_anomaly_endpoints() {
    let (state, _dir) = test_state().await;
    let router = api::router(state);

    router
        .clone()
        .oneshot(post_snapshot("BTCUSDT", book(10.0, 10.0)))
        .await
        .unwrap();
    router
        .clone()
        .oneshot(post_snapshot("BTCUSDT", book(90.0, 10.0)))
        .await
        .unwrap();

    let response = router.clone().oneshot(get("/features/BTCUSDT")).await.unwrap();
    let history: Vec<ProcessedResult> = body_json(response).await;
    assert_eq!(history.len(), 2);

    let response = router.clone().oneshot(get("/snapshot/BTCUSDT/latest")).await.unwrap();
    let latest: ProcessedResult = body_json(response).await;
    assert!((latest.obi - 0.8).abs() < 1e-9);

    let response = router.clone().oneshot(get("/anomalies/BTCUSDT")).await.unwrap();
    let events: Vec<AnomalyEvent> = body_json(response).await;
    assert!(events.iter().any(|e| e.message == "Heavy BUY pressure"));

    let response = router.oneshot(get("/features/DOGEUSDT")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reset_engine() {
    let (state, _dir) = test_state().await;
    let router = api::router(state.clone());

    router
        .clone()
        .oneshot(post_snapshot("ETHUSDT", book(10.0, 10.0)))
        .await
        .unwrap();

    let delete = Request::builder()
        .method("DELETE")
        .uri("/engines/ETHUSDT")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!state.engines.read().await.has_symbol("ETHUSDT"));

    let delete = Request::builder()
        .method("DELETE")
        .uri("/engines/ETHUSDT")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (state, _dir) = test_state().await;
    let router = api::router(state);

    router
        .clone()
        .oneshot(post_snapshot("BTCUSDT", book(10.0, 10.0)))
        .await
        .unwrap();

    let response = router.clone().oneshot(get("/health")).await.unwrap();
    let health: serde_json::Value = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["symbols"], json!(["BTCUSDT"]));

    let response = router.oneshot(get("/metrics")).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("analytics_snapshots_processed_total{symbol=\"BTCUSDT\"} 1"));
}

/// Next text frame from the live stream, as JSON
async fn next_json<S>(ws: &mut S) -> serde_json::Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("live frame in time")
            .expect("stream open")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_live_stream_sends_history_then_updates() {
    let (state, _dir) = test_state().await;
    let snapshot: Snapshot = serde_json::from_value(book(10.0, 10.0)).unwrap();
    state.ingest("BTCUSDT", &snapshot).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, api::router(state.clone())).into_future());

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/btcusdt", addr))
        .await
        .unwrap();

    let history = next_json(&mut ws).await;
    assert_eq!(history["type"], "history");
    assert_eq!(history["data"].as_array().unwrap().len(), 1);

    // Other symbols are not forwarded
    state.ingest("ETHUSDT", &snapshot).await.unwrap();
    let heavy: Snapshot = serde_json::from_value(book(90.0, 10.0)).unwrap();
    state.ingest("BTCUSDT", &heavy).await.unwrap();

    let update = next_json(&mut ws).await;
    assert!((update["obi"].as_f64().unwrap() - 0.8).abs() < 1e-9);
    assert_eq!(update["anomalies"][0]["type"], "HEAVY_IMBALANCE");
}

#[tokio::test]
async fn test_ingest_continues_with_stalled_ipc_consumer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stalled.sock");
    let listener = tokio::net::UnixListener::bind(&path).unwrap();
    let config = Config {
        ipc_socket_path: path.to_string_lossy().into_owned(),
        ..Config::default()
    };
    let state = AppState::new(config).await.unwrap();
    // Connected, never read from
    let (_consumer, _) = listener.accept().await.unwrap();

    let snapshot: Snapshot = serde_json::from_value(book(10.0, 10.0)).unwrap();
    let outcome = timeout(Duration::from_secs(5), async {
        for _ in 0..5_000 {
            state.ingest("BTCUSDT", &snapshot).await.unwrap();
        }
    })
    .await;

    assert!(outcome.is_ok(), "ingest stalled behind the IPC consumer");
    assert_eq!(state.engines.read().await.history("BTCUSDT").unwrap().len(), 100);
}


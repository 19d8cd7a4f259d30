//! End-to-end tests for the simulated SSE feed

mod common;

use axum::http::StatusCode;
use common::{fast_config, spawn_app};
use serde_json::Value;

fn parse_events(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|chunk| chunk.trim_start().strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).expect("event data is JSON"))
        .collect()
}

#[tokio::test]
async fn test_feed_streams_until_complete() {
    let (server, _state) = spawn_app(fast_config());

    let response = server.get("/api/courier").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.header("content-type"), "text/event-stream");
    assert_eq!(response.header("x-no-compression"), "1");

    let events = parse_events(&response.text());
    assert!(events.len() >= 2);

    let first = &events[0];
    assert_eq!(first["t"], 0.0);
    assert_eq!(first["leg"], "to-sortation");
    assert_eq!(first["pos"]["lat"], 40.4017);
    assert_eq!(first["waypoints"].as_array().unwrap().len(), 4);

    let last = events.last().unwrap();
    assert_eq!(last["t"], 1.0);
    assert_eq!(last["leg"], "to-recipient");
    assert_eq!(last["pos"]["lat"], 40.417);
    assert_eq!(last["remainingMeters"], 0.0);
}

#[tokio::test]
async fn test_feed_progress_is_monotonic() {
    let (server, _state) = spawn_app(fast_config());

    let events = parse_events(&server.get("/api/courier").await.text());
    let ts: Vec<f64> = events.iter().map(|e| e["t"].as_f64().unwrap()).collect();
    assert!(ts.windows(2).all(|w| w[0] <= w[1]));

    let remaining: Vec<f64> = events
        .iter()
        .map(|e| e["remainingMeters"].as_f64().unwrap())
        .collect();
    assert!(remaining.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_health() {
    let (server, _state) = spawn_app(fast_config());
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

//! End-to-end tests for the ingest endpoint
//!
//! Tests cover:
//! - Batch validation and accepted counts
//! - Status codes for empty, malformed and unauthorized requests
//! - Fan-out of accepted reports to subscribers

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use courier_relay::config::{Config, SECRET_HEADER};
use common::{attach_subscriber, drain, spawn_app};
use serde_json::{json, Value};

const WEBHOOK: &str = "/api/webhook/courier";

fn secret_header() -> HeaderName {
    HeaderName::from_static(SECRET_HEADER)
}

#[tokio::test]
async fn test_mixed_batch_accepts_two() {
    let (server, state) = spawn_app(Config::default());
    let mut rx = attach_subscriber(&state);

    let response = server
        .post(WEBHOOK)
        .json(&json!([{ "lat": 1, "lng": 2 }, { "lat": "x", "lng": 2 }, { "lat": 3, "lng": 4 }]))
        .expect_success()
        .await;

    response.assert_status(StatusCode::OK);
    response.assert_json(&json!({ "accepted": 2 }));

    let frames: Vec<Value> = drain(&mut rx)
        .iter()
        .map(|f| serde_json::from_str(f).unwrap())
        .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["lat"], 1.0);
    assert_eq!(frames[1]["lat"], 3.0);
}

#[tokio::test]
async fn test_empty_object_is_rejected_without_side_effects() {
    let (server, state) = spawn_app(Config::default());
    let mut rx = attach_subscriber(&state);

    let response = server.post(WEBHOOK).json(&json!({})).expect_failure().await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_unparsable_body_is_rejected() {
    let (server, _state) = spawn_app(Config::default());

    let response = server.post(WEBHOOK).text("lat=1&lng=2").expect_failure().await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON"));
}

#[tokio::test]
async fn test_missing_secret_is_unauthorized() {
    let config = Config {
        webhook_secret: Some("s3cret".to_string()),
        ..Config::default()
    };
    let (server, state) = spawn_app(config);
    let mut rx = attach_subscriber(&state);

    server
        .post(WEBHOOK)
        .json(&json!({ "lat": 1, "lng": 2 }))
        .expect_failure()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .post(WEBHOOK)
        .add_header(secret_header(), HeaderValue::from_static("nope"))
        .json(&json!({ "lat": 1, "lng": 2 }))
        .expect_failure()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    assert!(drain(&mut rx).is_empty());

    server
        .post(WEBHOOK)
        .add_header(secret_header(), HeaderValue::from_static("s3cret"))
        .json(&json!({ "lat": 1, "lng": 2 }))
        .expect_success()
        .await
        .assert_json(&json!({ "accepted": 1 }));

    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_waypoint_report_fans_out_every_role() {
    let (server, state) = spawn_app(Config::default());
    let mut rx = attach_subscriber(&state);

    server
        .post(WEBHOOK)
        .json(&json!({
            "point": {
                "coordinates": { "lat": 14.55, "lng": 121.0 },
                "pickupLocationCoordinates": { "lat": 14.5, "lng": 121.0 },
                "sortationCenterCoordinates": { "lat": 14.57, "lng": 121.05 },
                "deliveryHubCoordinates": { "lat": 14.58, "lng": 121.07 },
                "recipientCoordinates": { "lat": 14.6, "lng": 121.1 }
            },
            "ts": 1_700_000_000_000i64
        }))
        .expect_success()
        .await
        .assert_json(&json!({ "accepted": 1 }));

    let frames: Vec<Value> = drain(&mut rx)
        .iter()
        .map(|f| serde_json::from_str(f).unwrap())
        .collect();
    let roles: Vec<&str> = frames.iter().map(|f| f["role"].as_str().unwrap()).collect();
    assert_eq!(roles, ["courier", "pickup", "sortation", "hub", "recipient"]);
    assert!(frames.iter().all(|f| f["ts"] == 1_700_000_000_000i64));
}

#[tokio::test]
async fn test_dead_subscriber_does_not_fail_ingest() {
    let (server, state) = spawn_app(Config::default());
    let dead = attach_subscriber(&state);
    let mut live = attach_subscriber(&state);
    drop(dead);

    server
        .post(WEBHOOK)
        .json(&json!({ "lat": 40.4, "lng": -3.7 }))
        .expect_success()
        .await
        .assert_json(&json!({ "accepted": 1 }));

    assert_eq!(state.positions.len(), 1);
    assert_eq!(drain(&mut live).len(), 1);

    let stats: Value = server.get("/api/subscribers").await.json();
    assert_eq!(stats, json!({ "channel": "positions", "subscribers": 1 }));
}

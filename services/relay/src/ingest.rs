//! Position ingest endpoint
//!
//! Accepts one report or an array of reports from a courier webhook (or the
//! simulation harness) and fans every valid one out on the positions channel.
//!
//! Coordinates are looked up through [`COORDINATE_RULES`], in table order;
//! for each role the first key path holding a valid `{lat, lng}` wins:
//!
//! | role      | key paths, highest priority first                                      |
//! |-----------|------------------------------------------------------------------------|
//! | courier   | `point.coordinates`, `courier`, top-level `lat`/`lng`                  |
//! | pickup    | `point.pickupLocationCoordinates`, `pickup`                            |
//! | sortation | `point.sortationCenterCoordinates`, `sortation`                        |
//! | hub       | `point.deliveryHubCoordinates`, `hub`                                  |
//! | recipient | `point.recipientCoordinates`, `recipient`, `destination`, `dest`       |
//!
//! An entry is accepted when at least one role matched. The timestamp comes
//! from `timestamp` or `ts`; when absent it is the ingest time plus ten
//! milliseconds per batch index so a batch keeps its order.

use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use courier_shared::{GeoPoint, PositionUpdate, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::config::SECRET_HEADER;
use crate::error::IngestError;
use crate::router::AppState;

/// Spacing applied to default timestamps within one batch.
pub const BATCH_TS_STEP_MS: i64 = 10;

pub struct CoordinateRule {
    pub role: Role,
    /// Object keys leading to a `{lat, lng}` object; empty means the entry itself.
    pub path: &'static [&'static str],
}

const fn rule(role: Role, path: &'static [&'static str]) -> CoordinateRule {
    CoordinateRule { role, path }
}

pub const COORDINATE_RULES: &[CoordinateRule] = &[
    rule(Role::Courier, &["point", "coordinates"]),
    rule(Role::Courier, &["courier"]),
    rule(Role::Courier, &[]),
    rule(Role::Pickup, &["point", "pickupLocationCoordinates"]),
    rule(Role::Pickup, &["pickup"]),
    rule(Role::Sortation, &["point", "sortationCenterCoordinates"]),
    rule(Role::Sortation, &["sortation"]),
    rule(Role::Hub, &["point", "deliveryHubCoordinates"]),
    rule(Role::Hub, &["hub"]),
    rule(Role::Recipient, &["point", "recipientCoordinates"]),
    rule(Role::Recipient, &["recipient"]),
    rule(Role::Recipient, &["destination"]),
    rule(Role::Recipient, &["dest"]),
];

pub const TIMESTAMP_KEYS: &[&str] = &["timestamp", "ts"];

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestResponse {
    pub accepted: usize,
}

/// Result of validating one request body.
#[derive(Debug, Default, PartialEq)]
pub struct IngestBatch {
    pub accepted: usize,
    pub updates: Vec<PositionUpdate>,
}

pub async fn ingest_courier(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, IngestError> {
    authorize(state.config.webhook_secret.as_deref(), &headers)?;

    let body: Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Rejected unparsable ingest body");
        IngestError::MalformedBody(e.to_string())
    })?;

    let batch = extract_batch(&body, chrono::Utc::now().timestamp_millis());
    if batch.accepted == 0 {
        tracing::warn!("Ingest request carried no valid coordinates");
        return Err(IngestError::NoValidEntries);
    }

    let mut delivered = 0;
    for update in &batch.updates {
        delivered += state.positions.broadcast(update);
    }

    tracing::info!(
        accepted = batch.accepted,
        updates = batch.updates.len(),
        delivered,
        "Position reports ingested"
    );

    Ok(Json(IngestResponse {
        accepted: batch.accepted,
    }))
}

/// Check the shared secret, if one is configured.
pub fn authorize(expected: Option<&str>, headers: &HeaderMap) -> Result<(), IngestError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get(SECRET_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if bool::from(provided.ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!(header = SECRET_HEADER, present = !provided.is_empty(), "Webhook secret mismatch");
        Err(IngestError::Unauthorized)
    }
}

/// Validate a parsed body (object or array of objects) into position updates.
pub fn extract_batch(body: &Value, now_ms: i64) -> IngestBatch {
    let entries = match body {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };

    let mut batch = IngestBatch::default();
    for (index, entry) in entries.iter().enumerate() {
        let positions = extract_positions(entry);
        if positions.is_empty() {
            continue;
        }

        let ts = extract_timestamp(entry).unwrap_or(now_ms + index as i64 * BATCH_TS_STEP_MS);
        batch.accepted += 1;
        batch
            .updates
            .extend(positions.into_iter().map(|(role, point)| PositionUpdate::new(role, point, ts)));
    }
    batch
}

/// Every role matched by `entry`, in [`Role::ALL`] order.
pub fn extract_positions(entry: &Value) -> Vec<(Role, GeoPoint)> {
    let mut found: Vec<(Role, GeoPoint)> = Vec::new();
    for rule in COORDINATE_RULES {
        if found.iter().any(|(role, _)| *role == rule.role) {
            continue;
        }
        if let Some(point) = lookup(entry, rule.path).and_then(coordinate) {
            found.push((rule.role, point));
        }
    }
    found
}

pub fn extract_timestamp(entry: &Value) -> Option<i64> {
    TIMESTAMP_KEYS.iter().find_map(|key| {
        let value = entry.get(*key)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .filter(|ts| *ts >= 0)
    })
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

fn coordinate(value: &Value) -> Option<GeoPoint> {
    let lat = value.get("lat")?.as_f64()?;
    let lng = value.get("lng")?.as_f64()?;
    GeoPoint::checked(lat, lng)
}

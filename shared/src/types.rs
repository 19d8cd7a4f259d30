//! Core value types shared by the relay and its consumers

use serde::{Deserialize, Serialize};
use std::fmt;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Builds a point only if both components are finite and in range.
    pub fn checked(lat: f64, lng: f64) -> Option<Self> {
        let point = Self { lat, lng };
        point.is_valid().then_some(point)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lng)
    }
}

/// Which logical node a position report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Courier,
    Pickup,
    Sortation,
    Hub,
    Recipient,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Courier,
        Role::Pickup,
        Role::Sortation,
        Role::Hub,
        Role::Recipient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Courier => "courier",
            Role::Pickup => "pickup",
            Role::Sortation => "sortation",
            Role::Hub => "hub",
            Role::Recipient => "recipient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Position,
}

/// One position event as fanned out to subscribers.
///
/// Serialized flat: `{"type":"position","role":"courier","lat":..,"lng":..,"ts":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub role: Role,
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(rename = "ts")]
    pub timestamp: i64,
}

impl PositionUpdate {
    pub fn new(role: Role, point: GeoPoint, timestamp: i64) -> Self {
        Self {
            kind: EventKind::Position,
            role,
            point,
            timestamp,
        }
    }
}

/// A waypoint with the name used to label legs that end at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedWaypoint {
    pub name: String,
    #[serde(flatten)]
    pub point: GeoPoint,
}

impl NamedWaypoint {
    pub fn new(name: impl Into<String>, point: GeoPoint) -> Self {
        Self {
            name: name.into(),
            point,
        }
    }
}

//! Geodesic path math
//!
//! Pure functions over waypoint sequences. Distances are great-circle
//! (haversine) meters; interpolation inside a segment is linear in lat/lng,
//! which is accurate enough at city scale.

use crate::types::GeoPoint;
use thiserror::Error;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

/// Great-circle distance between two points in meters.
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let s = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * s.sqrt().atan2((1.0 - s).sqrt());
    EARTH_RADIUS_M * c
}

/// Component-wise linear interpolation; `t = 0` gives `a`, `t = 1` gives `b`.
pub fn interpolate(a: GeoPoint, b: GeoPoint, t: f64) -> GeoPoint {
    GeoPoint {
        lat: a.lat + (b.lat - a.lat) * t,
        lng: a.lng + (b.lng - a.lng) * t,
    }
}

/// Sum of consecutive segment distances. Zero for fewer than two points.
pub fn total_path_length(path: &[GeoPoint]) -> f64 {
    path.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Point at global progress `t` along `path`, by cumulative arc length.
pub fn interpolate_path(path: &[GeoPoint], t: f64) -> Result<GeoPoint, GeoError> {
    let last = *path.last().ok_or(GeoError::InvalidInput("empty path"))?;
    Ok(match locate(path, t) {
        Location::Start => path[0],
        Location::End => last,
        Location::Within { point, .. } => point,
    })
}

/// The traversed part of `path` at progress `t`, ending at the interpolated point.
pub fn path_prefix_at_t(path: &[GeoPoint], t: f64) -> Result<Vec<GeoPoint>, GeoError> {
    if path.is_empty() {
        return Err(GeoError::InvalidInput("empty path"));
    }
    Ok(match locate(path, t) {
        Location::Start => vec![path[0]],
        Location::End => path.to_vec(),
        Location::Within { segment, point } => {
            let mut prefix = path[..=segment].to_vec();
            prefix.push(point);
            prefix
        }
    })
}

/// The part of `path` still ahead at progress `t`, starting at the interpolated point.
pub fn path_suffix_at_t(path: &[GeoPoint], t: f64) -> Result<Vec<GeoPoint>, GeoError> {
    let last = *path.last().ok_or(GeoError::InvalidInput("empty path"))?;
    Ok(match locate(path, t) {
        Location::Start => path.to_vec(),
        Location::End => vec![last],
        Location::Within { segment, point } => {
            let mut suffix = Vec::with_capacity(path.len() - segment);
            suffix.push(point);
            suffix.extend_from_slice(&path[segment + 1..]);
            suffix
        }
    })
}

/// Meters left to travel at progress `t`.
pub fn remaining_distance_at_t(path: &[GeoPoint], t: f64) -> Result<f64, GeoError> {
    Ok(total_path_length(&path_suffix_at_t(path, t)?))
}

enum Location {
    Start,
    End,
    Within { segment: usize, point: GeoPoint },
}

// NaN progress is treated as the start of the path.
fn locate(path: &[GeoPoint], t: f64) -> Location {
    if t.is_nan() || t <= 0.0 {
        return Location::Start;
    }
    if t >= 1.0 || path.len() < 2 {
        return Location::End;
    }

    let segments: Vec<f64> = path.windows(2).map(|w| distance(w[0], w[1])).collect();
    let total: f64 = segments.iter().sum();
    let mut remaining = t * total;

    for (i, &len) in segments.iter().enumerate() {
        if remaining <= len {
            let local = if len == 0.0 { 0.0 } else { remaining / len };
            return Location::Within {
                segment: i,
                point: interpolate(path[i], path[i + 1], local),
            };
        }
        remaining -= len;
    }

    Location::End
}

//! Consumer-side tracking helpers
//!
//! What a map client derives locally from the position feed: proximity to
//! the recipient, per-leg progress, a smoothed progress value and a
//! breadcrumb trail of where the courier has been.

use std::collections::VecDeque;

use crate::geo::distance;
use crate::types::GeoPoint;

pub const NEARBY_RADIUS_M: f64 = 1_000.0;
pub const ARRIVED_RADIUS_M: f64 = 100.0;
pub const WAYPOINT_HIT_RADIUS_M: f64 = 30.0;
pub const BREADCRUMB_MIN_STEP_M: f64 = 5.0;
pub const SMOOTHING_WINDOW: usize = 10;

// Maximum detour (start->courier->end vs start->end) still counted as "on the leg".
const LEG_DETOUR_TOLERANCE: f64 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub distance_m: f64,
    pub nearby: bool,
    pub arrived: bool,
}

pub fn proximity(courier: GeoPoint, recipient: GeoPoint) -> Proximity {
    let distance_m = distance(courier, recipient);
    Proximity {
        distance_m,
        nearby: distance_m < NEARBY_RADIUS_M,
        arrived: distance_m < ARRIVED_RADIUS_M,
    }
}

/// A labelled leg between two known waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub label: String,
    pub start: GeoPoint,
    pub end: GeoPoint,
}

impl Leg {
    pub fn new(label: impl Into<String>, start: GeoPoint, end: GeoPoint) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegProgress {
    pub label: String,
    pub fraction: f64,
}

/// Estimate which leg the courier is on and how far along it is.
///
/// Legs are checked in order; the first that plausibly contains the courier wins.
pub fn leg_progress(courier: GeoPoint, legs: &[Leg]) -> Option<LegProgress> {
    for leg in legs {
        let length = distance(leg.start, leg.end);
        if length == 0.0 {
            continue;
        }

        let to_end = distance(courier, leg.end);
        if to_end <= WAYPOINT_HIT_RADIUS_M {
            return Some(LegProgress {
                label: leg.label.clone(),
                fraction: 1.0,
            });
        }

        let from_start = distance(leg.start, courier);
        if from_start < length && to_end < length && from_start + to_end <= length * LEG_DETOUR_TOLERANCE {
            return Some(LegProgress {
                label: leg.label.clone(),
                fraction: (from_start / length).clamp(0.0, 1.0),
            });
        }
    }
    None
}

/// Moving average over the most recent progress samples.
#[derive(Debug, Default)]
pub struct ProgressSmoother {
    window: VecDeque<f64>,
}

impl ProgressSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one estimate; `None` clears the history.
    pub fn push(&mut self, sample: Option<f64>) -> Option<f64> {
        let Some(value) = sample else {
            self.window.clear();
            return None;
        };

        self.window.push_back(value);
        if self.window.len() > SMOOTHING_WINDOW {
            self.window.pop_front();
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }
}

/// Trail of observed courier positions, ignoring jitter below a few meters.
#[derive(Debug, Clone)]
pub struct Breadcrumbs {
    trail: Vec<GeoPoint>,
}

impl Breadcrumbs {
    pub fn new(origin: GeoPoint) -> Self {
        Self {
            trail: vec![origin],
        }
    }

    /// Returns whether the point was appended.
    pub fn observe(&mut self, point: GeoPoint) -> bool {
        let moved = self
            .trail
            .last()
            .map_or(true, |last| distance(*last, point) > BREADCRUMB_MIN_STEP_M);
        if moved {
            self.trail.push(point);
        }
        moved
    }

    /// Start over from a new origin.
    pub fn reset(&mut self, origin: GeoPoint) {
        self.trail.clear();
        self.trail.push(origin);
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.trail
    }
}

pub fn format_distance(meters: f64) -> String {
    if meters >= 1_000.0 {
        format!("{:.2} km away", meters / 1_000.0)
    } else {
        format!("{} m away", meters.round() as i64)
    }
}

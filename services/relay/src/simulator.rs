//! Simulated courier feed
//!
//! Each request to the feed gets its own run: a clock started at request
//! time, a periodic tick, and a cancellation token. Every tick recomputes
//! progress `t`, interpolates the courier along the route and pushes a
//! [`Snapshot`] to that one client over server-sent events. The run ends
//! once `t` reaches 1, when the client goes away, or on shutdown, whichever
//! happens first; [`Teardown::release`] runs exactly once in every case.

use axum::{
    extract::State,
    http::{header, HeaderName},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
};
use courier_shared::geo::{interpolate_path, remaining_distance_at_t, GeoError};
use courier_shared::{GeoPoint, NamedWaypoint};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::router::AppState;

// Snapshots buffered per client; a client this far behind stalls its own run only.
const SNAPSHOT_BUFFER: usize = 4;

/// Ordered, named waypoints the simulated courier travels through.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    waypoints: Vec<NamedWaypoint>,
    points: Vec<GeoPoint>,
}

impl Route {
    pub fn new(waypoints: Vec<NamedWaypoint>) -> Result<Self, GeoError> {
        if waypoints.is_empty() {
            return Err(GeoError::InvalidInput("route needs at least one waypoint"));
        }
        let points = waypoints.iter().map(|w| w.point).collect();
        Ok(Self { waypoints, points })
    }

    /// Pickup, sortation center, delivery hub and recipient in central Madrid.
    pub fn demo() -> Self {
        let waypoints = vec![
            NamedWaypoint::new("pickup", GeoPoint::new(40.4017, -3.7074)),
            NamedWaypoint::new("sortation", GeoPoint::new(40.4267, -3.7038)),
            NamedWaypoint::new("hub", GeoPoint::new(40.4382, -3.6886)),
            NamedWaypoint::new("recipient", GeoPoint::new(40.4170, -3.7033)),
        ];
        let points = waypoints.iter().map(|w| w.point).collect();
        Self { waypoints, points }
    }

    pub fn waypoints(&self) -> &[NamedWaypoint] {
        &self.waypoints
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    /// Label of the leg active at progress `t`.
    ///
    /// Legs split `t` evenly, so with three legs `to-hub` starts at exactly 1/3.
    pub fn leg_label(&self, t: f64) -> String {
        let legs = self.waypoints.len() - 1;
        if legs == 0 {
            return format!("at-{}", self.waypoints[0].name);
        }

        let t = clamp_progress(t);
        let index = (0..legs)
            .find(|i| t < (*i as f64 + 1.0) / legs as f64)
            .unwrap_or(legs - 1);
        format!("to-{}", self.waypoints[index + 1].name)
    }

    pub fn snapshot(&self, t: f64) -> Result<Snapshot, GeoError> {
        let t = clamp_progress(t);
        Ok(Snapshot {
            pos: interpolate_path(&self.points, t)?,
            t,
            leg: self.leg_label(t),
            waypoints: self.waypoints.clone(),
            remaining_meters: remaining_distance_at_t(&self.points, t)?,
        })
    }
}

/// One message of the simulated feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub pos: GeoPoint,
    pub t: f64,
    pub leg: String,
    pub waypoints: Vec<NamedWaypoint>,
    pub remaining_meters: f64,
}

/// Normalized progress for `elapsed` out of `total`, clamped to `[0, 1]`.
pub fn progress(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 1.0;
    }
    clamp_progress(elapsed.as_secs_f64() / total.as_secs_f64())
}

fn clamp_progress(t: f64) -> f64 {
    if t.is_nan() {
        0.0
    } else {
        t.clamp(0.0, 1.0)
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Cancelled,
    ClientGone,
    PathError,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::Cancelled => "cancelled",
            StopReason::ClientGone => "client disconnected",
            StopReason::PathError => "path error",
        }
    }
}

/// Single release point for a run's resources.
pub struct Teardown {
    run_id: Uuid,
    released: AtomicBool,
    completed: AtomicBool,
    token: CancellationToken,
}

impl Teardown {
    fn new(run_id: Uuid, token: CancellationToken) -> Self {
        Self {
            run_id,
            released: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            token,
        }
    }

    /// Stop the run. Only the first call has any effect; it returns `true`.
    pub fn release(&self, reason: StopReason) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Must be visible before the token fires.
        if reason == StopReason::Completed {
            self.completed.store(true, Ordering::Release);
        }
        self.token.cancel();
        tracing::info!(run_id = %self.run_id, reason = reason.as_str(), "Simulation released");
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Whether the run reached `t = 1` rather than being cut short.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

pub struct Simulation {
    route: Arc<Route>,
    total: Duration,
    tick: Duration,
}

impl Simulation {
    pub fn new(route: Arc<Route>, total: Duration, tick: Duration) -> Self {
        Self { route, total, tick }
    }

    /// Start a run under `parent`. The first snapshot (`t = 0`) is queued
    /// before this returns; later ones follow every `tick`.
    pub fn spawn(self, parent: &CancellationToken) -> SnapshotStream {
        let run_id = Uuid::new_v4();
        let token = parent.child_token();
        let teardown = Arc::new(Teardown::new(run_id, token.clone()));
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let start = Instant::now();

        tracing::info!(
            run_id = %run_id,
            total_ms = self.total.as_millis() as u64,
            tick_ms = self.tick.as_millis() as u64,
            "Simulation started"
        );

        match self.route.snapshot(0.0) {
            Ok(first) => match tx.try_send(first) {
                Ok(()) => {
                    tokio::spawn(run(self, start, tx, token.clone(), teardown.clone()));
                }
                Err(e) => {
                    tracing::error!(run_id = %run_id, error = %e, "Failed to queue first snapshot");
                    teardown.release(StopReason::ClientGone);
                }
            },
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Simulation route rejected");
                teardown.release(StopReason::PathError);
            }
        }

        SnapshotStream {
            run_id,
            rx,
            teardown,
            token: token.clone(),
            _cancel_on_drop: token.drop_guard(),
        }
    }
}

async fn run(
    sim: Simulation,
    start: Instant,
    tx: mpsc::Sender<Snapshot>,
    token: CancellationToken,
    teardown: Arc<Teardown>,
) {
    let mut ticker = tokio::time::interval_at(start + sim.tick, sim.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                teardown.release(StopReason::Cancelled);
                break;
            }
            _ = ticker.tick() => {
                let t = progress(start.elapsed(), sim.total);
                let snapshot = match sim.route.snapshot(t) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to compute simulated position");
                        teardown.release(StopReason::PathError);
                        break;
                    }
                };
                // A client that stopped reading must not hold the run past cancellation.
                let delivered = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        teardown.release(StopReason::Cancelled);
                        break;
                    }
                    sent = tx.send(snapshot) => sent.is_ok(),
                };
                if !delivered {
                    teardown.release(StopReason::ClientGone);
                    break;
                }
                if t >= 1.0 {
                    teardown.release(StopReason::Completed);
                    break;
                }
            }
        }
    }
}

/// The client's end of a run. Dropping it cancels the run.
pub struct SnapshotStream {
    run_id: Uuid,
    rx: mpsc::Receiver<Snapshot>,
    teardown: Arc<Teardown>,
    token: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl SnapshotStream {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Cancel the run. Safe to call repeatedly. Snapshots still queued are
    /// discarded; the stream ends on its next poll.
    pub fn cancel(&self) -> bool {
        self.teardown.release(StopReason::Cancelled)
    }

    pub fn is_released(&self) -> bool {
        self.teardown.is_released()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Stream for SnapshotStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        // A completed run still drains its final snapshots; a cancelled one ends now.
        if self.token.is_cancelled() && !self.teardown.is_completed() {
            self.rx.close();
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

pub async fn simulated_feed(State(state): State<AppState>) -> impl IntoResponse {
    let stream = Simulation::new(state.route.clone(), state.config.sim_total, state.config.sim_tick)
        .spawn(&state.shutdown);

    let events = stream.map(|snapshot| Event::default().json_data(&snapshot));

    (
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (HeaderName::from_static("x-no-compression"), "1"),
        ],
        Sse::new(events),
    )
}

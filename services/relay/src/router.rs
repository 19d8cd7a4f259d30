use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::registry::ConnectionRegistry;
use crate::simulator::Route;
use crate::{ingest, middleware as mw, simulator, websocket};

/// Name of the channel that carries live position updates.
pub const POSITIONS_CHANNEL: &str = "positions";

/// Process-wide state, built once in `main` and cloned into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub positions: Arc<ConnectionRegistry>,
    pub route: Arc<Route>,
    /// Parent of every simulation run; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_route(config, Route::demo())
    }

    pub fn with_route(config: Config, route: Route) -> Self {
        Self {
            config: Arc::new(config),
            positions: Arc::new(ConnectionRegistry::new(POSITIONS_CHANNEL)),
            route: Arc::new(route),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop every simulation run and disconnect every subscriber.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.positions.close_all();
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriberStats {
    pub channel: String,
    pub subscribers: usize,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/webhook/courier", post(ingest::ingest_courier))
        .route("/ws", get(websocket::subscribe))
        .route("/api/ws", get(websocket::subscribe))
        .route("/api/courier", get(simulator::simulated_feed))
        .route("/api/subscribers", get(subscriber_stats))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(mw::request_logging))
                .layer(CorsLayer::permissive()),
        )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn subscriber_stats(State(state): State<AppState>) -> Json<SubscriberStats> {
    Json(SubscriberStats {
        channel: state.positions.channel().to_string(),
        subscribers: state.positions.len(),
    })
}

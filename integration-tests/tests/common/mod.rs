//! Helpers shared by the integration test binaries

#![allow(dead_code)]

use axum_test::TestServer;
use courier_relay::config::Config;
use courier_relay::registry::{Connection, Frame};
use courier_relay::{create_router, AppState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub fn fast_config() -> Config {
    Config {
        sim_total: Duration::from_millis(60),
        sim_tick: Duration::from_millis(10),
        ..Config::default()
    }
}

/// A test server plus the state behind it, so tests can observe fan-out.
pub fn spawn_app(config: Config) -> (TestServer, AppState) {
    let state = AppState::new(config);
    let server = TestServer::new(create_router(state.clone())).expect("test server");
    (server, state)
}

/// Attach an in-process subscriber to the positions channel.
pub fn attach_subscriber(state: &AppState) -> mpsc::Receiver<Frame> {
    let (connection, rx) = Connection::new(state.config.subscriber_buffer);
    state.positions.register(&connection);
    rx
}

pub fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<String> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame.to_string());
    }
    frames
}

/// Serve the relay on an ephemeral local port, for clients that need a real socket.
pub async fn serve_app(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::new(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, state)
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

//! WebSocket subscription handling
//!
//! Each socket is one subscriber of the positions channel. Frames queued by
//! the registry are written to the socket in order; the socket is only read
//! to notice the client going away.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::registry::{Connection, ConnectionRegistry, Frame};
use crate::router::AppState;

pub async fn subscribe(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(upgrade) = upgrade else {
        return (StatusCode::BAD_REQUEST, "Expected websocket").into_response();
    };

    let registry = state.positions.clone();
    let buffer = state.config.subscriber_buffer;
    upgrade.on_upgrade(move |socket| handle_socket(socket, registry, buffer))
}

async fn handle_socket(socket: WebSocket, registry: Arc<ConnectionRegistry>, buffer: usize) {
    let (connection, outbound) = Connection::new(buffer);
    let id = connection.id();
    registry.register(&connection);
    // The registry holds the only sender from here on, so unregistering closes `outbound`.
    drop(connection);

    serve(socket, outbound).await;

    registry.unregister(id);
}

async fn serve(socket: WebSocket, mut outbound: mpsc::Receiver<Frame>) {
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    // Dropped by the registry (failed delivery or shutdown).
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                    tracing::debug!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            msg = incoming.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(len = text.len(), "Ignoring client text frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
        }
    }
}

//! Connection registry
//!
//! Tracks the open subscriber connections of one broadcast channel and fans
//! payloads out to them. Delivery is best-effort: each subscriber owns a
//! bounded outbound queue, and a subscriber whose queue is closed or full is
//! dropped from the registry instead of slowing everyone else down.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// A serialized payload, shared by every subscriber it is sent to.
pub type Frame = Arc<str>;

/// Handle to one subscriber's outbound queue.
///
/// The task serving the subscriber holds the matching receiver; dropping it
/// makes every later send fail.
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    outbound: mpsc::Sender<Frame>,
}

impl Connection {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(buffer);
        (
            Self {
                id: Uuid::new_v4(),
                outbound,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

struct Subscriber {
    outbound: mpsc::Sender<Frame>,
    connected_at: Instant,
}

pub struct ConnectionRegistry {
    channel: &'static str,
    members: RwLock<HashMap<Uuid, Subscriber>>,
}

impl ConnectionRegistry {
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            members: RwLock::new(HashMap::new()),
        }
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }

    /// Add a connection. Registering the same connection twice is a no-op.
    pub fn register(&self, connection: &Connection) -> bool {
        let mut members = self.members.write();
        if members.contains_key(&connection.id) {
            return false;
        }
        members.insert(
            connection.id,
            Subscriber {
                outbound: connection.outbound.clone(),
                connected_at: Instant::now(),
            },
        );
        tracing::info!(
            channel = self.channel,
            connection_id = %connection.id,
            subscribers = members.len(),
            "Subscriber registered"
        );
        true
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn unregister(&self, id: Uuid) -> bool {
        let removed = self.members.write().remove(&id);
        match removed {
            Some(subscriber) => {
                tracing::info!(
                    channel = self.channel,
                    connection_id = %id,
                    connected_ms = subscriber.connected_at.elapsed().as_millis() as u64,
                    "Subscriber unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Serialize `payload` once and deliver it to every subscriber.
    ///
    /// Never fails: a payload that cannot be serialized is logged and skipped,
    /// and subscribers that cannot take the frame are removed. Returns the
    /// number of subscribers the frame was queued for.
    pub fn broadcast<T: Serialize + ?Sized>(&self, payload: &T) -> usize {
        match serde_json::to_string(payload) {
            Ok(json) => self.broadcast_frame(Frame::from(json)),
            Err(e) => {
                tracing::error!(channel = self.channel, error = %e, "Failed to serialize broadcast payload");
                0
            }
        }
    }

    pub fn broadcast_frame(&self, frame: Frame) -> usize {
        // Snapshot so no lock is held while sending.
        let targets: Vec<(Uuid, mpsc::Sender<Frame>)> = self
            .members
            .read()
            .iter()
            .map(|(id, sub)| (*id, sub.outbound.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, outbound) in targets {
            match outbound.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(channel = self.channel, connection_id = %id, "Subscriber queue full, dropping");
                    failed.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(channel = self.channel, connection_id = %id, "Subscriber closed, dropping");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut members = self.members.write();
            for id in &failed {
                members.remove(id);
            }
        }

        tracing::debug!(
            channel = self.channel,
            delivered,
            dropped = failed.len(),
            "Broadcast complete"
        );
        delivered
    }

    /// Drop every subscriber, closing their queues. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Uuid> = self.members.write().drain().map(|(id, _)| id).collect();
        if !drained.is_empty() {
            tracing::info!(channel = self.channel, closed = drained.len(), "Closed all subscribers");
        }
        drained.len()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.members.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}

//! Event fan-out
//!
//! Broadcast delivery of directory notifications (`newDeviceConnected`,
//! `deviceBlocked`, `deviceUnblocked`, `deviceDisconnected`) to every
//! client-role connection, held as an explicit subscriber set rather than a
//! scan of the connection table. Subscribers whose connection has gone away
//! are pruned on the next broadcast.
//!
//! Per-device events (screenshots, orientation changes) are not broadcast;
//! the relay delivers those point-to-point to the paired client.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::protocol::message::OutboundMessage;
use crate::registry::connection::ConnectionId;

/// Subscriber set for directory broadcasts
#[derive(Debug, Default)]
pub struct EventFanout {
    subscribers: HashMap<ConnectionId, mpsc::UnboundedSender<OutboundMessage>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client connection to the broadcast set
    ///
    /// Subscribing twice replaces the sender; delivery stays single.
    pub fn subscribe(&mut self, id: ConnectionId, sender: mpsc::UnboundedSender<OutboundMessage>) {
        self.subscribers.insert(id, sender);
    }

    /// Remove a connection from the broadcast set
    pub fn unsubscribe(&mut self, id: ConnectionId) {
        self.subscribers.remove(&id);
    }

    /// Deliver a message to every subscriber, pruning dead ones
    ///
    /// Returns the number of successful deliveries.
    pub fn broadcast(&mut self, msg: &OutboundMessage) -> usize {
        let mut delivered = 0;
        let mut dead: Vec<ConnectionId> = Vec::new();

        for (id, sender) in &self.subscribers {
            if sender.send(msg.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }

        for id in dead {
            tracing::debug!(connection = %id, "Pruning closed broadcast subscriber");
            self.subscribers.remove(&id);
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

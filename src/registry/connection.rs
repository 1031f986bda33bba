//! Connection registry
//!
//! Tracks every live connection and its role, keyed by a server-assigned
//! identity. All per-connection routing state lives here, never on the
//! transport object itself. Sends are fire-and-forget pushes into the
//! connection's outbound channel; the per-connection writer task drains it.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::protocol::message::OutboundMessage;

/// Server-assigned connection identity, stable for the connection's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Role a connection has self-selected into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connected, no message seen yet
    Unregistered,
    /// Sent `registerDevice`
    Device,
    /// Sent any client-side request
    Client,
}

/// Registry entry for one live connection
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub role: Role,
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl ConnectionHandle {
    /// Push a message into the connection's outbound queue
    ///
    /// Returns false if the writer side is gone (connection closing).
    pub fn send(&self, msg: OutboundMessage) -> bool {
        self.sender.send(msg).is_ok()
    }

    /// Clone the outbound sender (for the fan-out subscriber set)
    pub fn sender(&self) -> mpsc::UnboundedSender<OutboundMessage> {
        self.sender.clone()
    }
}

/// All live connections, keyed by identity
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection, assigning its identity
    pub fn register(&mut self, sender: mpsc::UnboundedSender<OutboundMessage>) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.connections.insert(
            id,
            ConnectionHandle {
                id,
                role: Role::Unregistered,
                sender,
            },
        );
        id
    }

    /// Remove a connection; returns its handle if it was live
    pub fn deregister(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.remove(&id)
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<&ConnectionHandle> {
        self.connections.get(&id)
    }

    /// Current role of a connection, if live
    pub fn role(&self, id: ConnectionId) -> Option<Role> {
        self.connections.get(&id).map(|h| h.role)
    }

    /// Set a connection's role
    pub fn set_role(&mut self, id: ConnectionId, role: Role) {
        if let Some(handle) = self.connections.get_mut(&id) {
            handle.role = role;
        }
    }

    /// Fire-and-forget send to a connection
    ///
    /// Returns false if the connection is gone or its writer has shut down.
    pub fn send(&self, id: ConnectionId, msg: OutboundMessage) -> bool {
        self.connections.get(&id).map_or(false, |h| h.send(msg))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::UnboundedSender<OutboundMessage>,
        mpsc::UnboundedReceiver<OutboundMessage>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_register_assigns_unique_ids() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();

        let a = registry.register(tx.clone());
        let b = registry.register(tx);

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.role(a), Some(Role::Unregistered));
    }

    #[test]
    fn test_deregister_removes() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();

        let id = registry.register(tx);
        assert!(registry.deregister(id).is_some());
        assert!(registry.lookup(id).is_none());
        assert!(registry.deregister(id).is_none());
    }

    #[test]
    fn test_send_delivers_to_channel() {
        let mut registry = ConnectionRegistry::new();
        let (tx, mut rx) = channel();

        let id = registry.register(tx);
        assert!(registry.send(id, OutboundMessage::ConnectedToClient));
        assert_eq!(rx.try_recv().unwrap(), OutboundMessage::ConnectedToClient);
    }

    #[test]
    fn test_send_to_closed_receiver_fails() {
        let mut registry = ConnectionRegistry::new();
        let (tx, rx) = channel();
        drop(rx);

        let id = registry.register(tx);
        assert!(!registry.send(id, OutboundMessage::ConnectedToClient));
    }

    #[test]
    fn test_role_transitions() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();

        let id = registry.register(tx);
        registry.set_role(id, Role::Client);
        assert_eq!(registry.role(id), Some(Role::Client));

        registry.set_role(id, Role::Device);
        assert_eq!(registry.role(id), Some(Role::Device));
    }
}

//! Action router
//!
//! Correlates client-issued action requests with device replies. Each
//! forwarded action carries an `ActionToken`; the device echoes the token in
//! its reply and the pending entry resolves exactly once, whether by reply,
//! timeout, or disconnect of either side. Requests from one client are
//! independently correlated; nothing here serializes them.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::registry::connection::ConnectionId;
use crate::registry::device::DeviceId;

/// Per-call correlation token, unique for the server's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionToken(pub u64);

impl std::fmt::Display for ActionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// One in-flight action awaiting a device reply
#[derive(Debug)]
pub struct PendingAction {
    /// Client that issued the action
    pub client: ConnectionId,
    /// Client's own request id, echoed back in the reply
    pub request_id: u64,
    /// Device the action was forwarded to
    pub device_id: DeviceId,
    /// When the action was forwarded
    pub issued_at: Instant,
}

/// Correlation table for in-flight actions
#[derive(Debug, Default)]
pub struct ActionRouter {
    next_token: u64,
    pending: HashMap<ActionToken, PendingAction>,
}

impl ActionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-flight action and assign its token
    pub fn begin(
        &mut self,
        client: ConnectionId,
        request_id: u64,
        device_id: DeviceId,
    ) -> ActionToken {
        self.next_token += 1;
        let token = ActionToken(self.next_token);
        self.pending.insert(
            token,
            PendingAction {
                client,
                request_id,
                device_id,
                issued_at: Instant::now(),
            },
        );
        token
    }

    /// Resolve a pending action; each token resolves at most once
    pub fn complete(&mut self, token: ActionToken) -> Option<PendingAction> {
        self.pending.remove(&token)
    }

    /// Drop all pending actions issued by a disconnected client
    ///
    /// Their eventual device replies become lost callbacks, not errors.
    pub fn abort_for_client(&mut self, client: ConnectionId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.client != client);
        before - self.pending.len()
    }

    /// Drain pending actions targeting a disconnected device
    ///
    /// Returns the drained entries so each issuing client can be told the
    /// transport closed.
    pub fn abort_for_device(&mut self, device_id: &DeviceId) -> Vec<PendingAction> {
        let tokens: Vec<ActionToken> = self
            .pending
            .iter()
            .filter(|(_, p)| &p.device_id == device_id)
            .map(|(t, _)| *t)
            .collect();
        tokens
            .into_iter()
            .filter_map(|t| self.pending.remove(&t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let mut router = ActionRouter::new();
        let a = router.begin(ConnectionId(1), 1, DeviceId::from("d1"));
        let b = router.begin(ConnectionId(1), 2, DeviceId::from("d1"));
        assert_ne!(a, b);
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_complete_resolves_once() {
        let mut router = ActionRouter::new();
        let token = router.begin(ConnectionId(1), 7, DeviceId::from("d1"));

        let pending = router.complete(token).unwrap();
        assert_eq!(pending.client, ConnectionId(1));
        assert_eq!(pending.request_id, 7);

        // Second resolution (late reply after timeout) yields nothing
        assert!(router.complete(token).is_none());
    }

    #[test]
    fn test_abort_for_client() {
        let mut router = ActionRouter::new();
        router.begin(ConnectionId(1), 1, DeviceId::from("d1"));
        router.begin(ConnectionId(1), 2, DeviceId::from("d1"));
        let other = router.begin(ConnectionId(2), 1, DeviceId::from("d1"));

        assert_eq!(router.abort_for_client(ConnectionId(1)), 2);
        assert_eq!(router.len(), 1);
        assert!(router.complete(other).is_some());
    }

    #[test]
    fn test_abort_for_device() {
        let mut router = ActionRouter::new();
        router.begin(ConnectionId(1), 1, DeviceId::from("d1"));
        router.begin(ConnectionId(2), 5, DeviceId::from("d1"));
        router.begin(ConnectionId(3), 9, DeviceId::from("d2"));

        let drained = router.abort_for_device(&DeviceId::from("d1"));
        assert_eq!(drained.len(), 2);
        assert_eq!(router.len(), 1);

        let clients: Vec<u64> = drained.iter().map(|p| p.client.0).collect();
        assert!(clients.contains(&1) && clients.contains(&2));
    }
}

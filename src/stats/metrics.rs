//! Process-wide relay counters
//!
//! Cheap atomic counters updated on the hot paths, snapshotable for
//! periodic logging or an operator endpoint. Never consulted for routing
//! decisions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters for one relay process
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Connections accepted since start
    pub connections_opened: AtomicU64,
    /// Currently live connections
    pub connections_active: AtomicU64,
    /// Device registrations (including reconnects)
    pub devices_registered: AtomicU64,
    /// Successful claims
    pub pairings_created: AtomicU64,
    /// Actions forwarded to a device
    pub actions_routed: AtomicU64,
    /// Actions that expired without a device reply
    pub actions_timed_out: AtomicU64,
    /// Device events delivered to a paired client
    pub events_delivered: AtomicU64,
    /// Device events dropped for lack of a paired client
    pub events_dropped: AtomicU64,
    /// Individual broadcast deliveries
    pub broadcast_deliveries: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn device_registered(&self) {
        self.devices_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pairing_created(&self) {
        self.pairings_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_routed(&self) {
        self.actions_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_timed_out(&self) {
        self.actions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_delivered(&self, receivers: usize) {
        self.broadcast_deliveries
            .fetch_add(receivers as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            devices_registered: self.devices_registered.load(Ordering::Relaxed),
            pairings_created: self.pairings_created.load(Ordering::Relaxed),
            actions_routed: self.actions_routed.load(Ordering::Relaxed),
            actions_timed_out: self.actions_timed_out.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            broadcast_deliveries: self.broadcast_deliveries.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of the counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_active: u64,
    pub devices_registered: u64,
    pub pairings_created: u64,
    pub actions_routed: u64,
    pub actions_timed_out: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub broadcast_deliveries: u64,
}

//! The relay facade
//!
//! `Relay` owns the five relay components behind a single lock and
//! implements every message handler plus the disconnect cascades:
//!
//! ```text
//!                          Arc<Relay>
//!              ┌────────────────────────────────┐
//!              │ Mutex<RelayState> {            │
//!              │   connections: ConnectionReg.  │
//!              │   devices:     DeviceDirectory │
//!              │   pairings:    PairingManager  │
//!              │   router:      ActionRouter    │
//!              │   fanout:      EventFanout     │
//!              │ }                              │
//!              └───────────────┬────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        ▼                     ▼                     ▼
//!   [Device conn]        [Client conn]         [Client conn]
//!   registerDevice       connectToDevice       getConnectedDevices
//!   screenShot ──────────► paired client       ◄── broadcasts
//! ```
//!
//! Every mutation runs as one atomic handler under the lock; no handler
//! awaits I/O while holding it. Outbound delivery is a push into the target
//! connection's unbounded channel, drained by that connection's writer task.
//! A reply arriving for a vanished client is dropped silently, never an
//! error.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::RelayError;
use crate::protocol::message::{
    DeviceEventKind, DeviceMeta, InboundMessage, OutboundMessage,
};
use crate::registry::config::RegistryConfig;
use crate::registry::connection::{ConnectionId, ConnectionRegistry, Role};
use crate::registry::device::{DeviceDirectory, DeviceId, DeviceRecord};
use crate::registry::fanout::EventFanout;
use crate::registry::pairing::PairingManager;
use crate::registry::router::{ActionRouter, ActionToken};
use crate::stats::metrics::RelayMetrics;

/// All mutable relay state, guarded by one lock
#[derive(Debug, Default)]
struct RelayState {
    connections: ConnectionRegistry,
    devices: DeviceDirectory,
    pairings: PairingManager,
    router: ActionRouter,
    fanout: EventFanout,
}

/// The multiplexing relay core
///
/// Explicitly constructed, one per server process; tests build their own and
/// tear it down by dropping it.
pub struct Relay {
    state: Mutex<RelayState>,
    config: RegistryConfig,
    metrics: Arc<RelayMetrics>,
}

impl Relay {
    /// Create a relay with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a relay with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: Mutex::new(RelayState::default()),
            config,
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    /// Relay configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Process-wide counters
    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Register a new connection and assign its identity
    ///
    /// `sender` is the connection's outbound queue; the caller's writer task
    /// drains it onto the wire.
    pub async fn connect(&self, sender: mpsc::UnboundedSender<OutboundMessage>) -> ConnectionId {
        let mut state = self.state.lock().await;
        let id = state.connections.register(sender);
        self.metrics.connection_opened();
        tracing::debug!(connection = %id, "Connection registered");
        id
    }

    /// Tear down a connection and cascade into directory and pairings
    ///
    /// Disconnection is an authoritative terminal signal; there is no
    /// resurrection and no retry.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;

        let Some(handle) = state.connections.deregister(id) else {
            return;
        };
        state.fanout.unsubscribe(id);
        self.metrics.connection_closed();

        match handle.role {
            Role::Device => self.on_device_connection_lost(&mut state, id),
            Role::Client => self.on_client_connection_lost(&mut state, id),
            Role::Unregistered => {}
        }

        tracing::info!(connection = %id, role = ?handle.role, "Connection closed");
    }

    /// Dispatch one inbound message from a connection
    ///
    /// Handlers are isolated per connection: routing failures become
    /// structured replies to that connection, never process faults.
    pub async fn handle_message(self: &Arc<Self>, conn: ConnectionId, msg: InboundMessage) {
        let mut state = self.state.lock().await;

        match msg {
            InboundMessage::RegisterDevice { metadata } => {
                self.on_register_device(&mut state, conn, metadata);
            }
            InboundMessage::GetConnectedDevices { request_id } => {
                self.on_get_devices(&mut state, conn, request_id);
            }
            InboundMessage::ConnectToDevice {
                request_id,
                device_id,
            } => {
                self.on_connect_to_device(&mut state, conn, request_id, &device_id);
            }
            InboundMessage::DisconnectFromDevice => {
                self.on_disconnect_from_device(&mut state, conn);
            }
            InboundMessage::PerformAction {
                request_id,
                path,
                data,
            } => {
                self.on_perform_action(&mut state, conn, request_id, path, data);
            }
            InboundMessage::ActionReply { token, data } => {
                self.on_action_reply(&mut state, conn, token, data);
            }
            InboundMessage::ScreenShot { data } => {
                self.on_device_event(&mut state, conn, DeviceEventKind::ScreenShot, data);
            }
            InboundMessage::OrientationChange { data } => {
                self.on_device_event(&mut state, conn, DeviceEventKind::OrientationChange, data);
            }
            InboundMessage::RawFrame { data } => {
                self.on_device_event(&mut state, conn, DeviceEventKind::RawFrame, data);
            }
        }
    }

    /// Expire a pending action that got no device reply in time
    ///
    /// Called from the timer task spawned at forward time. A no-op if the
    /// action already resolved.
    pub async fn expire_action(&self, token: ActionToken) {
        let mut state = self.state.lock().await;

        if let Some(pending) = state.router.complete(token) {
            self.metrics.action_timed_out();
            tracing::warn!(
                token = %token,
                client = %pending.client,
                device = %pending.device_id,
                "Action timed out waiting for device reply"
            );
            state.connections.send(
                pending.client,
                OutboundMessage::ActionError {
                    request_id: pending.request_id,
                    error: RelayError::Timeout.code().to_string(),
                },
            );
        }
    }

    // ── message handlers (all run under the state lock) ──────────────────

    fn on_register_device(&self, state: &mut RelayState, conn: ConnectionId, meta: DeviceMeta) {
        let device_id = meta.device_id.clone();

        // A Client-role connection switching sides gives up its client
        // state first: pairing released, in-flight actions dropped,
        // broadcast subscription removed.
        if state.connections.role(conn) == Some(Role::Client) {
            state.fanout.unsubscribe(conn);
            let aborted = state.router.abort_for_client(conn);
            if aborted > 0 {
                tracing::debug!(connection = %conn, aborted = aborted, "Dropped in-flight actions");
            }

            let RelayState {
                devices, pairings, ..
            } = state;
            if let Some(released) = pairings.release(devices, conn) {
                tracing::info!(connection = %conn, device = %released, "Pairing released by role switch");
                self.notify_device_released(state, &released);
            }
        }

        // A device re-registering under a new id retires its old record;
        // one connection backs at most one record.
        if let Some(prior_id) = state.devices.id_for_connection(conn).cloned() {
            if prior_id != device_id {
                state.devices.remove(&prior_id);
                tracing::info!(
                    connection = %conn,
                    old_device = %prior_id,
                    new_device = %device_id,
                    "Device re-registered under a new id, retiring old record"
                );
                self.retire_device(state, prior_id);
            }
        }

        let record = DeviceRecord::new(meta, conn);
        let snapshot = record.snapshot();

        // Colliding id: the new registration wins, the displaced record's
        // connection is demoted and its pairing torn down with exactly one
        // disconnect notice to the affected client.
        if let Some(displaced) = state.devices.insert(record) {
            tracing::info!(
                device = %device_id,
                old_connection = %displaced.connection,
                new_connection = %conn,
                "Device re-registered, replacing prior record"
            );

            if displaced.connection != conn {
                state
                    .connections
                    .set_role(displaced.connection, Role::Unregistered);
            }

            for pending in state.router.abort_for_device(&device_id) {
                state.connections.send(
                    pending.client,
                    OutboundMessage::ActionError {
                        request_id: pending.request_id,
                        error: RelayError::TransportClosed.code().to_string(),
                    },
                );
            }

            if let Some(client) = state.pairings.on_device_removed(&device_id) {
                state.connections.send(
                    client,
                    OutboundMessage::DeviceDisconnected {
                        device_id: device_id.clone(),
                    },
                );
            }
        } else {
            tracing::info!(device = %device_id, connection = %conn, "Device registered");
        }

        state.connections.set_role(conn, Role::Device);
        self.metrics.device_registered();

        let delivered = state
            .fanout
            .broadcast(&OutboundMessage::NewDeviceConnected { device: snapshot });
        self.metrics.broadcast_delivered(delivered);
    }

    fn on_get_devices(&self, state: &mut RelayState, conn: ConnectionId, request_id: u64) {
        if !self.ensure_client(state, conn) {
            return;
        }

        let devices = state.devices.snapshot();
        state
            .connections
            .send(conn, OutboundMessage::DeviceList { request_id, devices });
    }

    fn on_connect_to_device(
        &self,
        state: &mut RelayState,
        conn: ConnectionId,
        request_id: u64,
        device_id: &DeviceId,
    ) {
        if !self.ensure_client(state, conn) {
            return;
        }

        let RelayState {
            devices, pairings, ..
        } = state;

        match pairings.claim(devices, conn, device_id) {
            Ok(outcome) => {
                // Switching devices: the previous device goes back to the
                // pool and learns its client left.
                if let Some(released) = outcome.released {
                    self.notify_device_released(state, &released);
                }

                if let Some(record) = state.devices.get(device_id) {
                    let snapshot = record.snapshot();
                    state
                        .connections
                        .send(record.connection, OutboundMessage::ConnectedToClient);
                    state.connections.send(
                        conn,
                        OutboundMessage::ConnectResult {
                            request_id,
                            success: true,
                            device: Some(snapshot.clone()),
                            error: None,
                        },
                    );
                    let delivered = state
                        .fanout
                        .broadcast(&OutboundMessage::DeviceBlocked { device: snapshot });
                    self.metrics.broadcast_delivered(delivered);
                }

                self.metrics.pairing_created();
                tracing::info!(client = %conn, device = %device_id, "Pairing created");
            }
            Err(err) => {
                tracing::debug!(client = %conn, device = %device_id, error = %err, "Claim rejected");
                state.connections.send(
                    conn,
                    OutboundMessage::ConnectResult {
                        request_id,
                        success: false,
                        device: None,
                        error: Some(err.code().to_string()),
                    },
                );
            }
        }
    }

    fn on_disconnect_from_device(&self, state: &mut RelayState, conn: ConnectionId) {
        if !self.ensure_client(state, conn) {
            return;
        }

        let RelayState {
            devices, pairings, ..
        } = state;

        // No-op when unbound
        if let Some(device_id) = pairings.release(devices, conn) {
            tracing::info!(client = %conn, device = %device_id, "Pairing released");
            self.notify_device_released(state, &device_id);
        }
    }

    fn on_perform_action(
        self: &Arc<Self>,
        state: &mut RelayState,
        conn: ConnectionId,
        request_id: u64,
        path: String,
        data: Value,
    ) {
        if !self.ensure_client(state, conn) {
            return;
        }

        let Some(device_id) = state.pairings.device_for(conn).cloned() else {
            state.connections.send(
                conn,
                OutboundMessage::ActionError {
                    request_id,
                    error: RelayError::NotPaired.code().to_string(),
                },
            );
            return;
        };

        let Some(device_conn) = state.devices.get(&device_id).map(|r| r.connection) else {
            // Pairing without a directory record means the device vanished
            // between handlers; report it like a dropped transport.
            state.connections.send(
                conn,
                OutboundMessage::ActionError {
                    request_id,
                    error: RelayError::TransportClosed.code().to_string(),
                },
            );
            return;
        };

        let token = state.router.begin(conn, request_id, device_id.clone());
        let sent = state.connections.send(
            device_conn,
            OutboundMessage::PerformAction { token, path, data },
        );

        if !sent {
            state.router.complete(token);
            state.connections.send(
                conn,
                OutboundMessage::ActionError {
                    request_id,
                    error: RelayError::TransportClosed.code().to_string(),
                },
            );
            return;
        }

        self.metrics.action_routed();
        tracing::debug!(
            token = %token,
            client = %conn,
            device = %device_id,
            "Action forwarded"
        );

        // Bounded wait for the device reply; the timer resolves the entry
        // with a timeout error if nothing came back first. Spawning here is
        // lock-safe: the task itself takes the lock only when it fires.
        self.spawn_action_timer(token);
    }

    fn spawn_action_timer(self: &Arc<Self>, token: ActionToken) {
        let relay = Arc::clone(self);
        let timeout = self.config.action_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            relay.expire_action(token).await;
        });
    }

    fn on_action_reply(
        &self,
        state: &mut RelayState,
        conn: ConnectionId,
        token: ActionToken,
        data: Value,
    ) {
        if state.connections.role(conn) != Some(Role::Device) {
            tracing::warn!(connection = %conn, token = %token, "Action reply from non-device connection");
            return;
        }

        let Some(pending) = state.router.complete(token) else {
            // Timed out or the client vanished: a lost callback, not an error
            tracing::debug!(token = %token, "Discarding unmatched action reply");
            return;
        };

        // Replies must come from the connection currently backing the device
        if state.devices.id_for_connection(conn) != Some(&pending.device_id) {
            tracing::warn!(
                connection = %conn,
                token = %token,
                device = %pending.device_id,
                "Discarding action reply from stale device connection"
            );
            return;
        }

        let delivered = state.connections.send(
            pending.client,
            OutboundMessage::ActionResult {
                request_id: pending.request_id,
                data,
            },
        );
        if !delivered {
            tracing::debug!(token = %token, client = %pending.client, "Client gone, reply discarded");
        }
    }

    fn on_device_event(
        &self,
        state: &mut RelayState,
        conn: ConnectionId,
        kind: DeviceEventKind,
        data: Value,
    ) {
        if state.connections.role(conn) != Some(Role::Device) {
            return;
        }

        let Some(device_id) = state.devices.id_for_connection(conn).cloned() else {
            return;
        };

        // No paired client: drop, no buffering
        let Some(client) = state.pairings.client_for(&device_id) else {
            self.metrics.event_dropped();
            return;
        };

        if state
            .connections
            .send(client, OutboundMessage::device_event(kind, data))
        {
            self.metrics.event_delivered();
        } else {
            self.metrics.event_dropped();
        }
    }

    // ── cascades and shared notification paths ───────────────────────────

    fn on_device_connection_lost(&self, state: &mut RelayState, conn: ConnectionId) {
        let Some(removed) = state.devices.remove_by_connection(conn) else {
            return;
        };
        let device_id = removed.meta.device_id;
        tracing::info!(device = %device_id, "Device disconnected");
        self.retire_device(state, device_id);
    }

    /// Cascade for a device whose record left the directory: fail in-flight
    /// actions, tear down the pairing, tell every client
    ///
    /// The bound client is a broadcast subscriber, so the single broadcast
    /// here is its one disconnect notification.
    fn retire_device(&self, state: &mut RelayState, device_id: DeviceId) {
        for pending in state.router.abort_for_device(&device_id) {
            state.connections.send(
                pending.client,
                OutboundMessage::ActionError {
                    request_id: pending.request_id,
                    error: RelayError::TransportClosed.code().to_string(),
                },
            );
        }

        state.pairings.on_device_removed(&device_id);

        let delivered = state
            .fanout
            .broadcast(&OutboundMessage::DeviceDisconnected { device_id });
        self.metrics.broadcast_delivered(delivered);
    }

    fn on_client_connection_lost(&self, state: &mut RelayState, conn: ConnectionId) {
        // In-flight replies for this client become lost callbacks
        let aborted = state.router.abort_for_client(conn);
        if aborted > 0 {
            tracing::debug!(client = %conn, aborted = aborted, "Dropped in-flight actions");
        }

        let RelayState {
            devices, pairings, ..
        } = state;

        if let Some(device_id) = pairings.release(devices, conn) {
            tracing::info!(client = %conn, device = %device_id, "Pairing released by client disconnect");
            self.notify_device_released(state, &device_id);
        }
    }

    /// Tell a freed device its client is gone and advertise availability
    fn notify_device_released(&self, state: &mut RelayState, device_id: &DeviceId) {
        if let Some(record) = state.devices.get(device_id) {
            let snapshot = record.snapshot();
            state
                .connections
                .send(record.connection, OutboundMessage::DisconnectedFromClient);
            let delivered = state
                .fanout
                .broadcast(&OutboundMessage::DeviceUnblocked { device: snapshot });
            self.metrics.broadcast_delivered(delivered);
        }
    }

    /// Promote a fresh connection to the Client role on its first request
    ///
    /// Device connections do not get to issue client requests.
    fn ensure_client(&self, state: &mut RelayState, conn: ConnectionId) -> bool {
        match state.connections.role(conn) {
            Some(Role::Client) => true,
            Some(Role::Unregistered) => {
                state.connections.set_role(conn, Role::Client);
                if let Some(handle) = state.connections.lookup(conn) {
                    let sender = handle.sender();
                    state.fanout.subscribe(conn, sender);
                }
                tracing::debug!(connection = %conn, "Connection promoted to client");
                true
            }
            Some(Role::Device) => {
                tracing::warn!(connection = %conn, "Client request from device connection ignored");
                false
            }
            None => false,
        }
    }

    // ── introspection (tests, operator surfaces) ─────────────────────────

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Number of registered devices
    pub async fn device_count(&self) -> usize {
        self.state.lock().await.devices.len()
    }

    /// Number of active pairings
    pub async fn pairing_count(&self) -> usize {
        self.state.lock().await.pairings.len()
    }

    /// Number of in-flight actions
    pub async fn pending_action_count(&self) -> usize {
        self.state.lock().await.router.len()
    }

    /// Block state of a device, if registered
    pub async fn is_blocked(&self, device_id: &DeviceId) -> Option<bool> {
        self.state
            .lock()
            .await
            .devices
            .get(device_id)
            .map(|r| r.is_blocked)
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

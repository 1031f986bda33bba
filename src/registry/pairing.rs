//! Pairing manager
//!
//! Owns the 1:1 binding between a client connection and the device it
//! drives. A device can be held by at most one client; a client holds at
//! most one device. Block state flips only through here.
//!
//! Device side: Available -> Claimed -> Available (release or disconnect).
//! Client side: Unbound -> Bound -> Unbound. Terminal state for either side
//! is removal from the registry; a reconnect gets a fresh identity.

use std::collections::HashMap;

use crate::error::RelayError;
use crate::protocol::message::DeviceMeta;
use crate::registry::connection::ConnectionId;
use crate::registry::device::{DeviceDirectory, DeviceId};

/// Result of a successful claim
#[derive(Debug)]
pub struct ClaimOutcome {
    /// Metadata of the claimed device
    pub meta: DeviceMeta,
    /// Device the client previously held, auto-released by this claim
    pub released: Option<DeviceId>,
}

/// The 1:1 client<->device bindings
#[derive(Debug, Default)]
pub struct PairingManager {
    by_client: HashMap<ConnectionId, DeviceId>,
    by_device: HashMap<DeviceId, ConnectionId>,
}

impl PairingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a client to a device
    ///
    /// Fails with `DeviceNotFound` or `DeviceAlreadyBlocked`. A client
    /// already holding a different device auto-releases it first; the
    /// outcome reports the released id so the caller can notify that device.
    pub fn claim(
        &mut self,
        directory: &mut DeviceDirectory,
        client: ConnectionId,
        device_id: &DeviceId,
    ) -> Result<ClaimOutcome, RelayError> {
        let record = directory
            .get(device_id)
            .ok_or_else(|| RelayError::DeviceNotFound(device_id.clone()))?;

        if record.is_blocked {
            return Err(RelayError::DeviceAlreadyBlocked(device_id.clone()));
        }

        let meta = record.meta.clone();

        // Exclusive binding: switching devices releases the old one
        let released = self.release(directory, client);

        directory.set_blocked(device_id, true)?;
        self.by_client.insert(client, device_id.clone());
        self.by_device.insert(device_id.clone(), client);

        Ok(ClaimOutcome { meta, released })
    }

    /// Release a client's binding, if any; returns the freed device
    ///
    /// No-op when the client is unbound. The device returns to Available
    /// even if it has already left the directory.
    pub fn release(
        &mut self,
        directory: &mut DeviceDirectory,
        client: ConnectionId,
    ) -> Option<DeviceId> {
        let device_id = self.by_client.remove(&client)?;
        self.by_device.remove(&device_id);
        // Record may already be gone (device dropped first)
        let _ = directory.set_blocked(&device_id, false);
        Some(device_id)
    }

    /// Tear down the pairing for a device that left the directory
    ///
    /// Idempotent; returns the formerly bound client so the caller can
    /// notify it.
    pub fn on_device_removed(&mut self, device_id: &DeviceId) -> Option<ConnectionId> {
        let client = self.by_device.remove(device_id)?;
        self.by_client.remove(&client);
        Some(client)
    }

    /// Device a client currently holds
    pub fn device_for(&self, client: ConnectionId) -> Option<&DeviceId> {
        self.by_client.get(&client)
    }

    /// Client currently holding a device
    pub fn client_for(&self, device_id: &DeviceId) -> Option<ConnectionId> {
        self.by_device.get(device_id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_client.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_client.is_empty()
    }
}

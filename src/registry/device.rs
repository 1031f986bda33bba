//! Device directory
//!
//! Maps a device's self-declared identifier to its current connection and
//! cached metadata. At most one live record exists per id; a registration
//! with a colliding id replaces the prior record (treated as a reconnect)
//! and the caller tears down any pairing on the displaced record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::protocol::message::{DeviceMeta, DeviceSnapshot};
use crate::registry::connection::ConnectionId;

/// Device-supplied identifier, unique among live devices
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        DeviceId(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        DeviceId(s)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One registered device
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    /// Cached device metadata from registration
    pub meta: DeviceMeta,
    /// Connection currently backing this device (weak back-reference;
    /// the registry owns the connection, not this record)
    pub connection: ConnectionId,
    /// Whether a client currently holds this device
    pub is_blocked: bool,
}

impl DeviceRecord {
    pub fn new(meta: DeviceMeta, connection: ConnectionId) -> Self {
        Self {
            meta,
            connection,
            is_blocked: false,
        }
    }

    /// Directory entry as clients see it
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            device_meta: self.meta.clone(),
            is_blocked: self.is_blocked,
        }
    }
}

/// Directory of live devices, in stable registration order
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: HashMap<DeviceId, DeviceRecord>,
    /// Registration order for stable UI listings; a reconnecting device
    /// keeps its original slot
    order: Vec<DeviceId>,
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device record
    ///
    /// A colliding id is a reconnect: the new record takes over and the
    /// displaced record is returned so the caller can invalidate its
    /// connection and tear down any pairing.
    pub fn insert(&mut self, record: DeviceRecord) -> Option<DeviceRecord> {
        let id = record.meta.device_id.clone();
        let displaced = self.devices.insert(id.clone(), record);
        if displaced.is_none() {
            self.order.push(id);
        }
        displaced
    }

    /// Remove a device by id
    pub fn remove(&mut self, id: &DeviceId) -> Option<DeviceRecord> {
        let removed = self.devices.remove(id);
        if removed.is_some() {
            self.order.retain(|d| d != id);
        }
        removed
    }

    /// Remove the device backed by a given connection, if any
    pub fn remove_by_connection(&mut self, connection: ConnectionId) -> Option<DeviceRecord> {
        let id = self
            .devices
            .iter()
            .find(|(_, rec)| rec.connection == connection)
            .map(|(id, _)| id.clone())?;
        self.remove(&id)
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    /// Id of the device backed by a given connection, if any
    pub fn id_for_connection(&self, connection: ConnectionId) -> Option<&DeviceId> {
        self.devices
            .iter()
            .find(|(_, rec)| rec.connection == connection)
            .map(|(id, _)| id)
    }

    /// Flip a device's availability
    ///
    /// This is the only path that mutates `is_blocked`; the pairing manager
    /// calls it exactly once on claim and once on release.
    pub fn set_blocked(&mut self, id: &DeviceId, blocked: bool) -> Result<(), RelayError> {
        let record = self
            .devices
            .get_mut(id)
            .ok_or_else(|| RelayError::DeviceNotFound(id.clone()))?;
        record.is_blocked = blocked;
        Ok(())
    }

    /// Directory snapshot in registration order
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.devices.get(id))
            .map(DeviceRecord::snapshot)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn meta(id: &str) -> DeviceMeta {
        DeviceMeta {
            device_id: DeviceId::from(id),
            device_model: "Pixel 4".into(),
            os_version: "13".into(),
            screen: Value::Null,
        }
    }

    #[test]
    fn test_insert_and_snapshot_order() {
        let mut dir = DeviceDirectory::new();
        dir.insert(DeviceRecord::new(meta("b"), ConnectionId(1)));
        dir.insert(DeviceRecord::new(meta("a"), ConnectionId(2)));
        dir.insert(DeviceRecord::new(meta("c"), ConnectionId(3)));

        let ids: Vec<String> = dir
            .snapshot()
            .iter()
            .map(|s| s.device_meta.device_id.0.clone())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_collision_replaces_and_keeps_slot() {
        let mut dir = DeviceDirectory::new();
        dir.insert(DeviceRecord::new(meta("a"), ConnectionId(1)));
        dir.insert(DeviceRecord::new(meta("b"), ConnectionId(2)));

        // "a" reconnects on a new connection
        let displaced = dir.insert(DeviceRecord::new(meta("a"), ConnectionId(9)));
        assert_eq!(displaced.unwrap().connection, ConnectionId(1));

        assert_eq!(dir.len(), 2);
        assert_eq!(dir.get(&DeviceId::from("a")).unwrap().connection, ConnectionId(9));

        // Still listed first
        let ids: Vec<String> = dir
            .snapshot()
            .iter()
            .map(|s| s.device_meta.device_id.0.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_remove_by_connection() {
        let mut dir = DeviceDirectory::new();
        dir.insert(DeviceRecord::new(meta("a"), ConnectionId(1)));
        dir.insert(DeviceRecord::new(meta("b"), ConnectionId(2)));

        let removed = dir.remove_by_connection(ConnectionId(1)).unwrap();
        assert_eq!(removed.meta.device_id, DeviceId::from("a"));
        assert_eq!(dir.len(), 1);
        assert!(dir.remove_by_connection(ConnectionId(1)).is_none());
    }

    #[test]
    fn test_set_blocked() {
        let mut dir = DeviceDirectory::new();
        dir.insert(DeviceRecord::new(meta("a"), ConnectionId(1)));

        dir.set_blocked(&DeviceId::from("a"), true).unwrap();
        assert!(dir.get(&DeviceId::from("a")).unwrap().is_blocked);

        dir.set_blocked(&DeviceId::from("a"), false).unwrap();
        assert!(!dir.get(&DeviceId::from("a")).unwrap().is_blocked);

        let err = dir.set_blocked(&DeviceId::from("nope"), true).unwrap_err();
        assert!(matches!(err, RelayError::DeviceNotFound(_)));
    }
}

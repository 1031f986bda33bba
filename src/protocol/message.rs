//! Wire message vocabulary
//!
//! Every frame on the wire is a JSON object tagged with an `"event"` field;
//! the tag values are the wire-level event identifiers the inspector UI and
//! device agents speak (`registerDevice`, `connectToDevice`, `screenShot`,
//! ...). Payloads the relay does not interpret stay as `serde_json::Value`
//! and are forwarded verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::device::DeviceId;
use crate::registry::router::ActionToken;

/// Device-declared metadata, cached in the directory and shown in device lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMeta {
    /// Device-supplied identifier (serial, udid, emulator name)
    pub device_id: DeviceId,
    /// Human-readable model name
    pub device_model: String,
    /// OS version string
    pub os_version: String,
    /// Opaque screen geometry blob (width/height/scale), not interpreted here
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub screen: Value,
}

/// Directory entry as seen by clients: metadata plus availability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub device_meta: DeviceMeta,
    pub is_blocked: bool,
}

/// Kind of unsolicited device event fanned out to the paired client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEventKind {
    ScreenShot,
    OrientationChange,
    RawFrame,
}

impl DeviceEventKind {
    /// Wire event identifier for this kind
    pub fn as_event(&self) -> &'static str {
        match self {
            DeviceEventKind::ScreenShot => "screenShot",
            DeviceEventKind::OrientationChange => "orientationChange",
            DeviceEventKind::RawFrame => "rawFrame",
        }
    }
}

/// Messages received by the relay (from devices and clients)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum InboundMessage {
    /// Device announces availability; the connection becomes a Device
    RegisterDevice { metadata: DeviceMeta },

    /// Client requests a directory snapshot
    #[serde(rename_all = "camelCase")]
    GetConnectedDevices { request_id: u64 },

    /// Client claims a device
    #[serde(rename_all = "camelCase")]
    ConnectToDevice { request_id: u64, device_id: DeviceId },

    /// Client releases its pairing
    DisconnectFromDevice,

    /// Client-issued action, forwarded to the bound device
    #[serde(rename_all = "camelCase")]
    PerformAction {
        request_id: u64,
        path: String,
        data: Value,
    },

    /// Device's correlated reply to a forwarded action
    ActionReply { token: ActionToken, data: Value },

    /// Screenshot frame from a device
    ScreenShot { data: Value },

    /// Orientation change from a device
    OrientationChange { data: Value },

    /// Raw (unencoded) frame from a device
    RawFrame { data: Value },
}

/// Messages sent by the relay (to devices and clients)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Broadcast: a device registered
    NewDeviceConnected { device: DeviceSnapshot },

    /// Broadcast: a device was claimed
    DeviceBlocked { device: DeviceSnapshot },

    /// Broadcast: a device was released
    DeviceUnblocked { device: DeviceSnapshot },

    /// A device dropped; broadcast to clients, and sent point-to-point to a
    /// client whose paired device vanished
    #[serde(rename_all = "camelCase")]
    DeviceDisconnected { device_id: DeviceId },

    /// Directory snapshot, registration order
    #[serde(rename_all = "camelCase")]
    DeviceList {
        request_id: u64,
        devices: Vec<DeviceSnapshot>,
    },

    /// Reply to `connectToDevice`
    #[serde(rename_all = "camelCase")]
    ConnectResult {
        request_id: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device: Option<DeviceSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// To a device: a client claimed it
    ConnectedToClient,

    /// To a device: its client released it or disconnected
    DisconnectedFromClient,

    /// Forwarded action, tagged with the relay's correlation token
    PerformAction {
        token: ActionToken,
        path: String,
        data: Value,
    },

    /// Successful action reply, relayed back verbatim
    #[serde(rename_all = "camelCase")]
    ActionResult { request_id: u64, data: Value },

    /// Failed action (no pairing, timeout, device dropped)
    #[serde(rename_all = "camelCase")]
    ActionError { request_id: u64, error: String },

    /// Screenshot frame fanned out to the paired client
    ScreenShot { data: Value },

    /// Orientation change fanned out to the paired client
    OrientationChange { data: Value },

    /// Raw frame fanned out to the paired client
    RawFrame { data: Value },
}

impl OutboundMessage {
    /// Build the outbound counterpart of an unsolicited device event
    pub fn device_event(kind: DeviceEventKind, data: Value) -> Self {
        match kind {
            DeviceEventKind::ScreenShot => OutboundMessage::ScreenShot { data },
            DeviceEventKind::OrientationChange => OutboundMessage::OrientationChange { data },
            DeviceEventKind::RawFrame => OutboundMessage::RawFrame { data },
        }
    }
}

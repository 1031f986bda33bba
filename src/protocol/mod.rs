//! Wire protocol: message vocabulary and framing
//!
//! The relay speaks length-prefixed JSON frames over a persistent TCP
//! connection. `message` defines the event vocabulary exchanged with devices
//! and inspector clients; `framing` turns a byte stream into those messages.

pub mod framing;
pub mod message;

pub use framing::{CodecError, MessageCodec, DEFAULT_MAX_FRAME_LEN};
pub use message::{
    DeviceEventKind, DeviceMeta, DeviceSnapshot, InboundMessage, OutboundMessage,
};

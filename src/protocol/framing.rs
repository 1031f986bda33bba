//! Length-prefixed JSON framing
//!
//! Wire format: `[4-byte big-endian length][JSON payload]`. Frames above the
//! configured maximum are rejected before allocation; screenshots dominate
//! traffic, so the default cap is generous.
//!
//! The codec is generic over the decode/encode message types so the server
//! (`InboundMessage` in, `OutboundMessage` out) and test clients (the
//! reverse) share one implementation.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

/// Default maximum frame size (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Framing/decoding failure
#[derive(Debug)]
pub enum CodecError {
    /// Socket-level I/O failure
    Io(std::io::Error),
    /// Payload was not valid JSON for the expected message type
    Json(serde_json::Error),
    /// Peer announced a frame larger than the configured maximum
    FrameTooLarge { len: usize, max: usize },
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Io(e) => write!(f, "I/O error: {}", e),
            CodecError::Json(e) => write!(f, "Invalid message: {}", e),
            CodecError::FrameTooLarge { len, max } => {
                write!(f, "Frame too large: {} bytes (max {})", len, max)
            }
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Io(e) => Some(e),
            CodecError::Json(e) => Some(e),
            CodecError::FrameTooLarge { .. } => None,
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        CodecError::Io(e)
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json(e)
    }
}

/// Length-prefixed JSON codec, generic over message direction
pub struct MessageCodec<In, Out> {
    max_frame_len: usize,
    _marker: PhantomData<(In, Out)>,
}

impl<In, Out> MessageCodec<In, Out> {
    /// Create a codec with the default frame size limit
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a codec with a custom frame size limit
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for MessageCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In: DeserializeOwned, Out> Decoder for MessageCodec<In, Out> {
    type Item = In;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<In>, CodecError> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&src[..LEN_PREFIX]);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        if src.len() < LEN_PREFIX + len {
            // Reserve for the rest of the frame to avoid incremental growth
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let payload = src.split_to(len);
        let msg = serde_json::from_slice(&payload)?;
        Ok(Some(msg))
    }
}

impl<In, Out: Serialize> Encoder<Out> for MessageCodec<In, Out> {
    type Error = CodecError;

    fn encode(&mut self, msg: Out, dst: &mut BytesMut) -> Result<(), CodecError> {
        let payload = serde_json::to_vec(&msg)?;

        if payload.len() > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_len,
            });
        }

        dst.reserve(LEN_PREFIX + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

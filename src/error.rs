//! Crate error types
//!
//! `RelayError` covers routing failures that are surfaced back to the caller
//! as structured replies; `Error` wraps everything the server itself can hit
//! (I/O, framing). None of these are fatal to the process.

use crate::protocol::framing::CodecError;
use crate::registry::device::DeviceId;

/// Routing failure, recovered locally and reported to the requesting client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// No device with this id is registered
    DeviceNotFound(DeviceId),
    /// Device is already claimed by another client
    DeviceAlreadyBlocked(DeviceId),
    /// Action attempted by a client with no active pairing
    NotPaired,
    /// No device reply within the configured bound
    Timeout,
    /// Connection dropped mid-operation
    TransportClosed,
}

impl RelayError {
    /// Wire-level error code sent in `actionError` / `connectResult` replies
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::DeviceNotFound(_) => "deviceNotFound",
            RelayError::DeviceAlreadyBlocked(_) => "deviceAlreadyBlocked",
            RelayError::NotPaired => "notPaired",
            RelayError::Timeout => "timeout",
            RelayError::TransportClosed => "transportClosed",
        }
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::DeviceNotFound(id) => write!(f, "Device not found: {}", id),
            RelayError::DeviceAlreadyBlocked(id) => {
                write!(f, "Device already claimed by another client: {}", id)
            }
            RelayError::NotPaired => write!(f, "Client is not paired to any device"),
            RelayError::Timeout => write!(f, "Device did not reply within the timeout"),
            RelayError::TransportClosed => write!(f, "Connection closed mid-operation"),
        }
    }
}

impl std::error::Error for RelayError {}

/// Top-level error for server-facing operations
#[derive(Debug)]
pub enum Error {
    /// Socket-level I/O failure
    Io(std::io::Error),
    /// Wire framing/decoding failure
    Codec(CodecError),
    /// Routing failure
    Relay(RelayError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
            Error::Relay(e) => write!(f, "Relay error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Codec(e) => Some(e),
            Error::Relay(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Error::Relay(e)
    }
}

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        let id = DeviceId::from("D1");
        assert_eq!(RelayError::DeviceNotFound(id.clone()).code(), "deviceNotFound");
        assert_eq!(
            RelayError::DeviceAlreadyBlocked(id).code(),
            "deviceAlreadyBlocked"
        );
        assert_eq!(RelayError::NotPaired.code(), "notPaired");
        assert_eq!(RelayError::Timeout.code(), "timeout");
        assert_eq!(RelayError::TransportClosed.code(), "transportClosed");
    }

    #[test]
    fn test_display() {
        let err = RelayError::DeviceNotFound(DeviceId::from("emu-5554"));
        assert_eq!(err.to_string(), "Device not found: emu-5554");
    }
}

//! The relay core: connection, device, pairing, routing, and fan-out state
//!
//! Five components, composed by [`store::Relay`]:
//!
//! - [`connection`]: every live connection and its role, keyed by a
//!   server-assigned identity
//! - [`device`]: the directory of registered devices and their cached
//!   metadata
//! - [`pairing`]: the exclusive client<->device bindings and block state
//! - [`router`]: correlation of forwarded actions with device replies
//! - [`fanout`]: the broadcast subscriber set for directory notifications
//!
//! All state is in-memory and lost on restart; devices and clients
//! re-register and re-claim on reconnect.

pub mod config;
pub mod connection;
pub mod device;
pub mod fanout;
pub mod pairing;
pub mod router;
pub mod store;

pub use config::RegistryConfig;
pub use connection::{ConnectionId, ConnectionRegistry, Role};
pub use device::{DeviceDirectory, DeviceId, DeviceRecord};
pub use fanout::EventFanout;
pub use pairing::{ClaimOutcome, PairingManager};
pub use router::{ActionRouter, ActionToken, PendingAction};
pub use store::Relay;

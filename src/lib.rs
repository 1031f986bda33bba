//! inspector-relay - multiplexing relay for a mobile UI-automation inspector
//!
//! This crate is the rendezvous point between mobile automation devices and
//! the browser sessions inspecting them. Devices connect and announce
//! themselves; inspector clients browse the device directory, claim a device
//! exclusively, drive it with request/response actions, and watch its
//! screenshot stream, all multiplexed over persistent TCP connections
//! through one relay process.
//!
//! # Architecture
//!
//! ```text
//!  [device agents] ──┐                       ┌── [browser clients]
//!                    │    ┌─────────────┐    │
//!     registerDevice ├───►│ RelayServer │◄───┤ getConnectedDevices
//!     screenShot     │    │  Arc<Relay> │    │ connectToDevice
//!     actionReply    │    └─────────────┘    │ performAction
//!                    │      routing core     │
//!                    └──────────────────────-┘
//! ```
//!
//! The core guarantees:
//!
//! - a device is driven by at most one client at a time (claims on a blocked
//!   device are rejected);
//! - actions are correlated per call, so concurrent requests resolve
//!   independently and a reply is delivered exactly once or not at all;
//! - either side can drop at any moment: the survivor is notified once and
//!   the device returns to the pool;
//! - device frames are fanned out to the paired client only and dropped
//!   without buffering otherwise.
//!
//! # Example - Server
//!
//! ```ignore
//! use inspector_relay::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> inspector_relay::Result<()> {
//!     let config = ServerConfig::default().max_connections(256);
//!     let server = RelayServer::new(config);
//!     server.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await
//! }
//! ```
//!
//! All relay state is in-memory; a restart forgets every device and pairing
//! and both sides simply re-register and re-claim.

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;

pub use error::{Error, RelayError, Result};
pub use protocol::{DeviceMeta, DeviceSnapshot, InboundMessage, MessageCodec, OutboundMessage};
pub use registry::{ActionToken, ConnectionId, DeviceId, Relay, RegistryConfig};
pub use server::{RelayServer, ServerConfig};
pub use stats::{MetricsSnapshot, RelayMetrics};

//! Per-connection handling
//!
//! Each accepted socket gets one `Connection`: the read half decodes frames
//! and feeds them to the relay one at a time; a writer task drains the
//! connection's outbound channel onto the write half. When either side
//! stops, the connection deregisters itself and the relay cascades the
//! cleanup.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::Result;
use crate::protocol::framing::MessageCodec;
use crate::protocol::message::{InboundMessage, OutboundMessage};
use crate::registry::store::Relay;
use crate::server::config::ServerConfig;

type Reader = FramedRead<OwnedReadHalf, MessageCodec<InboundMessage, OutboundMessage>>;
type Writer = FramedWrite<OwnedWriteHalf, MessageCodec<InboundMessage, OutboundMessage>>;

/// One live socket, bridging the wire and the relay
pub struct Connection {
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    relay: Arc<Relay>,
}

impl Connection {
    pub fn new(
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        relay: Arc<Relay>,
    ) -> Self {
        Self {
            socket,
            peer_addr,
            config,
            relay,
        }
    }

    /// Drive the connection until the peer goes away
    ///
    /// A decode failure poisons only this connection; the relay state of
    /// every other device and client is untouched.
    pub async fn run(self) -> Result<()> {
        use futures::{SinkExt, StreamExt};

        let Connection {
            socket,
            peer_addr,
            config,
            relay,
        } = self;

        let (read_half, write_half) = socket.into_split();
        let mut reader: Reader = FramedRead::new(
            read_half,
            MessageCodec::with_max_frame_len(config.max_frame_len),
        );
        let mut writer: Writer = FramedWrite::new(
            write_half,
            MessageCodec::with_max_frame_len(config.max_frame_len),
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
        let conn_id = relay.connect(tx).await;

        tracing::debug!(connection = %conn_id, peer = %peer_addr, "Connection running");

        // Writer task: drain the outbound queue onto the wire. Exits when
        // the relay drops the sender (deregistration) or the socket dies.
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = writer.send(msg).await {
                    tracing::debug!(error = %e, "Write failed, stopping writer");
                    break;
                }
            }
        });

        // Read loop: one message, one atomic relay handler.
        let result = loop {
            match reader.next().await {
                Some(Ok(msg)) => {
                    relay.handle_message(conn_id, msg).await;
                }
                Some(Err(e)) => {
                    tracing::debug!(connection = %conn_id, error = %e, "Decode error, closing");
                    break Err(e.into());
                }
                None => break Ok(()),
            }
        };

        // Authoritative terminal signal: cascade cleanup. Deregistration
        // drops the outbound sender, so the writer drains and exits.
        relay.disconnect(conn_id).await;
        let _ = writer_task.await;

        tracing::debug!(connection = %conn_id, peer = %peer_addr, "Connection finished");
        result
    }
}

//! End-to-end tests for the inspector relay
//!
//! Drives real framed TCP connections against a server bound to a loopback
//! port: device registration, directory browsing, claiming, action
//! round-trips, screenshot fan-out, and disconnect cascades all go through
//! the actual wire codec.
//!
//! Run: `cargo test --test e2e`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use inspector_relay::{
    DeviceId, DeviceMeta, InboundMessage, MessageCodec, OutboundMessage, RegistryConfig,
    RelayServer, ServerConfig,
};

/// Endpoint-side framing: outbound messages in, inbound messages out
type Wire = Framed<TcpStream, MessageCodec<OutboundMessage, InboundMessage>>;

async fn spawn_server(registry_config: RegistryConfig) -> (SocketAddr, Arc<RelayServer>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Arc::new(RelayServer::with_registry_config(
        ServerConfig::default(),
        registry_config,
    ));

    let runner = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = runner.run_on(listener).await;
    });

    (addr, server)
}

async fn connect(addr: SocketAddr) -> Wire {
    let socket = TcpStream::connect(addr).await.unwrap();
    Framed::new(socket, MessageCodec::new())
}

async fn send(wire: &mut Wire, msg: InboundMessage) {
    wire.send(msg).await.unwrap();
}

async fn recv(wire: &mut Wire) -> OutboundMessage {
    tokio::time::timeout(Duration::from_secs(5), wire.next())
        .await
        .expect("timed out waiting for message")
        .expect("connection closed")
        .expect("decode failed")
}

fn meta(id: &str) -> DeviceMeta {
    DeviceMeta {
        device_id: DeviceId::from(id),
        device_model: "Pixel 4".into(),
        os_version: "13".into(),
        screen: json!({"width": 1080, "height": 2280}),
    }
}

async fn register(wire: &mut Wire, id: &str) {
    send(wire, InboundMessage::RegisterDevice { metadata: meta(id) }).await;
}

/// Claim a device and consume messages until the connect result arrives
/// (broadcasts may interleave).
async fn claim(wire: &mut Wire, request_id: u64, device: &str) -> OutboundMessage {
    send(
        wire,
        InboundMessage::ConnectToDevice {
            request_id,
            device_id: DeviceId::from(device),
        },
    )
    .await;
    loop {
        let msg = recv(wire).await;
        if matches!(msg, OutboundMessage::ConnectResult { .. }) {
            return msg;
        }
    }
}

#[tokio::test]
async fn full_session_over_wire() {
    let (addr, server) = spawn_server(RegistryConfig::default()).await;

    // Device announces itself
    let mut device = connect(addr).await;
    register(&mut device, "emu-5554").await;

    // Client browses the directory
    let mut client = connect(addr).await;
    send(&mut client, InboundMessage::GetConnectedDevices { request_id: 1 }).await;
    match recv(&mut client).await {
        OutboundMessage::DeviceList { request_id, devices } => {
            assert_eq!(request_id, 1);
            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].device_meta.device_id, DeviceId::from("emu-5554"));
            assert!(!devices[0].is_blocked);
        }
        other => panic!("unexpected message: {:?}", other),
    }

    // Client claims the device
    match claim(&mut client, 2, "emu-5554").await {
        OutboundMessage::ConnectResult { success: true, device: Some(d), .. } => {
            assert_eq!(d.device_meta.device_model, "Pixel 4");
        }
        other => panic!("unexpected message: {:?}", other),
    }
    assert_eq!(recv(&mut device).await, OutboundMessage::ConnectedToClient);

    // Action round-trip with the device echoing the correlation token
    send(
        &mut client,
        InboundMessage::PerformAction {
            request_id: 3,
            path: "/session/tap".into(),
            data: json!({"x": 100, "y": 200}),
        },
    )
    .await;

    let token = match recv(&mut device).await {
        OutboundMessage::PerformAction { token, path, data } => {
            assert_eq!(path, "/session/tap");
            assert_eq!(data["y"], 200);
            token
        }
        other => panic!("unexpected message: {:?}", other),
    };

    send(
        &mut device,
        InboundMessage::ActionReply {
            token,
            data: json!({"status": 0, "value": null}),
        },
    )
    .await;

    // Broadcasts (deviceBlocked) may arrive before the action result
    loop {
        match recv(&mut client).await {
            OutboundMessage::ActionResult { request_id, data } => {
                assert_eq!(request_id, 3);
                assert_eq!(data["status"], 0);
                break;
            }
            OutboundMessage::DeviceBlocked { .. } => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }

    // Screenshot frames reach the paired client
    send(&mut device, InboundMessage::ScreenShot { data: json!("iVBORw0KGgo=") }).await;
    match recv(&mut client).await {
        OutboundMessage::ScreenShot { data } => assert_eq!(data, "iVBORw0KGgo="),
        other => panic!("unexpected message: {:?}", other),
    }

    assert_eq!(server.relay().device_count().await, 1);
    assert_eq!(server.relay().pairing_count().await, 1);
}

#[tokio::test]
async fn claim_contention_over_wire() {
    let (addr, _server) = spawn_server(RegistryConfig::default()).await;

    let mut device = connect(addr).await;
    register(&mut device, "D1").await;

    let mut c1 = connect(addr).await;
    let mut c2 = connect(addr).await;

    match claim(&mut c1, 1, "D1").await {
        OutboundMessage::ConnectResult { success: true, .. } => {}
        other => panic!("unexpected message: {:?}", other),
    }

    match claim(&mut c2, 1, "D1").await {
        OutboundMessage::ConnectResult { success: false, error: Some(code), .. } => {
            assert_eq!(code, "deviceAlreadyBlocked");
        }
        other => panic!("unexpected message: {:?}", other),
    }

    // First client drops; its device frees up and the second claim sticks
    drop(c1);
    assert_eq!(recv(&mut device).await, OutboundMessage::ConnectedToClient);
    loop {
        match recv(&mut device).await {
            OutboundMessage::DisconnectedFromClient => break,
            other => panic!("unexpected message: {:?}", other),
        }
    }

    match claim(&mut c2, 2, "D1").await {
        OutboundMessage::ConnectResult { success: true, .. } => {}
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn device_disconnect_reaches_paired_client() {
    let (addr, server) = spawn_server(RegistryConfig::default()).await;

    let mut device = connect(addr).await;
    register(&mut device, "D1").await;

    let mut client = connect(addr).await;
    match claim(&mut client, 1, "D1").await {
        OutboundMessage::ConnectResult { success: true, .. } => {}
        other => panic!("unexpected message: {:?}", other),
    }

    drop(device);

    loop {
        match recv(&mut client).await {
            OutboundMessage::DeviceDisconnected { device_id } => {
                assert_eq!(device_id, DeviceId::from("D1"));
                break;
            }
            OutboundMessage::DeviceBlocked { .. } => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }

    assert_eq!(server.relay().device_count().await, 0);
    assert_eq!(server.relay().pairing_count().await, 0);
}

#[tokio::test]
async fn unpaired_action_rejected_over_wire() {
    let (addr, _server) = spawn_server(RegistryConfig::default()).await;

    let mut client = connect(addr).await;
    send(
        &mut client,
        InboundMessage::PerformAction {
            request_id: 11,
            path: "/session/tap".into(),
            data: Value::Null,
        },
    )
    .await;

    match recv(&mut client).await {
        OutboundMessage::ActionError { request_id, error } => {
            assert_eq!(request_id, 11);
            assert_eq!(error, "notPaired");
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn action_times_out_when_device_stays_silent() {
    let config = RegistryConfig::default().action_timeout(Duration::from_millis(200));
    let (addr, _server) = spawn_server(config).await;

    let mut device = connect(addr).await;
    register(&mut device, "D1").await;

    let mut client = connect(addr).await;
    match claim(&mut client, 1, "D1").await {
        OutboundMessage::ConnectResult { success: true, .. } => {}
        other => panic!("unexpected message: {:?}", other),
    }

    send(
        &mut client,
        InboundMessage::PerformAction {
            request_id: 5,
            path: "/session/source".into(),
            data: Value::Null,
        },
    )
    .await;

    // Device reads the forwarded action but never answers
    assert_eq!(recv(&mut device).await, OutboundMessage::ConnectedToClient);
    match recv(&mut device).await {
        OutboundMessage::PerformAction { path, .. } => assert_eq!(path, "/session/source"),
        other => panic!("unexpected message: {:?}", other),
    }

    loop {
        match recv(&mut client).await {
            OutboundMessage::ActionError { request_id, error } => {
                assert_eq!(request_id, 5);
                assert_eq!(error, "timeout");
                break;
            }
            OutboundMessage::DeviceBlocked { .. } => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

#[tokio::test]
async fn directory_broadcasts_keep_client_lists_live() {
    let (addr, _server) = spawn_server(RegistryConfig::default()).await;

    // Client subscribes by asking for the (empty) directory
    let mut watcher = connect(addr).await;
    send(&mut watcher, InboundMessage::GetConnectedDevices { request_id: 1 }).await;
    match recv(&mut watcher).await {
        OutboundMessage::DeviceList { devices, .. } => assert!(devices.is_empty()),
        other => panic!("unexpected message: {:?}", other),
    }

    // Device arrives: watcher hears about it
    let mut device = connect(addr).await;
    register(&mut device, "D1").await;
    match recv(&mut watcher).await {
        OutboundMessage::NewDeviceConnected { device } => {
            assert_eq!(device.device_meta.device_id, DeviceId::from("D1"));
        }
        other => panic!("unexpected message: {:?}", other),
    }

    // Another client claims it: watcher sees the block
    let mut other = connect(addr).await;
    match claim(&mut other, 1, "D1").await {
        OutboundMessage::ConnectResult { success: true, .. } => {}
        msg => panic!("unexpected message: {:?}", msg),
    }
    match recv(&mut watcher).await {
        OutboundMessage::DeviceBlocked { device } => assert!(device.is_blocked),
        other => panic!("unexpected message: {:?}", other),
    }

    // Claimer releases: watcher sees the unblock
    send(&mut other, InboundMessage::DisconnectFromDevice).await;
    loop {
        match recv(&mut watcher).await {
            OutboundMessage::DeviceUnblocked { device } => {
                assert!(!device.is_blocked);
                break;
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    // Device leaves: watcher hears that too
    drop(device);
    loop {
        match recv(&mut watcher).await {
            OutboundMessage::DeviceDisconnected { device_id } => {
                assert_eq!(device_id, DeviceId::from("D1"));
                break;
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

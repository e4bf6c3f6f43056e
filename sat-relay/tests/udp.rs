//! Integration tests for the UDP transport.
//!
//! Each test binds a receiving socket on an OS-assigned loopback port and
//! sends to it from a second socket in the same process.

use std::sync::Arc;
use std::time::Duration;

use sat_relay::config::{ReceiverConfig, TransferConfig};
use sat_relay::encoding::Encoding;
use sat_relay::envelope::Presence;
use sat_relay::receiver::{Delivery, ReassemblyEngine};
use sat_relay::sender::Sender;
use sat_relay::sink::{FileSink, ObjectSink};
use sat_relay::socket::Socket;
use sat_relay::transport::Transport;

/// Bind a socket to an OS-assigned port on loopback.
async fn ephemeral() -> Socket {
    let addr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

#[tokio::test]
async fn image_crosses_loopback_and_lands_on_disk() {
    let rx_sock = Arc::new(ephemeral().await);
    let (mut inbox, reader) = Arc::clone(&rx_sock).spawn_reader();

    let tx_sock = Socket::connect("127.0.0.1:0".parse().unwrap(), rx_sock.local_addr)
        .await
        .expect("connect");
    let cfg = TransferConfig {
        chunk_size: 1024,
        encoding: Encoding::Zstd,
        ..Default::default()
    };
    let data: Vec<u8> = (0..8_000u32).map(|i| (i % 251) as u8).collect();

    let sender = Sender::new(tx_sock, cfg);
    sender
        .transport()
        .publish("sat/status", &Presence::online("loop").encode())
        .await
        .unwrap();
    let report = sender.send("pass.png", &data).await.expect("send");

    let mut engine = ReassemblyEngine::new(ReceiverConfig::default());
    let mut presence = None;
    let object = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = inbox.recv().await.expect("reader alive");
            match engine.handle_message(&msg.topic, &msg.payload) {
                Ok(Some(Delivery::Object(o))) => return o,
                Ok(Some(Delivery::Presence(p))) => presence = Some(p),
                _ => {}
            }
        }
    })
    .await
    .expect("object within 5s");

    assert_eq!(presence, Some(Presence::online("loop")));
    assert!(object.is_verified());
    assert_eq!(object.data, data);
    assert_eq!(object.header.object_id, report.object_id);

    let tmp = tempfile::tempdir().unwrap();
    let mut sink = FileSink::create(tmp.path()).unwrap();
    let path = sink.store(&object).unwrap();
    assert_eq!(std::fs::read(path).unwrap(), data);

    reader.abort();
}

#[tokio::test]
async fn malformed_datagrams_are_skipped() {
    let rx_sock = Arc::new(ephemeral().await);
    let (mut inbox, reader) = Arc::clone(&rx_sock).spawn_reader();

    let raw = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(b"not a frame", rx_sock.local_addr).await.unwrap();

    let tx_sock = Socket::connect("127.0.0.1:0".parse().unwrap(), rx_sock.local_addr)
        .await
        .unwrap();
    tx_sock.publish("sat/status", b"node:online").await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), inbox.recv())
        .await
        .expect("message within 5s")
        .expect("reader alive");
    assert_eq!(msg.topic, "sat/status");
    assert_eq!(msg.payload, b"node:online");

    reader.abort();
}

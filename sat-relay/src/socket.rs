//! Async UDP transport.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! topic-tagged [`Message`]s instead of raw bytes, one framed
//! [`Packet`](crate::packet::Packet) per datagram.  All protocol logic lives
//! elsewhere; this module owns only byte I/O.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::packet::{Packet, PacketError, MAX_DATAGRAM};
use crate::transport::{Message, Transport, TransportError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from receiving on the socket.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet decode error: {0}")]
    Packet(#[from] PacketError),
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// A topic-aware UDP socket.
///
/// A socket created with [`Socket::connect`] publishes to its peer; a socket
/// created with [`Socket::bind`] only receives.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after the OS assigns an
    /// ephemeral port).
    pub local_addr: SocketAddr,
    peer: Option<SocketAddr>,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a receive-only socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            peer: None,
            inner,
        })
    }

    /// Bind to `local_addr` and publish every message to `peer`.
    pub async fn connect(local_addr: SocketAddr, peer: SocketAddr) -> Result<Self, SocketError> {
        let mut socket = Self::bind(local_addr).await?;
        socket.peer = Some(peer);
        Ok(socket)
    }

    /// Receive the next datagram and decode it into a [`Message`].
    ///
    /// Datagrams that fail to decode are returned as `Err`; the caller decides
    /// whether to keep reading.
    pub async fn recv(&self) -> Result<(Message, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let packet = Packet::decode(&buf[..n])?;
        Ok((packet.into(), addr))
    }

    /// Spawn a task that forwards every decodable datagram into a channel.
    ///
    /// Undecodable datagrams are logged and skipped.  The task ends when the
    /// receiving half of the channel is dropped or the socket fails.
    pub fn spawn_reader(self: Arc<Self>) -> (mpsc::UnboundedReceiver<Message>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            loop {
                match self.recv().await {
                    Ok((msg, addr)) => {
                        log::trace!(
                            "[udp] ← {} ({} bytes) from {addr}",
                            msg.topic,
                            msg.payload.len()
                        );
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(SocketError::Packet(e)) => {
                        log::warn!("[udp] dropping malformed datagram: {e}");
                    }
                    Err(SocketError::Io(e)) => {
                        log::error!("[udp] receive failed: {e}");
                        break;
                    }
                }
            }
        });
        (rx, handle)
    }
}

impl Transport for Socket {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let peer = self.peer.ok_or(TransportError::Closed)?;
        let bytes = Packet::new(topic, payload.to_vec())
            .encode()
            .map_err(|e| TransportError::Transient(e.to_string()))?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(TransportError::TooLarge {
                size: bytes.len(),
                max: MAX_DATAGRAM,
            });
        }
        self.inner.send_to(&bytes, peer).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn publish_reaches_bound_socket() {
        let rx = Socket::bind(loopback()).await.unwrap();
        let tx = Socket::connect(loopback(), rx.local_addr).await.unwrap();

        tx.publish("sat/status", b"pub:online").await.unwrap();
        let (msg, from) = rx.recv().await.unwrap();
        assert_eq!(msg, Message::new("sat/status", b"pub:online".to_vec()));
        assert_eq!(from, tx.local_addr);
    }

    #[tokio::test]
    async fn bind_only_socket_cannot_publish() {
        let s = Socket::bind(loopback()).await.unwrap();
        assert!(matches!(
            s.publish("t", b"x").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn oversized_message_is_rejected_before_sending() {
        let rx = Socket::bind(loopback()).await.unwrap();
        let tx = Socket::connect(loopback(), rx.local_addr).await.unwrap();
        let err = tx.publish("t", &vec![0u8; MAX_DATAGRAM]).await.unwrap_err();
        assert!(matches!(err, TransportError::TooLarge { .. }));
        assert!(!err.is_transient());
    }
}

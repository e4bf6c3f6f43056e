//! Transport adapter seam.
//!
//! The protocol rides on any transport that delivers discrete messages on
//! named topics, at least once, possibly duplicated or reordered.  The sender
//! only needs [`Transport::publish`]; the receiver only needs a stream of
//! [`Message`]s (an `mpsc` receiver), which keeps the engine independent of
//! how messages arrive.
//!
//! Implementations in this crate:
//! - [`MemoryTransport`] — in-process, unbounded channel.
//! - [`crate::socket::Socket`] — UDP datagrams.
//! - [`crate::simulator::Simulator`] — fault-injecting wrapper around either.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// Why a publish attempt failed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The attempt failed but a later one may succeed.
    #[error("transient publish failure: {0}")]
    Transient(String),
    /// Underlying socket error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The message can never fit in one transport unit.
    #[error("message of {size} bytes exceeds the transport limit of {max}")]
    TooLarge { size: usize, max: usize },
    /// The far side is gone; retrying is pointless.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// `true` when retrying the same publish may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_) | TransportError::Io(_))
    }
}

/// Publish side of a topic-based transport.
pub trait Transport: Send + Sync {
    /// Make one attempt at publishing `payload` on `topic`.
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).publish(topic, payload)
    }
}

/// In-process transport: every publish lands in an unbounded channel.
///
/// Queueing is unbounded: a slow consumer grows memory rather
/// than failing publishes.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Message>,
}

impl MemoryTransport {
    /// Create a transport and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.tx
            .send(Message::new(topic, payload.to_vec()))
            .map_err(|_| TransportError::Closed)
    }
}

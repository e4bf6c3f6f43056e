//! Outbound object pipeline.
//!
//! [`Sender`] turns one source object into a header plus ordered chunks and
//! publishes them through a [`Transport`].  Each call to [`Sender::send`] is
//! self-contained: nothing about the object is retained once it returns.
//!
//! # Send contract
//! - The digest covers the **wire** bytes (after encoding), never the raw
//!   source bytes.
//! - The header is published first, then chunks in ascending index order.
//!   This is a send-time convention only; receivers must not rely on it.
//! - Every publish gets its own retry budget ([`publish_with_retry`]).
//! - If the header exhausts its budget no chunk is sent.  If a chunk exhausts
//!   its budget the send aborts on the spot; chunks already published are not
//!   retracted and the object never completes on the receiver.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngCore;
use thiserror::Error;

use crate::chunk;
use crate::config::TransferConfig;
use crate::encoding::CodecError;
use crate::envelope::{now_nanos, EncodeError, TransferHeader};
use crate::integrity;
use crate::state::SendState;
use crate::timer::{Backoff, RetryPolicy};
use crate::transport::{Transport, TransportError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A single message could not be published within its retry budget.
#[derive(Debug, Error)]
#[error("publish to {topic} failed after {attempts} attempt(s): {source}")]
pub struct PublishError {
    pub topic: String,
    pub attempts: u32,
    #[source]
    pub source: TransportError,
}

/// Why a send did not complete.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to read object: {0}")]
    Read(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Telemetry(#[from] crate::telemetry::TelemetryError),
}

// ---------------------------------------------------------------------------
// Publish-with-retry
// ---------------------------------------------------------------------------

/// Publish `payload` on `topic`, retrying transient failures.
///
/// Up to `policy.attempts()` attempts are made, sleeping for the current
/// backoff delay between consecutive attempts (never after the last one).
/// Non-transient errors abort immediately.  On success returns the number of
/// attempts used.
pub async fn publish_with_retry<T: Transport>(
    transport: &T,
    topic: &str,
    payload: &[u8],
    policy: &RetryPolicy,
) -> Result<u32, PublishError> {
    let budget = policy.attempts();
    let mut backoff = Backoff::new(*policy);
    let mut attempt = 1;

    loop {
        match transport.publish(topic, payload).await {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_transient() && attempt < budget => {
                let delay = backoff.current();
                log::warn!(
                    "[tx] publish to {topic} failed (attempt {attempt}/{budget}): {e}; \
                     retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                backoff.back_off();
                attempt += 1;
            }
            Err(source) => {
                log::error!("[tx] publish to {topic} gave up after {attempt} attempt(s): {source}");
                return Err(PublishError {
                    topic: topic.to_owned(),
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub object_id: String,
    pub sequence: u64,
    pub chunk_count: u32,
    pub size_raw: u64,
    pub size_wire: u64,
    pub digest: String,
}

/// Object sender bound to one transport.
#[derive(Debug)]
pub struct Sender<T> {
    transport: T,
    config: TransferConfig,
    /// Sequence number for the next object.
    next_sequence: AtomicU64,
}

impl<T: Transport> Sender<T> {
    /// Create a sender.
    ///
    /// # Panics
    ///
    /// Panics if `config.chunk_size` is zero.
    pub fn new(transport: T, config: TransferConfig) -> Self {
        assert!(config.chunk_size >= 1, "chunk_size must be at least 1");
        Self {
            transport,
            config,
            next_sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read `path` and send its contents under the file's own name.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<SendReport, SendError> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.send(&name, &raw).await
    }

    /// Encode, frame and publish one object.
    pub async fn send(&self, name: &str, raw: &[u8]) -> Result<SendReport, SendError> {
        let object_id = new_object_id();
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let mut state = SendState::Raw;
        log::debug!("[tx] {object_id} {state} name={name} size={}", raw.len());

        let encoding = self.config.encoding;
        let wire = encoding.compress(raw, self.config.object_level)?;
        advance(&object_id, &mut state, SendState::Compressed);

        let digest = integrity::digest(&wire);
        advance(&object_id, &mut state, SendState::Digested);

        let chunks = chunk::split(&object_id, &wire, self.config.chunk_size);
        let header = TransferHeader {
            object_id: object_id.clone(),
            name: name.to_owned(),
            timestamp: now_nanos(),
            sequence,
            encoding,
            size_raw: raw.len() as u64,
            size_wire: wire.len() as u64,
            chunk_count: chunks.len() as u32,
            digest,
        };
        let header_bytes = header.encode()?;
        let chunk_bytes = chunks
            .iter()
            .map(|c| c.encode())
            .collect::<Result<Vec<_>, _>>()?;
        advance(&object_id, &mut state, SendState::Framed);

        advance(&object_id, &mut state, SendState::Publishing);
        let topics = &self.config.topics;
        let policy = &self.config.retry;

        let published = publish_with_retry(&self.transport, &topics.meta, &header_bytes, policy);
        if let Err(e) = published.await {
            advance(&object_id, &mut state, SendState::Failed);
            return Err(e.into());
        }
        log::debug!(
            "[tx] {object_id} → header enc={encoding} raw={} wire={} chunks={}",
            header.size_raw,
            header.size_wire,
            header.chunk_count
        );

        for (index, bytes) in chunk_bytes.iter().enumerate() {
            let published = publish_with_retry(&self.transport, &topics.chunk, bytes, policy);
            if let Err(e) = published.await {
                log::error!(
                    "[tx] {object_id} aborted at chunk {index}/{}; object will not complete",
                    header.chunk_count
                );
                advance(&object_id, &mut state, SendState::Failed);
                return Err(e.into());
            }
            log::trace!("[tx] {object_id} → chunk {index}/{}", header.chunk_count);
        }

        advance(&object_id, &mut state, SendState::Done);
        debug_assert!(state.is_terminal());
        log::info!(
            "[tx] sent {name} as {object_id} seq={sequence} ({} → {} bytes, {} chunk(s))",
            header.size_raw,
            header.size_wire,
            header.chunk_count
        );

        Ok(SendReport {
            object_id,
            sequence,
            chunk_count: header.chunk_count,
            size_raw: header.size_raw,
            size_wire: header.size_wire,
            digest: header.digest,
        })
    }
}

fn advance(object_id: &str, state: &mut SendState, next: SendState) {
    debug_assert!(!state.is_terminal(), "{object_id} advanced past {state}");
    log::debug!("[tx] {object_id} {state} → {next}");
    *state = next;
}

/// 128 random bits, hex encoded.
pub fn new_object_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

//! Chunk codec: split a wire buffer into checksummed chunks and join them back.
//!
//! Both functions are pure.  The sender calls [`split`] once per object; the
//! receiver calls [`join`] once per object, after every index has arrived.
//!
//! ```text
//!  wire buffer  ┌───────────────┬───────────────┬────────┐
//!               │   chunk_size  │   chunk_size  │  rest  │
//!               └───────┬───────┴───────┬───────┴───┬────┘
//!                   index 0         index 1     index 2      chunk_count = 3
//! ```

use std::collections::HashMap;

use thiserror::Error;

use crate::integrity;

/// Default chunk payload size (60 KiB), kept well below the transport's
/// maximum message size once envelope overhead is added.
pub const DEFAULT_CHUNK_SIZE: usize = 60 * 1024;

/// One indexed, checksummed fragment of an object's wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Object this chunk belongs to.
    pub object_id: String,
    /// Zero-based position within the object.
    pub index: u32,
    /// Total number of chunks in the object.
    ///
    /// Carried redundantly so a receiver can size a record before the header
    /// arrives.
    pub chunk_count: u32,
    /// CRC-32 of `payload` only (no metadata).
    pub checksum: u32,
    pub payload: Vec<u8>,
}

impl Chunk {
    /// Build a chunk, computing its checksum.
    pub fn new(
        object_id: impl Into<String>,
        index: u32,
        chunk_count: u32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            index,
            chunk_count,
            checksum: integrity::checksum(&payload),
            payload,
        }
    }

    /// Recomputed checksum of the payload as received.
    pub fn actual_checksum(&self) -> u32 {
        integrity::checksum(&self.payload)
    }

    /// `true` when the carried checksum matches the payload.
    pub fn verify(&self) -> bool {
        self.actual_checksum() == self.checksum
    }
}

/// A join was attempted before every index in `0..chunk_count` was present.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incomplete assembly: chunk {missing} of {chunk_count} is missing")]
pub struct IncompleteAssembly {
    /// Lowest absent index.
    pub missing: u32,
    pub chunk_count: u32,
}

/// Number of chunks needed for `len` bytes: `ceil(len / chunk_size)`.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn chunk_count(len: usize, chunk_size: usize) -> u32 {
    assert!(chunk_size > 0, "chunk_size must be at least 1");
    len.div_ceil(chunk_size) as u32
}

/// Split `buffer` into ordered chunks of at most `chunk_size` bytes.
///
/// Indices increase from 0; only the last chunk may be shorter.  An empty
/// buffer yields no chunks.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn split(object_id: &str, buffer: &[u8], chunk_size: usize) -> Vec<Chunk> {
    let total = chunk_count(buffer.len(), chunk_size);
    buffer
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, piece)| Chunk::new(object_id, index as u32, total, piece.to_vec()))
        .collect()
}

/// Concatenate `parts` by ascending index `0..chunk_count`.
///
/// Entries with an index outside that range are ignored.
pub fn join(
    parts: &HashMap<u32, Vec<u8>>,
    chunk_count: u32,
) -> Result<Vec<u8>, IncompleteAssembly> {
    let mut len = 0usize;
    for index in 0..chunk_count {
        match parts.get(&index) {
            Some(part) => len += part.len(),
            None => {
                return Err(IncompleteAssembly {
                    missing: index,
                    chunk_count,
                })
            }
        }
    }

    let mut buf = Vec::with_capacity(len);
    for index in 0..chunk_count {
        // Presence checked above.
        if let Some(part) = parts.get(&index) {
            buf.extend_from_slice(part);
        }
    }
    Ok(buf)
}

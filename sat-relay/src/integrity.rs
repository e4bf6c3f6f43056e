//! Integrity primitives shared by both ends of a transfer.
//!
//! Two codes are used, at two granularities:
//! - [`checksum`]: CRC-32 over one chunk (or one telemetry payload).  Cheap,
//!   detects transport corruption, no security properties.
//! - [`digest`]: lowercase hex SHA-256 over a whole object's **wire** bytes,
//!   i.e. the compressed stream before any decompression on the receiver.

use sha2::{Digest, Sha256};

/// CRC-32 (IEEE) of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Hex-encoded SHA-256 of `data`.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `true` when `data` hashes to `expected`.
///
/// Comparison ignores hex case and surrounding whitespace so digests written
/// by other encoders still match.
pub fn digest_matches(data: &[u8], expected: &str) -> bool {
    digest(data).eq_ignore_ascii_case(expected.trim())
}

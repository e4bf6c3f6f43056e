//! Wire encodings for object and telemetry payloads.
//!
//! An [`Encoding`] names how the bytes on the wire relate to the raw source
//! bytes.  `raw` is the identity; `zstd` is a single zstd frame.  The name is
//! carried in every header / telemetry envelope so the receiver knows how to
//! undo it.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// zstd level used for image objects.
pub const OBJECT_LEVEL: i32 = 10;

/// zstd level used for telemetry samples (small, latency sensitive).
pub const TELEMETRY_LEVEL: i32 = 6;

/// Errors from the compression codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown encoding {0:?}")]
    UnknownEncoding(String),
    #[error("zstd compression failed: {0}")]
    Compress(#[source] std::io::Error),
    #[error("zstd decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
}

/// How a payload is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Bytes are sent as-is.
    #[default]
    Raw,
    /// Bytes are one zstd frame.
    Zstd,
}

impl Encoding {
    /// Name used in the `enc` wire field.
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Zstd => "zstd",
        }
    }

    /// Encode raw bytes into wire bytes.
    ///
    /// `level` is ignored for [`Encoding::Raw`].
    pub fn compress(self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        match self {
            Encoding::Raw => Ok(data.to_vec()),
            Encoding::Zstd => zstd::encode_all(data, level).map_err(CodecError::Compress),
        }
    }

    /// Decode wire bytes back into raw bytes.
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Encoding::Raw => Ok(data.to_vec()),
            Encoding::Zstd => zstd::decode_all(data).map_err(CodecError::Decompress),
        }
    }
}

impl FromStr for Encoding {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Encoding::Raw),
            "zstd" => Ok(Encoding::Zstd),
            other => Err(CodecError::UnknownEncoding(other.to_owned())),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Wire envelopes: self-describing CBOR maps carried on each topic.
//!
//! This module owns the mapping between in-memory messages and their wire
//! form.  No I/O happens here.
//!
//! # Versioned decode
//!
//! The protocol has shipped two header shapes, so several logical values are
//! readable under more than one key.  Every logical value is described by a
//! [`Field`]: a logical name plus an ordered list of accepted wire keys.  The
//! decoder tries the keys in order and uses the first one present, once, at
//! decode time; everything downstream only sees the canonical struct.
//!
//! | Logical       | Wire keys (priority order) |
//! |---------------|----------------------------|
//! | `object_id`   | `file_id`                  |
//! | `chunk_count` | `total`, `chunks`          |
//! | `size_wire`   | `size`, `size_comp`        |
//! | `payload`     | `payload`, `data`          |
//!
//! Encoders write **both** aliases for `chunk_count` and `size_wire` so that
//! readers of either shape keep working.

use std::time::{SystemTime, UNIX_EPOCH};

use ciborium::value::Value;
use thiserror::Error;

use crate::chunk::Chunk;
use crate::encoding::Encoding;

/// `type` discriminator written into telemetry envelopes.
pub const TYPE_TELEMETRY: u64 = 0;
/// `type` discriminator written into object headers.
pub const TYPE_OBJECT: u64 = 1;

// ---------------------------------------------------------------------------
// Field tables
// ---------------------------------------------------------------------------

/// A logical field and the wire keys it may appear under.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub logical: &'static str,
    pub wire: &'static [&'static str],
}

impl Field {
    /// Key written by the encoder (the highest-priority alias).
    pub fn primary(&self) -> &'static str {
        self.wire[0]
    }
}

pub mod fields {
    use super::Field;

    pub const OBJECT_ID: Field = Field {
        logical: "object_id",
        wire: &["file_id"],
    };
    pub const NAME: Field = Field {
        logical: "name",
        wire: &["name"],
    };
    pub const TIMESTAMP: Field = Field {
        logical: "timestamp",
        wire: &["ts"],
    };
    pub const SEQUENCE: Field = Field {
        logical: "sequence",
        wire: &["seq"],
    };
    pub const ENCODING: Field = Field {
        logical: "encoding",
        wire: &["enc"],
    };
    pub const SIZE_RAW: Field = Field {
        logical: "size_raw",
        wire: &["size_raw"],
    };
    pub const SIZE_WIRE: Field = Field {
        logical: "size_wire",
        wire: &["size", "size_comp"],
    };
    pub const CHUNK_COUNT: Field = Field {
        logical: "chunk_count",
        wire: &["total", "chunks"],
    };
    pub const DIGEST: Field = Field {
        logical: "digest",
        wire: &["sha256"],
    };
    pub const INDEX: Field = Field {
        logical: "index",
        wire: &["idx"],
    };
    pub const CHECKSUM: Field = Field {
        logical: "checksum",
        wire: &["crc"],
    };
    pub const PAYLOAD: Field = Field {
        logical: "payload",
        wire: &["payload", "data"],
    };
    pub const TYPE: Field = Field {
        logical: "type",
        wire: &["type"],
    };
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A message could not be turned into a canonical envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed CBOR: {0}")]
    Malformed(String),
    #[error("envelope is not a map")]
    NotAMap,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has the wrong type or is out of range")]
    WrongType(&'static str),
    #[error("unknown encoding {0:?}")]
    UnknownEncoding(String),
    #[error("chunk index {index} out of range for {chunk_count} chunks")]
    IndexOutOfRange { index: u32, chunk_count: u32 },
    #[error("malformed presence marker {0:?}")]
    Presence(String),
}

/// A message could not be serialised.
#[derive(Debug, Error)]
#[error("failed to encode envelope: {0}")]
pub struct EncodeError(String);

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Per-object announcement published before any chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub object_id: String,
    /// Original object name; its extension names the saved file.
    pub name: String,
    /// Send time, nanoseconds since the Unix epoch.
    pub timestamp: u64,
    pub sequence: u64,
    pub encoding: Encoding,
    pub size_raw: u64,
    /// Byte count after encoding (what the chunks add up to).
    pub size_wire: u64,
    pub chunk_count: u32,
    /// Hex SHA-256 of the wire bytes.
    pub digest: String,
}

impl TransferHeader {
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        to_cbor(Value::Map(vec![
            entry(fields::OBJECT_ID.primary(), self.object_id.as_str()),
            entry(fields::NAME.primary(), self.name.as_str()),
            entry(fields::TIMESTAMP.primary(), self.timestamp),
            entry(fields::SEQUENCE.primary(), self.sequence),
            entry(fields::ENCODING.primary(), self.encoding.as_str()),
            entry(fields::SIZE_RAW.primary(), self.size_raw),
            entry("size", self.size_wire),
            entry("size_comp", self.size_wire),
            entry("total", self.chunk_count),
            entry("chunks", self.chunk_count),
            entry(fields::DIGEST.primary(), self.digest.as_str()),
            entry(fields::TYPE.primary(), TYPE_OBJECT),
        ]))
    }

    /// Decode a header, applying alias resolution and defaults.
    ///
    /// `file_id`, a chunk count and `sha256` are required.  A missing name
    /// defaults to `<object_id>.dat`, a missing timestamp to the local clock,
    /// a missing encoding to `raw`, and missing sizes / sequence to 0.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let value = from_cbor(buf)?;
        let map = MapView::new(&value)?;

        let object_id = map.require_text(&fields::OBJECT_ID)?.to_owned();
        let name = match map.text(&fields::NAME)? {
            Some(name) => name.to_owned(),
            None => format!("{object_id}.dat"),
        };
        let encoding = match map.text(&fields::ENCODING)? {
            Some(enc) => enc
                .parse()
                .map_err(|_| DecodeError::UnknownEncoding(enc.to_owned()))?,
            None => Encoding::Raw,
        };

        Ok(Self {
            name,
            timestamp: map.u64(&fields::TIMESTAMP)?.unwrap_or_else(now_nanos),
            sequence: map.u64(&fields::SEQUENCE)?.unwrap_or(0),
            encoding,
            size_raw: map.u64(&fields::SIZE_RAW)?.unwrap_or(0),
            size_wire: map.u64(&fields::SIZE_WIRE)?.unwrap_or(0),
            chunk_count: map.require_u32(&fields::CHUNK_COUNT)?,
            digest: map.require_text(&fields::DIGEST)?.to_owned(),
            object_id,
        })
    }
}

impl Chunk {
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        to_cbor(Value::Map(vec![
            entry(fields::OBJECT_ID.primary(), self.object_id.as_str()),
            entry(fields::INDEX.primary(), self.index),
            entry("total", self.chunk_count),
            entry(fields::CHECKSUM.primary(), self.checksum),
            entry(fields::PAYLOAD.primary(), Value::Bytes(self.payload.clone())),
        ]))
    }

    /// Decode a chunk.  The checksum is **not** verified here; see
    /// [`Chunk::verify`].
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let value = from_cbor(buf)?;
        let map = MapView::new(&value)?;

        let index = map.require_u32(&fields::INDEX)?;
        let chunk_count = map.require_u32(&fields::CHUNK_COUNT)?;
        if index >= chunk_count {
            return Err(DecodeError::IndexOutOfRange { index, chunk_count });
        }

        Ok(Self {
            object_id: map.require_text(&fields::OBJECT_ID)?.to_owned(),
            index,
            chunk_count,
            checksum: map.require_u32(&fields::CHECKSUM)?,
            payload: map.require_bytes(&fields::PAYLOAD)?.to_vec(),
        })
    }
}

/// Single-message telemetry envelope: an encoded sample plus its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEnvelope {
    pub timestamp: u64,
    pub sequence: u64,
    pub encoding: Encoding,
    /// CRC-32 of `payload` (the encoded sample bytes).
    pub checksum: u32,
    pub payload: Vec<u8>,
}

impl TelemetryEnvelope {
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        to_cbor(Value::Map(vec![
            entry(fields::TIMESTAMP.primary(), self.timestamp),
            entry(fields::SEQUENCE.primary(), self.sequence),
            entry(fields::TYPE.primary(), TYPE_TELEMETRY),
            entry(fields::ENCODING.primary(), self.encoding.as_str()),
            entry(fields::CHECKSUM.primary(), self.checksum),
            entry(fields::PAYLOAD.primary(), Value::Bytes(self.payload.clone())),
        ]))
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let value = from_cbor(buf)?;
        let map = MapView::new(&value)?;

        let enc = map.require_text(&fields::ENCODING)?;
        Ok(Self {
            timestamp: map.require_u64(&fields::TIMESTAMP)?,
            sequence: map.require_u64(&fields::SEQUENCE)?,
            encoding: enc
                .parse()
                .map_err(|_| DecodeError::UnknownEncoding(enc.to_owned()))?,
            checksum: map.require_u32(&fields::CHECKSUM)?,
            payload: map.require_bytes(&fields::PAYLOAD)?.to_vec(),
        })
    }
}

/// Liveness marker on the status topic: `<client_id>:online|offline`.
///
/// Plain UTF-8 text rather than CBOR, so brokers can attach it as a
/// last-will payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub client_id: String,
    pub online: bool,
}

impl Presence {
    pub fn online(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            online: true,
        }
    }

    pub fn offline(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            online: false,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let marker = if self.online { "online" } else { "offline" };
        format!("{}:{marker}", self.client_id).into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(buf)
            .map_err(|_| DecodeError::Presence(String::from_utf8_lossy(buf).into_owned()))?;
        let (client_id, marker) = text
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| DecodeError::Presence(text.to_owned()))?;
        let online = match marker {
            "online" => true,
            "offline" => false,
            _ => return Err(DecodeError::Presence(text.to_owned())),
        };
        if client_id.is_empty() {
            return Err(DecodeError::Presence(text.to_owned()));
        }
        Ok(Self { client_id: client_id.to_owned(), online })
    }
}

// ---------------------------------------------------------------------------
// CBOR helpers
// ---------------------------------------------------------------------------

/// Current time in nanoseconds since the Unix epoch (0 if the clock is
/// before the epoch).
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn entry(key: &str, value: impl Into<Value>) -> (Value, Value) {
    (Value::Text(key.to_owned()), value.into())
}

pub(crate) fn to_cbor(value: Value) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&value, &mut buf).map_err(|e| EncodeError(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn from_cbor(buf: &[u8]) -> Result<Value, DecodeError> {
    ciborium::de::from_reader(buf).map_err(|e| DecodeError::Malformed(e.to_string()))
}

/// Read-only view of a CBOR map with alias-aware typed lookups.
pub(crate) struct MapView<'a> {
    entries: &'a [(Value, Value)],
}

impl<'a> MapView<'a> {
    pub(crate) fn new(value: &'a Value) -> Result<Self, DecodeError> {
        match value {
            Value::Map(entries) => Ok(Self { entries }),
            _ => Err(DecodeError::NotAMap),
        }
    }

    /// All entries with a text key, in wire order.
    pub(crate) fn text_entries(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| k.as_text().map(|k| (k, v)))
    }

    /// First present wire key of `field`, in priority order.
    fn lookup(&self, field: &Field) -> Option<&'a Value> {
        field.wire.iter().find_map(|name| {
            self.entries
                .iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v)
        })
    }

    pub(crate) fn u64(&self, field: &Field) -> Result<Option<u64>, DecodeError> {
        match self.lookup(field) {
            None => Ok(None),
            Some(Value::Integer(i)) => u64::try_from(*i)
                .map(Some)
                .map_err(|_| DecodeError::WrongType(field.logical)),
            Some(_) => Err(DecodeError::WrongType(field.logical)),
        }
    }

    pub(crate) fn require_u64(&self, field: &Field) -> Result<u64, DecodeError> {
        self.u64(field)?.ok_or(DecodeError::MissingField(field.logical))
    }

    pub(crate) fn require_u32(&self, field: &Field) -> Result<u32, DecodeError> {
        u32::try_from(self.require_u64(field)?).map_err(|_| DecodeError::WrongType(field.logical))
    }

    pub(crate) fn text(&self, field: &Field) -> Result<Option<&'a str>, DecodeError> {
        match self.lookup(field) {
            None => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(DecodeError::WrongType(field.logical)),
        }
    }

    pub(crate) fn require_text(&self, field: &Field) -> Result<&'a str, DecodeError> {
        self.text(field)?.ok_or(DecodeError::MissingField(field.logical))
    }

    pub(crate) fn require_bytes(&self, field: &Field) -> Result<&'a [u8], DecodeError> {
        match self.lookup(field) {
            None => Err(DecodeError::MissingField(field.logical)),
            Some(Value::Bytes(b)) => Ok(b.as_slice()),
            Some(_) => Err(DecodeError::WrongType(field.logical)),
        }
    }
}

//! Telemetry samples: the single-message case of the transfer protocol.
//!
//! A [`TelemetrySample`] is serialised to a CBOR map, encoded, and wrapped in
//! a [`TelemetryEnvelope`] whose checksum covers the encoded bytes.  There is
//! no chunking and no receiver state: each envelope decodes on its own.
//!
//! ```text
//!  sample ──cbor──▶ body ──encode──▶ payload ──crc32──▶ envelope { ts, seq, enc, crc, payload }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ciborium::value::Value;
use thiserror::Error;

use crate::config::TransferConfig;
use crate::encoding::{CodecError, Encoding};
use crate::envelope::{
    fields, from_cbor, now_nanos, to_cbor, DecodeError, EncodeError, MapView, TelemetryEnvelope,
};
use crate::integrity;
use crate::sender::{publish_with_retry, SendError};
use crate::transport::Transport;

/// Errors sealing or opening a telemetry envelope.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Checksum { expected: u32, actual: u32 },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// One reading: timestamp, sequence and named scalar values.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    /// Nanoseconds since the Unix epoch.
    pub timestamp: u64,
    pub sequence: u64,
    pub fields: BTreeMap<String, f64>,
}

impl TelemetrySample {
    /// Empty sample stamped with the current time.
    pub fn new(sequence: u64) -> Self {
        Self {
            timestamp: now_nanos(),
            sequence,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, EncodeError> {
        let mut entries = vec![
            (
                Value::Text(fields::TIMESTAMP.primary().into()),
                Value::from(self.timestamp),
            ),
            (
                Value::Text(fields::SEQUENCE.primary().into()),
                Value::from(self.sequence),
            ),
        ];
        for (name, value) in &self.fields {
            entries.push((Value::Text(name.clone()), Value::Float(*value)));
        }
        to_cbor(Value::Map(entries))
    }

    /// Parse a sample body.  `ts` and `seq` are required; every other
    /// numeric entry becomes a field and non-numeric entries are ignored.
    pub fn from_cbor(buf: &[u8]) -> Result<Self, DecodeError> {
        let value = from_cbor(buf)?;
        let map = MapView::new(&value)?;

        let timestamp = map.require_u64(&fields::TIMESTAMP)?;
        let sequence = map.require_u64(&fields::SEQUENCE)?;

        let reserved = [fields::TIMESTAMP.primary(), fields::SEQUENCE.primary()];
        let fields = map
            .text_entries()
            .filter(|(k, _)| !reserved.contains(k))
            .filter_map(|(k, v)| scalar(v).map(|x| (k.to_owned(), x)))
            .collect();

        Ok(Self {
            timestamp,
            sequence,
            fields,
        })
    }
}

fn scalar(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Integer(i) => Some(i128::from(*i) as f64),
        _ => None,
    }
}

impl TelemetryEnvelope {
    /// Serialise, encode and checksum `sample`.
    pub fn seal(
        sample: &TelemetrySample,
        encoding: Encoding,
        level: i32,
    ) -> Result<Self, TelemetryError> {
        let body = sample.to_cbor()?;
        let payload = encoding.compress(&body, level)?;
        Ok(Self {
            timestamp: sample.timestamp,
            sequence: sample.sequence,
            encoding,
            checksum: integrity::checksum(&payload),
            payload,
        })
    }

    /// Verify the checksum, decode, and parse the sample.
    pub fn open(&self) -> Result<TelemetrySample, TelemetryError> {
        let actual = integrity::checksum(&self.payload);
        if actual != self.checksum {
            return Err(TelemetryError::Checksum {
                expected: self.checksum,
                actual,
            });
        }
        let body = self.encoding.decompress(&self.payload)?;
        Ok(TelemetrySample::from_cbor(&body)?)
    }
}

/// Publishes telemetry samples, one message each.
#[derive(Debug)]
pub struct TelemetryPublisher<T> {
    transport: T,
    config: TransferConfig,
    next_sequence: AtomicU64,
}

impl<T: Transport> TelemetryPublisher<T> {
    pub fn new(transport: T, config: TransferConfig) -> Self {
        Self {
            transport,
            config,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Empty sample carrying the publisher's next sequence number.
    pub fn next_sample(&self) -> TelemetrySample {
        TelemetrySample::new(self.next_sequence.fetch_add(1, Ordering::Relaxed))
    }

    /// Seal and publish `sample` with the configured retry budget.
    ///
    /// Returns the number of attempts used.
    pub async fn publish(&self, sample: &TelemetrySample) -> Result<u32, SendError> {
        let envelope = TelemetryEnvelope::seal(
            sample,
            self.config.telemetry_encoding,
            self.config.telemetry_level,
        )?;
        let bytes = envelope.encode()?;
        let attempts = publish_with_retry(
            &self.transport,
            &self.config.topics.telemetry,
            &bytes,
            &self.config.retry,
        )
        .await?;
        log::debug!(
            "[tx] → telemetry seq={} ({} bytes, {} attempt(s))",
            sample.sequence,
            bytes.len(),
            attempts
        );
        Ok(attempts)
    }
}

//! Protocol parameters for both ends.
//!
//! There is no config file: the binary maps CLI flags onto these structs and
//! library users build them directly.  `Default` carries the deployed values.

use std::time::Duration;

use crate::chunk::DEFAULT_CHUNK_SIZE;
use crate::encoding::{Encoding, OBJECT_LEVEL, TELEMETRY_LEVEL};
use crate::timer::RetryPolicy;

/// Topic names for each message class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Object headers.
    pub meta: String,
    /// Object chunks.
    pub chunk: String,
    pub telemetry: String,
    /// Presence markers.
    pub status: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            meta: "sat/image".into(),
            chunk: "sat/image/chunk".into(),
            telemetry: "sat/telemetry".into(),
            status: "sat/status".into(),
        }
    }
}

/// What kind of message a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass {
    Meta,
    Chunk,
    Telemetry,
    Status,
}

impl Topics {
    /// Classify an inbound topic; `None` for topics this protocol does not use.
    pub fn classify(&self, topic: &str) -> Option<TopicClass> {
        if topic == self.meta {
            Some(TopicClass::Meta)
        } else if topic == self.chunk {
            Some(TopicClass::Chunk)
        } else if topic == self.telemetry {
            Some(TopicClass::Telemetry)
        } else if topic == self.status {
            Some(TopicClass::Status)
        } else {
            None
        }
    }
}

/// Sender-side parameters.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum payload bytes per chunk.
    pub chunk_size: usize,
    /// Encoding applied to objects.
    pub encoding: Encoding,
    /// zstd level for objects.
    pub object_level: i32,
    /// Encoding applied to telemetry samples.
    pub telemetry_encoding: Encoding,
    /// zstd level for telemetry.
    pub telemetry_level: i32,
    pub retry: RetryPolicy,
    pub topics: Topics,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            encoding: Encoding::Zstd,
            object_level: OBJECT_LEVEL,
            telemetry_encoding: Encoding::Zstd,
            telemetry_level: TELEMETRY_LEVEL,
            retry: RetryPolicy::default(),
            topics: Topics::default(),
        }
    }
}

/// Receiver-side parameters.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub topics: Topics,
    /// Records idle longer than this are evicted by a sweep.
    pub stale_after: Duration,
    /// How often the receive loop sweeps.
    pub sweep_interval: Duration,
    /// Upper bound on concurrently pending records.
    pub max_pending: usize,
    /// Largest chunk count accepted for one object.
    pub max_chunk_count: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            topics: Topics::default(),
            stale_after: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(30),
            max_pending: 256,
            max_chunk_count: 65_536,
        }
    }
}

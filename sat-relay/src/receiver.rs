//! Inbound reassembly engine and receive loop.
//!
//! [`ReassemblyEngine`] is the receiver's single entry point: every delivered
//! message goes through [`ReassemblyEngine::handle_message`], one at a time.
//! The engine is synchronous and owns its [`ReassemblyStore`] outright, so no
//! locking is needed; concurrency lives in [`run_receiver`], which feeds it
//! from a channel and sweeps stale records on a timer.
//!
//! # Per-topic behaviour
//!
//! | Topic class | Action                                                        |
//! |-------------|---------------------------------------------------------------|
//! | meta        | Decode header, store it (last write wins), try finalize.      |
//! | chunk       | Decode, verify CRC (drop on mismatch), store part, try finalize. |
//! | telemetry   | Decode envelope, verify CRC, decode sample.                   |
//! | status      | Decode presence marker.                                       |
//!
//! # Finalize
//!
//! Runs after every record mutation and is a no-op until the record is
//! complete.  Then: join parts, compare the digest of the wire bytes, decode,
//! and hand back a [`ReceivedObject`] tagged verified or corrupt.  The record
//! is removed as the last step, so finalize runs at most once per object.

use std::path::Path;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::chunk::{self, Chunk};
use crate::config::{ReceiverConfig, TopicClass};
use crate::envelope::{DecodeError, Presence, TelemetryEnvelope, TransferHeader};
use crate::integrity;
use crate::sink::ObjectSink;
use crate::store::{ReassemblyRecord, ReassemblyStore, StaleRecord};
use crate::telemetry::{TelemetryError, TelemetrySample};
use crate::transport::Message;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a message was dropped.  Never fatal to the engine.
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("message on unknown topic {0:?}")]
    UnknownTopic(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("chunk {index} of {object_id} failed CRC: expected {expected:#010x}, got {actual:#010x}")]
    ChunkIntegrity {
        object_id: String,
        index: u32,
        expected: u32,
        actual: u32,
    },
    #[error("{object_id} announces {chunk_count} chunks, limit is {max}")]
    TooManyChunks {
        object_id: String,
        chunk_count: u32,
        max: u32,
    },
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// A complete object failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectIntegrityError {
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("decompression failed: {0}")]
    Decompression(String),
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Verified,
    Corrupt(ObjectIntegrityError),
}

/// A finalized object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedObject {
    pub header: TransferHeader,
    /// Decoded bytes, or the raw wire bytes when decoding failed.
    pub data: Vec<u8>,
    pub disposition: Disposition,
}

impl ReceivedObject {
    pub fn is_verified(&self) -> bool {
        self.disposition == Disposition::Verified
    }

    /// `img_<timestamp>_<sequence>[.corrupt]<ext>`, with the extension taken
    /// from the header name (`.bin` when it has none).
    pub fn file_name(&self) -> String {
        let ext = Path::new(&self.header.name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| ".bin".to_owned());
        let tag = if self.is_verified() { "" } else { ".corrupt" };
        format!(
            "img_{}_{}{tag}{ext}",
            self.header.timestamp, self.header.sequence
        )
    }
}

/// What a handled message produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Object(ReceivedObject),
    Telemetry(TelemetrySample),
    Presence(Presence),
}

// ---------------------------------------------------------------------------
// ReassemblyEngine
// ---------------------------------------------------------------------------

/// Receiver-side state machine: one record per in-flight object.
#[derive(Debug)]
pub struct ReassemblyEngine {
    config: ReceiverConfig,
    store: ReassemblyStore,
}

impl ReassemblyEngine {
    pub fn new(config: ReceiverConfig) -> Self {
        let store = ReassemblyStore::new(config.max_pending, config.stale_after);
        Self { config, store }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Number of objects still being reassembled.
    pub fn pending(&self) -> usize {
        self.store.len()
    }

    pub fn record(&self, object_id: &str) -> Option<&ReassemblyRecord> {
        self.store.get(object_id)
    }

    /// Process one delivered message.
    ///
    /// Returns `Ok(None)` when the message was absorbed without completing
    /// anything, and `Err` when it was dropped.
    pub fn handle_message(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<Delivery>, ReceiveError> {
        self.handle_message_at(topic, payload, Instant::now())
    }

    /// [`handle_message`](Self::handle_message) with an explicit clock.
    pub fn handle_message_at(
        &mut self,
        topic: &str,
        payload: &[u8],
        now: Instant,
    ) -> Result<Option<Delivery>, ReceiveError> {
        match self.config.topics.classify(topic) {
            Some(TopicClass::Meta) => self.on_header(TransferHeader::decode(payload)?, now),
            Some(TopicClass::Chunk) => self.on_chunk(Chunk::decode(payload)?, now),
            Some(TopicClass::Telemetry) => {
                let sample = TelemetryEnvelope::decode(payload)?.open()?;
                log::debug!("[rx] ← telemetry seq={}", sample.sequence);
                Ok(Some(Delivery::Telemetry(sample)))
            }
            Some(TopicClass::Status) => Ok(Some(Delivery::Presence(Presence::decode(payload)?))),
            None => Err(ReceiveError::UnknownTopic(topic.to_owned())),
        }
    }

    /// Remove and report every record idle past `stale_after`.
    pub fn sweep(&mut self, now: Instant) -> Vec<StaleRecord> {
        self.store.sweep(now)
    }

    fn on_header(
        &mut self,
        header: TransferHeader,
        now: Instant,
    ) -> Result<Option<Delivery>, ReceiveError> {
        self.check_count(&header.object_id, header.chunk_count)?;
        if self.store.is_finalized(&header.object_id, now) {
            log::debug!("[rx] ← header {} (already finalized, dropped)", header.object_id);
            return Ok(None);
        }
        log::debug!(
            "[rx] ← header {} enc={} chunks={}",
            header.object_id,
            header.encoding,
            header.chunk_count
        );

        let object_id = header.object_id.clone();
        let (record, evicted) = self.store.entry(&object_id, now);
        record.set_header(header, now);
        report_evicted(&evicted);
        Ok(self.try_finalize(&object_id, now))
    }

    fn on_chunk(&mut self, chunk: Chunk, now: Instant) -> Result<Option<Delivery>, ReceiveError> {
        let actual = chunk.actual_checksum();
        if actual != chunk.checksum {
            return Err(ReceiveError::ChunkIntegrity {
                object_id: chunk.object_id,
                index: chunk.index,
                expected: chunk.checksum,
                actual,
            });
        }
        self.check_count(&chunk.object_id, chunk.chunk_count)?;
        if self.store.is_finalized(&chunk.object_id, now) {
            log::trace!(
                "[rx] ← chunk {}/{} of {} (already finalized, dropped)",
                chunk.index,
                chunk.chunk_count,
                chunk.object_id
            );
            return Ok(None);
        }

        // Once a header is known its count decides the valid index range.
        if let Some(header) = self.store.get(&chunk.object_id).and_then(|r| r.header()) {
            if chunk.index >= header.chunk_count {
                return Err(DecodeError::IndexOutOfRange {
                    index: chunk.index,
                    chunk_count: header.chunk_count,
                }
                .into());
            }
        }

        let (record, evicted) = self.store.entry(&chunk.object_id, now);
        let fresh = record.insert_part(chunk.index, chunk.payload, chunk.chunk_count, now);
        log::trace!(
            "[rx] ← chunk {}/{} of {}{}",
            chunk.index,
            chunk.chunk_count,
            chunk.object_id,
            if fresh { "" } else { " (dup)" }
        );
        report_evicted(&evicted);
        Ok(self.try_finalize(&chunk.object_id, now))
    }

    fn check_count(&self, object_id: &str, chunk_count: u32) -> Result<(), ReceiveError> {
        if chunk_count > self.config.max_chunk_count {
            return Err(ReceiveError::TooManyChunks {
                object_id: object_id.to_owned(),
                chunk_count,
                max: self.config.max_chunk_count,
            });
        }
        Ok(())
    }

    fn try_finalize(&mut self, object_id: &str, now: Instant) -> Option<Delivery> {
        let record = self.store.get(object_id)?;
        if !record.is_complete() {
            return None;
        }
        let header = record.header()?.clone();
        let wire = match chunk::join(record.parts(), header.chunk_count) {
            Ok(wire) => wire,
            Err(e) => {
                log::error!("[rx] {object_id} looked complete but {e}");
                return None;
            }
        };
        self.store.mark_finalized(object_id, now);
        self.store.remove(object_id);
        Some(Delivery::Object(finalize(header, wire)))
    }
}

/// Verify and decode a fully assembled object.
fn finalize(header: TransferHeader, wire: Vec<u8>) -> ReceivedObject {
    if header.size_wire != 0 && header.size_wire != wire.len() as u64 {
        log::warn!(
            "[rx] {} wire size mismatch: header says {}, assembled {}",
            header.object_id,
            header.size_wire,
            wire.len()
        );
    }
    let digest_ok = integrity::digest_matches(&wire, &header.digest);
    let mut disposition = if digest_ok {
        Disposition::Verified
    } else {
        Disposition::Corrupt(ObjectIntegrityError::DigestMismatch {
            expected: header.digest.clone(),
            actual: integrity::digest(&wire),
        })
    };

    let data = match header.encoding.decompress(&wire) {
        Ok(raw) => raw,
        Err(e) => {
            if disposition == Disposition::Verified {
                let cause = ObjectIntegrityError::Decompression(e.to_string());
                disposition = Disposition::Corrupt(cause);
            }
            wire
        }
    };

    match &disposition {
        Disposition::Verified => {
            if header.size_raw != 0 && header.size_raw != data.len() as u64 {
                log::warn!(
                    "[rx] {} size mismatch: header says {}, got {}",
                    header.object_id,
                    header.size_raw,
                    data.len()
                );
            }
            log::info!(
                "[rx] {} complete: {} byte(s), digest ok",
                header.object_id,
                data.len()
            );
        }
        Disposition::Corrupt(e) => log::warn!("[rx] {} corrupt: {e}", header.object_id),
    }

    ReceivedObject {
        header,
        data,
        disposition,
    }
}

fn report_evicted(evicted: &[StaleRecord]) {
    for s in evicted {
        log::warn!(
            "[rx] store full; evicted {} ({}/{} chunk(s), idle {:?})",
            s.object_id,
            s.parts_received,
            s.expected_chunks.map_or_else(|| "?".to_owned(), |n| n.to_string()),
            s.idle
        );
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

/// Counters for one run of [`run_receiver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub messages: u64,
    pub verified: u64,
    pub corrupt: u64,
    pub telemetry: u64,
    pub presence: u64,
    /// Messages dropped by the engine.
    pub dropped: u64,
    /// Records removed by sweeps.
    pub stale: u64,
    pub write_failures: u64,
}

/// Drive `engine` from `inbox` until the channel closes.
///
/// Finalized objects go to `sink`; telemetry and presence are logged.  Stale
/// records are swept every `sweep_interval`.  Returns the engine and the
/// run's counters.
pub async fn run_receiver<S: ObjectSink>(
    mut engine: ReassemblyEngine,
    mut inbox: mpsc::UnboundedReceiver<Message>,
    sink: &mut S,
) -> (ReassemblyEngine, ReceiverStats) {
    let mut stats = ReceiverStats::default();
    let mut sweep = tokio::time::interval(engine.config().sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    sweep.tick().await;

    loop {
        tokio::select! {
            msg = inbox.recv() => {
                let Some(msg) = msg else {
                    log::debug!("[rx] inbox closed; {} record(s) pending", engine.pending());
                    break;
                };
                stats.messages += 1;
                match engine.handle_message(&msg.topic, &msg.payload) {
                    Ok(Some(delivery)) => deliver(delivery, sink, &mut stats),
                    Ok(None) => {}
                    Err(e) => {
                        stats.dropped += 1;
                        log::warn!("[rx] dropped message on {}: {e}", msg.topic);
                    }
                }
            }
            _ = sweep.tick() => {
                for s in engine.sweep(Instant::now()) {
                    stats.stale += 1;
                    log::warn!(
                        "[rx] abandoning stale {}: {}/{} chunk(s), header {}, idle {:?}, age {:?}",
                        s.object_id,
                        s.parts_received,
                        s.expected_chunks.map_or_else(|| "?".to_owned(), |n| n.to_string()),
                        if s.has_header { "seen" } else { "missing" },
                        s.idle,
                        s.age
                    );
                }
            }
        }
    }

    (engine, stats)
}

fn deliver<S: ObjectSink>(delivery: Delivery, sink: &mut S, stats: &mut ReceiverStats) {
    match delivery {
        Delivery::Object(object) => {
            if object.is_verified() {
                stats.verified += 1;
            } else {
                stats.corrupt += 1;
            }
            match sink.store(&object) {
                Ok(path) => log::info!("[rx] saved {}", path.display()),
                Err(e) => {
                    stats.write_failures += 1;
                    log::error!("[rx] {e}");
                }
            }
        }
        Delivery::Telemetry(sample) => {
            stats.telemetry += 1;
            log::info!(
                "[rx] telemetry seq={} ts={} {:?}",
                sample.sequence,
                sample.timestamp,
                sample.fields
            );
        }
        Delivery::Presence(p) => {
            stats.presence += 1;
            let state = if p.online { "online" } else { "offline" };
            log::info!("[rx] {} is {state}", p.client_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::encoding::Encoding;

    const META: &str = "sat/image";
    const CHUNK: &str = "sat/image/chunk";

    fn frame(
        id: &str,
        wire: &[u8],
        size: usize,
        digest: Option<String>,
    ) -> (Vec<u8>, Vec<Vec<u8>>) {
        let chunks = chunk::split(id, wire, size);
        let header = TransferHeader {
            object_id: id.into(),
            name: "pic.png".into(),
            timestamp: 99,
            sequence: 1,
            encoding: Encoding::Raw,
            size_raw: wire.len() as u64,
            size_wire: wire.len() as u64,
            chunk_count: chunks.len() as u32,
            digest: digest.unwrap_or_else(|| integrity::digest(wire)),
        };
        let chunks = chunks.iter().map(|c| c.encode().unwrap()).collect();
        (header.encode().unwrap(), chunks)
    }

    fn object(d: Option<Delivery>) -> ReceivedObject {
        match d {
            Some(Delivery::Object(o)) => o,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn chunks_before_header_finalize_on_header() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let (h, cs) = frame("a", &[5u8; 30], 10, None);
        for c in &cs {
            assert!(e.handle_message(CHUNK, c).unwrap().is_none());
        }
        assert_eq!(e.record("a").unwrap().expected_chunks(), Some(3));
        let o = object(e.handle_message(META, &h).unwrap());
        assert!(o.is_verified());
        assert_eq!(o.data, vec![5u8; 30]);
        assert_eq!(e.pending(), 0);
    }

    #[test]
    fn duplicate_after_finalize_is_dropped() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let (h, cs) = frame("a", b"hi", 10, None);
        e.handle_message(META, &h).unwrap();
        assert!(e.handle_message(CHUNK, &cs[0]).unwrap().is_some());
        // A late redelivery must not emit the object a second time.
        assert!(e.handle_message(CHUNK, &cs[0]).unwrap().is_none());
        assert!(e.handle_message(META, &h).unwrap().is_none());
        assert_eq!(e.pending(), 0);
    }

    #[test]
    fn redelivered_empty_header_finalizes_once() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let (h, _) = frame("e", b"", 10, None);
        assert!(e.handle_message(META, &h).unwrap().is_some());
        assert!(e.handle_message(META, &h).unwrap().is_none());
        assert_eq!(e.pending(), 0);
    }

    #[test]
    fn finalized_id_is_forgotten_after_stale_window() {
        let cfg = ReceiverConfig {
            stale_after: Duration::from_secs(60),
            ..Default::default()
        };
        let mut e = ReassemblyEngine::new(cfg);
        let t0 = Instant::now();
        let (h, _) = frame("e", b"", 10, None);
        assert!(e.handle_message_at(META, &h, t0).unwrap().is_some());
        assert!(e.handle_message_at(META, &h, t0 + Duration::from_secs(30)).unwrap().is_none());
        let later = t0 + Duration::from_secs(61);
        assert!(e.sweep(later).is_empty());
        assert!(e.handle_message_at(META, &h, later).unwrap().is_some());
    }

    #[test]
    fn redeliveries_after_finalize_do_not_evict_live_records() {
        let cfg = ReceiverConfig {
            max_pending: 2,
            ..Default::default()
        };
        let mut e = ReassemblyEngine::new(cfg);
        let t0 = Instant::now();
        let at = |s: u64| t0 + Duration::from_secs(s);

        let (live_h, live_cs) = frame("live", &[7u8; 20], 10, None);
        e.handle_message_at(META, &live_h, at(0)).unwrap();
        e.handle_message_at(CHUNK, &live_cs[0], at(1)).unwrap();

        let done: Vec<_> = ["x", "y", "z"]
            .iter()
            .map(|id| frame(id, b"ok", 10, None))
            .collect();
        for (i, (h, cs)) in done.iter().enumerate() {
            let t = at(2 + i as u64);
            e.handle_message_at(META, h, t).unwrap();
            assert!(e.handle_message_at(CHUNK, &cs[0], t).unwrap().is_some());
        }

        // The broker redelivers every finished object.
        for (i, (h, cs)) in done.iter().enumerate() {
            let t = at(10 + i as u64);
            assert!(e.handle_message_at(META, h, t).unwrap().is_none());
            assert!(e.handle_message_at(CHUNK, &cs[0], t).unwrap().is_none());
        }
        assert_eq!(e.pending(), 1);

        let o = object(e.handle_message_at(CHUNK, &live_cs[1], at(20)).unwrap());
        assert!(o.is_verified());
        assert_eq!(o.data, vec![7u8; 20]);
    }

    #[test]
    fn wire_size_mismatch_still_delivers() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let (h, cs) = frame("w", b"abc", 10, None);
        let mut header = TransferHeader::decode(&h).unwrap();
        header.size_wire = 999;
        e.handle_message(META, &header.encode().unwrap()).unwrap();
        let o = object(e.handle_message(CHUNK, &cs[0]).unwrap());
        assert!(o.is_verified());
        assert_eq!(o.data, b"abc");
    }

    #[test]
    fn duplicate_header_is_idempotent() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let (h, cs) = frame("a", &[1u8; 20], 10, None);
        e.handle_message(META, &h).unwrap();
        e.handle_message(META, &h).unwrap();
        e.handle_message(CHUNK, &cs[0]).unwrap();
        assert!(e.handle_message(CHUNK, &cs[1]).unwrap().is_some());
    }

    #[test]
    fn corrupt_chunk_does_not_touch_store() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let mut c = Chunk::new("a", 0, 1, b"payload".to_vec());
        c.payload[0] ^= 0xff;
        let err = e.handle_message(CHUNK, &c.encode().unwrap()).unwrap_err();
        assert!(matches!(err, ReceiveError::ChunkIntegrity { index: 0, .. }));
        assert_eq!(e.pending(), 0);
    }

    #[test]
    fn index_beyond_header_count_is_rejected() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let (h, _) = frame("a", &[0u8; 20], 10, None);
        e.handle_message(META, &h).unwrap();
        let stray = Chunk::new("a", 4, 5, vec![0]);
        let err = e.handle_message(CHUNK, &stray.encode().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ReceiveError::Decode(DecodeError::IndexOutOfRange { index: 4, chunk_count: 2 })
        ));
    }

    #[test]
    fn digest_mismatch_is_emitted_corrupt() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let (h, cs) = frame("a", b"abc", 10, Some("00".repeat(32)));
        e.handle_message(META, &h).unwrap();
        let o = object(e.handle_message(CHUNK, &cs[0]).unwrap());
        assert!(matches!(
            o.disposition,
            Disposition::Corrupt(ObjectIntegrityError::DigestMismatch { .. })
        ));
        assert_eq!(o.file_name(), "img_99_1.corrupt.png");
        assert_eq!(e.pending(), 0);
    }

    #[test]
    fn undecodable_object_keeps_wire_bytes() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let wire = b"not zstd".to_vec();
        let header = TransferHeader {
            object_id: "z".into(),
            name: "z".into(),
            timestamp: 1,
            sequence: 2,
            encoding: Encoding::Zstd,
            size_raw: 100,
            size_wire: wire.len() as u64,
            chunk_count: 1,
            digest: integrity::digest(&wire),
        };
        e.handle_message(META, &header.encode().unwrap()).unwrap();
        let c = Chunk::new("z", 0, 1, wire.clone());
        let o = object(e.handle_message(CHUNK, &c.encode().unwrap()).unwrap());
        assert_eq!(o.data, wire);
        assert!(matches!(
            o.disposition,
            Disposition::Corrupt(ObjectIntegrityError::Decompression(_))
        ));
        assert_eq!(o.file_name(), "img_1_2.corrupt.bin");
    }

    #[test]
    fn empty_object_finalizes_on_header() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let (h, cs) = frame("e", b"", 10, None);
        assert!(cs.is_empty());
        let o = object(e.handle_message(META, &h).unwrap());
        assert!(o.is_verified());
        assert!(o.data.is_empty());
    }

    #[test]
    fn oversized_chunk_count_is_refused() {
        let cfg = ReceiverConfig {
            max_chunk_count: 4,
            ..Default::default()
        };
        let mut e = ReassemblyEngine::new(cfg);
        let c = Chunk::new("big", 0, 5, vec![1]);
        let err = e.handle_message(CHUNK, &c.encode().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ReceiveError::TooManyChunks {
                chunk_count: 5,
                max: 4,
                ..
            }
        ));
        assert_eq!(e.pending(), 0);
    }

    #[test]
    fn unknown_topic_and_garbage_are_errors() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        assert!(matches!(
            e.handle_message("sat/other", b""),
            Err(ReceiveError::UnknownTopic(_))
        ));
        assert!(matches!(
            e.handle_message(META, b"\xff\xff"),
            Err(ReceiveError::Decode(_))
        ));
    }

    #[test]
    fn presence_is_delivered() {
        let mut e = ReassemblyEngine::new(ReceiverConfig::default());
        let d = e.handle_message("sat/status", b"jetson-pub:offline").unwrap();
        assert_eq!(d, Some(Delivery::Presence(Presence::offline("jetson-pub"))));
    }

    #[test]
    fn sweep_drops_idle_incomplete_records() {
        let cfg = ReceiverConfig {
            stale_after: Duration::from_secs(60),
            ..Default::default()
        };
        let mut e = ReassemblyEngine::new(cfg);
        let t0 = Instant::now();
        let (h, _) = frame("s", &[0u8; 30], 10, None);
        e.handle_message_at(META, &h, t0).unwrap();
        assert!(e.sweep(t0 + Duration::from_secs(30)).is_empty());
        let stale = e.sweep(t0 + Duration::from_secs(61));
        assert_eq!(stale.len(), 1);
        assert!(stale[0].has_header);
        assert_eq!(e.pending(), 0);
    }

    #[test]
    fn file_name_defaults_to_bin() {
        let (h, _) = frame("n", b"", 10, None);
        let mut header = TransferHeader::decode(&h).unwrap();
        header.name = "no_extension".into();
        let o = ReceivedObject {
            header,
            data: vec![],
            disposition: Disposition::Verified,
        };
        assert_eq!(o.file_name(), "img_99_1.bin");
    }
}

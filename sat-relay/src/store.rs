//! Per-object reassembly records and their lifecycle.
//!
//! The [`ReassemblyStore`] is owned by exactly one
//! [`crate::receiver::ReassemblyEngine`]; nothing else reads or mutates the
//! records.  A record is created by the first header or chunk for an object,
//! mutated by later arrivals, and removed exactly once: either by the engine
//! right after finalize, or by a sweep once it has been idle too long.
//!
//! ```text
//!   first header/chunk           more arrivals               complete
//!  ───────────────────▶ [record] ─────────────▶ [record] ───────────────▶ removed (finalize)
//!                           │
//!                           │ idle > stale_after, or store full
//!                           ▼
//!                        removed (StaleRecord report)
//! ```
//!
//! Finalized ids are remembered for `stale_after` (bounded, oldest forgotten
//! first) so the engine can drop late redeliveries of a finished object.
//!
//! Time is passed in explicitly so sweeps are deterministic under test.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::envelope::TransferHeader;

// ---------------------------------------------------------------------------
// ReassemblyRecord
// ---------------------------------------------------------------------------

/// Everything received so far for one object.
#[derive(Debug, Clone)]
pub struct ReassemblyRecord {
    header: Option<TransferHeader>,
    /// Verified chunk payloads keyed by index.
    parts: HashMap<u32, Vec<u8>>,
    /// Chunk count taken from the first chunk, until a header confirms it.
    tentative_count: Option<u32>,
    created_at: Instant,
    last_activity: Instant,
}

impl ReassemblyRecord {
    pub fn new(now: Instant) -> Self {
        Self {
            header: None,
            parts: HashMap::new(),
            tentative_count: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn header(&self) -> Option<&TransferHeader> {
        self.header.as_ref()
    }

    pub fn parts(&self) -> &HashMap<u32, Vec<u8>> {
        &self.parts
    }

    /// Store (or replace) the header.
    ///
    /// The header's chunk count is authoritative: parts with an index beyond
    /// it are discarded.
    pub fn set_header(&mut self, header: TransferHeader, now: Instant) {
        let count = header.chunk_count;
        self.parts.retain(|index, _| *index < count);
        if let Some(tentative) = self.tentative_count.take() {
            if tentative != count {
                log::warn!(
                    "[rx] {} header says {count} chunk(s), chunks said {tentative}",
                    header.object_id
                );
            }
        }
        self.header = Some(header);
        self.last_activity = now;
    }

    /// Store a verified chunk payload.  Returns `false` when the index was
    /// already present (the payload is overwritten either way).
    pub fn insert_part(
        &mut self,
        index: u32,
        payload: Vec<u8>,
        chunk_count: u32,
        now: Instant,
    ) -> bool {
        if self.header.is_none() && self.tentative_count.is_none() {
            self.tentative_count = Some(chunk_count);
        }
        self.last_activity = now;
        self.parts.insert(index, payload).is_none()
    }

    /// Chunk count from the header, else the tentative count from chunks.
    pub fn expected_chunks(&self) -> Option<u32> {
        self.header
            .as_ref()
            .map(|h| h.chunk_count)
            .or(self.tentative_count)
    }

    pub fn parts_received(&self) -> usize {
        self.parts.len()
    }

    /// A header is present and every index in `0..chunk_count` has a part.
    pub fn is_complete(&self) -> bool {
        // Parts beyond the header's count are pruned, so a length match means
        // every index is present.
        self.header
            .as_ref()
            .is_some_and(|h| self.parts.len() == h.chunk_count as usize)
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

// ---------------------------------------------------------------------------
// ReassemblyStore
// ---------------------------------------------------------------------------

/// Report for a record removed without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRecord {
    pub object_id: String,
    pub parts_received: usize,
    pub expected_chunks: Option<u32>,
    pub has_header: bool,
    pub idle: Duration,
    pub age: Duration,
}

impl StaleRecord {
    fn describe(object_id: String, record: &ReassemblyRecord, now: Instant) -> Self {
        Self {
            object_id,
            parts_received: record.parts_received(),
            expected_chunks: record.expected_chunks(),
            has_header: record.header.is_some(),
            idle: record.idle_for(now),
            age: record.age(now),
        }
    }
}

/// Default bound on remembered finalized ids, per allowed pending record.
const FINALIZED_PER_PENDING: usize = 16;

/// Bounded map from object id to [`ReassemblyRecord`].
///
/// Ids of finalized objects are remembered for `stale_after` so that late
/// redeliveries can be recognised and dropped instead of opening a new
/// record.
#[derive(Debug)]
pub struct ReassemblyStore {
    records: HashMap<String, ReassemblyRecord>,
    /// Finalized object id → time of finalize.
    finalized: HashMap<String, Instant>,
    max_pending: usize,
    max_finalized: usize,
    stale_after: Duration,
}

impl ReassemblyStore {
    /// # Panics
    ///
    /// Panics if `max_pending` is zero.
    pub fn new(max_pending: usize, stale_after: Duration) -> Self {
        assert!(max_pending >= 1, "max_pending must be at least 1");
        Self {
            records: HashMap::new(),
            finalized: HashMap::new(),
            max_pending,
            max_finalized: max_pending.saturating_mul(FINALIZED_PER_PENDING),
            stale_after,
        }
    }

    /// Remember at most `limit` finalized ids (at least one).
    pub fn with_finalized_limit(mut self, limit: usize) -> Self {
        self.max_finalized = limit.max(1);
        self
    }

    /// Note that `object_id` has been finalized at `now`.
    ///
    /// When the set is full, expired ids are dropped first, then the oldest.
    pub fn mark_finalized(&mut self, object_id: &str, now: Instant) {
        let full = self.finalized.len() >= self.max_finalized;
        if full && !self.finalized.contains_key(object_id) {
            self.expire_finalized(now);
            if self.finalized.len() >= self.max_finalized {
                let oldest = self
                    .finalized
                    .iter()
                    .min_by_key(|(_, at)| **at)
                    .map(|(id, _)| id.clone());
                if let Some(oldest) = oldest {
                    self.finalized.remove(&oldest);
                }
            }
        }
        self.finalized.insert(object_id.to_owned(), now);
    }

    /// `true` when `object_id` finalized less than `stale_after` ago.
    pub fn is_finalized(&self, object_id: &str, now: Instant) -> bool {
        self.finalized
            .get(object_id)
            .is_some_and(|at| now.saturating_duration_since(*at) <= self.stale_after)
    }

    pub fn finalized_len(&self) -> usize {
        self.finalized.len()
    }

    fn expire_finalized(&mut self, now: Instant) {
        let stale_after = self.stale_after;
        self.finalized
            .retain(|_, at| now.saturating_duration_since(*at) <= stale_after);
    }

    /// Record for `object_id`, created if absent.
    ///
    /// Creating a record in a full store first sweeps stale records; if the
    /// store is still full the longest-idle record is evicted.  Every record
    /// removed this way is returned.
    pub fn entry(
        &mut self,
        object_id: &str,
        now: Instant,
    ) -> (&mut ReassemblyRecord, Vec<StaleRecord>) {
        let mut evicted = Vec::new();
        if !self.records.contains_key(object_id) && self.records.len() >= self.max_pending {
            evicted = self.sweep(now);
            if self.records.len() >= self.max_pending {
                if let Some(victim) = self.longest_idle() {
                    if let Some(record) = self.records.remove(&victim) {
                        evicted.push(StaleRecord::describe(victim, &record, now));
                    }
                }
            }
        }
        let record = self
            .records
            .entry(object_id.to_owned())
            .or_insert_with(|| ReassemblyRecord::new(now));
        (record, evicted)
    }

    pub fn get(&self, object_id: &str) -> Option<&ReassemblyRecord> {
        self.records.get(object_id)
    }

    pub fn contains(&self, object_id: &str) -> bool {
        self.records.contains_key(object_id)
    }

    pub fn remove(&mut self, object_id: &str) -> Option<ReassemblyRecord> {
        self.records.remove(object_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Remove every record idle for longer than `stale_after`, and forget
    /// finalized ids older than that.
    pub fn sweep(&mut self, now: Instant) -> Vec<StaleRecord> {
        self.expire_finalized(now);
        let stale_after = self.stale_after;
        let stale: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.idle_for(now) > stale_after)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| {
                let record = self.records.remove(&id)?;
                Some(StaleRecord::describe(id, &record, now))
            })
            .collect()
    }

    fn longest_idle(&self) -> Option<String> {
        self.records
            .iter()
            .min_by_key(|(_, r)| r.last_activity)
            .map(|(id, _)| id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoding;

    fn header(id: &str, chunk_count: u32) -> TransferHeader {
        TransferHeader {
            object_id: id.into(),
            name: "x.bin".into(),
            timestamp: 1,
            sequence: 0,
            encoding: Encoding::Raw,
            size_raw: 0,
            size_wire: 0,
            chunk_count,
            digest: String::new(),
        }
    }

    #[test]
    fn complete_needs_header_and_all_parts() {
        let t0 = Instant::now();
        let mut r = ReassemblyRecord::new(t0);
        r.insert_part(0, vec![1], 2, t0);
        r.insert_part(1, vec![2], 2, t0);
        assert!(!r.is_complete());
        assert_eq!(r.expected_chunks(), Some(2));
        r.set_header(header("a", 2), t0);
        assert!(r.is_complete());
    }

    #[test]
    fn duplicate_part_is_idempotent() {
        let t0 = Instant::now();
        let mut r = ReassemblyRecord::new(t0);
        assert!(r.insert_part(0, vec![1], 3, t0));
        assert!(!r.insert_part(0, vec![1], 3, t0));
        assert_eq!(r.parts_received(), 1);
    }

    #[test]
    fn header_prunes_out_of_range_parts() {
        let t0 = Instant::now();
        let mut r = ReassemblyRecord::new(t0);
        r.insert_part(0, vec![1], 4, t0);
        r.insert_part(3, vec![4], 4, t0);
        r.set_header(header("a", 1), t0);
        assert_eq!(r.parts_received(), 1);
        assert!(r.is_complete());
    }

    #[test]
    fn zero_chunk_header_is_complete_on_arrival() {
        let t0 = Instant::now();
        let mut r = ReassemblyRecord::new(t0);
        r.set_header(header("empty", 0), t0);
        assert!(r.is_complete());
    }

    #[test]
    fn sweep_removes_only_idle_records() {
        let t0 = Instant::now();
        let mut store = ReassemblyStore::new(8, Duration::from_secs(60));
        store.entry("old", t0).0.insert_part(0, vec![0], 2, t0);
        let later = t0 + Duration::from_secs(50);
        store.entry("new", later).0.insert_part(0, vec![0], 2, later);

        let now = t0 + Duration::from_secs(90);
        let stale = store.sweep(now);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].object_id, "old");
        assert_eq!(stale[0].parts_received, 1);
        assert_eq!(stale[0].expected_chunks, Some(2));
        assert!(!stale[0].has_header);
        assert_eq!(stale[0].idle, Duration::from_secs(90));
        assert!(store.contains("new"));
        assert!(!store.contains("old"));
    }

    #[test]
    fn activity_keeps_a_record_alive() {
        let t0 = Instant::now();
        let mut store = ReassemblyStore::new(8, Duration::from_secs(60));
        store.entry("a", t0);
        let t1 = t0 + Duration::from_secs(50);
        store.entry("a", t1).0.insert_part(0, vec![0], 2, t1);
        assert!(store.sweep(t0 + Duration::from_secs(100)).is_empty());
        let age = store.get("a").map(|r| r.age(t0 + Duration::from_secs(100)));
        assert_eq!(age, Some(Duration::from_secs(100)));
    }

    #[test]
    fn full_store_evicts_longest_idle() {
        let t0 = Instant::now();
        let mut store = ReassemblyStore::new(2, Duration::from_secs(600));
        store.entry("a", t0);
        store.entry("b", t0 + Duration::from_secs(1));
        let (_, evicted) = store.entry("c", t0 + Duration::from_secs(2));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].object_id, "a");
        assert_eq!(store.len(), 2);
        assert!(store.contains("b") && store.contains("c"));
    }

    #[test]
    fn full_store_prefers_sweeping_stale_records() {
        let t0 = Instant::now();
        let mut store = ReassemblyStore::new(2, Duration::from_secs(10));
        store.entry("a", t0);
        store.entry("b", t0);
        let (_, evicted) = store.entry("c", t0 + Duration::from_secs(11));
        assert_eq!(evicted.len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn existing_record_never_triggers_eviction() {
        let t0 = Instant::now();
        let mut store = ReassemblyStore::new(1, Duration::from_secs(600));
        store.entry("a", t0);
        let (_, evicted) = store.entry("a", t0);
        assert!(evicted.is_empty());
    }

    #[test]
    fn finalized_ids_expire_with_the_sweep() {
        let t0 = Instant::now();
        let mut store = ReassemblyStore::new(4, Duration::from_secs(60));
        store.mark_finalized("done", t0);
        assert!(store.is_finalized("done", t0 + Duration::from_secs(60)));
        assert!(!store.is_finalized("other", t0));

        store.sweep(t0 + Duration::from_secs(61));
        assert!(!store.is_finalized("done", t0 + Duration::from_secs(61)));
        assert_eq!(store.finalized_len(), 0);
    }

    #[test]
    fn finalized_set_is_bounded() {
        let t0 = Instant::now();
        let mut store = ReassemblyStore::new(4, Duration::from_secs(600)).with_finalized_limit(2);
        store.mark_finalized("a", t0);
        store.mark_finalized("b", t0 + Duration::from_secs(1));
        store.mark_finalized("c", t0 + Duration::from_secs(2));
        assert_eq!(store.finalized_len(), 2);
        let now = t0 + Duration::from_secs(3);
        assert!(!store.is_finalized("a", now));
        assert!(store.is_finalized("b", now) && store.is_finalized("c", now));
    }
}

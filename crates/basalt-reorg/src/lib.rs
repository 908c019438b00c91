//! Reorg detector and anchor registry (spec §4.3): tracks the L1 block hash
//! seen at each height, detects when a new block arrives at a height whose
//! hash has changed, and cascades that into invalidating any anchor whose
//! L1 height is at or past the reorg point. Built on [`basalt_kv`]'s ordered
//! keyspace, using the `block:`, `anchor:`, `reorg:`, `reorg_counter` keys
//! from spec §6.
//!
//! Storage failures are logged and surfaced as `false`/`None` from the
//! mutating/reading methods respectively, matching spec §4.3's description
//! of an uninitialised store; the out-parameter the original takes for
//! storage errors becomes a `tracing::error!` call here, which is the
//! idiomatic Rust equivalent of an error callback nobody is forced to check.

use std::sync::Arc;

use basalt_config::ReorgDetectorConfig;
use basalt_kv::{KvStore, WriteBatch};
use basalt_primitives::AnchorHash;
use parking_lot::Mutex;
use tracing::error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AnchorStatus {
    Pending = 0,
    Confirmed = 1,
    InvalidatedReorg = 2,
    FailedOrphaned = 3,
}

impl AnchorStatus {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Pending),
            1 => Some(Self::Confirmed),
            2 => Some(Self::InvalidatedReorg),
            3 => Some(Self::FailedOrphaned),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnchorRecord {
    pub anchor_hash: AnchorHash,
    pub l1_tx_id: String,
    pub l1_height: u64,
    pub confirmations: u64,
    pub broadcast_time: u64,
    pub retry_count: u32,
    pub status: AnchorStatus,
    pub l2_state_root: basalt_primitives::Digest,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReorgEvent {
    pub reorg_height: u64,
    pub old_hash: String,
    pub new_hash: String,
    pub detected_at: u64,
    pub invalidated_anchors: Vec<AnchorHash>,
}

const BLOCK_PREFIX: &str = "block:";
const ANCHOR_PREFIX: &str = "anchor:";
const REORG_PREFIX: &str = "reorg:";
const REORG_COUNTER_KEY: &[u8] = b"reorg_counter";

fn block_key(height: u64) -> Vec<u8> {
    format!("{BLOCK_PREFIX}{height:020}").into_bytes()
}

fn anchor_key(hash: &str) -> Vec<u8> {
    format!("{ANCHOR_PREFIX}{hash}").into_bytes()
}

fn reorg_key(seq: u64) -> Vec<u8> {
    format!("{REORG_PREFIX}{seq:020}").into_bytes()
}

fn serialize_anchor(record: &AnchorRecord) -> Vec<u8> {
    format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        record.anchor_hash.to_hex(),
        record.l1_tx_id,
        record.l1_height,
        record.confirmations,
        record.broadcast_time,
        record.retry_count,
        record.status as u8,
        record.l2_state_root.to_hex(),
    )
    .into_bytes()
}

fn deserialize_anchor(bytes: &[u8]) -> Option<AnchorRecord> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut parts = text.splitn(8, '|');
    let anchor_hash = AnchorHash::from_hex(parts.next()?).ok()?;
    let l1_tx_id = parts.next()?.to_string();
    let l1_height: u64 = parts.next()?.parse().ok()?;
    let confirmations: u64 = parts.next()?.parse().ok()?;
    let broadcast_time: u64 = parts.next()?.parse().ok()?;
    let retry_count: u32 = parts.next()?.parse().ok()?;
    let status = AnchorStatus::from_u8(parts.next()?.parse().ok()?)?;
    let l2_state_root = basalt_primitives::Digest::from_hex(parts.next()?).ok()?;
    Some(AnchorRecord {
        anchor_hash,
        l1_tx_id,
        l1_height,
        confirmations,
        broadcast_time,
        retry_count,
        status,
        l2_state_root,
    })
}

fn serialize_reorg_event(event: &ReorgEvent) -> Vec<u8> {
    let mut out = format!(
        "{}|{}|{}|{}|{}",
        event.reorg_height,
        event.old_hash,
        event.new_hash,
        event.detected_at,
        event.invalidated_anchors.len(),
    );
    for anchor in &event.invalidated_anchors {
        out.push('|');
        out.push_str(&anchor.to_hex());
    }
    out.into_bytes()
}

fn deserialize_reorg_event(bytes: &[u8]) -> Option<ReorgEvent> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut parts = text.split('|');
    let reorg_height: u64 = parts.next()?.parse().ok()?;
    let old_hash = parts.next()?.to_string();
    let new_hash = parts.next()?.to_string();
    let detected_at: u64 = parts.next()?.parse().ok()?;
    let count: usize = parts.next()?.parse().ok()?;
    let mut invalidated_anchors = Vec::with_capacity(count);
    for _ in 0..count {
        invalidated_anchors.push(AnchorHash::from_hex(parts.next()?).ok()?);
    }
    Some(ReorgEvent {
        reorg_height,
        old_hash,
        new_hash,
        detected_at,
        invalidated_anchors,
    })
}

type ReorgCallback = Box<dyn Fn(&ReorgEvent) + Send + Sync>;

/// Tracks L1 block hashes by height, anchor lifecycle, and reorg history.
///
/// A detector with no backing store (`ReorgDetector::uninitialized`) is a
/// valid, inert value: every mutating method returns `false`, every reader
/// returns `None`/empty. This matches spec §4.3's "if the store is not
/// initialised, all mutating ops return false and reads return None", and
/// gives tests and partially-wired binaries a harmless placeholder.
pub struct ReorgDetector {
    store: Option<Arc<dyn KvStore>>,
    config: ReorgDetectorConfig,
    callback: Mutex<Option<ReorgCallback>>,
}

impl ReorgDetector {
    pub fn new(store: Arc<dyn KvStore>, config: ReorgDetectorConfig) -> Self {
        Self {
            store: Some(store),
            config,
            callback: Mutex::new(None),
        }
    }

    pub fn uninitialized(config: ReorgDetectorConfig) -> Self {
        Self {
            store: None,
            config,
            callback: Mutex::new(None),
        }
    }

    pub fn register_reorg_callback(&self, callback: impl Fn(&ReorgEvent) + Send + Sync + 'static) {
        *self.callback.lock() = Some(Box::new(callback));
    }

    /// Records `hash` as the block seen at `height`, without checking for a
    /// prior, different hash there. Use [`Self::detect_reorg`] when that
    /// check matters.
    pub fn track_block(&self, height: u64, hash: &str) -> bool {
        let Some(store) = &self.store else { return false };
        match store.put(&block_key(height), hash.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, height, "failed to track L1 block");
                false
            }
        }
    }

    pub fn get_block_hash_at_height(&self, height: u64) -> Option<String> {
        let store = self.store.as_ref()?;
        let bytes = store
            .get(&block_key(height))
            .map_err(|e| error!(error = %e, height, "failed to read L1 block"))
            .ok()??;
        String::from_utf8(bytes).ok()
    }

    /// Compares `new_hash` against whatever was previously tracked at
    /// `height`. If nothing was tracked there, just records it and returns
    /// `None`. If the previously-tracked hash differs, this is a reorg:
    /// every anchor with `l1_height >= height` and a status other than
    /// `InvalidatedReorg` is flipped to `InvalidatedReorg` with
    /// `confirmations` reset to zero, a [`ReorgEvent`] is appended under the
    /// next `reorg:` sequence number, and the block hash at `height` is
    /// overwritten — all in one atomic batch.
    pub fn detect_reorg(&self, height: u64, new_hash: &str, detected_at: u64) -> Option<ReorgEvent> {
        let store = self.store.as_ref()?;
        let key = block_key(height);
        let existing = match store.get(&key) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, height, "failed to read L1 block during reorg check");
                return None;
            }
        };

        let old_hash = match existing {
            None => {
                if let Err(e) = store.put(&key, new_hash.as_bytes()) {
                    error!(error = %e, height, "failed to record first-seen L1 block");
                }
                return None;
            }
            Some(bytes) => String::from_utf8(bytes).ok()?,
        };

        if old_hash == new_hash {
            return None;
        }

        let anchors = self.all_anchor_records(store)?;
        let mut invalidated = Vec::new();
        let mut batch = WriteBatch::new();

        for mut anchor in anchors {
            if anchor.l1_height >= height && anchor.status != AnchorStatus::InvalidatedReorg {
                anchor.status = AnchorStatus::InvalidatedReorg;
                anchor.confirmations = 0;
                invalidated.push(anchor.anchor_hash);
                batch.put(anchor_key(&anchor.anchor_hash.to_hex()), serialize_anchor(&anchor));
            }
        }
        invalidated.sort_by_key(|a| a.to_hex());

        let seq = self.next_reorg_seq(store)?;
        let event = ReorgEvent {
            reorg_height: height,
            old_hash,
            new_hash: new_hash.to_string(),
            detected_at,
            invalidated_anchors: invalidated,
        };

        batch.put(reorg_key(seq), serialize_reorg_event(&event));
        batch.put(key, new_hash.as_bytes().to_vec());

        if let Err(e) = store.write_batch(batch) {
            error!(error = %e, height, "failed to persist reorg");
            return None;
        }

        if let Some(cb) = self.callback.lock().as_ref() {
            cb(&event);
        }

        Some(event)
    }

    pub fn register_anchor(&self, record: AnchorRecord) -> bool {
        let Some(store) = &self.store else { return false };
        match store.put(&anchor_key(&record.anchor_hash.to_hex()), &serialize_anchor(&record)) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, anchor = %record.anchor_hash, "failed to register anchor");
                false
            }
        }
    }

    pub fn update_anchor_confirmations(&self, anchor_hash: &AnchorHash, confirmations: u64) -> bool {
        let Some(store) = &self.store else { return false };
        let Some(mut record) = self.get_anchor_status(anchor_hash) else { return false };
        record.confirmations = confirmations;
        if record.status == AnchorStatus::Pending && confirmations >= self.config.confirmation_threshold {
            record.status = AnchorStatus::Confirmed;
        }
        match store.put(&anchor_key(&record.anchor_hash.to_hex()), &serialize_anchor(&record)) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, anchor = %anchor_hash, "failed to update anchor confirmations");
                false
            }
        }
    }

    pub fn get_anchor_status(&self, anchor_hash: &AnchorHash) -> Option<AnchorRecord> {
        let store = self.store.as_ref()?;
        let bytes = store
            .get(&anchor_key(&anchor_hash.to_hex()))
            .map_err(|e| error!(error = %e, anchor = %anchor_hash, "failed to read anchor"))
            .ok()??;
        deserialize_anchor(&bytes)
    }

    /// Anchors still `Pending` whose `broadcast_time` is further than
    /// `max_anchor_pending_time_ms` in the past relative to `now`.
    pub fn get_orphaned_anchors(&self, now: u64) -> Vec<AnchorRecord> {
        let Some(store) = &self.store else { return Vec::new() };
        let Some(anchors) = self.all_anchor_records(store) else { return Vec::new() };
        anchors
            .into_iter()
            .filter(|a| {
                a.status == AnchorStatus::Pending
                    && now.saturating_sub(a.broadcast_time) > self.config.max_anchor_pending_time_ms
            })
            .collect()
    }

    /// Deletes all tracked block heights except the `keep_last_n` highest,
    /// in one batch.
    pub fn prune_old_blocks(&self, keep_last_n: usize) -> bool {
        let Some(store) = &self.store else { return false };
        let entries = match store.prefix_scan(BLOCK_PREFIX.as_bytes()) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to scan blocks for pruning");
                return false;
            }
        };
        if entries.len() <= keep_last_n {
            return true;
        }
        let mut batch = WriteBatch::new();
        for (key, _) in entries.iter().take(entries.len() - keep_last_n) {
            batch.delete(key.clone());
        }
        match store.write_batch(batch) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to prune blocks");
                false
            }
        }
    }

    pub fn should_halt_for_deep_reorg(&self, depth: u64) -> bool {
        depth > self.config.confirmation_threshold
    }

    pub fn get_reorg_history(&self) -> Vec<ReorgEvent> {
        let Some(store) = &self.store else { return Vec::new() };
        let entries = match store.prefix_scan(REORG_PREFIX.as_bytes()) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to scan reorg history");
                return Vec::new();
            }
        };
        entries.iter().filter_map(|(_, v)| deserialize_reorg_event(v)).collect()
    }

    fn all_anchor_records(&self, store: &Arc<dyn KvStore>) -> Option<Vec<AnchorRecord>> {
        let entries = match store.prefix_scan(ANCHOR_PREFIX.as_bytes()) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to scan anchors");
                return None;
            }
        };
        Some(entries.iter().filter_map(|(_, v)| deserialize_anchor(v)).collect())
    }

    fn next_reorg_seq(&self, store: &Arc<dyn KvStore>) -> Option<u64> {
        let current = match store.get(REORG_COUNTER_KEY) {
            Ok(Some(bytes)) => std::str::from_utf8(&bytes).ok()?.parse::<u64>().ok()?,
            Ok(None) => 0,
            Err(e) => {
                error!(error = %e, "failed to read reorg counter");
                return None;
            }
        };
        let next = current + 1;
        if let Err(e) = store.put(REORG_COUNTER_KEY, next.to_string().as_bytes()) {
            error!(error = %e, "failed to advance reorg counter");
            return None;
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_kv::MemKvStore;
    use basalt_primitives::Digest;

    fn detector() -> ReorgDetector {
        ReorgDetector::new(Arc::new(MemKvStore::new()), ReorgDetectorConfig::default())
    }

    fn anchor(hash_byte: u8, l1_height: u64) -> AnchorRecord {
        AnchorRecord {
            anchor_hash: AnchorHash::from(Digest([hash_byte; 32])),
            l1_tx_id: format!("tx{hash_byte}"),
            l1_height,
            confirmations: 0,
            broadcast_time: 0,
            retry_count: 0,
            status: AnchorStatus::Pending,
            l2_state_root: Digest::ZERO,
        }
    }

    #[test]
    fn uninitialized_detector_is_inert() {
        let det = ReorgDetector::uninitialized(ReorgDetectorConfig::default());
        assert!(!det.track_block(1, "abc"));
        assert!(det.get_block_hash_at_height(1).is_none());
        assert!(det.detect_reorg(1, "abc", 0).is_none());
        assert!(!det.register_anchor(anchor(1, 1)));
    }

    #[test]
    fn first_seen_block_does_not_trigger_reorg() {
        let det = detector();
        assert!(det.detect_reorg(100, "hash_a", 10).is_none());
        assert_eq!(det.get_block_hash_at_height(100), Some("hash_a".to_string()));
    }

    #[test]
    fn identical_hash_is_not_a_reorg() {
        let det = detector();
        det.detect_reorg(100, "hash_a", 10);
        assert!(det.detect_reorg(100, "hash_a", 20).is_none());
    }

    /// Scenario S3: two anchors registered at/after the reorg height are
    /// invalidated and reported in ascending hash order.
    #[test]
    fn reorg_invalidates_anchors_at_or_past_height() {
        let det = detector();
        det.detect_reorg(100, "hash_a", 10);

        let a101 = anchor(0x01, 101);
        let a102 = anchor(0x02, 102);
        let a099 = anchor(0x03, 99);
        det.register_anchor(a101.clone());
        det.register_anchor(a102.clone());
        det.register_anchor(a099.clone());

        let event = det.detect_reorg(100, "hash_b", 20).expect("reorg detected");
        assert_eq!(event.old_hash, "hash_a");
        assert_eq!(event.new_hash, "hash_b");
        assert_eq!(event.reorg_height, 100);

        let mut expected = vec![a101.anchor_hash, a102.anchor_hash];
        expected.sort_by_key(|a| a.to_hex());
        assert_eq!(event.invalidated_anchors, expected);

        assert_eq!(
            det.get_anchor_status(&a101.anchor_hash).unwrap().status,
            AnchorStatus::InvalidatedReorg
        );
        assert_eq!(
            det.get_anchor_status(&a099.anchor_hash).unwrap().status,
            AnchorStatus::Pending
        );
        assert_eq!(det.get_block_hash_at_height(100), Some("hash_b".to_string()));
    }

    #[test]
    fn reorg_history_accumulates_with_advancing_sequence() {
        let det = detector();
        det.detect_reorg(1, "a", 0);
        det.detect_reorg(1, "b", 1);
        det.detect_reorg(1, "c", 2);
        assert_eq!(det.get_reorg_history().len(), 2);
    }

    #[test]
    fn update_anchor_confirmations_promotes_to_confirmed() {
        let det = detector();
        let rec = anchor(0x09, 5);
        det.register_anchor(rec.clone());
        assert!(det.update_anchor_confirmations(&rec.anchor_hash, 6));
        assert_eq!(
            det.get_anchor_status(&rec.anchor_hash).unwrap().status,
            AnchorStatus::Confirmed
        );
    }

    #[test]
    fn orphaned_anchors_are_pending_past_the_deadline() {
        let mut cfg = ReorgDetectorConfig::default();
        cfg.max_anchor_pending_time_ms = 1_000;
        let det = ReorgDetector::new(Arc::new(MemKvStore::new()), cfg);
        let mut rec = anchor(0x0a, 1);
        rec.broadcast_time = 0;
        det.register_anchor(rec.clone());
        assert!(det.get_orphaned_anchors(500).is_empty());
        assert_eq!(det.get_orphaned_anchors(2_000).len(), 1);
    }

    #[test]
    fn prune_old_blocks_keeps_only_the_most_recent() {
        let det = detector();
        for h in 1..=5u64 {
            det.track_block(h, "x");
        }
        assert!(det.prune_old_blocks(2));
        assert!(det.get_block_hash_at_height(1).is_none());
        assert!(det.get_block_hash_at_height(4).is_some());
        assert!(det.get_block_hash_at_height(5).is_some());
    }

    #[test]
    fn should_halt_for_deep_reorg_compares_against_confirmation_threshold() {
        let det = detector();
        assert!(!det.should_halt_for_deep_reorg(6));
        assert!(det.should_halt_for_deep_reorg(7));
    }

    #[test]
    fn reorg_callback_fires_on_detection() {
        let det = detector();
        det.detect_reorg(1, "a", 0);
        let seen = Arc::new(Mutex::new(false));
        let seen2 = seen.clone();
        det.register_reorg_callback(move |_event| {
            *seen2.lock() = true;
        });
        det.detect_reorg(1, "b", 1);
        assert!(*seen.lock());
    }
}

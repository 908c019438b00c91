//! Block producer: emits L2 blocks at a configured cadence and signals
//! anchor commitments. Owns exactly one worker thread.
//!
//! The producer never calls the bridge, an adapter, or the anchor builder
//! directly — it hands an [`AnchorBuildRequest`] to whoever is on the other
//! end of its `mpsc` channel, and takes a caller-supplied snapshot
//! provider at construction time. This is the Design Notes' "wiring is
//! one-way" rule applied to the block producer specifically: it must not
//! hold a reference back to the bridge or the commitment builder.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use basalt_commitment::L2StateSnapshot;
use basalt_config::BlockProducerConfig;
use basalt_mempool::Mempool;
use basalt_primitives::AnchorHash;
use basalt_reorg::ReorgDetector;
use parking_lot::Mutex;
use tracing::{error, warn};

/// A completed tick's worth of work, surfaced to whoever polls the
/// producer's anchor channel.
#[derive(Clone, Debug)]
pub struct AnchorBuildRequest {
    pub block_height: u64,
    pub snapshot: L2StateSnapshot,
}

#[derive(Clone, Debug, Default)]
pub struct BlockProducerState {
    pub block_height: u64,
    pub total_transactions: u64,
    pub last_anchor_height: u64,
    pub last_block_timestamp_ms: u64,
    pub last_anchor_hash: Option<AnchorHash>,
}

/// How often the tick loop checks the stop flag while sleeping out the
/// remainder of `block_interval_ms`. Keeps `stop()` responsive without
/// busy-waiting.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since the Unix epoch. The default clock for production
/// use; tests inject a deterministic one.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

pub struct BlockProducer {
    state: Mutex<BlockProducerState>,
    mempool: Arc<Mempool>,
    reorg_detector: Arc<ReorgDetector>,
    config: BlockProducerConfig,
    clock: Arc<dyn Clock>,
    snapshot_provider: Box<dyn Fn() -> L2StateSnapshot + Send + Sync>,
    anchor_tx: mpsc::Sender<AnchorBuildRequest>,
    stop_flag: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BlockProducer {
    /// Builds a producer and returns it along with the receiving end of
    /// its anchor-build channel. The caller drives anchor construction
    /// however it likes (inline, another thread, a task queue).
    pub fn new(
        mempool: Arc<Mempool>,
        reorg_detector: Arc<ReorgDetector>,
        config: BlockProducerConfig,
        snapshot_provider: impl Fn() -> L2StateSnapshot + Send + Sync + 'static,
    ) -> (Self, mpsc::Receiver<AnchorBuildRequest>) {
        let (anchor_tx, anchor_rx) = mpsc::channel();
        let producer = Self {
            state: Mutex::new(BlockProducerState::default()),
            mempool,
            reorg_detector,
            config,
            clock: Arc::new(SystemClock),
            snapshot_provider: Box::new(snapshot_provider),
            anchor_tx,
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        };
        (producer, anchor_rx)
    }

    /// Test/harness hook: override the clock used for `last_block_timestamp_ms`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> BlockProducerState {
        self.state.lock().clone()
    }

    /// Records which anchor hash corresponds to the current
    /// `last_anchor_height`, so [`Self::is_tip_invalidated`] has something
    /// to check. The anchor builder calls this once it has computed the
    /// hash for the snapshot this producer handed it.
    pub fn record_last_anchor_hash(&self, hash: AnchorHash) {
        self.state.lock().last_anchor_hash = Some(hash);
    }

    /// True if the anchor recorded for the current tip has been
    /// invalidated by a reorg. The producer does not act on this itself —
    /// it only exposes the fact so a host binary can decide whether to
    /// halt production.
    pub fn is_tip_invalidated(&self) -> bool {
        let Some(hash) = self.state.lock().last_anchor_hash else { return false };
        self.reorg_detector
            .get_anchor_status(&hash)
            .map(|record| record.status == basalt_reorg::AnchorStatus::InvalidatedReorg)
            .unwrap_or(false)
    }

    /// Spawns the producer thread. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut handle_guard = self.handle.lock();
        if handle_guard.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *handle_guard = Some(thread::spawn(move || this.run()));
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn run(&self) {
        while !self.stop_flag.load(Ordering::SeqCst) {
            if let Err(e) = self.tick() {
                error!(error = %e, "block producer tick failed");
            }
            self.sleep_interruptible(Duration::from_millis(self.config.block_interval_ms));
        }
    }

    fn sleep_interruptible(&self, total: Duration) {
        let mut remaining = total;
        while remaining > Duration::ZERO {
            if self.stop_flag.load(Ordering::SeqCst) {
                return;
            }
            let step = remaining.min(STOP_CHECK_INTERVAL);
            thread::sleep(step);
            remaining -= step;
        }
    }

    fn tick(&self) -> Result<(), String> {
        // Step 1: observe reorg history; warn but never halt production.
        let current_height = self.state.lock().block_height;
        for event in self.reorg_detector.get_reorg_history() {
            let depth = current_height.saturating_sub(event.reorg_height);
            if self.reorg_detector.should_halt_for_deep_reorg(depth) {
                warn!(reorg_height = event.reorg_height, depth, "deep reorg observed; continuing production");
            }
        }

        // Step 2.
        let now = self.clock.now_ms();
        let block_height = {
            let mut state = self.state.lock();
            state.block_height += 1;
            state.last_block_timestamp_ms = now;
            state.block_height
        };

        // Step 3.
        let candidates = self.mempool.take_pending(self.config.max_transactions_per_block);
        let valid_hashes: Vec<String> = candidates
            .into_iter()
            .filter(|tx| basalt_mempool::validate_tx_structure(tx).is_ok())
            .map(|tx| tx.tx_hash)
            .collect();

        // Step 4.
        let confirmed = self.mempool.confirm(&valid_hashes, block_height);

        let should_anchor = {
            let mut state = self.state.lock();
            state.total_transactions += confirmed as u64;
            if block_height.saturating_sub(state.last_anchor_height) >= self.config.commitment_interval_blocks {
                state.last_anchor_height = block_height;
                true
            } else {
                false
            }
        };

        // Step 5.
        if should_anchor {
            let snapshot = (self.snapshot_provider)();
            if self
                .anchor_tx
                .send(AnchorBuildRequest { block_height, snapshot })
                .is_err()
            {
                warn!(block_height, "anchor channel has no receiver; dropping anchor-build signal");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_kv::MemKvStore;
    use basalt_mempool::Transaction;
    use basalt_primitives::{Digest, PeerId};
    use std::sync::atomic::AtomicU64;

    struct FixedClock(AtomicU64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn hex_hash(byte: u8) -> String {
        hex::encode([byte; 32])
    }

    fn setup() -> (Arc<BlockProducer>, mpsc::Receiver<AnchorBuildRequest>, Arc<Mempool>) {
        let mempool = Arc::new(Mempool::new(100, 100));
        let reorg = Arc::new(ReorgDetector::new(Arc::new(MemKvStore::new()), basalt_config::ReorgDetectorConfig::default()));
        let mut config = BlockProducerConfig::default();
        config.block_interval_ms = 10;
        config.commitment_interval_blocks = 2;
        config.max_transactions_per_block = 10;
        let (producer, rx) = BlockProducer::new(mempool.clone(), reorg, config, || L2StateSnapshot::default());
        (Arc::new(producer.with_clock(Arc::new(FixedClock(AtomicU64::new(1))))), rx, mempool)
    }

    #[test]
    fn tick_confirms_structurally_valid_transactions_and_advances_height() {
        let (producer, _rx, mempool) = setup();
        mempool
            .add(Transaction::new_pending(hex_hash(1), PeerId::new("a"), PeerId::new("b"), 10, vec![], 0))
            .unwrap();

        producer.tick().unwrap();

        let state = producer.state();
        assert_eq!(state.block_height, 1);
        assert_eq!(state.total_transactions, 1);
        assert_eq!(mempool.pending_count(), 0);
    }

    #[test]
    fn anchor_signal_fires_at_commitment_interval() {
        let (producer, rx, _mempool) = setup();
        producer.tick().unwrap();
        assert!(rx.try_recv().is_err());
        producer.tick().unwrap();
        let request = rx.try_recv().expect("anchor signal at interval boundary");
        assert_eq!(request.block_height, 2);
        assert_eq!(producer.state().last_anchor_height, 2);
    }

    #[test]
    fn is_tip_invalidated_reflects_reorg_detector_state() {
        let (producer, _rx, _mempool) = setup();
        let hash = AnchorHash::from(Digest([9u8; 32]));
        producer.record_last_anchor_hash(hash);
        assert!(!producer.is_tip_invalidated());

        producer.reorg_detector.register_anchor(basalt_reorg::AnchorRecord {
            anchor_hash: hash,
            l1_tx_id: "tx".into(),
            l1_height: 5,
            confirmations: 0,
            broadcast_time: 0,
            retry_count: 0,
            status: basalt_reorg::AnchorStatus::Pending,
            l2_state_root: Digest::ZERO,
        });
        producer.reorg_detector.detect_reorg(5, "first", 0);
        producer.reorg_detector.detect_reorg(5, "second", 1);
        assert!(producer.is_tip_invalidated());
    }

    #[test]
    fn start_then_stop_joins_cleanly() {
        let (producer, _rx, _mempool) = setup();
        producer.start();
        thread::sleep(Duration::from_millis(30));
        producer.stop();
        assert!(producer.state().block_height >= 1);
    }
}

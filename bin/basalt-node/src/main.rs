//! Wires up one Basalt node process: mempool, reorg detector, block
//! producer, bridge, settlement orchestrator, chain adapter, and task
//! orchestrator, in dependency order.
//!
//! The block producer hands anchor-build requests back to this binary over
//! its `mpsc` channel rather than calling into the commitment builder or
//! reorg detector itself — wiring stays one-directional, as each component
//! crate's own doc comments insist.

mod args;
mod config;
mod snapshot;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use basalt_bridge::{Bridge, Federation};
use basalt_chain_adapter::mock::MockUtxoAdapter;
use basalt_chain_adapter::{AdapterConfig, ChainAdapter};
use basalt_commitment::build_anchor_commitment;
use basalt_common::logging::{self, LoggerConfig};
use basalt_kv::{KvStore, MemKvStore, SledKvStore};
use basalt_ledger::Ledger;
use basalt_mempool::Mempool;
use basalt_primitives::{FeePolicy, FeePriority, Network, SlippagePolicy};
use basalt_reorg::{AnchorRecord, AnchorStatus, ReorgDetector};
use basalt_reputation::{InMemoryLatencyMap, ReputationLedger};
use basalt_settlement::SettlementOrchestrator;
use basalt_orchestrator::TaskOrchestrator;
use basalt_block_producer::BlockProducer;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn main() {
    let args: args::Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e:?}");
        std::process::exit(1);
    }
}

fn main_inner(args: args::Args) -> anyhow::Result<()> {
    let config = config::load(&args.config)?;
    logging::init(LoggerConfig::new("basalt-node"));

    let snapshot_journal_path = args.snapshot_journal_path.clone();

    let kv_path = args.kv_store_path.map(|p| p.to_string_lossy().into_owned()).or_else(|| config.kv_store_path.clone());
    let kv_store: Arc<dyn KvStore> = match kv_path {
        Some(path) => Arc::new(SledKvStore::open(&path).with_context(|| format!("opening sled store at {path}"))?),
        None => Arc::new(MemKvStore::new()),
    };

    let reorg_detector = Arc::new(ReorgDetector::new(kv_store, config.reorg_detector.clone()));
    let mempool = Arc::new(Mempool::new(config.mempool.max_pending, config.mempool.max_confirmed));
    let ledger = Arc::new(Ledger::new());

    // Bridge, orchestrator, and settlement are fully wired here but have no
    // caller yet — there's no RPC/API surface driving them in this binary.
    // Kept alive under `_`-prefixed bindings so the components they hold
    // (worker pool, federation state) stay live for the process lifetime
    // rather than being dropped immediately.
    let federation = Federation::new(config.bridge.federation_threshold);
    let _bridge = Arc::new(Bridge::new(config.bridge.clone(), federation));

    let reputation = Arc::new(ReputationLedger::new(config.reputation.clone()));
    let latency = Arc::new(InMemoryLatencyMap::new());
    let _orchestrator = Arc::new(TaskOrchestrator::new(config.orchestrator.clone(), reputation, latency));

    let _settlement = SettlementOrchestrator::new();

    let adapter = Arc::new(MockUtxoAdapter::new(config.adapter_retry.clone()));
    adapter
        .init(
            AdapterConfig {
                chain: "bitcoin".into(),
                node_endpoint: "http://127.0.0.1:8332".into(),
                auth_username: None,
                auth_password: None,
                network: Network::Testnet,
                extra: Default::default(),
                enable_telemetry: true,
                read_only: false,
                fee_policy: FeePolicy { max_fee_rate: 50.0, priority: FeePriority::Normal },
                slippage_policy: SlippagePolicy { max_slippage_pct: 1.0, enforce_hard: false },
                min_oracle_confidence: 0.6,
            },
            Box::new(|err| tracing::error!(error = %err, "chain adapter error")),
        )
        .context("initializing chain adapter")?;
    adapter
        .start(
            Box::new(|tx| tracing::debug!(tx_id = %tx.tx_id, "observed l1 transaction")),
            Box::new(|header| tracing::debug!(height = header.height, "observed l1 block")),
            Box::new(|energy| tracing::debug!(source = %energy.energy_source, "observed energy telemetry")),
        )
        .context("starting chain adapter")?;

    let ledger_for_snapshot = ledger.clone();
    let (producer, anchor_rx) = BlockProducer::new(
        mempool.clone(),
        reorg_detector.clone(),
        config.block_producer.clone(),
        move || snapshot::project(&ledger_for_snapshot, now_ms()),
    );
    let producer = Arc::new(producer);
    producer.start();

    tracing::info!(
        orchestrator_workers = config.orchestrator.workers,
        bridge_threshold = config.bridge.federation_threshold,
        "basalt node started"
    );

    // One-directional wiring: drain anchor-build requests, compute the
    // commitment, and register it with the reorg detector's anchor
    // registry. Nothing here calls back into the block producer's tick
    // loop.
    for request in anchor_rx {
        let commitment = build_anchor_commitment(&request.snapshot);
        let registered = reorg_detector.register_anchor(AnchorRecord {
            anchor_hash: commitment.hash.into(),
            l1_tx_id: String::new(),
            l1_height: 0,
            confirmations: 0,
            broadcast_time: now_ms(),
            retry_count: 0,
            status: AnchorStatus::Pending,
            l2_state_root: commitment.l2_state_root,
        });
        if registered {
            producer.record_last_anchor_hash(commitment.hash.into());
            tracing::info!(
                height = request.block_height,
                root = %commitment.l2_state_root,
                "registered anchor commitment"
            );
            if let Some(path) = &snapshot_journal_path {
                if let Err(e) = basalt_snapshot::append(path, &request.snapshot, Some(&commitment)) {
                    tracing::warn!(error = %e, "failed to append snapshot journal record");
                }
            }
        } else {
            tracing::warn!(height = request.block_height, "anchor registration rejected, duplicate or invalid");
        }
    }

    producer.stop();
    adapter.stop();
    logging::finalize();
    Ok(())
}

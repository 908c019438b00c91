//! Reference adapters that honor the [`ChainAdapter`] contract without
//! talking to a real chain (spec §4.7 "additional detail"): `MockUtxoAdapter`
//! models a Bitcoin-family adapter, `MockEvmAdapter` an EVM-family one. Both
//! are instantiations of the same generic [`MockAdapter`], which runs an
//! in-process simulated heartbeat thread so the retry/backoff and
//! idempotency-cache logic is exercised for real.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use basalt_common::retry::{policies::ExponentialBackoff, retry_with_backoff};
use basalt_config::AdapterRetryConfig;
use basalt_primitives::{AdapterTraits, BlockHeader, Digest, EnergyTelemetry, Network, NormalizedTx, UnitSpec};
use parking_lot::Mutex;

use crate::{AdapterConfig, AdapterError, BroadcastOpts, ChainAdapter, OnBlock, OnEnergy, OnError, OnTx};

/// Per-chain-family behavior the generic mock defers to.
pub trait AdapterFamily: Send + Sync + 'static {
    fn traits(&self) -> AdapterTraits;

    /// Whether a [`Network::Named`] string is recognized by this family.
    /// Unrecognized names fail closed (Design Notes' resolved open
    /// question) rather than silently falling back to a default network.
    fn recognizes_named_network(&self, name: &str) -> bool;

    fn validate_extra(&self, _extra: &HashMap<String, String>) -> Result<(), AdapterError> {
        Ok(())
    }
}

pub struct UtxoFamily;

impl AdapterFamily for UtxoFamily {
    fn traits(&self) -> AdapterTraits {
        AdapterTraits {
            name: "mock-utxo".into(),
            version: "1.0.0".into(),
            supports_events: true,
            supports_broadcast: true,
            supports_smart_contracts: false,
            supports_utxo_model: true,
            supports_privacy: false,
            default_unit: UnitSpec::new("BTC".into(), 8),
            audited: false,
        }
    }

    fn recognizes_named_network(&self, name: &str) -> bool {
        matches!(name, "regtest" | "signet")
    }
}

pub struct EvmFamily;

impl AdapterFamily for EvmFamily {
    fn traits(&self) -> AdapterTraits {
        AdapterTraits {
            name: "mock-evm".into(),
            version: "1.0.0".into(),
            supports_events: true,
            supports_broadcast: true,
            supports_smart_contracts: true,
            supports_utxo_model: false,
            supports_privacy: false,
            default_unit: UnitSpec::new("ETH".into(), 18),
            audited: false,
        }
    }

    fn recognizes_named_network(&self, name: &str) -> bool {
        matches!(name, "goerli" | "sepolia")
    }

    fn validate_extra(&self, extra: &HashMap<String, String>) -> Result<(), AdapterError> {
        if !extra.contains_key("from") {
            return Err(AdapterError::Validation("EVM adapter config requires extra.from".into()));
        }
        Ok(())
    }
}

struct State {
    config: Option<AdapterConfig>,
    started: bool,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

pub struct MockAdapter<F: AdapterFamily> {
    family: F,
    state: Mutex<State>,
    tip_height: Arc<AtomicU64>,
    idempotency_cache: Mutex<HashMap<String, (Instant, String)>>,
    transactions: Mutex<HashMap<String, NormalizedTx>>,
    headers: Arc<Mutex<HashMap<String, BlockHeader>>>,
    on_tx: Mutex<Option<OnTx>>,
    retry_config: AdapterRetryConfig,
}

pub type MockUtxoAdapter = MockAdapter<UtxoFamily>;
pub type MockEvmAdapter = MockAdapter<EvmFamily>;

impl MockUtxoAdapter {
    pub fn new(retry_config: AdapterRetryConfig) -> Self {
        MockAdapter::with_family(UtxoFamily, retry_config)
    }
}

impl MockEvmAdapter {
    pub fn new(retry_config: AdapterRetryConfig) -> Self {
        MockAdapter::with_family(EvmFamily, retry_config)
    }
}

impl<F: AdapterFamily> MockAdapter<F> {
    pub fn with_family(family: F, retry_config: AdapterRetryConfig) -> Self {
        Self {
            family,
            state: Mutex::new(State {
                config: None,
                started: false,
                stop_flag: Arc::new(AtomicBool::new(false)),
                handle: None,
            }),
            tip_height: Arc::new(AtomicU64::new(0)),
            idempotency_cache: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            headers: Arc::new(Mutex::new(HashMap::new())),
            on_tx: Mutex::new(None),
            retry_config,
        }
    }

    fn validate_network(&self, network: &Network) -> Result<(), AdapterError> {
        match network {
            Network::Mainnet | Network::Testnet | Network::Devnet => Ok(()),
            Network::Named(name) => {
                if self.family.recognizes_named_network(name) {
                    Ok(())
                } else {
                    Err(AdapterError::Validation(format!("unrecognized network '{name}'")))
                }
            }
        }
    }

    fn prune_idempotency_cache(&self, cache: &mut HashMap<String, (Instant, String)>) {
        let ttl = Duration::from_millis(self.retry_config.broadcast_cache_ttl_ms);
        let now = Instant::now();
        cache.retain(|_, (seen_at, _)| now.duration_since(*seen_at) < ttl);
    }
}

impl<F: AdapterFamily> ChainAdapter for MockAdapter<F> {
    fn init(&self, cfg: AdapterConfig, on_error: OnError) -> Result<(), AdapterError> {
        if let Err(e) = self.validate_network(&cfg.network) {
            on_error(&e);
            return Err(e);
        }
        if let Err(e) = self.family.validate_extra(&cfg.extra) {
            on_error(&e);
            return Err(e);
        }
        self.state.lock().config = Some(cfg);
        Ok(())
    }

    fn start(&self, on_tx: OnTx, on_block: OnBlock, on_energy: OnEnergy) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if state.config.is_none() {
            return Err(AdapterError::NotInitialized);
        }
        if state.started {
            return Ok(());
        }
        state.started = true;
        state.stop_flag.store(false, Ordering::SeqCst);
        let stop_flag = Arc::clone(&state.stop_flag);
        drop(state);

        *self.on_tx.lock() = Some(on_tx);
        let tip = Arc::clone(&self.tip_height);
        let headers = Arc::clone(&self.headers);

        let handle = thread::spawn(move || {
            let mut tick: u64 = 0;
            while !stop_flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(20));
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                let height = tip.fetch_add(1, Ordering::SeqCst) + 1;
                let hash = basalt_crypto::sha256(&height.to_be_bytes());
                let header = BlockHeader {
                    hash,
                    height,
                    prev_hash: Digest::ZERO,
                    merkle_root: Digest::ZERO,
                    timestamp: height,
                };
                headers.lock().insert(header.hash.to_hex(), header.clone());
                on_block(header);

                tick += 1;
                if tick % 5 == 0 {
                    on_energy(EnergyTelemetry {
                        carbon_intensity_g_co2_per_kwh: 400.0,
                        energy_source: "mixed".into(),
                        sampled_at: height,
                    });
                }
            }
        });
        self.state.lock().handle = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        let (stop_flag, handle) = {
            let mut state = self.state.lock();
            state.started = false;
            (Arc::clone(&state.stop_flag), state.handle.take())
        };
        stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        *self.on_tx.lock() = None;
    }

    fn broadcast(&self, opts: BroadcastOpts) -> Result<String, AdapterError> {
        let read_only = self
            .state
            .lock()
            .config
            .as_ref()
            .ok_or(AdapterError::NotInitialized)?
            .read_only;
        if read_only {
            return Err(AdapterError::ReadOnly);
        }
        if opts.raw_tx.is_empty() {
            return Err(AdapterError::Validation("broadcast requires a non-empty raw_tx".into()));
        }

        let cache_key = basalt_crypto::sha256_hex(&opts.raw_tx);
        {
            let mut cache = self.idempotency_cache.lock();
            self.prune_idempotency_cache(&mut cache);
            if let Some((_, tx_id)) = cache.get(&cache_key) {
                return Ok(tx_id.clone());
            }
        }

        let simulate_failures: u32 = opts
            .extra
            .get("simulate_failures")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let backoff = ExponentialBackoff::default();
        let raw_tx = opts.raw_tx.clone();
        let mut call_count: u32 = 0;
        let result: Result<String, AdapterError> = retry_with_backoff(
            "broadcast",
            self.retry_config.max_broadcast_attempts,
            &backoff,
            || {
                call_count += 1;
                if call_count <= simulate_failures {
                    Err(AdapterError::Transient(format!("simulated transient failure {call_count}")))
                } else {
                    Ok(basalt_crypto::sha256_hex(&raw_tx))
                }
            },
        );

        let tx_id = result?;
        self.idempotency_cache.lock().insert(cache_key, (Instant::now(), tx_id.clone()));

        let tx = NormalizedTx {
            tx_id: Digest::from_hex(&tx_id).unwrap_or(Digest::ZERO),
            inputs: Vec::new(),
            outputs: Vec::new(),
            confirmed: false,
            block_height: None,
        };
        self.transactions.lock().insert(tx_id.clone(), tx.clone());
        if let Some(cb) = self.on_tx.lock().as_ref() {
            cb(tx);
        }

        Ok(tx_id)
    }

    fn get_transaction(&self, tx_id: &str) -> Option<NormalizedTx> {
        self.transactions.lock().get(tx_id).cloned()
    }

    fn get_block_header(&self, hash: &str) -> Option<BlockHeader> {
        self.headers.lock().get(hash).cloned()
    }

    fn get_block_height(&self) -> Option<u64> {
        if self.state.lock().started {
            Some(self.tip_height.load(Ordering::SeqCst))
        } else {
            None
        }
    }

    fn traits(&self) -> AdapterTraits {
        self.family.traits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_primitives::{FeePolicy, FeePriority, SlippagePolicy};
    use std::sync::Mutex as StdMutex;

    fn utxo_config(network: Network, read_only: bool) -> AdapterConfig {
        AdapterConfig {
            chain: "bitcoin".into(),
            node_endpoint: "http://localhost:8332".into(),
            auth_username: None,
            auth_password: None,
            network,
            extra: HashMap::new(),
            enable_telemetry: true,
            read_only,
            fee_policy: FeePolicy { max_fee_rate: 10.0, priority: FeePriority::Normal },
            slippage_policy: SlippagePolicy { max_slippage_pct: 1.0, enforce_hard: false },
            min_oracle_confidence: 0.5,
        }
    }

    #[test]
    fn init_fails_closed_on_unrecognized_named_network() {
        let adapter = MockUtxoAdapter::new(AdapterRetryConfig::default());
        let err = adapter
            .init(utxo_config(Network::Named("nonsense".into()), false), Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
    }

    #[test]
    fn evm_adapter_requires_from_in_extra() {
        let adapter = MockEvmAdapter::new(AdapterRetryConfig::default());
        let mut cfg = utxo_config(Network::Mainnet, false);
        cfg.chain = "ethereum".into();
        let err = adapter.init(cfg, Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
    }

    #[test]
    fn broadcast_rejects_when_read_only() {
        let adapter = MockUtxoAdapter::new(AdapterRetryConfig::default());
        adapter.init(utxo_config(Network::Mainnet, true), Box::new(|_| {})).unwrap();
        let err = adapter
            .broadcast(BroadcastOpts { raw_tx: vec![1, 2, 3], extra: HashMap::new() })
            .unwrap_err();
        assert!(matches!(err, AdapterError::ReadOnly));
    }

    #[test]
    fn broadcast_is_idempotent_within_cache_ttl() {
        let adapter = MockUtxoAdapter::new(AdapterRetryConfig::default());
        adapter.init(utxo_config(Network::Mainnet, false), Box::new(|_| {})).unwrap();
        let opts = BroadcastOpts { raw_tx: vec![9, 9, 9], extra: HashMap::new() };
        let first = adapter.broadcast(opts.clone()).unwrap();
        let second = adapter.broadcast(opts).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn broadcast_retries_through_simulated_transient_failures() {
        let mut retry_config = AdapterRetryConfig::default();
        retry_config.max_broadcast_attempts = 5;
        let adapter = MockUtxoAdapter::new(retry_config);
        adapter.init(utxo_config(Network::Mainnet, false), Box::new(|_| {})).unwrap();

        let mut extra = HashMap::new();
        extra.insert("simulate_failures".to_string(), "2".to_string());
        let tx_id = adapter
            .broadcast(BroadcastOpts { raw_tx: vec![7, 7, 7], extra })
            .expect("succeeds after simulated retries");
        assert_eq!(tx_id.len(), 64);
    }

    #[test]
    fn broadcast_gives_up_after_exhausting_attempts() {
        let mut retry_config = AdapterRetryConfig::default();
        retry_config.max_broadcast_attempts = 2;
        let adapter = MockUtxoAdapter::new(retry_config);
        adapter.init(utxo_config(Network::Mainnet, false), Box::new(|_| {})).unwrap();

        let mut extra = HashMap::new();
        extra.insert("simulate_failures".to_string(), "5".to_string());
        let err = adapter
            .broadcast(BroadcastOpts { raw_tx: vec![3, 3, 3], extra })
            .unwrap_err();
        assert!(matches!(err, AdapterError::Transient(_)));
    }

    #[test]
    fn start_invokes_on_block_and_stop_joins_cleanly() {
        let adapter = MockUtxoAdapter::new(AdapterRetryConfig::default());
        adapter.init(utxo_config(Network::Mainnet, false), Box::new(|_| {})).unwrap();

        let blocks_seen = Arc::new(StdMutex::new(0u32));
        let blocks_seen2 = Arc::clone(&blocks_seen);
        adapter
            .start(
                Box::new(|_| {}),
                Box::new(move |_header| {
                    *blocks_seen2.lock().unwrap() += 1;
                }),
                Box::new(|_| {}),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(80));
        adapter.stop();

        assert!(*blocks_seen.lock().unwrap() > 0);
        assert!(adapter.get_block_height().is_none());
    }

    #[test]
    fn traits_report_family_capabilities() {
        let utxo = MockUtxoAdapter::new(AdapterRetryConfig::default());
        assert!(utxo.traits().supports_utxo_model);
        assert!(!utxo.traits().supports_smart_contracts);

        let evm = MockEvmAdapter::new(AdapterRetryConfig::default());
        assert!(evm.traits().supports_smart_contracts);
        assert!(!evm.traits().supports_utxo_model);
    }
}

//! Typed configuration for every component. Loading this from a TOML file
//! on disk is an external collaborator's job (spec §1: "configuration
//! loading" is out of scope) — this crate only owns the shapes, the way
//! `AdapterConfig` is specified as data in spec §6.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MempoolConfig {
    pub max_pending: usize,
    pub max_confirmed: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_pending: 10_000,
            max_confirmed: 1_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockProducerConfig {
    pub block_interval_ms: u64,
    pub max_transactions_per_block: usize,
    pub commitment_interval_blocks: u64,
}

impl Default for BlockProducerConfig {
    fn default() -> Self {
        Self {
            block_interval_ms: 1000,
            max_transactions_per_block: 500,
            commitment_interval_blocks: 100,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReorgDetectorConfig {
    pub confirmation_threshold: u64,
    pub max_anchor_pending_time_ms: u64,
    pub block_retention_window: u64,
}

impl Default for ReorgDetectorConfig {
    fn default() -> Self {
        Self {
            confirmation_threshold: 6,
            max_anchor_pending_time_ms: 3_600_000,
            block_retention_window: 100_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub min_pegin_amount: u64,
    pub max_pegin_amount: u64,
    pub bridge_fee_sats: u64,
    pub min_confirmations_pegin: u64,
    pub min_confirmations_pegout: u64,
    pub federation_threshold: u16,
    pub emergency_timeout_blocks: u64,
    pub collateralization_band: (f64, f64),
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            min_pegin_amount: 10_000,
            max_pegin_amount: 10_000_000_000,
            bridge_fee_sats: 1_000,
            min_confirmations_pegin: 6,
            min_confirmations_pegout: 100,
            federation_threshold: 10,
            emergency_timeout_blocks: 1_008,
            collateralization_band: (0.95, 1.05),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub workers: usize,
    pub trust_weight: f64,
    pub speed_weight: f64,
    pub power_weight: f64,
    pub stale_metrics_after_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            trust_weight: 0.6,
            speed_weight: 0.3,
            power_weight: 0.1,
            stale_metrics_after_ms: 5 * 60 * 1000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReputationConfig {
    pub decay_window_days: u64,
    pub decay_rate: f64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            decay_window_days: 30,
            decay_rate: 0.01,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterRetryConfig {
    pub max_broadcast_attempts: u32,
    pub max_heartbeat_attempts: u32,
    pub request_timeout_ms: u64,
    pub broadcast_cache_ttl_ms: u64,
}

impl Default for AdapterRetryConfig {
    fn default() -> Self {
        Self {
            max_broadcast_attempts: 5,
            max_heartbeat_attempts: 5,
            request_timeout_ms: 10_000,
            broadcast_cache_ttl_ms: 60_000,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub kv_store_path: Option<String>,
    pub mempool: MempoolConfig,
    pub block_producer: BlockProducerConfig,
    pub reorg_detector: ReorgDetectorConfig,
    pub bridge: BridgeConfig,
    pub orchestrator: OrchestratorConfig,
    pub reputation: ReputationConfig,
    pub adapter_retry: AdapterRetryConfig,
}

//! Chain adapter contract (spec §4.7): a uniform capability set every
//! chain integration implements. `basalt-chain-adapter` ships mocks that
//! honor the contract — real RPC/WS/ZMQ clients are out of scope (spec
//! §1) — so the retry/backoff and idempotency-cache logic has a real
//! exerciser.

pub mod mock;

use std::collections::HashMap;

use basalt_primitives::{AdapterTraits, BlockHeader, EnergyTelemetry, FeePolicy, Network, NormalizedTx, SlippagePolicy};
use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum AdapterError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("adapter is in read-only mode")]
    ReadOnly,

    #[error("adapter is not initialized")]
    NotInitialized,
}

#[derive(Clone, Debug)]
pub struct AdapterConfig {
    pub chain: String,
    pub node_endpoint: String,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    pub network: Network,
    pub extra: HashMap<String, String>,
    pub enable_telemetry: bool,
    pub read_only: bool,
    pub fee_policy: FeePolicy,
    pub slippage_policy: SlippagePolicy,
    pub min_oracle_confidence: f64,
}

#[derive(Clone, Debug, Default)]
pub struct BroadcastOpts {
    pub raw_tx: Vec<u8>,
    pub extra: HashMap<String, String>,
}

pub type OnTx = Box<dyn Fn(NormalizedTx) + Send + Sync>;
pub type OnBlock = Box<dyn Fn(BlockHeader) + Send + Sync>;
pub type OnEnergy = Box<dyn Fn(EnergyTelemetry) + Send + Sync>;
pub type OnError = Box<dyn Fn(&AdapterError) + Send + Sync>;

/// The uniform capability set every chain integration implements (spec
/// §4.7). Mirrors the teacher's adapter-facing traits, generalized from a
/// single chain family to an arbitrary one.
pub trait ChainAdapter: Send + Sync {
    fn init(&self, cfg: AdapterConfig, on_error: OnError) -> Result<(), AdapterError>;
    fn start(&self, on_tx: OnTx, on_block: OnBlock, on_energy: OnEnergy) -> Result<(), AdapterError>;
    fn stop(&self);
    fn broadcast(&self, opts: BroadcastOpts) -> Result<String, AdapterError>;
    fn get_transaction(&self, tx_id: &str) -> Option<NormalizedTx>;
    fn get_block_header(&self, hash: &str) -> Option<BlockHeader>;
    fn get_block_height(&self) -> Option<u64>;
    fn traits(&self) -> AdapterTraits;
}

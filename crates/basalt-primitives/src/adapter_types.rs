//! Value types shared by the chain adapter contract and the settlement
//! orchestrator (spec §3.1, §4.7, §4.9). These are plain data, not
//! behavior: the adapter contract itself lives in `basalt-chain-adapter`.

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// The native unit of a chain (sats/8, wei/18, lamports/9).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub symbol: String,
    pub decimals: u8,
}

impl UnitSpec {
    pub const fn new(symbol: String, decimals: u8) -> Self {
        Self { symbol, decimals }
    }
}

/// A chain-native amount paired with its unit.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub value: u128,
    pub unit: UnitSpec,
}

/// Normalized transaction input, as returned by `get_transaction`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxIn {
    pub prev_tx_id: Digest,
    pub prev_index: u32,
}

/// Normalized transaction output, as returned by `get_transaction`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: String,
    pub amount: u64,
}

/// A normalized view of a transaction on some L1, independent of its
/// native wire format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTx {
    pub tx_id: Digest,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub confirmed: bool,
    pub block_height: Option<u64>,
}

/// A normalized block header, as returned by `get_block_header`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: Digest,
    pub height: u64,
    pub prev_hash: Digest,
    pub merkle_root: Digest,
    pub timestamp: u64,
}

/// Periodic, best-effort energy telemetry delivered via `on_energy`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnergyTelemetry {
    pub carbon_intensity_g_co2_per_kwh: f64,
    pub energy_source: String,
    pub sampled_at: u64,
}

/// Static descriptor of what an adapter supports (spec §4.7 `traits()`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AdapterTraits {
    pub name: String,
    pub version: String,
    pub supports_events: bool,
    pub supports_broadcast: bool,
    pub supports_smart_contracts: bool,
    pub supports_utxo_model: bool,
    pub supports_privacy: bool,
    pub default_unit: UnitSpec,
    pub audited: bool,
}

/// Network selector accepted by `AdapterConfig`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
    /// A chain-specific network name the adapter family recognizes itself.
    Named(String),
}

/// Fee policy attached to a settlement intent or adapter config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeePolicy {
    pub max_fee_rate: f64,
    pub priority: FeePriority,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FeePriority {
    Low,
    Normal,
    High,
}

/// Slippage policy attached to a settlement intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlippagePolicy {
    pub max_slippage_pct: f64,
    pub enforce_hard: bool,
}

impl SlippagePolicy {
    /// Structural validity per spec §4.9: `max_slippage_pct > 0` when hard
    /// enforcement is requested.
    pub fn is_structurally_valid(&self) -> bool {
        if self.enforce_hard {
            self.max_slippage_pct > 0.0
        } else {
            true
        }
    }
}

/// An oracle-reported confidence signal, checked against a floor by the
/// settlement orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OracleSignal {
    pub price: f64,
    pub confidence: f64,
}

/// Risk flags surfaced to the caller alongside a settlement routing
/// decision (successful or not).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RiskFlags {
    pub circuit_breaker_tripped: bool,
    pub low_oracle_confidence: bool,
    pub slippage_invalid: bool,
}

impl RiskFlags {
    pub fn is_clear(&self) -> bool {
        !self.circuit_breaker_tripped && !self.low_oracle_confidence && !self.slippage_invalid
    }
}

/// A chain identifier, deliberately open-ended — new adapters add new
/// variants-by-string rather than requiring a core-crate release.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of settlement a `SettlementIntent` asks for (spec §6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SettlementKind {
    PegIn,
    PegOut,
    SwapCrossChain,
    Checkpoint,
    FeeSweep,
}

/// A settlement intent as defined in spec §6.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementIntent {
    pub kind: SettlementKind,
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub amount_source: Amount,
    pub min_receive_target: Amount,
    pub fee_policy: FeePolicy,
    pub slippage_policy: SlippagePolicy,
    pub oracle: Option<OracleSignal>,
    pub vault_id: Option<String>,
    pub peg_tag: Option<String>,
    pub target_address: Option<String>,
}

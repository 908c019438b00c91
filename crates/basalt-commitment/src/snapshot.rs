//! The aggregate view of L2 state that the commitment builder and the
//! snapshot journal both canonicalise (spec §3 "L2 snapshot").
//!
//! This is a self-contained summary model, not the owning ledger/bridge/
//! orchestrator types themselves: the ledger, bridge, and orchestrator each
//! project their state into these entries when asking for a commitment or
//! writing a journal record, which keeps this crate a leaf dependency.

#[derive(Clone, Debug, PartialEq)]
pub struct BalanceEntry {
    pub peer_id: String,
    pub balance: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EscrowEntry {
    pub task_id: String,
    pub client_peer_id: String,
    pub amount: u64,
    pub locked: bool,
    pub created_at: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PegInEntry {
    pub peg_id: String,
    pub status: String,
    pub l1_amount: u64,
    pub l2_mint_amount: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PegOutEntry {
    pub peg_id: String,
    pub status: String,
    pub l2_burn_amount: u64,
    pub l1_release_amount: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaskEntry {
    pub task_id: String,
    pub task_type: String,
    pub priority: u8,
    pub submitter_id: String,
    pub submitted_at: u64,
    pub payload_hash: String,
    pub bound_anchor_hash: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct L2StateSnapshot {
    pub balances: Vec<BalanceEntry>,
    pub escrows: Vec<EscrowEntry>,
    pub pegins: Vec<PegInEntry>,
    pub pegouts: Vec<PegOutEntry>,
    pub tasks: Vec<TaskEntry>,
    pub timestamp_ms: u64,
    pub recovery_metadata: Vec<u8>,
}

//! Projects the ledger's current state into the shape the commitment
//! builder and block producer share. The bridge's
//! peg-in/peg-out state and the orchestrator's task table are not
//! enumerable in bulk from their current public APIs, so this node only
//! ever anchors balances and escrows — a real deployment would extend
//! `Bridge`/`TaskOrchestrator` with a listing API and fold their entries
//! in here too.

use basalt_commitment::{BalanceEntry, EscrowEntry, L2StateSnapshot};
use basalt_ledger::Ledger;

pub fn project(ledger: &Ledger, timestamp_ms: u64) -> L2StateSnapshot {
    let snap = ledger.snapshot();
    L2StateSnapshot {
        balances: snap
            .balances
            .into_iter()
            .map(|(peer, balance)| BalanceEntry {
                peer_id: peer.to_string(),
                balance,
            })
            .collect(),
        escrows: snap
            .escrows
            .into_iter()
            .map(|(task_id, escrow)| EscrowEntry {
                task_id: task_id.to_string(),
                client_peer_id: escrow.client_peer_id.to_string(),
                amount: escrow.amount,
                locked: escrow.locked,
                created_at: escrow.created_at,
            })
            .collect(),
        timestamp_ms,
        ..Default::default()
    }
}

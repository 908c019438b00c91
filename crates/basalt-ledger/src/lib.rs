//! Ledger (spec §4.1): balances, escrow lifecycle, atomic transfers, and an
//! advisory event stream. The ledger is the sole writer of balances and
//! escrows (spec §3 "Ownership").
//!
//! Concurrency follows spec §5's shared-resource policy: balances and
//! escrows are each guarded by their own `RwLock`, and any operation that
//! touches both (`put_in_escrow`, `release_escrow`, `refund_escrow`)
//! acquires them in the fixed order balances-then-escrows to avoid
//! deadlock with any other component that might someday need the reverse.

use std::{collections::BTreeMap, sync::Arc};

use basalt_primitives::{PeerId, TaskId};
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum LedgerError {
    #[error("insufficient funds: {peer} has {available}, requested {requested}")]
    InsufficientFunds {
        peer: PeerId,
        requested: u64,
        available: u64,
    },

    #[error("invalid peer: {0}")]
    InvalidPeer(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Escrow {
    pub task_id: TaskId,
    pub client_peer_id: PeerId,
    pub amount: u64,
    pub locked: bool,
    pub created_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    Credit { peer: PeerId, amount: u64 },
    Debit { peer: PeerId, amount: u64 },
    EscrowCreated { task_id: TaskId, client: PeerId, amount: u64 },
    EscrowReleased { task_id: TaskId, worker: PeerId, amount: u64 },
    EscrowRefunded { task_id: TaskId, client: PeerId, amount: u64 },
}

#[derive(Clone, Debug, Default)]
pub struct LedgerSnapshot {
    /// Sorted ascending by peer id.
    pub balances: Vec<(PeerId, u64)>,
    /// Sorted ascending by task id.
    pub escrows: Vec<(TaskId, Escrow)>,
}

type EventCallback = dyn Fn(LedgerEvent) + Send + Sync;

/// The ledger. Cheaply cloneable (`Arc` internals would be more typical for
/// sharing across threads, so callers usually hold this behind an `Arc`).
pub struct Ledger {
    balances: RwLock<BTreeMap<PeerId, u64>>,
    escrows: RwLock<BTreeMap<TaskId, Escrow>>,
    callbacks: RwLock<Vec<Arc<EventCallback>>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            balances: RwLock::new(BTreeMap::new()),
            escrows: RwLock::new(BTreeMap::new()),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn register_event_callback<F>(&self, f: F)
    where
        F: Fn(LedgerEvent) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(f));
    }

    /// Never inserts for unknown peers — matches spec §3's "querying never
    /// inserts" invariant.
    pub fn balance_of(&self, peer: &PeerId) -> u64 {
        self.balances.read().get(peer).copied().unwrap_or(0)
    }

    pub fn get_escrow(&self, task_id: &TaskId) -> Option<Escrow> {
        self.escrows.read().get(task_id).cloned()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let balances = self.balances.read();
        let escrows = self.escrows.read();
        LedgerSnapshot {
            balances: balances.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            escrows: escrows.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    pub fn credit(&self, peer: &PeerId, amount: u64) -> Result<(), LedgerError> {
        if peer.is_empty() {
            return Err(LedgerError::InvalidPeer("peer id is empty".into()));
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("amount must be > 0".into()));
        }
        {
            let mut balances = self.balances.write();
            *balances.entry(peer.clone()).or_insert(0) += amount;
        }
        self.emit(LedgerEvent::Credit {
            peer: peer.clone(),
            amount,
        });
        Ok(())
    }

    /// Returns `Result` rather than the `bool` used in the prose spec —
    /// callers need the failure category (spec §7 requires every operation
    /// to surface a structured outcome, not a bare boolean).
    pub fn debit(&self, peer: &PeerId, amount: u64) -> Result<(), LedgerError> {
        if peer.is_empty() {
            return Err(LedgerError::InvalidPeer("peer id is empty".into()));
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("amount must be > 0".into()));
        }
        {
            let mut balances = self.balances.write();
            let available = balances.get(peer).copied().unwrap_or(0);
            if available < amount {
                return Err(LedgerError::InsufficientFunds {
                    peer: peer.clone(),
                    requested: amount,
                    available,
                });
            }
            *balances.get_mut(peer).unwrap() -= amount;
        }
        self.emit(LedgerEvent::Debit {
            peer: peer.clone(),
            amount,
        });
        Ok(())
    }

    pub fn transfer(&self, from: &PeerId, to: &PeerId, amount: u64) -> Result<(), LedgerError> {
        if from == to {
            return Err(LedgerError::InvalidPeer("transfer requires from != to".into()));
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("amount must be > 0".into()));
        }
        {
            let mut balances = self.balances.write();
            let available = balances.get(from).copied().unwrap_or(0);
            if available < amount {
                return Err(LedgerError::InsufficientFunds {
                    peer: from.clone(),
                    requested: amount,
                    available,
                });
            }
            *balances.entry(from.clone()).or_insert(0) -= amount;
            *balances.entry(to.clone()).or_insert(0) += amount;
        }
        self.emit(LedgerEvent::Debit {
            peer: from.clone(),
            amount,
        });
        self.emit(LedgerEvent::Credit {
            peer: to.clone(),
            amount,
        });
        Ok(())
    }

    pub fn put_in_escrow(&self, escrow: Escrow) -> Result<(), LedgerError> {
        if escrow.amount == 0 {
            return Err(LedgerError::InvalidAmount("escrow amount must be > 0".into()));
        }
        if escrow.client_peer_id.is_empty() {
            return Err(LedgerError::InvalidPeer("escrow client id is empty".into()));
        }

        // Fixed lock order: balances before escrows.
        let mut balances = self.balances.write();
        let mut escrows = self.escrows.write();

        if escrows.contains_key(&escrow.task_id) {
            return Err(LedgerError::AlreadyExists(format!(
                "escrow for task {} already exists",
                escrow.task_id
            )));
        }

        let available = balances.get(&escrow.client_peer_id).copied().unwrap_or(0);
        if available < escrow.amount {
            return Err(LedgerError::InsufficientFunds {
                peer: escrow.client_peer_id.clone(),
                requested: escrow.amount,
                available,
            });
        }
        *balances.entry(escrow.client_peer_id.clone()).or_insert(0) -= escrow.amount;

        let task_id = escrow.task_id.clone();
        let client = escrow.client_peer_id.clone();
        let amount = escrow.amount;
        escrows.insert(task_id.clone(), escrow);

        drop(escrows);
        drop(balances);

        self.emit(LedgerEvent::EscrowCreated {
            task_id,
            client,
            amount,
        });
        Ok(())
    }

    pub fn release_escrow(&self, task_id: &TaskId, worker: &PeerId) -> Result<(), LedgerError> {
        if worker.is_empty() {
            return Err(LedgerError::InvalidPeer("worker id is empty".into()));
        }

        let mut balances = self.balances.write();
        let mut escrows = self.escrows.write();

        let escrow = escrows
            .remove(task_id)
            .ok_or_else(|| LedgerError::NotFound(format!("no escrow for task {task_id}")))?;

        *balances.entry(worker.clone()).or_insert(0) += escrow.amount;

        drop(escrows);
        drop(balances);

        self.emit(LedgerEvent::EscrowReleased {
            task_id: task_id.clone(),
            worker: worker.clone(),
            amount: escrow.amount,
        });
        Ok(())
    }

    pub fn refund_escrow(&self, task_id: &TaskId) -> Result<(), LedgerError> {
        let mut balances = self.balances.write();
        let mut escrows = self.escrows.write();

        let escrow = escrows
            .remove(task_id)
            .ok_or_else(|| LedgerError::NotFound(format!("no escrow for task {task_id}")))?;

        *balances.entry(escrow.client_peer_id.clone()).or_insert(0) += escrow.amount;

        drop(escrows);
        drop(balances);

        self.emit(LedgerEvent::EscrowRefunded {
            task_id: task_id.clone(),
            client: escrow.client_peer_id,
            amount: escrow.amount,
        });
        Ok(())
    }

    /// Total conserved value: sum of balances plus sum of escrow amounts.
    /// Exposed for tests that assert the conservation invariant (spec §8,
    /// universal invariant 1); not part of the production surface.
    #[cfg(test)]
    fn total_value(&self) -> u64 {
        let balances: u64 = self.balances.read().values().sum();
        let escrows: u64 = self.escrows.read().values().map(|e| e.amount).sum();
        balances + escrows
    }

    fn emit(&self, event: LedgerEvent) {
        for cb in self.callbacks.read().iter() {
            cb(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use basalt_primitives::Digest;

    use super::*;

    fn task(label: u8) -> TaskId {
        TaskId(Digest::from_bytes([label; 32]))
    }

    /// Scenario S1 from spec §8.
    #[test]
    fn s1_credit_and_transfer() {
        let ledger = Ledger::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events2 = events.clone();
        ledger.register_event_callback(move |ev| events2.lock().unwrap().push(ev));

        let a = PeerId::new("A");
        let b = PeerId::new("B");

        ledger.credit(&a, 1000).unwrap();
        ledger.transfer(&a, &b, 400).unwrap();

        assert_eq!(ledger.balance_of(&a), 600);
        assert_eq!(ledger.balance_of(&b), 400);

        let got = events.lock().unwrap().clone();
        assert_eq!(
            got,
            vec![
                LedgerEvent::Credit { peer: a.clone(), amount: 1000 },
                LedgerEvent::Debit { peer: a, amount: 400 },
                LedgerEvent::Credit { peer: b, amount: 400 },
            ]
        );
    }

    /// Scenario S2 from spec §8.
    #[test]
    fn s2_escrow_create_and_release() {
        let ledger = Ledger::new();
        let client = PeerId::new("client");
        let worker = PeerId::new("worker");
        let t = task(1);

        ledger.credit(&client, 500).unwrap();
        ledger
            .put_in_escrow(Escrow {
                task_id: t.clone(),
                client_peer_id: client.clone(),
                amount: 200,
                locked: true,
                created_at: 0,
            })
            .unwrap();
        ledger.release_escrow(&t, &worker).unwrap();

        assert_eq!(ledger.balance_of(&client), 300);
        assert_eq!(ledger.balance_of(&worker), 200);
        assert!(ledger.get_escrow(&t).is_none());
    }

    #[test]
    fn debit_never_goes_negative() {
        let ledger = Ledger::new();
        let a = PeerId::new("A");
        let err = ledger.debit(&a, 1).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance_of(&a), 0);
    }

    #[test]
    fn put_in_escrow_fails_closed_on_insufficient_funds() {
        let ledger = Ledger::new();
        let client = PeerId::new("client");
        let t = task(2);
        let err = ledger
            .put_in_escrow(Escrow {
                task_id: t.clone(),
                client_peer_id: client.clone(),
                amount: 50,
                locked: true,
                created_at: 0,
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert!(ledger.get_escrow(&t).is_none());
        assert_eq!(ledger.balance_of(&client), 0);
    }

    #[test]
    fn duplicate_escrow_task_id_rejected() {
        let ledger = Ledger::new();
        let client = PeerId::new("client");
        let t = task(3);
        ledger.credit(&client, 1000).unwrap();
        ledger
            .put_in_escrow(Escrow {
                task_id: t.clone(),
                client_peer_id: client.clone(),
                amount: 100,
                locked: true,
                created_at: 0,
            })
            .unwrap();
        let err = ledger
            .put_in_escrow(Escrow {
                task_id: t,
                client_peer_id: client,
                amount: 100,
                locked: true,
                created_at: 0,
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(_)));
    }

    #[test]
    fn conservation_holds_across_credit_transfer_escrow_release() {
        let ledger = Ledger::new();
        let a = PeerId::new("A");
        let b = PeerId::new("B");
        let t = task(4);

        ledger.credit(&a, 1000).unwrap();
        assert_eq!(ledger.total_value(), 1000);

        ledger.transfer(&a, &b, 300).unwrap();
        assert_eq!(ledger.total_value(), 1000);

        ledger
            .put_in_escrow(Escrow {
                task_id: t.clone(),
                client_peer_id: b.clone(),
                amount: 150,
                locked: true,
                created_at: 0,
            })
            .unwrap();
        assert_eq!(ledger.total_value(), 1000);

        ledger.release_escrow(&t, &a).unwrap();
        assert_eq!(ledger.total_value(), 1000);
    }

    #[test]
    fn releasing_to_empty_worker_fails() {
        let ledger = Ledger::new();
        let client = PeerId::new("client");
        let t = task(5);
        ledger.credit(&client, 100).unwrap();
        ledger
            .put_in_escrow(Escrow {
                task_id: t.clone(),
                client_peer_id: client,
                amount: 100,
                locked: true,
                created_at: 0,
            })
            .unwrap();
        let err = ledger.release_escrow(&t, &PeerId::new("")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPeer(_)));
        // escrow must still be present — the failed release is a no-op.
        assert!(ledger.get_escrow(&t).is_some());
    }
}

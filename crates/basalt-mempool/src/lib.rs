//! Mempool (spec §4.2): a bounded FIFO of pending L2 transactions with a
//! small bounded ring of recently confirmed transactions for query. A
//! single mutex guards both queues (spec §4.2 "Concurrency").

use std::collections::VecDeque;

use basalt_primitives::{Digest, PeerId};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum MempoolError {
    #[error("malformed transaction: {0}")]
    InvalidStructure(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub tx_hash: String,
    pub from: PeerId,
    pub to: PeerId,
    pub amount: u64,
    pub data: Vec<u8>,
    pub timestamp: u64,
    pub status: TxStatus,
    pub block_height: Option<u64>,
}

impl Transaction {
    pub fn new_pending(tx_hash: impl Into<String>, from: PeerId, to: PeerId, amount: u64, data: Vec<u8>, timestamp: u64) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            from,
            to,
            amount,
            data,
            timestamp,
            status: TxStatus::Pending,
            block_height: None,
        }
    }
}

/// Structural validation applied both on `add` (defense in depth) and,
/// again, by the block producer right before confirming (spec §4.5 step 3:
/// "reject entries that fail structural validation").
pub fn validate_tx_structure(tx: &Transaction) -> Result<(), MempoolError> {
    if !Digest::is_well_formed_hex(&tx.tx_hash) {
        return Err(MempoolError::InvalidStructure(format!(
            "tx_hash {} is not 64 lowercase hex chars",
            tx.tx_hash
        )));
    }
    if tx.from.is_empty() {
        return Err(MempoolError::InvalidStructure("sender is empty".into()));
    }
    if tx.to.is_empty() {
        return Err(MempoolError::InvalidStructure("receiver is empty".into()));
    }
    Ok(())
}

struct Inner {
    pending: VecDeque<Transaction>,
    confirmed: VecDeque<Transaction>,
    max_pending: usize,
    max_confirmed: usize,
}

pub struct Mempool {
    inner: Mutex<Inner>,
}

impl Mempool {
    pub fn new(max_pending: usize, max_confirmed: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                confirmed: VecDeque::new(),
                max_pending,
                max_confirmed,
            }),
        }
    }

    /// Adds `tx` to the pending queue, evicting the oldest pending entry
    /// first if the bound is already reached (spec §3: "eviction is
    /// oldest-first within a status class").
    pub fn add(&self, tx: Transaction) -> Result<(), MempoolError> {
        validate_tx_structure(&tx)?;
        let mut inner = self.inner.lock();
        if inner.pending.len() >= inner.max_pending {
            inner.pending.pop_front();
        }
        inner.pending.push_back(tx);
        Ok(())
    }

    /// Returns up to `max_count` pending transactions in insertion order.
    /// This is a read-ahead: entries are not removed (spec §4.2).
    pub fn take_pending(&self, max_count: usize) -> Vec<Transaction> {
        let inner = self.inner.lock();
        inner.pending.iter().take(max_count).cloned().collect()
    }

    /// Moves every entry whose hash is in `hashes` from pending to the
    /// confirmed ring, in one critical section. Unknown hashes are
    /// silently skipped (idempotent). Returns the number confirmed.
    pub fn confirm(&self, hashes: &[String], block_height: u64) -> usize {
        let mut inner = self.inner.lock();
        let mut confirmed_count = 0;

        for hash in hashes {
            if let Some(pos) = inner.pending.iter().position(|tx| &tx.tx_hash == hash) {
                let mut tx = inner.pending.remove(pos).expect("position just found");
                tx.status = TxStatus::Confirmed;
                tx.block_height = Some(block_height);

                if inner.confirmed.len() >= inner.max_confirmed {
                    inner.confirmed.pop_front();
                }
                inner.confirmed.push_back(tx);
                confirmed_count += 1;
            }
        }

        confirmed_count
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Debug/introspection surface only: pending entries followed by
    /// confirmed entries, each still in insertion order. The block
    /// producer never consumes this (spec §4.2 additional detail).
    pub fn all(&self) -> Vec<Transaction> {
        let inner = self.inner.lock();
        inner.pending.iter().chain(inner.confirmed.iter()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(hash: &str) -> Transaction {
        Transaction::new_pending(hash, PeerId::new("alice"), PeerId::new("bob"), 10, vec![], 0)
    }

    fn hex_hash(byte: u8) -> String {
        hex::encode([byte; 32])
    }

    #[test]
    fn add_rejects_malformed_tx_hash() {
        let mempool = Mempool::new(10, 10);
        let err = mempool.add(tx("not-hex")).unwrap_err();
        assert!(matches!(err, MempoolError::InvalidStructure(_)));
    }

    #[test]
    fn confirm_is_idempotent_on_unknown_hash() {
        let mempool = Mempool::new(10, 10);
        let h = hex_hash(1);
        mempool.add(tx(&h)).unwrap();
        let confirmed = mempool.confirm(&["ffff".repeat(16)], 1);
        assert_eq!(confirmed, 0);
        assert_eq!(mempool.pending_count(), 1);
    }

    #[test]
    fn confirm_moves_to_ring_in_order() {
        let mempool = Mempool::new(10, 10);
        let h1 = hex_hash(1);
        let h2 = hex_hash(2);
        mempool.add(tx(&h1)).unwrap();
        mempool.add(tx(&h2)).unwrap();

        let confirmed = mempool.confirm(&[h1.clone(), h2.clone()], 42);
        assert_eq!(confirmed, 2);
        assert_eq!(mempool.pending_count(), 0);

        let all = mempool.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].tx_hash, h1);
        assert_eq!(all[1].tx_hash, h2);
        assert!(all.iter().all(|t| t.status == TxStatus::Confirmed && t.block_height == Some(42)));
    }

    #[test]
    fn pending_bound_evicts_oldest_first() {
        let mempool = Mempool::new(2, 10);
        mempool.add(tx(&hex_hash(1))).unwrap();
        mempool.add(tx(&hex_hash(2))).unwrap();
        mempool.add(tx(&hex_hash(3))).unwrap();

        let pending = mempool.take_pending(10);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].tx_hash, hex_hash(2));
        assert_eq!(pending[1].tx_hash, hex_hash(3));
    }

    #[test]
    fn confirmed_ring_is_capped() {
        let mempool = Mempool::new(10, 1);
        mempool.add(tx(&hex_hash(1))).unwrap();
        mempool.add(tx(&hex_hash(2))).unwrap();
        mempool.confirm(&[hex_hash(1), hex_hash(2)], 1);
        let all = mempool.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tx_hash, hex_hash(2));
    }

    #[test]
    fn take_pending_does_not_remove() {
        let mempool = Mempool::new(10, 10);
        mempool.add(tx(&hex_hash(1))).unwrap();
        let _ = mempool.take_pending(10);
        assert_eq!(mempool.pending_count(), 1);
    }
}

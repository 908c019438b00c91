//! Persistent key-value store facade (spec §2, §6): an ordered,
//! byte-keyed store with atomic batch writes and prefix iteration. The
//! reorg detector is the primary consumer, using the `block:`, `anchor:`,
//! `reorg:`, and `reorg_counter` keyspaces described in spec §6.
//!
//! Two implementations are provided: [`MemKvStore`], a `BTreeMap` backed
//! store for tests and ephemeral use, and [`SledKvStore`], a persistent
//! store backed by `sled` (the same embedded-store family the sibling
//! `alpenlabs-alpen` workspace uses for its newer `store-sled` crate).

use std::{
    collections::BTreeMap,
    ops::Bound,
    path::Path,
    sync::Arc,
};

use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("store not initialized")]
    NotInitialized,

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single mutation in a [`WriteBatch`].
enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A set of mutations applied atomically by [`KvStore::write_batch`].
///
/// Used wherever the spec requires multiple keys to change together: reorg
/// invalidation + event append (spec §4.3), and block pruning (spec §4.3).
#[derive(Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
        self
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete(key.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Ordered, byte-keyed key-value store with atomic batch writes and
/// prefix-scan iteration.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        let mut batch = WriteBatch::new();
        batch.put(key.to_vec(), value.to_vec());
        self.write_batch(batch)
    }

    fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        let mut batch = WriteBatch::new();
        batch.delete(key.to_vec());
        self.write_batch(batch)
    }

    /// Applies every operation in `batch` atomically: either all of them
    /// are visible to subsequent reads, or none are.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), KvError>;

    /// Returns every `(key, value)` pair whose key starts with `prefix`, in
    /// ascending key order. Bounded and owned, per the design notes'
    /// "expose bounded prefix-scan iterators that yield owned records"
    /// guidance — nothing here borrows from the store past the call.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;
}

/// In-memory, `BTreeMap`-backed store. Used in tests and by any component
/// that doesn't need to survive a restart.
#[derive(Default)]
pub struct MemKvStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), KvError> {
        let mut guard = self.inner.write();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => {
                    guard.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    guard.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        let guard = self.inner.read();
        let upper = prefix_upper_bound(prefix);
        let range = match &upper {
            Some(upper) => guard.range::<Vec<u8>, _>((
                Bound::Included(prefix.to_vec()),
                Bound::Excluded(upper.clone()),
            )),
            None => guard.range::<Vec<u8>, _>((Bound::Included(prefix.to_vec()), Bound::Unbounded)),
        };
        Ok(range.map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Persistent store backed by `sled`.
pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn open_temporary() -> Result<Self, KvError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl KvStore for SledKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.db.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), KvError> {
        let mut sled_batch = sled::Batch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => sled_batch.insert(k, v),
                BatchOp::Delete(k) => sled_batch.remove(k),
            }
        }
        self.db.apply_batch(sled_batch)?;
        self.db.flush()?;
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (k, v) = item?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }
}

/// Smallest byte string strictly greater than every string starting with
/// `prefix`, or `None` if `prefix` is all `0xff` (meaning "no upper bound").
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last == 0xff {
            upper.pop();
            continue;
        }
        *last += 1;
        return Some(upper);
    }
    None
}

/// Convenience alias used by consumers that take `Arc<dyn KvStore>`.
pub type SharedKvStore = Arc<dyn KvStore>;

//! Transaction pool (mempool) for pending transactions
//!
//! Holds admitted transactions keyed by content hash until the block
//! producer drains them. First seen wins; re-adding is a no-op.

use crate::core::Transaction;
use crate::crypto::Hash;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Memory pool for pending transactions
#[derive(Debug, Default)]
pub struct Mempool {
    txs: RwLock<HashMap<Hash, Transaction>>,
}

impl Mempool {
    /// Create a new mempool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction. Returns `false` if it was already present.
    pub fn add(&self, tx: Transaction) -> bool {
        let hash = tx.hash();
        let mut txs = self.txs.write().unwrap_or_else(PoisonError::into_inner);

        if txs.contains_key(&hash) {
            return false;
        }
        txs.insert(hash, tx);
        true
    }

    pub fn has(&self, tx: &Transaction) -> bool {
        self.contains(&tx.hash())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.txs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(hash)
    }

    /// Remove and return every pending transaction
    pub fn clear(&self) -> Vec<Transaction> {
        let mut txs = self.txs.write().unwrap_or_else(PoisonError::into_inner);
        txs.drain().map(|(_, tx)| tx).collect()
    }

    pub fn len(&self) -> usize {
        self.txs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! In-memory stores
//!
//! Each store is a `HashMap` behind its own `RwLock`. Reads share the lock,
//! writes take it exclusively.

use super::traits::{BlockStore, StorageError, TxStore, UtxoStore};
use crate::core::{Block, Transaction, Utxo, UtxoKey};
use crate::crypto::Hash;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Hash, Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().map(|blocks| blocks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&self, block: &Block) -> Result<(), StorageError> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| StorageError::LockPoisoned("block"))?;
        blocks.insert(block.hash(), block.clone());
        Ok(())
    }

    fn get(&self, hash: &Hash) -> Result<Block, StorageError> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| StorageError::LockPoisoned("block"))?;
        blocks.get(hash).cloned().ok_or_else(|| StorageError::NotFound {
            kind: "block",
            key: hash.to_hex(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryTxStore {
    txs: RwLock<HashMap<Hash, Transaction>>,
}

impl MemoryTxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.txs.read().map(|txs| txs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TxStore for MemoryTxStore {
    fn put(&self, tx: &Transaction) -> Result<(), StorageError> {
        let mut txs = self
            .txs
            .write()
            .map_err(|_| StorageError::LockPoisoned("transaction"))?;
        txs.insert(tx.hash(), tx.clone());
        Ok(())
    }

    fn get(&self, hash: &Hash) -> Result<Transaction, StorageError> {
        let txs = self
            .txs
            .read()
            .map_err(|_| StorageError::LockPoisoned("transaction"))?;
        txs.get(hash).cloned().ok_or_else(|| StorageError::NotFound {
            kind: "transaction",
            key: hash.to_hex(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryUtxoStore {
    utxos: RwLock<HashMap<UtxoKey, Utxo>>,
}

impl MemoryUtxoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.utxos.read().map(|utxos| utxos.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UtxoStore for MemoryUtxoStore {
    fn put(&self, utxo: &Utxo) -> Result<(), StorageError> {
        let mut utxos = self
            .utxos
            .write()
            .map_err(|_| StorageError::LockPoisoned("utxo"))?;
        utxos.insert(utxo.key(), utxo.clone());
        Ok(())
    }

    fn get(&self, key: &UtxoKey) -> Result<Utxo, StorageError> {
        let utxos = self
            .utxos
            .read()
            .map_err(|_| StorageError::LockPoisoned("utxo"))?;
        utxos.get(key).cloned().ok_or_else(|| StorageError::NotFound {
            kind: "utxo",
            key: key.to_string(),
        })
    }
}

/// Block store whose writes can be switched to fail, for exercising
/// commit failures
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FlakyBlockStore {
    inner: MemoryBlockStore,
    failing: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl FlakyBlockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl BlockStore for FlakyBlockStore {
    fn put(&self, block: &Block) -> Result<(), StorageError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StorageError::LockPoisoned("block"));
        }
        self.inner.put(block)
    }

    fn get(&self, hash: &Hash) -> Result<Block, StorageError> {
        self.inner.get(hash)
    }
}

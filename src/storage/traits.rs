//! Storage interfaces used by the chain
//!
//! Each store owns its key space. `put` inserts or overwrites; `get` of a
//! key that was never stored returns [`StorageError::NotFound`].

use crate::core::{Block, Transaction, Utxo, UtxoKey};
use crate::crypto::Hash;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("{0} store lock poisoned")]
    LockPoisoned(&'static str),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Blocks keyed by block hash
pub trait BlockStore: Send + Sync {
    fn put(&self, block: &Block) -> Result<(), StorageError>;
    fn get(&self, hash: &Hash) -> Result<Block, StorageError>;
}

/// Transactions keyed by content hash
pub trait TxStore: Send + Sync {
    fn put(&self, tx: &Transaction) -> Result<(), StorageError>;
    fn get(&self, hash: &Hash) -> Result<Transaction, StorageError>;
}

/// UTXOs keyed by `(tx_hash, out_index)`
pub trait UtxoStore: Send + Sync {
    fn put(&self, utxo: &Utxo) -> Result<(), StorageError>;
    fn get(&self, key: &UtxoKey) -> Result<Utxo, StorageError>;
}

//! Chain implementation
//!
//! The chain owns the ordered header list and is the only writer of the
//! UTXO set. Blocks are validated against the current head and then
//! committed through the block, transaction and UTXO stores.

use crate::core::block::{Block, Header, BLOCK_VERSION};
use crate::core::transaction::{Transaction, TransactionBuilder, TransactionError, Utxo, UtxoKey};
use crate::crypto::{Hash, KeyError, PrivateKey};
use crate::storage::{
    BlockStore, MemoryBlockStore, MemoryTxStore, MemoryUtxoStore, StorageError, TxStore,
    UtxoStore,
};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Seed of the key that signs the genesis block and owns its output
pub const GENESIS_SEED: &str = "d12cda4733e2e24377cc161b55bf447a13a615d48838b33ab7634b77531734dc";

/// Amount credited by the genesis transaction
pub const GENESIS_AMOUNT: u64 = 1000;

/// Chain-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Invalid block signature")]
    InvalidBlockSignature,
    #[error("Invalid root hash in block {0}")]
    InvalidRootHash(Hash),
    #[error("Block does not extend the head: expected prev hash {expected}, got {got}")]
    LinkageMismatch { expected: Hash, got: Hash },
    #[error("Unexpected block height: expected {expected}, got {got}")]
    UnexpectedHeight { expected: u64, got: u64 },
    #[error("Transaction {0} appears more than once in the block")]
    DuplicateTransaction(Hash),
    #[error("Height {requested} is above the chain height {current}")]
    HeightTooHigh { requested: u64, current: u64 },
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

// =============================================================================
// Header List
// =============================================================================

/// Append-only list of headers; index is height
#[derive(Debug, Clone, Default)]
pub struct HeaderList {
    headers: Vec<Header>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, header: Header) {
        self.headers.push(header);
    }

    pub fn get(&self, height: u64) -> Option<&Header> {
        usize::try_from(height)
            .ok()
            .and_then(|index| self.headers.get(index))
    }

    pub fn last(&self) -> Option<&Header> {
        self.headers.last()
    }

    /// Height of the last header; 0 while only genesis (or nothing) is held
    pub fn height(&self) -> u64 {
        self.headers.len().saturating_sub(1) as u64
    }

}

// =============================================================================
// Genesis
// =============================================================================

/// Parameters of the genesis block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisConfig {
    /// Hex seed of the genesis key
    pub seed: String,
    /// Amount credited to the genesis key's address
    pub amount: u64,
    /// Header timestamp; fixed so every node derives the same genesis
    pub timestamp: i64,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            seed: GENESIS_SEED.to_string(),
            amount: GENESIS_AMOUNT,
            timestamp: 0,
        }
    }
}

impl GenesisConfig {
    pub fn key(&self) -> Result<PrivateKey, KeyError> {
        PrivateKey::from_seed_hex(&self.seed)
    }

    /// Build the signed genesis block: one input-less transaction crediting
    /// `amount` to the genesis key's own address
    pub fn block(&self) -> Result<Block, KeyError> {
        let key = self.key()?;

        let tx = TransactionBuilder::new()
            .output(key.address(), self.amount)
            .build();

        let header = Header {
            version: BLOCK_VERSION,
            height: 0,
            prev_hash: Hash::ZERO,
            root_hash: Hash::ZERO,
            timestamp: self.timestamp,
        };

        let mut block = Block::new(header, vec![tx]);
        block.sign(&key);
        Ok(block)
    }
}

// =============================================================================
// Chain
// =============================================================================

pub struct Chain {
    headers: HeaderList,
    block_store: Arc<dyn BlockStore>,
    tx_store: Arc<dyn TxStore>,
    utxo_store: Arc<dyn UtxoStore>,
}

impl Chain {
    /// Create a chain over the given stores and commit the genesis block
    pub fn new(
        genesis: &GenesisConfig,
        block_store: Arc<dyn BlockStore>,
        tx_store: Arc<dyn TxStore>,
        utxo_store: Arc<dyn UtxoStore>,
    ) -> Result<Self, ChainError> {
        let mut chain = Self {
            headers: HeaderList::new(),
            block_store,
            tx_store,
            utxo_store,
        };

        let block = genesis.block()?;
        chain.commit_block(&block)?;

        log::info!(
            "Genesis block {} committed ({} credited to {})",
            block.hash(),
            genesis.amount,
            genesis.key()?.address()
        );

        Ok(chain)
    }

    /// Create a chain backed by fresh in-memory stores
    pub fn in_memory(genesis: &GenesisConfig) -> Result<Self, ChainError> {
        Self::new(
            genesis,
            Arc::new(MemoryBlockStore::new()),
            Arc::new(MemoryTxStore::new()),
            Arc::new(MemoryUtxoStore::new()),
        )
    }

    /// Get chain height
    pub fn height(&self) -> u64 {
        self.headers.height()
    }

    /// Header of the latest block, `None` only before genesis is committed
    pub fn head(&self) -> Option<&Header> {
        self.headers.last()
    }

    /// Hash of the latest block
    pub fn head_hash(&self) -> Hash {
        self.head().map(Header::hash).unwrap_or(Hash::ZERO)
    }

    /// Validate a block against the head and commit it
    pub fn add_block(&mut self, block: Block) -> Result<(), ChainError> {
        self.validate_block(&block)?;
        self.commit_block(&block)?;

        log::info!(
            "Added block {} at height {} with {} transaction(s)",
            block.hash(),
            block.header.height,
            block.tx_count()
        );

        Ok(())
    }

    /// Validate a block before adding
    pub fn validate_block(&self, block: &Block) -> Result<(), ChainError> {
        if !block.transactions.is_empty() && !block.verify_root_hash() {
            return Err(ChainError::InvalidRootHash(block.hash()));
        }

        if !block.verify_signature() {
            return Err(ChainError::InvalidBlockSignature);
        }

        let head_hash = self.head_hash();
        if block.header.prev_hash != head_hash {
            return Err(ChainError::LinkageMismatch {
                expected: head_hash,
                got: block.header.prev_hash,
            });
        }

        let expected = self.height() + 1;
        if block.header.height != expected {
            return Err(ChainError::UnexpectedHeight {
                expected,
                got: block.header.height,
            });
        }

        // Outputs may be spent by at most one transaction of the block
        let mut spent_in_block = HashSet::new();
        let mut seen = HashSet::new();
        for tx in &block.transactions {
            let hash = tx.hash();
            if !seen.insert(hash) {
                return Err(ChainError::DuplicateTransaction(hash));
            }

            self.validate_transaction(tx)?;

            for input in &tx.inputs {
                let key = input.utxo_key();
                if !spent_in_block.insert(key) {
                    return Err(TransactionError::AlreadySpent(key).into());
                }
            }
        }

        Ok(())
    }

    /// Validate a transaction against the committed UTXO set
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), ChainError> {
        let hash = tx.hash();

        if !tx.verify_signatures()? {
            return Err(TransactionError::InvalidSignature(hash).into());
        }

        let mut seen = HashSet::new();
        let mut total_input: u64 = 0;

        for input in &tx.inputs {
            let key = input.utxo_key();
            if !seen.insert(key) {
                return Err(TransactionError::DuplicateInput(key).into());
            }

            let utxo = self.lookup_utxo(&key)?;
            if utxo.spent {
                return Err(TransactionError::AlreadySpent(key).into());
            }
            if input.public_key.address() != utxo.address {
                return Err(TransactionError::NotOwner(key).into());
            }

            total_input = total_input
                .checked_add(utxo.amount)
                .ok_or(TransactionError::AmountOverflow(hash))?;
        }

        let total_output = tx.total_output()?;
        if total_input < total_output {
            return Err(TransactionError::InsufficientFunds {
                hash,
                inputs: total_input,
                outputs: total_output,
            }
            .into());
        }

        Ok(())
    }

    fn lookup_utxo(&self, key: &UtxoKey) -> Result<Utxo, ChainError> {
        self.utxo_store.get(key).map_err(|e| match e {
            StorageError::NotFound { .. } => ChainError::from(TransactionError::UnknownUtxo(*key)),
            other => ChainError::from(other),
        })
    }

    /// Write a validated block through the stores. Transactions are stored
    /// after the block and the header is appended last. If a store fails
    /// midway, spent marks already written are restored.
    fn commit_block(&mut self, block: &Block) -> Result<(), ChainError> {
        let mut undo = Vec::new();

        if let Err(e) = self.write_block(block, &mut undo) {
            for utxo in undo.iter().rev() {
                if let Err(restore) = self.utxo_store.put(utxo) {
                    log::error!("Failed to restore UTXO {}: {}", utxo.key(), restore);
                }
            }
            log::error!("Commit of block {} failed: {}", block.hash(), e);
            return Err(e);
        }

        self.headers.add(block.header.clone());
        Ok(())
    }

    fn write_block(&self, block: &Block, undo: &mut Vec<Utxo>) -> Result<(), ChainError> {
        for tx in &block.transactions {
            let hash = tx.hash();

            for input in &tx.inputs {
                let mut utxo = self.utxo_store.get(&input.utxo_key())?;
                undo.push(utxo.clone());
                utxo.spent = true;
                self.utxo_store.put(&utxo)?;
            }

            for (index, output) in tx.outputs.iter().enumerate() {
                self.utxo_store.put(&Utxo {
                    tx_hash: hash,
                    out_index: index as u32,
                    amount: output.amount,
                    address: output.address,
                    spent: false,
                })?;
            }
        }

        self.block_store.put(block)?;

        for tx in &block.transactions {
            self.tx_store.put(tx)?;
        }
        Ok(())
    }

    // ===== Lookups =====

    /// Get a block by height
    pub fn get_block_by_height(&self, height: u64) -> Result<Block, ChainError> {
        let header = self.headers.get(height).ok_or(ChainError::HeightTooHigh {
            requested: height,
            current: self.height(),
        })?;
        self.get_block_by_hash(&header.hash())
    }

    /// Get a block by hash
    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Block, ChainError> {
        Ok(self.block_store.get(hash)?)
    }

    pub fn get_transaction(&self, hash: &Hash) -> Result<Transaction, ChainError> {
        Ok(self.tx_store.get(hash)?)
    }

    /// Whether the transaction is part of a committed block
    pub fn has_transaction(&self, hash: &Hash) -> bool {
        self.tx_store.get(hash).is_ok()
    }

    pub fn get_utxo(&self, key: &UtxoKey) -> Result<Utxo, ChainError> {
        Ok(self.utxo_store.get(key)?)
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("height", &self.height())
            .field("head", &self.head_hash())
            .finish_non_exhaustive()
    }
}

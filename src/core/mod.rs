//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (UTXO model, Ed25519 signed inputs)
//! - Blocks (signed headers committing to a merkle root)
//! - Chain (validation against the head, UTXO commit, genesis)

pub mod block;
pub mod chain;
pub mod transaction;

pub use block::{Block, Header, BLOCK_VERSION};
pub use chain::{Chain, ChainError, GenesisConfig, HeaderList, GENESIS_AMOUNT, GENESIS_SEED};
pub use transaction::{
    sign_transaction, Transaction, TransactionBuilder, TransactionError, TxInput, TxOutput, Utxo,
    UtxoKey, TX_VERSION,
};

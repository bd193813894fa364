//! Storage module for ledger state
//!
//! Defines the store interfaces the chain writes through and their
//! in-memory implementations.

pub mod memory;
pub mod traits;

#[cfg(test)]
pub(crate) use memory::FlakyBlockStore;
pub use memory::{MemoryBlockStore, MemoryTxStore, MemoryUtxoStore};
pub use traits::{BlockStore, StorageError, TxStore, UtxoStore};

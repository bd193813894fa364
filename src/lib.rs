//! Gossip Ledger: a peer-to-peer UTXO ledger node in Rust
//!
//! This crate provides:
//! - Ed25519 signatures with addresses derived from public keys
//! - UTXO-based transaction model with per-input signatures
//! - Merkle tree transaction commitment and inclusion proofs
//! - A chain of producer-signed blocks over pluggable stores
//! - Transaction mempool and periodic block production
//! - Handshake-based peer discovery and transaction gossip
//!
//! # Example
//!
//! ```rust
//! use gossip_ledger::core::{Block, Chain, GenesisConfig, Header, TransactionBuilder};
//! use gossip_ledger::crypto::PrivateKey;
//!
//! let genesis = GenesisConfig::default();
//! let mut chain = Chain::in_memory(&genesis).unwrap();
//! let owner = genesis.key().unwrap();
//! let genesis_tx = chain.get_block_by_height(0).unwrap().transactions[0].hash();
//!
//! // Spend the genesis output
//! let recipient = PrivateKey::generate();
//! let tx = TransactionBuilder::new()
//!     .input(genesis_tx, 0, owner.public_key())
//!     .output(recipient.address(), 100)
//!     .output(owner.address(), 900)
//!     .build_and_sign(&owner);
//!
//! // Produce a block carrying it
//! let mut block = Block::new(Header::new(chain.height() + 1, chain.head_hash()), vec![tx]);
//! block.sign(&owner);
//! chain.add_block(block).unwrap();
//! assert_eq!(chain.height(), 1);
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod storage;

// Re-export commonly used types
pub use core::{Block, Chain, GenesisConfig, Header, Transaction, TransactionBuilder, Utxo};
pub use crypto::{Address, Hash, PrivateKey, PublicKey, Signature};
pub use mining::{BlockProducer, Mempool};
pub use network::{Node, NodeClient, NodeConfig};
pub use storage::{BlockStore, MemoryBlockStore, MemoryTxStore, MemoryUtxoStore, TxStore, UtxoStore};

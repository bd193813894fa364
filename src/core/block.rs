//! Block implementation for the ledger
//!
//! A block contains a header with metadata, a list of transactions and the
//! producer's signature over the header hash.

use crate::core::transaction::Transaction;
use crate::crypto::{sha256, Hash, MerkleProof, MerkleTree, PrivateKey, PublicKey, Signature};
use bytes::{BufMut, BytesMut};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current block version
pub const BLOCK_VERSION: u32 = 1;

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Block version
    pub version: u32,
    /// Position in the chain; genesis is 0
    pub height: u64,
    /// Hash of the previous block
    pub prev_hash: Hash,
    /// Merkle root of all transactions
    pub root_hash: Hash,
    /// Creation time in nanoseconds since the Unix epoch
    pub timestamp: i64,
}

impl Header {
    /// Header for a block at `height` extending `prev_hash`, stamped now
    pub fn new(height: u64, prev_hash: Hash) -> Self {
        Self {
            version: BLOCK_VERSION,
            height,
            prev_hash,
            root_hash: Hash::ZERO,
            timestamp: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        }
    }

    /// Calculate the hash of the block header
    pub fn hash(&self) -> Hash {
        let mut buf = BytesMut::with_capacity(4 + 8 + 32 + 32 + 8);
        buf.put_u32(self.version);
        buf.put_u64(self.height);
        buf.put_slice(self.prev_hash.as_bytes());
        buf.put_slice(self.root_hash.as_bytes());
        buf.put_i64(self.timestamp);
        sha256(&buf)
    }
}

/// A block in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    /// Producer key; zero until the block is signed
    pub public_key: PublicKey,
    /// Producer signature over the header hash
    pub signature: Signature,
}

impl Block {
    /// Create a new, unsigned block
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
            public_key: PublicKey::default(),
            signature: Signature::default(),
        }
    }

    /// Block identity. Covers the header only, so it commits to the
    /// transactions through the root hash.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Merkle tree over the current transactions, `None` for an empty block
    pub fn merkle_tree(&self) -> Option<MerkleTree> {
        let hashes: Vec<Hash> = self.transactions.iter().map(Transaction::hash).collect();
        MerkleTree::new(&hashes)
    }

    /// Fill in the root hash, then sign the header with the producer key
    pub fn sign(&mut self, key: &PrivateKey) {
        self.header.root_hash = self
            .merkle_tree()
            .map(|tree| tree.root())
            .unwrap_or(Hash::ZERO);

        self.public_key = key.public_key();
        self.signature = key.sign(self.hash().as_bytes());
    }

    /// Verify the block's root hash against its transactions
    pub fn verify_root_hash(&self) -> bool {
        match self.merkle_tree() {
            Some(tree) => tree.verify() && tree.root() == self.header.root_hash,
            None => self.header.root_hash.is_zero(),
        }
    }

    /// Verify the producer signature over the header hash
    pub fn verify_signature(&self) -> bool {
        self.public_key
            .verify(self.hash().as_bytes(), &self.signature)
    }

    /// Inclusion proof for the transaction at `index`
    pub fn transaction_proof(&self, index: usize) -> Option<MerkleProof> {
        self.merkle_tree()?.proof(index)
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::TransactionBuilder;

    fn random_block(height: u64, key: &PrivateKey, txs: usize) -> Block {
        let transactions = (0..txs)
            .map(|i| {
                TransactionBuilder::new()
                    .output(key.address(), i as u64 + 1)
                    .build()
            })
            .collect();

        let mut block = Block::new(Header::new(height, Hash(rand::random())), transactions);
        block.sign(key);
        block
    }

    #[test]
    fn test_sign_and_verify_block() {
        let key = PrivateKey::generate();
        let block = random_block(1, &key, 3);

        assert_eq!(block.public_key, key.public_key());
        assert!(block.verify_signature());
        assert!(block.verify_root_hash());
    }

    #[test]
    fn test_tampered_header_fails_signature() {
        let key = PrivateKey::generate();
        let mut block = random_block(1, &key, 1);

        block.header.height += 1;
        assert!(!block.verify_signature());
    }

    #[test]
    fn test_signature_by_other_key_fails() {
        let key = PrivateKey::generate();
        let mut block = random_block(1, &key, 1);

        block.public_key = PrivateKey::generate().public_key();
        assert!(!block.verify_signature());
    }

    #[test]
    fn test_unsigned_block_does_not_verify() {
        let block = Block::new(Header::new(1, Hash::ZERO), vec![]);
        assert!(!block.verify_signature());
    }

    #[test]
    fn test_block_hash_ignores_transactions() {
        let key = PrivateKey::generate();
        let mut block = random_block(1, &key, 2);
        let hash = block.hash();
        assert_eq!(hash.as_bytes().len(), 32);

        block.transactions.push(
            TransactionBuilder::new()
                .output(key.address(), 99)
                .build(),
        );
        assert_eq!(block.hash(), hash);
        assert_eq!(block.hash(), block.header.hash());
    }

    #[test]
    fn test_root_hash_detects_tampering() {
        let key = PrivateKey::generate();
        let mut block = random_block(1, &key, 4);
        assert!(block.verify_root_hash());

        block.transactions[2].outputs[0].amount += 1;
        assert!(!block.verify_root_hash());
    }

    #[test]
    fn test_empty_block_root_hash() {
        let key = PrivateKey::generate();
        let block = random_block(1, &key, 0);

        assert!(block.header.root_hash.is_zero());
        assert!(block.verify_root_hash());
        assert!(block.merkle_tree().is_none());
    }

    #[test]
    fn test_transaction_proof() {
        let key = PrivateKey::generate();
        let block = random_block(1, &key, 5);

        for (i, tx) in block.transactions.iter().enumerate() {
            let proof = block.transaction_proof(i).unwrap();
            assert!(proof.verify(&tx.hash(), &block.header.root_hash));
        }
        assert!(block.transaction_proof(5).is_none());
    }
}

//! Merkle tree implementation for transaction verification
//!
//! Provides efficient verification of transaction inclusion in blocks
//! using a binary hash tree structure. Levels with an odd number of nodes
//! pair their last node with itself.

use super::hash::{sha256_pair, Hash};

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| sha256_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
        .collect()
}

/// A complete merkle tree, stored level by level from the leaves up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
    root: Hash,
}

impl MerkleTree {
    /// Build a tree over the given leaves (order-preserving).
    /// Returns `None` when there is nothing to commit to.
    pub fn new(leaves: &[Hash]) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }

        let mut levels = vec![leaves.to_vec()];
        let mut current = leaves.to_vec();

        while current.len() > 1 {
            current = next_level(&current);
            levels.push(current.clone());
        }

        Some(Self {
            levels,
            root: current[0],
        })
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    /// Recompute every internal node from the leaves and check the tree
    /// is structurally consistent
    pub fn verify(&self) -> bool {
        let mut current = self.levels[0].clone();

        for level in &self.levels[1..] {
            current = next_level(&current);
            if &current != level {
                return false;
            }
        }

        current.len() == 1 && current[0] == self.root
    }

    /// Build an inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.levels[0].len() {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.levels.len());
        let mut position = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if position % 2 == 0 {
                level.get(position + 1).unwrap_or(&level[position])
            } else {
                &level[position - 1]
            };
            siblings.push((*sibling, position % 2 == 1));
            position /= 2;
        }

        Some(MerkleProof { siblings })
    }
}

/// Merkle proof for verifying transaction inclusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// List of sibling hashes from leaf to root
    pub siblings: Vec<(Hash, bool)>, // (hash, is_left)
}

impl MerkleProof {
    /// Verify the proof against a root hash
    pub fn verify(&self, leaf_hash: &Hash, root_hash: &Hash) -> bool {
        let mut current = *leaf_hash;

        for (sibling, is_left) in &self.siblings {
            current = if *is_left {
                sha256_pair(sibling, &current)
            } else {
                sha256_pair(&current, sibling)
            };
        }

        current == *root_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha256;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n).map(|i| sha256(format!("tx{}", i).as_bytes())).collect()
    }

    fn merkle_root(hashes: &[Hash]) -> Option<Hash> {
        MerkleTree::new(hashes).map(|tree| tree.root())
    }

    #[test]
    fn test_merkle_root_single() {
        let hashes = leaves(1);
        assert_eq!(merkle_root(&hashes), Some(hashes[0]));
    }

    #[test]
    fn test_merkle_root_two() {
        let hashes = leaves(2);
        let root = merkle_root(&hashes).unwrap();
        assert_eq!(root, sha256_pair(&hashes[0], &hashes[1]));
    }

    #[test]
    fn test_merkle_root_odd_duplicates_last() {
        let hashes = leaves(3);
        let root = merkle_root(&hashes).unwrap();

        let left = sha256_pair(&hashes[0], &hashes[1]);
        let right = sha256_pair(&hashes[2], &hashes[2]);
        assert_eq!(root, sha256_pair(&left, &right));
    }

    #[test]
    fn test_empty_merkle_root() {
        assert!(MerkleTree::new(&[]).is_none());
    }

    #[test]
    fn test_order_matters() {
        let mut hashes = leaves(4);
        let root = merkle_root(&hashes).unwrap();
        hashes.swap(0, 1);
        assert_ne!(merkle_root(&hashes).unwrap(), root);
    }

    #[test]
    fn test_verify_tree() {
        let tree = MerkleTree::new(&leaves(5)).unwrap();
        assert!(tree.verify());

        let mut tampered = tree.clone();
        tampered.levels[0][3] = sha256(b"evil");
        assert!(!tampered.verify());
    }

    #[test]
    fn test_proofs_for_every_leaf() {
        for n in 1..=7 {
            let hashes = leaves(n);
            let tree = MerkleTree::new(&hashes).unwrap();

            for (i, leaf) in hashes.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(proof.verify(leaf, &tree.root()), "leaf {} of {}", i, n);
                assert!(!proof.verify(&sha256(b"other"), &tree.root()));
            }

            assert!(tree.proof(n).is_none());
        }
    }
}

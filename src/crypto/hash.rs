//! Cryptographic hashing utilities for the ledger
//!
//! Provides the SHA-256 digest used for block identities, transaction
//! identities, signing payloads and merkle tree nodes.

use sha2::{Digest, Sha256};

hex_bytes!(
    /// A 32-byte SHA-256 digest
    Hash,
    32
);

impl Hash {
    /// The all-zero hash, used where no hash is present (genesis parent,
    /// root of an empty block)
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash(hasher.finalize().into())
}

/// SHA-256 over the concatenation of two hashes
pub fn sha256_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.as_bytes().len(), 32);
        assert_eq!(
            hash.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_pair_matches_concatenation() {
        let a = sha256(b"tx1");
        let b = sha256(b"tx2");

        let mut data = a.as_bytes().to_vec();
        data.extend_from_slice(b.as_bytes());

        assert_eq!(sha256_pair(&a, &b), sha256(&data));
    }

    #[test]
    fn test_hash_hex_round_trip() {
        let hash = sha256(b"block");
        let parsed: Hash = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);

        assert!(Hash::from_hex("abcd").is_err());
        assert!(Hash::from_hex("not hex").is_err());
    }

    #[test]
    fn test_zero_hash() {
        assert!(Hash::ZERO.is_zero());
        assert!(Hash::default().is_zero());
        assert!(!sha256(b"").is_zero());
    }
}

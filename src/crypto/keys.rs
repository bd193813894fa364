//! Ed25519 key management for the ledger
//!
//! Provides key pair generation, signing, verification and address
//! derivation. Addresses are the trailing bytes of the public key.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

/// Length of the expanded private key (seed followed by public key)
pub const PRIVATE_KEY_LEN: usize = 64;

/// Length of the seed a private key is derived from
pub const SEED_LEN: usize = 32;

/// Length of a public key
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of a signature
pub const SIGNATURE_LEN: usize = 64;

/// Length of an address
pub const ADDRESS_LEN: usize = 20;

/// Errors that can occur during key operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),
}

hex_bytes!(
    /// Ed25519 public key bytes
    PublicKey,
    32
);

hex_bytes!(
    /// Ed25519 signature bytes
    Signature,
    64
);

hex_bytes!(
    /// Account address derived from a public key
    Address,
    20
);

impl PublicKey {
    /// Derive the address owned by this key
    pub fn address(&self) -> Address {
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(&self.0[PUBLIC_KEY_LEN - ADDRESS_LEN..]);
        Address(address)
    }

    /// Verify a signature over `message`. Bytes that do not decode to a
    /// curve point never verify.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify_strict(message, &signature).is_ok()
    }
}

/// A private signing key
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Derive a private key from a 32-byte seed
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        let seed: [u8; SEED_LEN] = seed.try_into().map_err(|_| KeyError::InvalidLength {
            expected: SEED_LEN,
            actual: seed.len(),
        })?;
        Ok(Self {
            key: SigningKey::from_bytes(&seed),
        })
    }

    /// Derive a private key from a hex-encoded seed
    pub fn from_seed_hex(seed: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(seed).map_err(|_| KeyError::InvalidHex(seed.to_string()))?;
        Self::from_seed(&bytes)
    }

    /// The seed this key was derived from
    pub fn seed(&self) -> [u8; SEED_LEN] {
        self.key.to_bytes()
    }

    /// The 64-byte expanded form: seed followed by public key
    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_LEN] {
        self.key.to_keypair_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.key.verifying_key().to_bytes())
    }

    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.key.sign(message).to_bytes())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 content hashing
//! - Ed25519 key management, signing and address derivation
//! - Merkle tree calculations and inclusion proofs

/// Declares a fixed-width byte newtype that renders as lowercase hex,
/// (de)serializes as a hex string and parses from one.
macro_rules! hex_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Length in bytes
            pub const LEN: usize = $len;

            /// Build from a slice, rejecting any other length
            pub fn from_slice(bytes: &[u8]) -> Result<Self, $crate::crypto::KeyError> {
                let array: [u8; $len] =
                    bytes
                        .try_into()
                        .map_err(|_| $crate::crypto::KeyError::InvalidLength {
                            expected: $len,
                            actual: bytes.len(),
                        })?;
                Ok(Self(array))
            }

            /// Parse from a hex string
            pub fn from_hex(s: &str) -> Result<Self, $crate::crypto::KeyError> {
                let bytes = ::hex::decode(s)
                    .map_err(|_| $crate::crypto::KeyError::InvalidHex(s.to_string()))?;
                Self::from_slice(&bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                ::hex::encode(self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $len])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::crypto::KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(::serde::de::Error::custom)
            }
        }
    };
}

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{sha256, Hash};
pub use keys::{
    Address, KeyError, PrivateKey, PublicKey, Signature, ADDRESS_LEN, PRIVATE_KEY_LEN,
    PUBLIC_KEY_LEN, SEED_LEN, SIGNATURE_LEN,
};
pub use merkle::{MerkleProof, MerkleTree};

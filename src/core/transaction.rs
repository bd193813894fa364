//! Transaction handling for the ledger
//!
//! Implements a UTXO-based transaction model with Ed25519 signatures.
//! Each input signature covers the transaction's *signing hash*: the
//! content hash of the transaction with every input signature cleared.
//! Signing and verifying never touch the live transaction, so inputs of a
//! multi-input transaction verify independently of each other.

use crate::crypto::{sha256, Address, Hash, PrivateKey, PublicKey, Signature};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Current transaction version
pub const TX_VERSION: u32 = 1;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Input {input} carries no signature")]
    MissingSignature { input: usize },
    #[error("Invalid signature on transaction {0}")]
    InvalidSignature(Hash),
    #[error("Unknown UTXO {0}")]
    UnknownUtxo(UtxoKey),
    #[error("UTXO {0} is already spent")]
    AlreadySpent(UtxoKey),
    #[error("UTXO {0} is not owned by the spending key")]
    NotOwner(UtxoKey),
    #[error("UTXO {0} is referenced more than once")]
    DuplicateInput(UtxoKey),
    #[error("Transaction {hash} has insufficient funds: inputs {inputs} < outputs {outputs}")]
    InsufficientFunds { hash: Hash, inputs: u64, outputs: u64 },
    #[error("Amount overflow in transaction {0}")]
    AmountOverflow(Hash),
    #[error("Transaction {0} has no outputs")]
    NoOutputs(Hash),
}

// =============================================================================
// UTXO
// =============================================================================

/// Identifies an output: the transaction that created it and its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtxoKey {
    pub tx_hash: Hash,
    pub out_index: u32,
}

impl UtxoKey {
    pub fn new(tx_hash: Hash, out_index: u32) -> Self {
        Self { tx_hash, out_index }
    }
}

impl fmt::Display for UtxoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.tx_hash, self.out_index)
    }
}

/// Unspent Transaction Output (UTXO)
///
/// Created unspent when its transaction is committed; flips to spent once
/// and is never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_hash: Hash,
    pub out_index: u32,
    pub amount: u64,
    pub address: Address,
    pub spent: bool,
}

impl Utxo {
    pub fn key(&self) -> UtxoKey {
        UtxoKey::new(self.tx_hash, self.out_index)
    }
}

// =============================================================================
// Transaction Input / Output
// =============================================================================

/// Transaction input (reference to previous output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction holding the spent output
    pub prev_tx_hash: Hash,
    /// Index of the output in that transaction
    pub prev_out_index: u32,
    /// Public key of the spender (for verification)
    pub public_key: PublicKey,
    /// Signature over the signing hash, set by the spender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl TxInput {
    pub fn new(prev_tx_hash: Hash, prev_out_index: u32, public_key: PublicKey) -> Self {
        Self {
            prev_tx_hash,
            prev_out_index,
            public_key,
            signature: None,
        }
    }

    /// The output this input consumes
    pub fn utxo_key(&self) -> UtxoKey {
        UtxoKey::new(self.prev_tx_hash, self.prev_out_index)
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub address: Address,
}

// =============================================================================
// Transaction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: TX_VERSION,
            inputs,
            outputs,
        }
    }

    /// Content hash over every field, including any signatures present
    pub fn hash(&self) -> Hash {
        sha256(&self.encode(true))
    }

    /// Hash of the transaction with all input signatures cleared
    pub fn signing_hash(&self) -> Hash {
        sha256(&self.encode(false))
    }

    fn encode(&self, with_signatures: bool) -> BytesMut {
        let mut buf = BytesMut::with_capacity(
            12 + self.inputs.len() * (32 + 4 + 32 + 65) + self.outputs.len() * (8 + 20),
        );

        buf.put_u32(self.version);

        buf.put_u32(self.inputs.len() as u32);
        for input in &self.inputs {
            buf.put_slice(input.prev_tx_hash.as_bytes());
            buf.put_u32(input.prev_out_index);
            buf.put_slice(input.public_key.as_bytes());
            if with_signatures {
                match &input.signature {
                    Some(signature) => {
                        buf.put_u8(1);
                        buf.put_slice(signature.as_bytes());
                    }
                    None => buf.put_u8(0),
                }
            }
        }

        buf.put_u32(self.outputs.len() as u32);
        for output in &self.outputs {
            buf.put_u64(output.amount);
            buf.put_slice(output.address.as_bytes());
        }

        buf
    }

    /// Sign every input spent with `key`. Returns the number of inputs signed.
    pub fn sign(&mut self, key: &PrivateKey) -> usize {
        let signature = sign_transaction(key, self);
        let public_key = key.public_key();

        let mut signed = 0;
        for input in &mut self.inputs {
            if input.public_key == public_key {
                input.signature = Some(signature);
                signed += 1;
            }
        }
        signed
    }

    /// Verify all input signatures.
    ///
    /// An input without a signature is an error; a signature that does not
    /// verify yields `Ok(false)`.
    pub fn verify_signatures(&self) -> Result<bool, TransactionError> {
        let signing_hash = self.signing_hash();

        for (index, input) in self.inputs.iter().enumerate() {
            let signature = input
                .signature
                .as_ref()
                .ok_or(TransactionError::MissingSignature { input: index })?;

            if !input.public_key.verify(signing_hash.as_bytes(), signature) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Structural checks that need no ledger state: at least one output and
    /// every input properly signed
    pub fn check_format(&self) -> Result<(), TransactionError> {
        if self.outputs.is_empty() {
            return Err(TransactionError::NoOutputs(self.hash()));
        }
        if !self.verify_signatures()? {
            return Err(TransactionError::InvalidSignature(self.hash()));
        }
        self.total_output()?;
        Ok(())
    }

    /// Get total output amount
    pub fn total_output(&self) -> Result<u64, TransactionError> {
        self.outputs.iter().try_fold(0u64, |total, output| {
            total
                .checked_add(output.amount)
                .ok_or_else(|| TransactionError::AmountOverflow(self.hash()))
        })
    }
}

/// Sign the transaction's signing hash
pub fn sign_transaction(key: &PrivateKey, tx: &Transaction) -> Signature {
    key.sign(tx.signing_hash().as_bytes())
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Builder for creating transactions
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend the output `prev_out_index` of `prev_tx_hash`
    pub fn input(mut self, prev_tx_hash: Hash, prev_out_index: u32, public_key: PublicKey) -> Self {
        self.inputs
            .push(TxInput::new(prev_tx_hash, prev_out_index, public_key));
        self
    }

    /// Spend a known UTXO with the given owner key
    pub fn spend(self, utxo: &Utxo, public_key: PublicKey) -> Self {
        self.input(utxo.tx_hash, utxo.out_index, public_key)
    }

    pub fn output(mut self, address: Address, amount: u64) -> Self {
        self.outputs.push(TxOutput { amount, address });
        self
    }

    pub fn build(self) -> Transaction {
        Transaction::new(self.inputs, self.outputs)
    }

    /// Build and sign the inputs owned by `key`
    pub fn build_and_sign(self, key: &PrivateKey) -> Transaction {
        let mut tx = self.build();
        tx.sign(key);
        tx
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Network message types for the node RPC protocol
//!
//! Every call is one request frame answered by one response frame. Frames
//! carry a JSON-encoded [`Message`].

use crate::core::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version advertised in the handshake
pub const PROTOCOL_VERSION: &str = "0.0.1";

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = *b"UTXO";

/// Maximum encoded message size accepted from the wire (8 MiB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Node identity exchanged during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Protocol version string
    pub version: String,
    /// Sender's chain height
    pub height: u64,
    /// Address the sender accepts connections on
    pub listen_addr: String,
    /// Dial addresses of the sender's known peers
    pub peer_list: Vec<String>,
}

/// Category of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectCode {
    /// The request failed validation
    Validation,
    /// Something the request referenced does not exist
    Lookup,
    /// A network or peer failure
    Network,
    /// The request could not be understood
    Malformed,
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectCode::Validation => "validation",
            RejectCode::Lookup => "lookup",
            RejectCode::Network => "network",
            RejectCode::Malformed => "malformed",
        };
        f.write_str(name)
    }
}

/// Structured failure returned in place of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectMessage {
    pub code: RejectCode,
    pub reason: String,
}

impl RejectMessage {
    pub fn new(code: RejectCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Network message types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Request: introduce the sender and learn the receiver's identity
    Handshake(Version),

    /// Response to `Handshake`
    Version(Version),

    /// Request: submit a transaction for admission and gossip
    HandleTransaction(Transaction),

    /// Response to `HandleTransaction`
    Ack,

    /// Response to any request that failed
    Reject(RejectMessage),
}

impl Message {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Handshake(_) => "Handshake",
            Message::Version(_) => "Version",
            Message::HandleTransaction(_) => "HandleTransaction",
            Message::Ack => "Ack",
            Message::Reject(_) => "Reject",
        }
    }
}

//! Gossip networking module
//!
//! Provides the request/response protocol nodes use to discover each
//! other and spread transactions.
//!
//! # Features
//! - Length-prefixed JSON frames over TCP
//! - Handshake-based transitive peer discovery
//! - Transaction gossip with bounded fan-out
//! - Structured rejects for failed calls

pub mod client;
pub mod message;
pub mod node;
pub mod peer;
pub mod server;

pub use client::NodeClient;
pub use message::{
    Message, RejectCode, RejectMessage, Version, MAGIC, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
pub use node::{
    Node, NodeConfig, NodeError, NodeState, NodeStatus, DEFAULT_BLOCK_TIME, DEFAULT_RPC_TIMEOUT,
    MAX_BROADCAST_FANOUT, RELAY_QUEUE_SIZE,
};
pub use peer::{Peer, PeerError, PeerRegistry};
pub use server::{connect_to_peer, serve_connection, MessageCodec, Server};

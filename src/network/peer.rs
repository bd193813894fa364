//! Peer management for the gossip network
//!
//! Tracks the peers a node knows, keyed by the address their client dials.

use crate::network::client::NodeClient;
use crate::network::message::{RejectCode, Version};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Peer connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Peer disconnected")]
    Disconnected,
    #[error("Call to {0} timed out")]
    Timeout(String),
    #[error("Rejected ({code}): {reason}")]
    Rejected { code: RejectCode, reason: String },
    #[error("Unexpected response, wanted {0}")]
    UnexpectedResponse(&'static str),
}

impl PeerError {
    /// Whether the peer could not be reached at all, as opposed to
    /// answering with an error
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            PeerError::ConnectionFailed(_)
                | PeerError::IoError(_)
                | PeerError::Disconnected
                | PeerError::Timeout(_)
        )
    }
}

/// A known peer: how to call it and what it advertised
#[derive(Debug, Clone)]
pub struct Peer {
    pub client: Arc<NodeClient>,
    pub version: Version,
}

impl Peer {
    pub fn new(client: Arc<NodeClient>, version: Version) -> Self {
        Self { client, version }
    }

    /// Dial address; the registry key
    pub fn addr(&self) -> &str {
        self.client.addr()
    }
}

/// Registry of known peers
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a peer. Returns `true` if the address was new.
    pub async fn add_peer(&self, peer: Peer) -> bool {
        let mut peers = self.peers.write().await;
        peers.insert(peer.addr().to_string(), peer).is_none()
    }

    /// Remove a peer
    pub async fn remove_peer(&self, addr: &str) -> Option<Peer> {
        self.peers.write().await.remove(addr)
    }

    pub async fn contains(&self, addr: &str) -> bool {
        self.peers.read().await.contains_key(addr)
    }

    /// Dial addresses of every known peer
    pub async fn addrs(&self) -> Vec<String> {
        self.peers.read().await.keys().cloned().collect()
    }

    /// Copy of the current peers, taken under the read lock and released
    /// before the caller does any network work
    pub async fn snapshot(&self) -> Vec<Peer> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

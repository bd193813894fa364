//! Ledger node implementation
//!
//! The node serves the RPC protocol, keeps the peer registry and mempool,
//! gossips admitted transactions and, when configured with a validator
//! key, runs the block producer.

use crate::core::{Chain, ChainError, GenesisConfig, Transaction, TransactionError};
use crate::crypto::{Hash, PrivateKey};
use crate::mining::{BlockProducer, Mempool};
use crate::network::client::NodeClient;
use crate::network::message::{Message, RejectCode, RejectMessage, Version, PROTOCOL_VERSION};
use crate::network::peer::{Peer, PeerError, PeerRegistry};
use crate::network::server::{serve_connection, Server};
use crate::storage::StorageError;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock};

/// Interval between produced blocks
pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(5);

/// Deadline for one remote call
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the queue of transactions waiting to be relayed
pub const RELAY_QUEUE_SIZE: usize = 1024;

/// Peers contacted concurrently while relaying one transaction
pub const MAX_BROADCAST_FANOUT: usize = 16;

/// Node errors, reported to remote callers as a reject
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),
    #[error("Unexpected request: {0}")]
    UnexpectedRequest(&'static str),
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl NodeError {
    /// Wire category for this error
    pub fn reject_code(&self) -> RejectCode {
        match self {
            NodeError::InvalidTransaction(TransactionError::UnknownUtxo(_)) => RejectCode::Lookup,
            NodeError::InvalidTransaction(_) => RejectCode::Validation,
            NodeError::Chain(ChainError::HeightTooHigh { .. })
            | NodeError::Chain(ChainError::Storage(StorageError::NotFound { .. }))
            | NodeError::Chain(ChainError::Transaction(TransactionError::UnknownUtxo(_))) => {
                RejectCode::Lookup
            }
            NodeError::Chain(ChainError::Storage(_)) => RejectCode::Network,
            NodeError::Chain(_) => RejectCode::Validation,
            NodeError::Peer(_) | NodeError::Io(_) | NodeError::Task(_) => RejectCode::Network,
            NodeError::InvalidHandshake(_) | NodeError::UnexpectedRequest(_) => {
                RejectCode::Malformed
            }
        }
    }
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Protocol version advertised to peers
    pub version: String,
    /// Address to listen on; also the address advertised to peers
    pub listen_addr: String,
    /// Initial peers to connect to
    pub bootstrap_peers: Vec<String>,
    /// Signing key of a validator node; `None` disables block production
    pub validator_key: Option<PrivateKey>,
    pub block_time: Duration,
    pub rpc_timeout: Duration,
    pub genesis: GenesisConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            listen_addr: "127.0.0.1:3000".to_string(),
            bootstrap_peers: Vec::new(),
            validator_key: None,
            block_time: DEFAULT_BLOCK_TIME,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            genesis: GenesisConfig::default(),
        }
    }
}

/// Node lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Listening,
    Bootstrapping,
    Serving,
}

/// Node status information
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub state: NodeState,
    pub listen_addr: String,
    pub height: u64,
    pub head_hash: Hash,
    pub peers: usize,
    pub mempool_size: usize,
}

/// The ledger node
pub struct Node {
    config: NodeConfig,
    chain: Arc<RwLock<Chain>>,
    mempool: Arc<Mempool>,
    peers: PeerRegistry,
    state: RwLock<NodeState>,
    server: Mutex<Option<Server>>,
    relay_tx: mpsc::Sender<Transaction>,
    relay_rx: std::sync::Mutex<Option<mpsc::Receiver<Transaction>>>,
}

impl Node {
    /// Create a node over a fresh in-memory chain built from the configured genesis
    pub fn new(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        let chain = Chain::in_memory(&config.genesis)?;
        Ok(Self::with_chain(config, chain))
    }

    /// Create a node around an existing chain
    pub fn with_chain(config: NodeConfig, chain: Chain) -> Arc<Self> {
        Self::with_shared(
            config,
            Arc::new(RwLock::new(chain)),
            Arc::new(Mempool::new()),
        )
    }

    /// Create a node sharing its chain and mempool with the caller
    pub fn with_shared(
        config: NodeConfig,
        chain: Arc<RwLock<Chain>>,
        mempool: Arc<Mempool>,
    ) -> Arc<Self> {
        let (relay_tx, relay_rx) = mpsc::channel(RELAY_QUEUE_SIZE);

        Arc::new(Self {
            config,
            chain,
            mempool,
            peers: PeerRegistry::new(),
            state: RwLock::new(NodeState::Created),
            server: Mutex::new(None),
            relay_tx,
            relay_rx: std::sync::Mutex::new(Some(relay_rx)),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<RwLock<Chain>> {
        &self.chain
    }

    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub async fn state(&self) -> NodeState {
        *self.state.read().await
    }

    async fn set_state(&self, state: NodeState) {
        *self.state.write().await = state;
        debug!("Node {} is {:?}", self.config.listen_addr, state);
    }

    // ===== Lifecycle =====

    /// Bind the listening socket. Connections are accepted once the node runs.
    pub async fn bind(&self) -> Result<SocketAddr, NodeError> {
        let server = Server::bind(&self.config.listen_addr).await?;
        let local_addr = server.local_addr()?;

        *self.server.lock().await = Some(server);
        self.set_state(NodeState::Listening).await;

        Ok(local_addr)
    }

    /// Run the node until the accept loop ends
    pub async fn start(self: Arc<Self>) -> Result<(), NodeError> {
        let bound = self.server.lock().await.take();
        let server = match bound {
            Some(server) => server,
            None => {
                self.bind().await?;
                self.server
                    .lock()
                    .await
                    .take()
                    .ok_or_else(|| NodeError::Io(std::io::ErrorKind::NotConnected.into()))?
            }
        };

        info!(
            "Node started on {} (version {})",
            self.config.listen_addr, self.config.version
        );

        let relay_rx = self
            .relay_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(relay_rx) = relay_rx {
            tokio::spawn(Arc::clone(&self).relay_loop(relay_rx));
        }

        let accept = tokio::spawn(Arc::clone(&self).accept_loop(server));

        if !self.config.bootstrap_peers.is_empty() {
            self.set_state(NodeState::Bootstrapping).await;
            let connected = self.bootstrap_network(&self.config.bootstrap_peers).await;
            info!(
                "Bootstrap connected to {} of {} seed(s)",
                connected,
                self.config.bootstrap_peers.len()
            );
        }

        self.set_state(NodeState::Serving).await;

        if let Some(key) = &self.config.validator_key {
            let producer = BlockProducer::new(
                Arc::clone(&self.chain),
                Arc::clone(&self.mempool),
                key.clone(),
                self.config.block_time,
            );
            tokio::spawn(producer.run());
        }

        accept.await?;
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, server: Server) {
        loop {
            match server.accept().await {
                Ok((stream, addr)) => {
                    debug!("Incoming connection from {}", addr);
                    let node = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, addr, node).await {
                            debug!("Connection error with {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    async fn relay_loop(self: Arc<Self>, mut relay_rx: mpsc::Receiver<Transaction>) {
        while let Some(tx) = relay_rx.recv().await {
            let delivered = self.broadcast(&tx).await;
            debug!("Relayed transaction {} to {} peer(s)", tx.hash(), delivered);
        }
    }

    // ===== Request handling =====

    /// Answer one request
    pub async fn respond(self: &Arc<Self>, request: Message) -> Message {
        let kind = request.type_name();
        let result = match request {
            Message::Handshake(version) => self.handshake(version).await.map(Message::Version),
            Message::HandleTransaction(tx) => self.handle_transaction(tx).await.map(|_| Message::Ack),
            _ => Err(NodeError::UnexpectedRequest(kind)),
        };

        result.unwrap_or_else(|e| {
            debug!("Rejecting {}: {}", kind, e);
            Message::Reject(RejectMessage::new(e.reject_code(), e.to_string()))
        })
    }

    /// Register the remote node and return our own version. Peers the remote
    /// advertises are dialed in the background.
    pub async fn handshake(self: &Arc<Self>, remote: Version) -> Result<Version, NodeError> {
        if remote.listen_addr.is_empty() {
            return Err(NodeError::InvalidHandshake("empty listen address".into()));
        }
        if remote.listen_addr == self.config.listen_addr {
            return Err(NodeError::InvalidHandshake("handshake from self".into()));
        }

        let client = Arc::new(NodeClient::new(
            remote.listen_addr.clone(),
            self.config.rpc_timeout,
        ));
        self.add_peer(Peer::new(client, remote)).await;

        Ok(self.version().await)
    }

    /// Admit a transaction to the mempool and queue it for relay if it is new
    pub async fn handle_transaction(&self, tx: Transaction) -> Result<(), NodeError> {
        tx.check_format()?;

        let hash = tx.hash();
        if self.chain.read().await.has_transaction(&hash) {
            debug!("Transaction {} already committed", hash);
            return Ok(());
        }

        if !self.mempool.add(tx.clone()) {
            debug!("Transaction {} already in mempool", hash);
            return Ok(());
        }

        info!("Received transaction {}", hash);

        match self.relay_tx.try_send(tx) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Relay queue full, not relaying {}", hash),
            Err(TrySendError::Closed(_)) => warn!("Relay stopped, not relaying {}", hash),
        }

        Ok(())
    }

    /// Our identity as advertised to peers
    pub async fn version(&self) -> Version {
        Version {
            version: self.config.version.clone(),
            height: self.chain.read().await.height(),
            listen_addr: self.config.listen_addr.clone(),
            peer_list: self.peers.addrs().await,
        }
    }

    // ===== Peers =====

    async fn add_peer(self: &Arc<Self>, peer: Peer) {
        let addr = peer.addr().to_string();
        let peer_list = peer.version.peer_list.clone();
        let height = peer.version.height;

        if self.peers.add_peer(peer).await {
            info!("Added peer {} (height {})", addr, height);
        }

        if !peer_list.is_empty() {
            self.spawn_bootstrap(peer_list);
        }
    }

    async fn delete_peer(&self, addr: &str) {
        if self.peers.remove_peer(addr).await.is_some() {
            info!("Removed peer {}", addr);
        }
    }

    fn spawn_bootstrap(self: &Arc<Self>, addrs: Vec<String>) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            node.bootstrap_network(&addrs).await;
        });
    }

    /// Dial and handshake every address we are not yet connected to,
    /// following the peer lists they return. Failures are logged and
    /// skipped. Returns the number of peers added.
    pub async fn bootstrap_network(&self, addrs: &[String]) -> usize {
        let mut queue: VecDeque<String> = addrs.iter().cloned().collect();
        let mut attempted = HashSet::new();
        let mut connected = 0;

        while let Some(addr) = queue.pop_front() {
            if !attempted.insert(addr.clone()) || !self.can_connect_with(&addr).await {
                continue;
            }

            match self.dial_remote_node(&addr).await {
                Ok(peer) => {
                    queue.extend(peer.version.peer_list.iter().cloned());
                    if self.peers.add_peer(peer).await {
                        info!("Connected to peer {}", addr);
                        connected += 1;
                    }
                }
                Err(e) => warn!("Failed to connect to {}: {}", addr, e),
            }
        }

        connected
    }

    /// Whether `addr` is neither ourselves nor an existing peer
    pub async fn can_connect_with(&self, addr: &str) -> bool {
        addr != self.config.listen_addr && !self.peers.contains(addr).await
    }

    async fn dial_remote_node(&self, addr: &str) -> Result<Peer, NodeError> {
        let client = Arc::new(NodeClient::new(addr, self.config.rpc_timeout));
        let version = client.handshake(self.version().await).await?;
        Ok(Peer::new(client, version))
    }

    /// Send a transaction to every known peer, at most
    /// `MAX_BROADCAST_FANOUT` at a time. Unreachable peers are dropped.
    /// Returns the number of peers that accepted it.
    pub async fn broadcast(&self, tx: &Transaction) -> usize {
        let peers = self.peers.snapshot().await;

        let results: Vec<(Peer, Result<(), PeerError>)> = stream::iter(peers)
            .map(|peer| {
                let tx = tx.clone();
                async move {
                    let result = peer.client.handle_transaction(tx).await;
                    (peer, result)
                }
            })
            .buffer_unordered(MAX_BROADCAST_FANOUT)
            .collect()
            .await;

        let mut delivered = 0;
        for (peer, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) if e.is_connection_failure() => {
                    warn!("Peer {} unreachable: {}", peer.addr(), e);
                    self.delete_peer(peer.addr()).await;
                }
                Err(e) => debug!("Peer {} refused transaction: {}", peer.addr(), e),
            }
        }

        delivered
    }

    /// Get node status
    pub async fn status(&self) -> NodeStatus {
        let (height, head_hash) = {
            let chain = self.chain.read().await;
            (chain.height(), chain.head_hash())
        };

        NodeStatus {
            state: self.state().await,
            listen_addr: self.config.listen_addr.clone(),
            height,
            head_hash,
            peers: self.peers.len().await,
            mempool_size: self.mempool.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TransactionBuilder, UtxoKey};
    use std::future::Future;
    use std::net::TcpListener;

    fn pick_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .expect("bind ephem")
            .local_addr()
            .expect("local addr")
            .port()
    }

    fn config(bootstrap_peers: Vec<String>) -> NodeConfig {
        NodeConfig {
            listen_addr: format!("127.0.0.1:{}", pick_port()),
            bootstrap_peers,
            rpc_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    async fn launch(config: NodeConfig) -> Arc<Node> {
        let node = Node::new(config).unwrap();
        node.bind().await.unwrap();
        tokio::spawn(Arc::clone(&node).start());
        node
    }

    async fn wait_for<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !condition().await {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn genesis_spend(node: &Node, amount: u64) -> Transaction {
        let genesis = GenesisConfig::default().key().unwrap();
        let gtx = node.chain().read().await.get_block_by_height(0).unwrap().transactions[0].clone();

        TransactionBuilder::new()
            .input(gtx.hash(), 0, genesis.public_key())
            .output(PrivateKey::generate().address(), amount)
            .output(genesis.address(), 1000 - amount)
            .build_and_sign(&genesis)
    }

    fn remote_version(listen_addr: &str) -> Version {
        Version {
            version: PROTOCOL_VERSION.to_string(),
            height: 0,
            listen_addr: listen_addr.to_string(),
            peer_list: vec![],
        }
    }

    #[tokio::test]
    async fn test_handshake_registers_peer() {
        let node = Node::new(config(vec![])).unwrap();

        let version = match node.respond(Message::Handshake(remote_version("127.0.0.1:1"))).await {
            Message::Version(version) => version,
            other => panic!("expected version, got {:?}", other),
        };

        assert_eq!(version.listen_addr, node.config().listen_addr);
        assert_eq!(version.height, 0);
        assert_eq!(version.peer_list, vec!["127.0.0.1:1".to_string()]);
        assert!(node.peers().contains("127.0.0.1:1").await);
    }

    #[tokio::test]
    async fn test_handshake_from_self_rejected() {
        let node = Node::new(config(vec![])).unwrap();
        let own = node.config().listen_addr.clone();

        for addr in [own.as_str(), ""] {
            let response = node.respond(Message::Handshake(remote_version(addr))).await;
            assert!(matches!(
                response,
                Message::Reject(RejectMessage {
                    code: RejectCode::Malformed,
                    ..
                })
            ));
        }
        assert!(node.peers().is_empty().await);
    }

    #[tokio::test]
    async fn test_handle_transaction_deduplicates() {
        let node = Node::new(config(vec![])).unwrap();
        let tx = genesis_spend(&node, 100).await;

        let first = node.respond(Message::HandleTransaction(tx.clone())).await;
        let second = node.respond(Message::HandleTransaction(tx.clone())).await;

        assert_eq!(first, Message::Ack);
        assert_eq!(second, Message::Ack);
        assert_eq!(node.mempool().len(), 1);
        assert!(node.mempool().has(&tx));
    }

    #[tokio::test]
    async fn test_committed_transaction_not_readmitted() {
        let node = Node::new(config(vec![])).unwrap();
        let tx = genesis_spend(&node, 100).await;
        let tx_hash = tx.hash();

        assert_eq!(
            node.respond(Message::HandleTransaction(tx.clone())).await,
            Message::Ack
        );

        let producer = BlockProducer::new(
            Arc::clone(node.chain()),
            Arc::clone(node.mempool()),
            PrivateKey::generate(),
            DEFAULT_BLOCK_TIME,
        );
        producer.produce_block().await.unwrap().unwrap();
        assert!(node.mempool().is_empty());

        // A peer relaying it back gets an ack, but it is neither pooled nor relayed
        assert_eq!(
            node.respond(Message::HandleTransaction(tx)).await,
            Message::Ack
        );
        assert!(node.mempool().is_empty());
        let mut relay = node.relay_rx.lock().unwrap().take().unwrap();
        assert_eq!(relay.try_recv().unwrap().hash(), tx_hash);
        assert!(relay.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsigned_transaction_rejected() {
        let node = Node::new(config(vec![])).unwrap();
        let mut tx = genesis_spend(&node, 100).await;
        tx.inputs[0].signature = None;

        let response = node.respond(Message::HandleTransaction(tx)).await;
        assert!(matches!(
            response,
            Message::Reject(RejectMessage {
                code: RejectCode::Validation,
                ..
            })
        ));
        assert!(node.mempool().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_peer_removed_on_broadcast() {
        let node = Node::new(NodeConfig {
            rpc_timeout: Duration::from_millis(500),
            ..config(vec![])
        })
        .unwrap();

        let dead = format!("127.0.0.1:{}", pick_port());
        node.handshake(remote_version(&dead)).await.unwrap();
        assert_eq!(node.peers().len().await, 1);

        let tx = genesis_spend(&node, 10).await;
        assert_eq!(node.broadcast(&tx).await, 0);
        assert!(node.peers().is_empty().await);
    }

    #[tokio::test]
    async fn test_bootstrap_skips_failing_seeds() {
        let first = launch(config(vec![])).await;
        let dead = format!("127.0.0.1:{}", pick_port());

        let node = Node::new(config(vec![])).unwrap();
        let connected = node
            .bootstrap_network(&[dead, first.config().listen_addr.clone()])
            .await;

        assert_eq!(connected, 1);
        assert!(node.peers().contains(&first.config().listen_addr).await);
    }

    #[tokio::test]
    async fn test_discovery_and_gossip() {
        let a = launch(config(vec![])).await;
        let b = launch(config(vec![a.config().listen_addr.clone()])).await;
        let c = launch(config(vec![b.config().listen_addr.clone()])).await;

        // C learns about A through B's peer list
        for node in [&a, &b, &c] {
            wait_for(move || async move { node.peers().len().await == 2 }).await;
            assert_eq!(node.state().await, NodeState::Serving);
        }

        let tx = genesis_spend(&a, 100).await;
        let client = NodeClient::new(a.config().listen_addr.clone(), Duration::from_secs(2));
        client.handle_transaction(tx.clone()).await.unwrap();

        let tx = &tx;
        for node in [&a, &b, &c] {
            wait_for(move || async move { node.mempool().has(tx) }).await;
        }
    }

    #[tokio::test]
    async fn test_validator_produces_block() {
        let validator = launch(NodeConfig {
            validator_key: Some(PrivateKey::generate()),
            block_time: Duration::from_millis(100),
            ..config(vec![])
        })
        .await;

        let tx = genesis_spend(&validator, 250).await;
        validator.handle_transaction(tx.clone()).await.unwrap();

        let node = &validator;
        wait_for(move || async move { node.chain().read().await.height() == 1 }).await;

        let (utxo, head_hash) = {
            let chain = validator.chain().read().await;
            (
                chain.get_utxo(&UtxoKey::new(tx.hash(), 0)).unwrap(),
                chain.head_hash(),
            )
        };
        assert_eq!(utxo.amount, 250);
        assert!(validator.mempool().is_empty());

        let status = validator.status().await;
        assert_eq!(status.height, 1);
        assert_eq!(status.head_hash, head_hash);
    }

    #[test]
    fn test_reject_codes() {
        let key = UtxoKey::new(Hash::ZERO, 0);

        assert_eq!(
            NodeError::InvalidTransaction(TransactionError::MissingSignature { input: 0 })
                .reject_code(),
            RejectCode::Validation
        );
        assert_eq!(
            NodeError::Chain(ChainError::Transaction(TransactionError::UnknownUtxo(key)))
                .reject_code(),
            RejectCode::Lookup
        );
        assert_eq!(
            NodeError::Peer(PeerError::Disconnected).reject_code(),
            RejectCode::Network
        );
        assert_eq!(
            NodeError::InvalidHandshake("x".into()).reject_code(),
            RejectCode::Malformed
        );
    }
}

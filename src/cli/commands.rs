//! CLI commands for the ledger node
//!
//! Implements all command handlers for the CLI interface.

use crate::core::{GenesisConfig, Transaction, TransactionBuilder};
use crate::crypto::{Address, Hash, PrivateKey};
use crate::network::{Node, NodeClient, NodeConfig};
use std::time::Duration;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Split a comma separated peer list
pub fn parse_peers(peers: Option<&str>) -> Vec<String> {
    peers
        .map(|p| {
            p.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Run a node until interrupted
pub async fn cmd_start(config: NodeConfig) -> CliResult<()> {
    println!("🌐 Starting node on {}...", config.listen_addr);
    if !config.bootstrap_peers.is_empty() {
        println!("   Seeds: {}", config.bootstrap_peers.join(", "));
    }
    if let Some(key) = &config.validator_key {
        println!(
            "   ⛏️  Validator {} (block time {:?})",
            key.address(),
            config.block_time
        );
    }

    let node = Node::new(config)?;

    // Handle Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        println!("\n📴 Shutting down node...");
        std::process::exit(0);
    });

    node.start().await?;
    Ok(())
}

/// Print a key pair, generated or derived from a seed
pub fn cmd_keygen(seed: Option<&str>) -> CliResult<()> {
    let key = match seed {
        Some(seed) => PrivateKey::from_seed_hex(seed)?,
        None => PrivateKey::generate(),
    };

    println!("🔐 Key pair");
    println!("   🌱 Seed:       {}", hex::encode(key.seed()));
    println!("   🔑 Public Key: {}", key.public_key());
    println!("   📍 Address:    {}", key.address());
    Ok(())
}

/// Print the genesis block and the output it creates
pub fn cmd_genesis(genesis: &GenesisConfig) -> CliResult<()> {
    let block = genesis.block()?;
    let key = genesis.key()?;

    println!("📦 Genesis block");
    println!("   ├─ Hash: {}", block.hash());
    for tx in &block.transactions {
        println!("   ├─ Transaction: {}", tx.hash());
    }
    println!("   ├─ Amount: {}", genesis.amount);
    println!("   └─ Owner: {}", key.address());
    Ok(())
}

/// A one-input transfer built by `submit`
#[derive(Debug, Clone)]
pub struct Transfer {
    pub prev_tx: Hash,
    pub index: u32,
    pub to: Address,
    pub amount: u64,
    /// Amount returned to the sender, if any
    pub change: Option<u64>,
}

impl Transfer {
    /// Build and sign the transfer with the owner of the spent output
    pub fn build(&self, key: &PrivateKey) -> Transaction {
        let mut builder = TransactionBuilder::new()
            .input(self.prev_tx, self.index, key.public_key())
            .output(self.to, self.amount);

        if let Some(change) = self.change.filter(|change| *change > 0) {
            builder = builder.output(key.address(), change);
        }

        builder.build_and_sign(key)
    }
}

/// Sign a transfer and submit it to a running node
pub async fn cmd_submit(
    node_addr: &str,
    seed: &str,
    transfer: &Transfer,
    timeout: Duration,
) -> CliResult<()> {
    let key = PrivateKey::from_seed_hex(seed)?;
    let tx = transfer.build(&key);

    let client = NodeClient::new(node_addr, timeout);
    client.handle_transaction(tx.clone()).await?;

    println!("✅ Transaction submitted to {}", node_addr);
    println!("   ├─ Hash: {}", tx.hash());
    println!("   ├─ To: {} ({})", transfer.to, transfer.amount);
    println!("   └─ Change: {}", transfer.change.unwrap_or(0));
    Ok(())
}

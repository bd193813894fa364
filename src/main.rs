//! Gossip Ledger node CLI
//!
//! Runs a ledger node and talks to running ones.

use clap::{Parser, Subcommand};
use gossip_ledger::cli::{self, CliResult, Transfer};
use gossip_ledger::core::GenesisConfig;
use gossip_ledger::crypto::{Address, Hash, PrivateKey};
use gossip_ledger::network::{NodeConfig, DEFAULT_RPC_TIMEOUT};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ledger-node")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A peer-to-peer UTXO ledger node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node
    Start {
        /// Address to listen on and advertise to peers
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        listen: String,

        /// Comma separated seed peers
        #[arg(short, long)]
        peers: Option<String>,

        /// Hex seed of the validator key; enables block production
        #[arg(long)]
        validator_seed: Option<String>,

        /// Seconds between produced blocks
        #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
        block_time: u64,
    },

    /// Generate a key pair, or derive one from a seed
    Keygen {
        /// Hex encoded 32-byte seed
        #[arg(short, long)]
        seed: Option<String>,
    },

    /// Show the genesis block
    Genesis,

    /// Sign and submit a one-input transfer
    Submit {
        /// Node to submit to
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        node: String,

        /// Hex seed of the key owning the spent output
        #[arg(short, long)]
        seed: String,

        /// Hash of the transaction holding the spent output
        #[arg(long)]
        prev_tx: Hash,

        /// Index of the spent output
        #[arg(short, long, default_value = "0")]
        index: u32,

        /// Recipient address
        #[arg(short, long)]
        to: Address,

        /// Amount to send
        #[arg(short, long)]
        amount: u64,

        /// Amount returned to the sender
        #[arg(short, long)]
        change: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Start {
            listen,
            peers,
            validator_seed,
            block_time,
        } => {
            let validator_key = validator_seed
                .as_deref()
                .map(PrivateKey::from_seed_hex)
                .transpose()?;

            let config = NodeConfig {
                listen_addr: listen,
                bootstrap_peers: cli::parse_peers(peers.as_deref()),
                validator_key,
                block_time: Duration::from_secs(block_time),
                ..Default::default()
            };

            cli::cmd_start(config).await
        }

        Commands::Keygen { seed } => cli::cmd_keygen(seed.as_deref()),

        Commands::Genesis => cli::cmd_genesis(&GenesisConfig::default()),

        Commands::Submit {
            node,
            seed,
            prev_tx,
            index,
            to,
            amount,
            change,
        } => {
            let transfer = Transfer {
                prev_tx,
                index,
                to,
                amount,
                change,
            };
            cli::cmd_submit(&node, &seed, &transfer, DEFAULT_RPC_TIMEOUT).await
        }
    }
}

//! Block producer for validator nodes
//!
//! On every tick the producer drains the mempool, keeps the transactions
//! that are valid against the current head and do not conflict with each
//! other, then signs and commits a block extending the head.

use crate::core::{Block, Chain, ChainError, Header, Transaction};
use crate::crypto::PrivateKey;
use crate::mining::Mempool;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Periodic block producer
pub struct BlockProducer {
    chain: Arc<RwLock<Chain>>,
    mempool: Arc<Mempool>,
    key: PrivateKey,
    block_time: Duration,
}

impl BlockProducer {
    pub fn new(
        chain: Arc<RwLock<Chain>>,
        mempool: Arc<Mempool>,
        key: PrivateKey,
        block_time: Duration,
    ) -> Self {
        Self {
            chain,
            mempool,
            key,
            block_time,
        }
    }

    /// Produce blocks forever. Failures are logged and the loop carries on.
    pub async fn run(self) {
        info!(
            "Block producer started: validator {}, block time {:?}",
            self.key.address(),
            self.block_time
        );

        let mut ticker = tokio::time::interval(self.block_time.max(Duration::from_millis(1)));
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match self.produce_block().await {
                Ok(Some(block)) => debug!("Produced block {}", block.hash()),
                Ok(None) => {}
                Err(e) => error!("Block production failed: {}", e),
            }
        }
    }

    /// Drain the mempool and commit one block. Returns `None` when no
    /// pending transaction survives selection. If the commit fails the
    /// selected transactions go back to the mempool.
    pub async fn produce_block(&self) -> Result<Option<Block>, ChainError> {
        let pending = self.mempool.clear();
        if pending.is_empty() {
            return Ok(None);
        }

        let mut chain = self.chain.write().await;
        let transactions = select_transactions(&chain, pending);
        if transactions.is_empty() {
            return Ok(None);
        }

        let header = Header::new(chain.height() + 1, chain.head_hash());
        let mut block = Block::new(header, transactions);
        block.sign(&self.key);

        if let Err(e) = chain.add_block(block.clone()) {
            let returned = block.tx_count();
            for tx in block.transactions {
                self.mempool.add(tx);
            }
            warn!("Returned {} transaction(s) to the mempool", returned);
            return Err(e);
        }

        info!(
            "Produced block {} at height {} with {} transaction(s)",
            block.hash(),
            block.header.height,
            block.tx_count()
        );

        Ok(Some(block))
    }
}

/// Keep transactions valid against the head whose inputs are not already
/// claimed by an earlier selected transaction
fn select_transactions(chain: &Chain, pending: Vec<Transaction>) -> Vec<Transaction> {
    let mut claimed = HashSet::new();
    let mut selected = Vec::with_capacity(pending.len());

    for tx in pending {
        if let Err(e) = chain.validate_transaction(&tx) {
            warn!("Dropping transaction {}: {}", tx.hash(), e);
            continue;
        }

        let keys: Vec<_> = tx.inputs.iter().map(|input| input.utxo_key()).collect();
        if keys.iter().any(|key| claimed.contains(key)) {
            warn!(
                "Dropping transaction {}: conflicts with a selected transaction",
                tx.hash()
            );
            continue;
        }

        claimed.extend(keys);
        selected.push(tx);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GenesisConfig, TransactionBuilder, UtxoKey};
    use crate::storage::{FlakyBlockStore, MemoryTxStore, MemoryUtxoStore};

    fn setup() -> (Arc<RwLock<Chain>>, Arc<Mempool>, BlockProducer) {
        let chain = Arc::new(RwLock::new(
            Chain::in_memory(&GenesisConfig::default()).unwrap(),
        ));
        let mempool = Arc::new(Mempool::new());
        let producer = BlockProducer::new(
            Arc::clone(&chain),
            Arc::clone(&mempool),
            PrivateKey::generate(),
            Duration::from_millis(50),
        );
        (chain, mempool, producer)
    }

    async fn genesis_tx(chain: &Arc<RwLock<Chain>>) -> Transaction {
        chain.read().await.get_block_by_height(0).unwrap().transactions[0].clone()
    }

    #[tokio::test]
    async fn test_empty_mempool_produces_nothing() {
        let (chain, _mempool, producer) = setup();

        assert!(producer.produce_block().await.unwrap().is_none());
        assert_eq!(chain.read().await.height(), 0);
    }

    #[tokio::test]
    async fn test_produce_block_commits_transactions() {
        let (chain, mempool, producer) = setup();
        let alice = GenesisConfig::default().key().unwrap();
        let bob = PrivateKey::generate();
        let gtx = genesis_tx(&chain).await;

        let tx = TransactionBuilder::new()
            .input(gtx.hash(), 0, alice.public_key())
            .output(bob.address(), 100)
            .output(alice.address(), 900)
            .build_and_sign(&alice);
        mempool.add(tx.clone());

        let block = producer.produce_block().await.unwrap().unwrap();
        assert_eq!(block.header.height, 1);
        assert_eq!(block.transactions, vec![tx.clone()]);
        assert!(mempool.is_empty());

        let chain = chain.read().await;
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.head_hash(), block.hash());
        assert_eq!(
            chain.get_utxo(&UtxoKey::new(tx.hash(), 0)).unwrap().amount,
            100
        );
    }

    #[tokio::test]
    async fn test_invalid_and_conflicting_transactions_dropped() {
        let (chain, mempool, producer) = setup();
        let alice = GenesisConfig::default().key().unwrap();
        let gtx = genesis_tx(&chain).await;

        let spend = |amount| {
            TransactionBuilder::new()
                .input(gtx.hash(), 0, alice.public_key())
                .output(alice.address(), amount)
                .build_and_sign(&alice)
        };

        // Two valid but conflicting spends and one overspend
        mempool.add(spend(10));
        mempool.add(spend(20));
        mempool.add(spend(5000));

        let block = producer.produce_block().await.unwrap().unwrap();
        assert_eq!(block.tx_count(), 1);
        assert!(mempool.is_empty());
        assert_eq!(chain.read().await.height(), 1);

        // Nothing valid is left to spend
        mempool.add(spend(30));
        assert!(producer.produce_block().await.unwrap().is_none());
        assert_eq!(chain.read().await.height(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_returns_transactions() {
        let block_store = Arc::new(FlakyBlockStore::new());
        let chain = Arc::new(RwLock::new(
            Chain::new(
                &GenesisConfig::default(),
                block_store.clone(),
                Arc::new(MemoryTxStore::new()),
                Arc::new(MemoryUtxoStore::new()),
            )
            .unwrap(),
        ));
        let mempool = Arc::new(Mempool::new());
        let producer = BlockProducer::new(
            Arc::clone(&chain),
            Arc::clone(&mempool),
            PrivateKey::generate(),
            Duration::from_millis(50),
        );

        let alice = GenesisConfig::default().key().unwrap();
        let gtx = genesis_tx(&chain).await;
        let tx = TransactionBuilder::new()
            .input(gtx.hash(), 0, alice.public_key())
            .output(alice.address(), 1000)
            .build_and_sign(&alice);
        mempool.add(tx.clone());

        block_store.set_failing(true);
        assert!(producer.produce_block().await.is_err());
        assert_eq!(chain.read().await.height(), 0);
        assert!(mempool.has(&tx));

        block_store.set_failing(false);
        let block = producer.produce_block().await.unwrap().unwrap();
        assert_eq!(block.transactions, vec![tx]);
        assert!(mempool.is_empty());
    }
}

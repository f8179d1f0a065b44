//! Node composition: stores, policy, and processors wired together.
//!
//! All chain-state mutation goes through one [`BlockProcessor`] behind a
//! mutex, so blocks and transactions are applied strictly one at a time.
//! Events drained after each operation are dispatched to the log here;
//! embedders wanting the events themselves can drive a [`BlockProcessor`]
//! directly.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use beck_consensus::PolicyEngine;
use beck_core::block_store::MemoryBlockStore;
use beck_core::error::BeckError;
use beck_core::traits::{
    ConsensusPolicy, SharedBlockStore, SharedUtxoStore, Verdict,
};
use beck_core::types::{Block, Hash256, IndexedBlock, Transaction};
use beck_core::utxo_store::MemoryUtxoStore;

use crate::block_processor::BlockProcessor;
use crate::config::NodeConfig;
use crate::events::ChainEvent;
use crate::tx_processor::ProcessedTransaction;

pub struct Node {
    processor: Mutex<BlockProcessor>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").finish_non_exhaustive()
    }
}

impl Node {
    /// A node over fresh in-memory stores and the standard policy engine.
    pub fn new(config: NodeConfig) -> Self {
        let blocks: SharedBlockStore = Arc::new(RwLock::new(MemoryBlockStore::new()));
        let confirmed: SharedUtxoStore = Arc::new(RwLock::new(MemoryUtxoStore::new()));
        let pool_view: SharedUtxoStore = Arc::new(RwLock::new(MemoryUtxoStore::new()));
        let policy = Arc::new(PolicyEngine::new(
            blocks.clone(),
            confirmed.clone(),
            pool_view.clone(),
            config.network,
        ));
        Self::with_parts(blocks, confirmed, pool_view, policy, config)
    }

    /// A node over caller-supplied stores and policy.
    pub fn with_parts(
        blocks: SharedBlockStore,
        confirmed: SharedUtxoStore,
        pool_view: SharedUtxoStore,
        policy: Arc<dyn ConsensusPolicy>,
        config: NodeConfig,
    ) -> Self {
        Self {
            processor: Mutex::new(BlockProcessor::new(
                blocks, confirmed, pool_view, policy, &config,
            )),
        }
    }

    /// Bring the in-memory main chain in line with persisted state.
    ///
    /// Call once before offering blocks when the stores carry data from a
    /// previous run.
    pub fn start(&self) -> Result<(), BeckError> {
        let mut processor = self.processor.lock();
        processor.sync_main_chain_with_utxo_set()?;
        dispatch(processor.drain_events());
        Ok(())
    }

    /// Offer a block to the chain.
    pub fn process_block(&self, block: Block) -> Result<Verdict, BeckError> {
        let mut processor = self.processor.lock();
        let verdict = processor.process_new_block(block)?;
        dispatch(processor.drain_events());
        Ok(verdict)
    }

    /// Offer a transaction to the pool.
    pub fn process_transaction(
        &self,
        tx: Transaction,
    ) -> Result<ProcessedTransaction, BeckError> {
        let mut processor = self.processor.lock();
        let result = processor.transactions_mut().process_new_transaction(tx)?;
        dispatch(processor.drain_events());
        Ok(result)
    }

    /// Height of the main-chain tip, `None` before any block connects.
    pub fn height(&self) -> Option<u64> {
        self.processor.lock().chain().main().height()
    }

    /// The main-chain tip.
    pub fn tip(&self) -> Option<IndexedBlock> {
        self.processor.lock().chain().main().top().cloned()
    }

    /// Fetch a stored block.
    pub fn block(&self, hash: &Hash256) -> Result<Option<Block>, BeckError> {
        self.processor.lock().chain().block(hash)
    }

    /// Whether a block with this hash has been stored.
    pub fn has_block(&self, hash: &Hash256) -> Result<bool, BeckError> {
        self.processor.lock().chain().has_block(hash)
    }

    /// Whether a transaction sits in a validated pool tier.
    pub fn has_pool_transaction(&self, txid: &Hash256) -> bool {
        self.processor.lock().transactions().pool().has_validated(txid)
    }

    /// Validated pool size.
    pub fn pool_size(&self) -> usize {
        self.processor.lock().transactions().pool().validated_len()
    }
}

fn dispatch(events: Vec<ChainEvent>) {
    for event in events {
        match event {
            ChainEvent::BlockStored { hash, height } => {
                debug!(hash = %hash, height, "stored block");
            }
            ChainEvent::BlockOrphaned { hash } => {
                debug!(hash = %hash, "parked orphan block");
            }
            ChainEvent::BlockRejected { hash } => {
                info!(hash = %hash, "rejected block");
            }
            ChainEvent::BlockConnected { hash, height } => {
                info!(hash = %hash, height, "block connected");
            }
            ChainEvent::BlockDisconnected { hash, height } => {
                info!(hash = %hash, height, "block disconnected");
            }
            ChainEvent::TransactionAccepted { txid } => {
                debug!(txid = %txid, "transaction accepted");
            }
            ChainEvent::TransactionOrphaned { txid } => {
                debug!(txid = %txid, "transaction parked as orphan");
            }
            ChainEvent::TransactionRejected { txid } => {
                debug!(txid = %txid, "transaction rejected");
            }
        }
    }
}

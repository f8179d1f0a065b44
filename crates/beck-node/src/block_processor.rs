//! Drives blocks from arrival to the main chain.
//!
//! One instance owns the chain index, the UTXO processor, and the
//! transaction processor, and is the only writer of chain state. An
//! incoming block is judged, stored, and may trigger a reorganization:
//! the main chain always follows the best valid stored block, switching
//! forks by disconnecting to the junction and reconnecting along the
//! fork path.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use beck_core::chain::Blockchain;
use beck_core::error::{BeckError, ChainError, CorruptionError};
use beck_core::traits::{
    BlockRuleset, ConsensusPolicy, SharedBlockStore, SharedUtxoStore, UtxoStore, Verdict,
};
use beck_core::types::{Block, Hash256, IndexedBlock};
use beck_core::utxo_processor::UtxoProcessor;

use crate::config::NodeConfig;
use crate::events::ChainEvent;
use crate::rejected::RecentRejects;
use crate::tx_processor::TransactionProcessor;

/// The fork path from the main chain to a candidate tip.
///
/// `path` lists the blocks to connect, oldest first. `junction` is the
/// main-chain block the fork branches from; `None` means the path starts
/// at a genesis block and the whole chain unwinds first.
#[derive(Debug)]
struct ForkPath {
    junction: Option<IndexedBlock>,
    path: Vec<IndexedBlock>,
}

pub struct BlockProcessor {
    chain: Blockchain,
    utxo: UtxoProcessor,
    transactions: TransactionProcessor,
    policy: Arc<dyn ConsensusPolicy>,
    rejected: RecentRejects,
    events: Vec<ChainEvent>,
}

impl std::fmt::Debug for BlockProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockProcessor")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl BlockProcessor {
    pub fn new(
        blocks: SharedBlockStore,
        confirmed: SharedUtxoStore,
        pool_view: SharedUtxoStore,
        policy: Arc<dyn ConsensusPolicy>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            chain: Blockchain::new(blocks, config.max_orphan_blocks),
            utxo: UtxoProcessor::new(confirmed),
            transactions: TransactionProcessor::new(pool_view, Arc::clone(&policy), config),
            policy,
            rejected: RecentRejects::new(config.max_rejected_blocks),
            events: Vec::new(),
        }
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn transactions(&self) -> &TransactionProcessor {
        &self.transactions
    }

    pub fn transactions_mut(&mut self) -> &mut TransactionProcessor {
        &mut self.transactions
    }

    /// Take every event emitted since the last drain, block and
    /// transaction events alike.
    pub fn drain_events(&mut self) -> Vec<ChainEvent> {
        let mut events = std::mem::take(&mut self.events);
        events.extend(self.transactions.drain_events());
        events
    }

    /// Offer a new block.
    ///
    /// Returns the verdict on the offered block itself. A valid block is
    /// stored, orphans waiting on it are re-offered transitively, and the
    /// main chain is moved to the best valid stored tip.
    pub fn process_new_block(&mut self, block: Block) -> Result<Verdict, BeckError> {
        let hash = block.hash();
        if self.rejected.contains(&hash) {
            debug!(hash = %hash, "dropping recently rejected block");
            return Ok(Verdict::Invalid);
        }

        match self.policy.validate_block(&block, BlockRuleset::Incoming)? {
            Verdict::Invalid => {
                self.rejected.insert(hash);
                self.events.push(ChainEvent::BlockRejected { hash });
                Ok(Verdict::Invalid)
            }
            Verdict::Orphan => {
                debug!(hash = %hash, parent = %block.header.parent_hash, "parking orphan block");
                self.chain.add_orphan(block);
                self.events.push(ChainEvent::BlockOrphaned { hash });
                Ok(Verdict::Orphan)
            }
            Verdict::Valid => {
                let indexed = self.chain.store_block(&block)?;
                self.events.push(ChainEvent::BlockStored {
                    hash,
                    height: indexed.info.height,
                });
                let mut candidates = vec![hash];
                self.attach_orphans(hash, &mut candidates)?;
                self.update_main_chain(candidates)?;
                Ok(Verdict::Valid)
            }
        }
    }

    /// Re-offer parked orphans whose ancestry just became known, breadth
    /// first, appending each newly stored block to `candidates`.
    fn attach_orphans(
        &mut self,
        parent: Hash256,
        candidates: &mut Vec<Hash256>,
    ) -> Result<(), BeckError> {
        let mut queue = VecDeque::from([parent]);
        while let Some(parent) = queue.pop_front() {
            for orphan in self.chain.remove_orphans_of_parent(&parent) {
                let hash = orphan.hash();
                match self.policy.validate_block(&orphan, BlockRuleset::AfterOrphan)? {
                    Verdict::Valid => {
                        let indexed = self.chain.store_block(&orphan)?;
                        debug!(hash = %hash, height = indexed.info.height, "stored former orphan block");
                        self.events.push(ChainEvent::BlockStored {
                            hash,
                            height: indexed.info.height,
                        });
                        candidates.push(hash);
                        queue.push_back(hash);
                    }
                    Verdict::Invalid => {
                        self.rejected.insert(hash);
                        self.events.push(ChainEvent::BlockRejected { hash });
                    }
                    Verdict::Orphan => self.chain.add_orphan(orphan),
                }
            }
        }
        Ok(())
    }

    /// Move the main chain to the best valid stored tip.
    ///
    /// Repeats until the tip is the best candidate: pick the best valid
    /// block among candidates and the current tip, trace its fork path,
    /// disconnect down to the junction, and reconnect along the path. A
    /// block that fails connection is marked invalid and selection runs
    /// again; disconnected blocks rejoin the candidate set so the chain
    /// can fall back.
    fn update_main_chain(&mut self, mut candidates: Vec<Hash256>) -> Result<(), BeckError> {
        loop {
            let mut eligible = Vec::with_capacity(candidates.len() + 1);
            for hash in &candidates {
                if let Some(indexed) = self.chain.indexed_block(hash)?
                    && indexed.info.valid
                {
                    eligible.push(indexed);
                }
            }
            if let Some(tip) = self.chain.main().top()
                && !eligible.iter().any(|b| b.hash == tip.hash)
            {
                eligible.push(tip.clone());
            }

            let Some(best) = self.policy.best_valid_block(&eligible) else {
                if !self.chain.main().is_empty() {
                    warn!("no valid tip among candidates, leaving main chain unchanged");
                }
                return Ok(());
            };
            if self.chain.main().top().is_some_and(|tip| tip.hash == best.hash) {
                return Ok(());
            }

            let Some(fork) = self.find_valid_fork(&best)? else {
                debug!(hash = %best.hash, "candidate has no valid path to the main chain");
                candidates.retain(|h| *h != best.hash);
                continue;
            };
            if fork.path.is_empty() {
                candidates.retain(|h| *h != best.hash);
                continue;
            }

            let junction_hash = fork.junction.as_ref().map(|j| j.hash);
            if junction_hash.is_some() || !self.chain.main().is_empty() {
                info!(
                    to = %best.hash,
                    height = best.info.height,
                    "reorganizing main chain"
                );
            }
            while let Some(top) = self.chain.main().top().cloned() {
                if Some(top.hash) == junction_hash {
                    break;
                }
                self.disconnect_tip()?;
                if !candidates.contains(&top.hash) {
                    candidates.push(top.hash);
                }
            }

            for block in &fork.path {
                if !self.connect_block(block.clone())? {
                    warn!(hash = %block.hash, "block failed connection, marking invalid");
                    self.chain.set_block_invalid(&block.hash)?;
                    self.rejected.insert(block.hash);
                    self.events.push(ChainEvent::BlockRejected { hash: block.hash });
                    candidates.retain(|h| *h != block.hash);
                    break;
                }
            }
        }
    }

    /// Trace from `target` back to the main chain.
    ///
    /// Returns `None` when the path runs through an invalid or unindexed
    /// block, or reaches a genesis block while the main chain is anchored
    /// elsewhere.
    fn find_valid_fork(&self, target: &IndexedBlock) -> Result<Option<ForkPath>, BeckError> {
        let mut path = Vec::new();
        let mut cursor = target.clone();
        let junction = loop {
            if !cursor.info.valid {
                return Ok(None);
            }
            if self.chain.main().contains(&cursor) {
                break Some(cursor);
            }
            let parent_hash = cursor.info.parent_hash;
            path.push(cursor);
            if parent_hash.is_zero() {
                if !self.chain.main().is_empty() {
                    return Ok(None);
                }
                break None;
            }
            cursor = match self.chain.indexed_block(&parent_hash)? {
                Some(parent) => parent,
                None => return Ok(None),
            };
        };
        path.reverse();
        Ok(Some(ForkPath { junction, path }))
    }

    /// Disconnect the current tip, reversing its UTXO effects and
    /// returning its transactions to the pool.
    fn disconnect_tip(&mut self) -> Result<(), BeckError> {
        let tip = self
            .chain
            .main()
            .top()
            .cloned()
            .ok_or(ChainError::EmptyChain)?;
        let block = self
            .chain
            .block(&tip.hash)?
            .ok_or_else(|| CorruptionError::MissingBlockData(tip.hash.to_string()))?;
        let undo = self
            .chain
            .undo(&tip.hash)?
            .ok_or_else(|| CorruptionError::MissingUndoData(tip.hash.to_string()))?;

        self.utxo.disconnect_block(&block, &undo)?;
        self.transactions.process_top_block_disconnected(&block)?;
        self.chain.pop_top()?;
        info!(hash = %tip.hash, height = tip.info.height, "disconnected block");
        self.events.push(ChainEvent::BlockDisconnected {
            hash: tip.hash,
            height: tip.info.height,
        });
        Ok(())
    }

    /// Connect a stored block as the new tip.
    ///
    /// Returns `Ok(false)` when the connect-to-chain ruleset rejects it;
    /// chain state is untouched in that case.
    fn connect_block(&mut self, indexed: IndexedBlock) -> Result<bool, BeckError> {
        let block = self
            .chain
            .block(&indexed.hash)?
            .ok_or_else(|| CorruptionError::MissingBlockData(indexed.hash.to_string()))?;
        if self.policy.validate_block(&block, BlockRuleset::ConnectToChain)? != Verdict::Valid {
            return Ok(false);
        }

        let undo = self.utxo.connect_block(&block)?;
        self.chain.put_undo(indexed.hash, &undo)?;
        self.transactions.process_top_block_connected(&block)?;
        let height = indexed.info.height;
        let hash = indexed.hash;
        self.chain.push_top(indexed)?;
        info!(hash = %hash, height, "connected block");
        self.events.push(ChainEvent::BlockConnected { hash, height });
        Ok(true)
    }

    /// Rebuild the in-memory main chain from the UTXO set's last-processed
    /// pointer, for startup after the index was persisted but the chain
    /// was not.
    ///
    /// The pointer must name an indexed block whose ancestry reaches a
    /// genesis block; anything else is reported as corruption.
    pub fn sync_main_chain_with_utxo_set(&mut self) -> Result<(), BeckError> {
        let pointer = self.utxo.store().read().last_processed()?;
        if pointer.is_zero() {
            return Ok(());
        }

        let mut cursor = self
            .chain
            .indexed_block(&pointer)?
            .ok_or_else(|| CorruptionError::UnknownUtxoPointer(pointer.to_string()))?;
        let mut path = Vec::new();
        loop {
            if !cursor.info.valid {
                return Err(CorruptionError::NoForkToMainChain(cursor.hash.to_string()).into());
            }
            let parent_hash = cursor.info.parent_hash;
            path.push(cursor);
            if parent_hash.is_zero() {
                break;
            }
            cursor = self
                .chain
                .indexed_block(&parent_hash)?
                .ok_or_else(|| CorruptionError::MissingBlockData(parent_hash.to_string()))?;
        }

        for block in path.into_iter().rev() {
            self.chain.push_top(block)?;
        }
        info!(
            tip = %pointer,
            height = self.chain.main().height(),
            "restored main chain from UTXO pointer"
        );
        Ok(())
    }
}

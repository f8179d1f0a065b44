//! The policy engine: every judgement call the processors delegate.
//!
//! Blocks pass through three rulesets (incoming, after-orphan,
//! connect-to-chain); the first two are parent-relative and cheap, the
//! third resolves every spend against the confirmed UTXO set because only
//! then is the full context (maturity depths, fees) knowable. Transactions
//! pass through two rulesets that currently share the same checks; they
//! stay separate seams because the call sites differ.

use std::collections::HashSet;

use tracing::debug;

use beck_core::constants::{HALVING_INTERVAL, INITIAL_REWARD};
use beck_core::error::StorageError;
use beck_core::merkle;
use beck_core::traits::{
    BlockRuleset, BlockStore, ConsensusPolicy, SharedBlockStore, SharedUtxoStore, TxRuleset,
    UtxoStore, Verdict,
};
use beck_core::types::{
    Block, Hash256, IndexedBlock, OutPoint, Transaction, UnspentOutputInfo,
};

/// Coinbase subsidy at the given height: halves every [`HALVING_INTERVAL`]
/// blocks, reaching zero after 64 halvings.
pub fn block_subsidy(height: u64) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        0
    } else {
        INITIAL_REWARD >> halvings
    }
}

/// Proof-of-work check: the first eight bytes of the header hash, read
/// little-endian, must not exceed the target.
pub fn hash_meets_target(hash: &Hash256, target: u64) -> bool {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix) <= target
}

/// Concrete [`ConsensusPolicy`] over shared block and UTXO stores.
pub struct PolicyEngine {
    blocks: SharedBlockStore,
    confirmed: SharedUtxoStore,
    pool_view: SharedUtxoStore,
    network: u64,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl PolicyEngine {
    pub fn new(
        blocks: SharedBlockStore,
        confirmed: SharedUtxoStore,
        pool_view: SharedUtxoStore,
        network: u64,
    ) -> Self {
        Self {
            blocks,
            confirmed,
            pool_view,
            network,
        }
    }

    /// Context-free checks shared by every block ruleset.
    fn structurally_sound(&self, block: &Block) -> bool {
        if block.header.network != self.network {
            return false;
        }
        if !hash_meets_target(&block.hash(), block.header.target) {
            return false;
        }
        let Some(first) = block.transactions.first() else {
            return false;
        };
        if !first.is_coinbase() {
            return false;
        }
        if block.transactions.iter().skip(1).any(Transaction::is_coinbase) {
            return false;
        }
        let Ok(txids) = block.txids() else {
            return false;
        };
        if merkle::merkle_root(&txids) != block.header.merkle_root {
            return false;
        }
        let mut seen_txids = HashSet::new();
        if !txids.iter().all(|txid| seen_txids.insert(*txid)) {
            return false;
        }
        let mut seen_spends: HashSet<OutPoint> = HashSet::new();
        for tx in &block.transactions {
            if tx.signatures.len() != tx.inputs.len() {
                return false;
            }
            if !tx.is_coinbase() && (tx.inputs.is_empty() || tx.outputs.is_empty()) {
                return false;
            }
            for input in &tx.inputs {
                if !seen_spends.insert(input.previous_output) {
                    return false;
                }
            }
        }
        true
    }

    /// Resolve every spend of the block against the confirmed set plus
    /// outputs created earlier in the same block. Returns the verdict.
    fn check_spends(&self, confirmed: &dyn UtxoStore, block: &Block) -> Result<Verdict, StorageError> {
        let height = block.header.height;
        let mut created: std::collections::HashMap<OutPoint, UnspentOutputInfo> =
            std::collections::HashMap::new();
        let mut fees: u64 = 0;

        for tx in &block.transactions {
            let Ok(txid) = tx.txid() else {
                return Ok(Verdict::Invalid);
            };
            if !tx.is_coinbase() {
                let mut input_sum: u64 = 0;
                for input in &tx.inputs {
                    let info = match created.remove(&input.previous_output) {
                        Some(info) => info,
                        None => match confirmed.unspent(&input.previous_output)? {
                            Some(info) => info,
                            None => {
                                debug!(outpoint = %input.previous_output, "spend of unknown output");
                                return Ok(Verdict::Invalid);
                            }
                        },
                    };
                    if !info.is_mature(height) {
                        return Ok(Verdict::Invalid);
                    }
                    input_sum = match input_sum.checked_add(info.value) {
                        Some(sum) => sum,
                        None => return Ok(Verdict::Invalid),
                    };
                }
                let Some(output_sum) = tx.total_output_value() else {
                    return Ok(Verdict::Invalid);
                };
                if output_sum > input_sum {
                    return Ok(Verdict::Invalid);
                }
                fees = match fees.checked_add(input_sum - output_sum) {
                    Some(sum) => sum,
                    None => return Ok(Verdict::Invalid),
                };
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                created.insert(
                    OutPoint::new(txid, index as u64),
                    UnspentOutputInfo::confirmed(output, height, tx.is_coinbase()),
                );
            }
        }

        // Coinbase claims at most subsidy plus collected fees.
        if let Some(coinbase) = block.coinbase() {
            let allowed = block_subsidy(height).saturating_add(fees);
            let Some(claimed) = coinbase.total_output_value() else {
                return Ok(Verdict::Invalid);
            };
            if claimed > allowed {
                return Ok(Verdict::Invalid);
            }
        }
        Ok(Verdict::Valid)
    }

    /// Look up an unspent output in the confirmed set, then the pool view.
    fn available_output(
        &self,
        outpoint: &OutPoint,
    ) -> Result<Option<UnspentOutputInfo>, StorageError> {
        if let Some(info) = self.confirmed.read().unspent(outpoint)? {
            return Ok(Some(info));
        }
        self.pool_view.read().unspent(outpoint)
    }

    /// Height the next connected block would have.
    fn next_height(&self) -> Result<u64, StorageError> {
        let tip = self.confirmed.read().last_processed()?;
        if tip.is_zero() {
            return Ok(0);
        }
        match self.blocks.read().info(&tip)? {
            Some(info) => Ok(info.height + 1),
            None => Ok(0),
        }
    }
}

#[cfg(any(test, feature = "testing"))]
impl PolicyEngine {
    /// Engine over fresh in-memory stores, handing back the store handles.
    pub fn in_memory(
        network: u64,
    ) -> (
        std::sync::Arc<Self>,
        SharedBlockStore,
        SharedUtxoStore,
        SharedUtxoStore,
    ) {
        use beck_core::block_store::MemoryBlockStore;
        use beck_core::utxo_store::MemoryUtxoStore;
        use parking_lot::RwLock;
        use std::sync::Arc;

        let blocks: SharedBlockStore = Arc::new(RwLock::new(MemoryBlockStore::new()));
        let confirmed: SharedUtxoStore = Arc::new(RwLock::new(MemoryUtxoStore::new()));
        let pool_view: SharedUtxoStore = Arc::new(RwLock::new(MemoryUtxoStore::new()));
        let engine = Arc::new(Self::new(
            blocks.clone(),
            confirmed.clone(),
            pool_view.clone(),
            network,
        ));
        (engine, blocks, confirmed, pool_view)
    }
}

impl ConsensusPolicy for PolicyEngine {
    fn validate_block(
        &self,
        block: &Block,
        ruleset: BlockRuleset,
    ) -> Result<Verdict, StorageError> {
        if !self.structurally_sound(block) {
            return Ok(Verdict::Invalid);
        }

        let parent_hash = block.header.parent_hash;
        let parent_info = if parent_hash.is_zero() {
            None
        } else {
            self.blocks.read().info(&parent_hash)?
        };

        match ruleset {
            BlockRuleset::Incoming | BlockRuleset::AfterOrphan => {
                if parent_hash.is_zero() {
                    return Ok(if block.header.height == 0 {
                        Verdict::Valid
                    } else {
                        Verdict::Invalid
                    });
                }
                match parent_info {
                    None => Ok(Verdict::Orphan),
                    Some(info) if !info.valid => Ok(Verdict::Invalid),
                    Some(info) if block.header.height != info.height + 1 => Ok(Verdict::Invalid),
                    Some(_) => Ok(Verdict::Valid),
                }
            }
            BlockRuleset::ConnectToChain => {
                // The block must extend exactly the state the UTXO set is at.
                if self.confirmed.read().last_processed()? != parent_hash {
                    return Ok(Verdict::Invalid);
                }
                if parent_hash.is_zero() {
                    if block.header.height != 0 {
                        return Ok(Verdict::Invalid);
                    }
                } else {
                    match parent_info {
                        Some(info) if info.valid && block.header.height == info.height + 1 => {}
                        _ => return Ok(Verdict::Invalid),
                    }
                }
                let confirmed = self.confirmed.read();
                self.check_spends(&*confirmed, block)
            }
        }
    }

    fn validate_transaction(
        &self,
        tx: &Transaction,
        _ruleset: TxRuleset,
    ) -> Result<Verdict, StorageError> {
        // Coinbase transactions only enter through blocks.
        if tx.is_coinbase() || tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Ok(Verdict::Invalid);
        }
        if tx.signatures.len() != tx.inputs.len() {
            return Ok(Verdict::Invalid);
        }
        let mut seen = HashSet::new();
        if !tx.inputs.iter().all(|i| seen.insert(i.previous_output)) {
            return Ok(Verdict::Invalid);
        }

        let next_height = self.next_height()?;
        let mut input_sum: u64 = 0;
        for input in &tx.inputs {
            match self.available_output(&input.previous_output)? {
                None => return Ok(Verdict::Orphan),
                Some(info) => {
                    if !info.is_mature(next_height) {
                        return Ok(Verdict::Invalid);
                    }
                    input_sum = match input_sum.checked_add(info.value) {
                        Some(sum) => sum,
                        None => return Ok(Verdict::Invalid),
                    };
                }
            }
        }
        let Some(output_sum) = tx.total_output_value() else {
            return Ok(Verdict::Invalid);
        };
        if output_sum > input_sum {
            return Ok(Verdict::Invalid);
        }
        Ok(Verdict::Valid)
    }

    fn best_valid_block(&self, candidates: &[IndexedBlock]) -> Option<IndexedBlock> {
        candidates
            .iter()
            .filter(|c| c.info.valid)
            .max_by_key(|c| (c.info.chain_work, std::cmp::Reverse(c.hash)))
            .cloned()
    }

    fn is_independent(&self, tx: &Transaction) -> Result<bool, StorageError> {
        let confirmed = self.confirmed.read();
        for input in &tx.inputs {
            if !confirmed.is_unspent(&input.previous_output)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

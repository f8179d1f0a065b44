//! Collaborator seams between the consensus-state core and its environment.
//!
//! Store implementations are not thread-safe on their own; the node wraps
//! them in a `parking_lot::RwLock` and shares them through the aliases at
//! the bottom of this module. Validation lives entirely behind
//! [`ConsensusPolicy`]; the processors only consume verdicts.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::StorageError;
use crate::types::{
    Block, BlockInfo, BlockUndo, Hash256, IndexedBlock, OutPoint, Transaction, UnspentOutputInfo,
};

/// Outcome of running a block or transaction through a validation ruleset.
///
/// Rejection is a verdict, not an error: errors are reserved for failures
/// of the machinery (storage, corruption).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Passed every check in the ruleset.
    Valid,
    /// Failed a check; permanently rejected.
    Invalid,
    /// References data the node does not have yet; parked for later.
    Orphan,
}

/// Which checks apply to a block at each of the three validation points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockRuleset {
    /// A block just received from the outside.
    Incoming,
    /// A parked orphan re-offered after its parent arrived.
    AfterOrphan,
    /// The strictest point: the block is about to extend the UTXO set.
    ConnectToChain,
}

/// Which checks apply to a transaction at each validation point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxRuleset {
    /// A transaction just received from the outside.
    Initial,
    /// A parked orphan re-offered after a dependency appeared.
    AfterOrphan,
}

/// Keyed access to a set of unspent outputs.
///
/// Two instances exist per node: the confirmed set (outputs of main-chain
/// blocks) and the pool view (confirmed set plus outputs of validated pool
/// transactions). Each carries its own last-processed pointer.
pub trait UtxoStore: Send + Sync {
    /// Look up an output, returning its record iff it is currently unspent.
    fn unspent(&self, outpoint: &OutPoint) -> Result<Option<UnspentOutputInfo>, StorageError>;

    /// Whether the outpoint is currently unspent.
    fn is_unspent(&self, outpoint: &OutPoint) -> Result<bool, StorageError> {
        Ok(self.unspent(outpoint)?.is_some())
    }

    /// Record an output as unspent.
    fn mark_unspent(
        &mut self,
        outpoint: OutPoint,
        info: UnspentOutputInfo,
    ) -> Result<(), StorageError>;

    /// Remove an output from the unspent set, returning its record.
    ///
    /// Returns `None` when the outpoint was not in the set.
    fn mark_spent(&mut self, outpoint: &OutPoint)
        -> Result<Option<UnspentOutputInfo>, StorageError>;

    /// Hash of the last block whose outputs this set reflects.
    ///
    /// [`Hash256::ZERO`] before any block has been processed.
    fn last_processed(&self) -> Result<Hash256, StorageError>;

    /// Move the last-processed pointer.
    fn set_last_processed(&mut self, hash: Hash256) -> Result<(), StorageError>;
}

/// Keyed storage for raw blocks, their index metadata, and undo data.
pub trait BlockStore: Send + Sync {
    /// Store a block's full contents under its hash.
    fn put_block(&mut self, hash: Hash256, block: &Block) -> Result<(), StorageError>;

    /// Fetch a block's full contents.
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, StorageError>;

    /// Whether a block with this hash has been stored.
    fn has_block(&self, hash: &Hash256) -> Result<bool, StorageError> {
        Ok(self.info(hash)?.is_some())
    }

    /// Store or replace a block's index metadata.
    fn put_info(&mut self, hash: Hash256, info: BlockInfo) -> Result<(), StorageError>;

    /// Fetch a block's index metadata.
    fn info(&self, hash: &Hash256) -> Result<Option<BlockInfo>, StorageError>;

    /// Fetch a block hash paired with its metadata.
    fn indexed_block(&self, hash: &Hash256) -> Result<Option<IndexedBlock>, StorageError> {
        Ok(self.info(hash)?.map(|info| IndexedBlock::new(*hash, info)))
    }

    /// Store undo data for a connected block.
    fn put_undo(&mut self, hash: Hash256, undo: &BlockUndo) -> Result<(), StorageError>;

    /// Fetch a connected block's undo data.
    fn undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>, StorageError>;
}

/// External validation and chain-selection rules.
///
/// The processors never interpret block or transaction contents themselves;
/// every judgement call is delegated here.
pub trait ConsensusPolicy: Send + Sync {
    /// Judge a block under the given ruleset.
    fn validate_block(&self, block: &Block, ruleset: BlockRuleset)
        -> Result<Verdict, StorageError>;

    /// Judge a transaction under the given ruleset.
    fn validate_transaction(
        &self,
        tx: &Transaction,
        ruleset: TxRuleset,
    ) -> Result<Verdict, StorageError>;

    /// Pick the best block to build the main chain towards.
    ///
    /// Only blocks marked valid are eligible. Must be deterministic: equal
    /// candidate sets always produce the same answer.
    fn best_valid_block(&self, candidates: &[IndexedBlock]) -> Option<IndexedBlock>;

    /// Whether every input of `tx` is satisfied by confirmed outputs alone.
    ///
    /// Decides independent vs dependent tier placement in the pool.
    fn is_independent(&self, tx: &Transaction) -> Result<bool, StorageError>;
}

/// A UTXO store shared between the single writer and concurrent readers.
pub type SharedUtxoStore = Arc<RwLock<dyn UtxoStore>>;

/// A block store shared between the single writer and concurrent readers.
pub type SharedBlockStore = Arc<RwLock<dyn BlockStore>>;

//! Chain index: block storage bookkeeping, the main chain, and orphan blocks.
//!
//! The [`Blockchain`] owns the node's view of every stored block plus two
//! pieces of in-memory state: the contiguous main chain and the bounded set
//! of orphan blocks waiting for their parent. It never validates anything;
//! callers decide what goes in.

use std::collections::HashMap;

use rand::Rng;
use tracing::debug;

use crate::error::{BeckError, ChainError};
use crate::traits::{BlockStore, SharedBlockStore};
use crate::types::{Block, BlockInfo, BlockUndo, Hash256, IndexedBlock};

/// The contiguous sequence of connected blocks, genesis at the bottom.
///
/// Invariant: `blocks[i].info.height == i`, and every entry's parent hash is
/// the hash of the entry below it (genesis has the zero parent).
#[derive(Debug, Default, Clone)]
pub struct MainChain {
    blocks: Vec<IndexedBlock>,
}

impl MainChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The current tip, if any block is connected.
    pub fn top(&self) -> Option<&IndexedBlock> {
        self.blocks.last()
    }

    /// Height of the tip. `None` when the chain is empty.
    pub fn height(&self) -> Option<u64> {
        self.top().map(|b| b.info.height)
    }

    /// The connected block at the given height.
    pub fn at_height(&self, height: u64) -> Option<&IndexedBlock> {
        usize::try_from(height).ok().and_then(|i| self.blocks.get(i))
    }

    /// Whether this exact block sits on the main chain at its recorded height.
    pub fn contains(&self, block: &IndexedBlock) -> bool {
        self.at_height(block.info.height)
            .is_some_and(|at| at.hash == block.hash)
    }

    /// Push a new tip.
    ///
    /// The block must sit exactly one above the current tip and name it as
    /// parent (or be a genesis block on an empty chain).
    pub fn push_top(&mut self, block: IndexedBlock) -> Result<(), ChainError> {
        let expected = self.blocks.len() as u64;
        if block.info.height != expected {
            return Err(ChainError::NonContiguousPush {
                expected,
                got: block.info.height,
            });
        }
        let extends = match self.top() {
            Some(top) => block.info.parent_hash == top.hash,
            None => block.info.parent_hash.is_zero(),
        };
        if !extends {
            return Err(ChainError::DoesNotExtendTip(block.hash.to_string()));
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Remove and return the tip. `None` when the chain is empty.
    pub fn pop_top(&mut self) -> Option<IndexedBlock> {
        self.blocks.pop()
    }
}

/// Bounded holding area for blocks whose parent has not arrived yet.
///
/// Keyed by the missing parent's hash. When the cap is exceeded a uniformly
/// random orphan is dropped; orphans are best-effort state and can always be
/// re-fetched.
#[derive(Debug)]
struct OrphanBlocks {
    by_parent: HashMap<Hash256, Vec<Block>>,
    count: usize,
    max: usize,
}

impl OrphanBlocks {
    fn new(max: usize) -> Self {
        Self {
            by_parent: HashMap::new(),
            count: 0,
            max,
        }
    }

    fn len(&self) -> usize {
        self.count
    }

    fn add(&mut self, block: Block) {
        let hash = block.hash();
        let bucket = self.by_parent.entry(block.header.parent_hash).or_default();
        if bucket.iter().any(|b| b.hash() == hash) {
            return;
        }
        bucket.push(block);
        self.count += 1;
        while self.count > self.max {
            self.evict_random();
        }
    }

    fn remove_children(&mut self, parent: &Hash256) -> Vec<Block> {
        let children = self.by_parent.remove(parent).unwrap_or_default();
        self.count -= children.len();
        children
    }

    fn evict_random(&mut self) {
        let mut rng = rand::thread_rng();
        let mut n = rng.gen_range(0..self.count);
        let mut victim_parent = None;
        for (parent, bucket) in &self.by_parent {
            if n < bucket.len() {
                victim_parent = Some(*parent);
                break;
            }
            n -= bucket.len();
        }
        if let Some(parent) = victim_parent
            && let Some(bucket) = self.by_parent.get_mut(&parent)
        {
            let evicted = bucket.swap_remove(n);
            if bucket.is_empty() {
                self.by_parent.remove(&parent);
            }
            self.count -= 1;
            debug!(hash = %evicted.hash(), "evicted orphan block");
        }
    }
}

/// The chain index over a shared block store.
pub struct Blockchain {
    store: SharedBlockStore,
    main: MainChain,
    orphans: OrphanBlocks,
}

impl std::fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blockchain")
            .field("main_height", &self.main.height())
            .field("orphans", &self.orphans.len())
            .finish_non_exhaustive()
    }
}

impl Blockchain {
    pub fn new(store: SharedBlockStore, max_orphan_blocks: usize) -> Self {
        Self {
            store,
            main: MainChain::new(),
            orphans: OrphanBlocks::new(max_orphan_blocks),
        }
    }

    pub fn main(&self) -> &MainChain {
        &self.main
    }

    /// Store a block and its index metadata.
    ///
    /// Idempotent: re-storing a known block changes nothing except that a
    /// block previously marked invalid becomes valid again (the caller just
    /// re-validated it). Cumulative chain work is computed from the parent's
    /// record, so the parent of a non-genesis block must already be stored.
    pub fn store_block(&mut self, block: &Block) -> Result<IndexedBlock, BeckError> {
        let hash = block.hash();
        let mut store = self.store.write();

        if let Some(mut info) = store.info(&hash)? {
            if !info.valid {
                info.valid = true;
                store.put_info(hash, info.clone())?;
                debug!(hash = %hash, "re-marked stored block as valid");
            }
            return Ok(IndexedBlock::new(hash, info));
        }

        let parent_hash = block.header.parent_hash;
        let parent_work = if parent_hash.is_zero() {
            0
        } else {
            store
                .info(&parent_hash)?
                .ok_or_else(|| ChainError::UnknownParent(parent_hash.to_string()))?
                .chain_work
        };
        let info = BlockInfo {
            parent_hash,
            height: block.header.height,
            chain_work: parent_work + block.header.work(),
            valid: true,
        };
        store.put_block(hash, block)?;
        store.put_info(hash, info.clone())?;
        Ok(IndexedBlock::new(hash, info))
    }

    /// Fetch a stored block's contents.
    pub fn block(&self, hash: &Hash256) -> Result<Option<Block>, BeckError> {
        Ok(self.store.read().block(hash)?)
    }

    /// Fetch a stored block's hash-plus-metadata handle.
    pub fn indexed_block(&self, hash: &Hash256) -> Result<Option<IndexedBlock>, BeckError> {
        Ok(self.store.read().indexed_block(hash)?)
    }

    /// Whether the index knows this hash.
    pub fn has_block(&self, hash: &Hash256) -> Result<bool, BeckError> {
        Ok(self.store.read().has_block(hash)?)
    }

    /// Permanently mark a stored block invalid.
    ///
    /// Fails on unknown hashes; an unknown block cannot have a validity.
    pub fn set_block_invalid(&mut self, hash: &Hash256) -> Result<(), BeckError> {
        let mut store = self.store.write();
        let mut info = store
            .info(hash)?
            .ok_or_else(|| ChainError::UnknownBlock(hash.to_string()))?;
        info.valid = false;
        store.put_info(*hash, info)?;
        Ok(())
    }

    /// Store undo data captured when a block was connected.
    pub fn put_undo(&mut self, hash: Hash256, undo: &BlockUndo) -> Result<(), BeckError> {
        Ok(self.store.write().put_undo(hash, undo)?)
    }

    /// Fetch a connected block's undo data.
    pub fn undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>, BeckError> {
        Ok(self.store.read().undo(hash)?)
    }

    /// Park a block whose parent is unknown.
    pub fn add_orphan(&mut self, block: Block) {
        self.orphans.add(block);
    }

    /// Remove and return every orphan waiting on `parent`.
    pub fn remove_orphans_of_parent(&mut self, parent: &Hash256) -> Vec<Block> {
        self.orphans.remove_children(parent)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Connect a block as the new main-chain tip.
    pub fn push_top(&mut self, block: IndexedBlock) -> Result<(), BeckError> {
        Ok(self.main.push_top(block)?)
    }

    /// Disconnect the main-chain tip.
    pub fn pop_top(&mut self) -> Result<IndexedBlock, BeckError> {
        self.main.pop_top().ok_or(ChainError::EmptyChain.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_store::MemoryBlockStore;
    use crate::constants::NETWORK_TEST;
    use crate::types::BlockHeader;
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn shared_store() -> SharedBlockStore {
        Arc::new(RwLock::new(MemoryBlockStore::new()))
    }

    fn make_block(parent: Hash256, height: u64, nonce: u64) -> Block {
        Block {
            header: BlockHeader {
                network: NETWORK_TEST,
                parent_hash: parent,
                merkle_root: Hash256::ZERO,
                target: u64::MAX,
                height,
                nonce,
            },
            transactions: vec![],
        }
    }

    fn indexed(block: &Block, chain_work: u128) -> IndexedBlock {
        IndexedBlock::new(
            block.hash(),
            BlockInfo {
                parent_hash: block.header.parent_hash,
                height: block.header.height,
                chain_work,
                valid: true,
            },
        )
    }

    // ---- MainChain ----

    #[test]
    fn empty_chain_has_no_top() {
        let chain = MainChain::new();
        assert!(chain.top().is_none());
        assert!(chain.height().is_none());
        assert!(chain.is_empty());
    }

    #[test]
    fn push_genesis_then_child() {
        let genesis = make_block(Hash256::ZERO, 0, 0);
        let child = make_block(genesis.hash(), 1, 1);

        let mut chain = MainChain::new();
        chain.push_top(indexed(&genesis, 1)).unwrap();
        chain.push_top(indexed(&child, 2)).unwrap();

        assert_eq!(chain.height(), Some(1));
        assert_eq!(chain.top().unwrap().hash, child.hash());
        assert_eq!(chain.at_height(0).unwrap().hash, genesis.hash());
    }

    #[test]
    fn push_rejects_wrong_height() {
        let genesis = make_block(Hash256::ZERO, 0, 0);
        let skipper = make_block(genesis.hash(), 2, 1);

        let mut chain = MainChain::new();
        chain.push_top(indexed(&genesis, 1)).unwrap();
        let err = chain.push_top(indexed(&skipper, 2)).unwrap_err();
        assert!(matches!(
            err,
            ChainError::NonContiguousPush { expected: 1, got: 2 }
        ));
    }

    #[test]
    fn push_rejects_wrong_parent() {
        let genesis = make_block(Hash256::ZERO, 0, 0);
        let stranger = make_block(Hash256([9; 32]), 1, 1);

        let mut chain = MainChain::new();
        chain.push_top(indexed(&genesis, 1)).unwrap();
        assert!(matches!(
            chain.push_top(indexed(&stranger, 2)),
            Err(ChainError::DoesNotExtendTip(_))
        ));
    }

    #[test]
    fn push_rejects_non_genesis_on_empty_chain() {
        let block = make_block(Hash256([1; 32]), 0, 0);
        let mut chain = MainChain::new();
        assert!(chain.push_top(indexed(&block, 1)).is_err());
    }

    #[test]
    fn pop_returns_blocks_in_reverse() {
        let genesis = make_block(Hash256::ZERO, 0, 0);
        let child = make_block(genesis.hash(), 1, 1);

        let mut chain = MainChain::new();
        chain.push_top(indexed(&genesis, 1)).unwrap();
        chain.push_top(indexed(&child, 2)).unwrap();

        assert_eq!(chain.pop_top().unwrap().hash, child.hash());
        assert_eq!(chain.pop_top().unwrap().hash, genesis.hash());
        assert!(chain.pop_top().is_none());
    }

    #[test]
    fn contains_checks_hash_at_height() {
        let genesis = make_block(Hash256::ZERO, 0, 0);
        let rival = make_block(Hash256::ZERO, 0, 99);

        let mut chain = MainChain::new();
        chain.push_top(indexed(&genesis, 1)).unwrap();
        assert!(chain.contains(&indexed(&genesis, 1)));
        assert!(!chain.contains(&indexed(&rival, 1)));
    }

    // ---- Blockchain::store_block ----

    #[test]
    fn store_block_records_info_and_work() {
        let mut bc = Blockchain::new(shared_store(), 10);
        let genesis = make_block(Hash256::ZERO, 0, 0);
        let child = make_block(genesis.hash(), 1, 1);

        let g = bc.store_block(&genesis).unwrap();
        let c = bc.store_block(&child).unwrap();

        assert_eq!(g.info.height, 0);
        assert_eq!(g.info.chain_work, genesis.header.work());
        assert_eq!(c.info.chain_work, g.info.chain_work + child.header.work());
        assert!(bc.has_block(&child.hash()).unwrap());
    }

    #[test]
    fn store_block_is_idempotent() {
        let mut bc = Blockchain::new(shared_store(), 10);
        let genesis = make_block(Hash256::ZERO, 0, 0);
        let first = bc.store_block(&genesis).unwrap();
        let second = bc.store_block(&genesis).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn store_block_upgrades_invalidated_block() {
        let mut bc = Blockchain::new(shared_store(), 10);
        let genesis = make_block(Hash256::ZERO, 0, 0);
        let hash = genesis.hash();

        bc.store_block(&genesis).unwrap();
        bc.set_block_invalid(&hash).unwrap();
        assert!(!bc.indexed_block(&hash).unwrap().unwrap().info.valid);

        let again = bc.store_block(&genesis).unwrap();
        assert!(again.info.valid);
        assert!(bc.indexed_block(&hash).unwrap().unwrap().info.valid);
    }

    #[test]
    fn store_block_requires_known_parent() {
        let mut bc = Blockchain::new(shared_store(), 10);
        let block = make_block(Hash256([7; 32]), 1, 0);
        assert!(matches!(
            bc.store_block(&block),
            Err(BeckError::Chain(ChainError::UnknownParent(_)))
        ));
    }

    #[test]
    fn set_invalid_unknown_block_fails() {
        let mut bc = Blockchain::new(shared_store(), 10);
        assert!(matches!(
            bc.set_block_invalid(&Hash256([1; 32])),
            Err(BeckError::Chain(ChainError::UnknownBlock(_)))
        ));
    }

    // ---- orphans ----

    #[test]
    fn orphans_grouped_by_parent() {
        let mut bc = Blockchain::new(shared_store(), 10);
        let parent = Hash256([1; 32]);
        let other = Hash256([2; 32]);
        bc.add_orphan(make_block(parent, 5, 0));
        bc.add_orphan(make_block(parent, 5, 1));
        bc.add_orphan(make_block(other, 5, 2));
        assert_eq!(bc.orphan_count(), 3);

        let children = bc.remove_orphans_of_parent(&parent);
        assert_eq!(children.len(), 2);
        assert_eq!(bc.orphan_count(), 1);

        // Removal is draining: a second call finds nothing.
        assert!(bc.remove_orphans_of_parent(&parent).is_empty());
    }

    #[test]
    fn duplicate_orphan_ignored() {
        let mut bc = Blockchain::new(shared_store(), 10);
        let block = make_block(Hash256([1; 32]), 5, 0);
        bc.add_orphan(block.clone());
        bc.add_orphan(block);
        assert_eq!(bc.orphan_count(), 1);
    }

    #[test]
    fn orphan_cap_enforced_by_random_eviction() {
        let mut bc = Blockchain::new(shared_store(), 4);
        for nonce in 0..20 {
            bc.add_orphan(make_block(Hash256([1; 32]), 5, nonce));
        }
        assert_eq!(bc.orphan_count(), 4);
    }

    #[test]
    fn eviction_spans_parent_buckets() {
        let mut bc = Blockchain::new(shared_store(), 6);
        for parent_byte in 0..10u8 {
            let parent = Hash256([parent_byte.wrapping_add(1); 32]);
            bc.add_orphan(make_block(parent, 5, parent_byte as u64));
        }
        assert_eq!(bc.orphan_count(), 6);
    }
}

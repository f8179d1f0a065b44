//! In-memory implementation of [`BlockStore`].

use std::collections::HashMap;

use crate::error::StorageError;
use crate::traits::BlockStore;
use crate::types::{Block, BlockInfo, BlockUndo, Hash256};

/// HashMap-backed block storage: raw blocks, index metadata, and undo data.
///
/// Not thread-safe; callers wrap it in a lock.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: HashMap<Hash256, Block>,
    infos: HashMap<Hash256, BlockInfo>,
    undo: HashMap<Hash256, BlockUndo>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed blocks.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put_block(&mut self, hash: Hash256, block: &Block) -> Result<(), StorageError> {
        self.blocks.insert(hash, block.clone());
        Ok(())
    }

    fn block(&self, hash: &Hash256) -> Result<Option<Block>, StorageError> {
        Ok(self.blocks.get(hash).cloned())
    }

    fn has_block(&self, hash: &Hash256) -> Result<bool, StorageError> {
        Ok(self.infos.contains_key(hash))
    }

    fn put_info(&mut self, hash: Hash256, info: BlockInfo) -> Result<(), StorageError> {
        self.infos.insert(hash, info);
        Ok(())
    }

    fn info(&self, hash: &Hash256) -> Result<Option<BlockInfo>, StorageError> {
        Ok(self.infos.get(hash).cloned())
    }

    fn put_undo(&mut self, hash: Hash256, undo: &BlockUndo) -> Result<(), StorageError> {
        self.undo.insert(hash, undo.clone());
        Ok(())
    }

    fn undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>, StorageError> {
        Ok(self.undo.get(hash).cloned())
    }
}

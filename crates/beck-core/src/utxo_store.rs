//! In-memory implementation of [`UtxoStore`].

use std::collections::HashMap;

use crate::error::StorageError;
use crate::traits::UtxoStore;
use crate::types::{Hash256, OutPoint, UnspentOutputInfo};

/// HashMap-backed unspent-output set with a movable last-processed pointer.
///
/// Not thread-safe; callers wrap it in a lock. A persistent backend would
/// implement the same trait.
#[derive(Debug, Default)]
pub struct MemoryUtxoStore {
    entries: HashMap<OutPoint, UnspentOutputInfo>,
    last_processed: Hash256,
}

impl MemoryUtxoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unspent outputs currently in the set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl UtxoStore for MemoryUtxoStore {
    fn unspent(&self, outpoint: &OutPoint) -> Result<Option<UnspentOutputInfo>, StorageError> {
        Ok(self.entries.get(outpoint).cloned())
    }

    fn mark_unspent(
        &mut self,
        outpoint: OutPoint,
        info: UnspentOutputInfo,
    ) -> Result<(), StorageError> {
        self.entries.insert(outpoint, info);
        Ok(())
    }

    fn mark_spent(
        &mut self,
        outpoint: &OutPoint,
    ) -> Result<Option<UnspentOutputInfo>, StorageError> {
        Ok(self.entries.remove(outpoint))
    }

    fn last_processed(&self) -> Result<Hash256, StorageError> {
        Ok(self.last_processed)
    }

    fn set_last_processed(&mut self, hash: Hash256) -> Result<(), StorageError> {
        self.last_processed = hash;
        Ok(())
    }
}

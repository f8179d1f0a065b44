//! Applies blocks to a UTXO store and reverses them with undo data.
//!
//! Connecting a block marks its outputs unspent, spends its inputs while
//! capturing what they consumed, and moves the store's last-processed
//! pointer to the block. Disconnecting with the captured undo data restores
//! the store to the exact prior state and moves the pointer to the parent.

use tracing::debug;

use crate::error::{BeckError, CorruptionError, StorageError};
use crate::traits::{SharedUtxoStore, UtxoStore};
use crate::types::{Block, BlockUndo, OutPoint, TransactionUndo, UnspentOutputInfo};

pub struct UtxoProcessor {
    store: SharedUtxoStore,
}

impl std::fmt::Debug for UtxoProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtxoProcessor").finish_non_exhaustive()
    }
}

impl UtxoProcessor {
    pub fn new(store: SharedUtxoStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SharedUtxoStore {
        &self.store
    }

    /// Apply a block on top of the store's current state.
    ///
    /// Outputs are created first so inputs may spend outputs of earlier
    /// transactions in the same block. The returned undo data holds one
    /// record per non-coinbase transaction, aligned with block position
    /// offset by one (the coinbase spends nothing and gets no slot).
    ///
    /// The caller must have validated the block against this store; an
    /// input that misses here is reported as corruption.
    pub fn connect_block(&self, block: &Block) -> Result<BlockUndo, BeckError> {
        let hash = block.hash();
        let height = block.header.height;
        let mut store = self.store.write();

        for tx in &block.transactions {
            let txid = tx.txid()?;
            let is_coinbase = tx.is_coinbase();
            for (index, output) in tx.outputs.iter().enumerate() {
                store.mark_unspent(
                    OutPoint::new(txid, index as u64),
                    UnspentOutputInfo::confirmed(output, height, is_coinbase),
                )?;
            }
        }

        let mut undo = BlockUndo::default();
        for tx in block.transactions.iter().skip(1) {
            let mut tx_undo = TransactionUndo::default();
            for input in &tx.inputs {
                let spent = store.mark_spent(&input.previous_output)?.ok_or_else(|| {
                    CorruptionError::UtxoSetDiverged(input.previous_output.to_string())
                })?;
                tx_undo.spent.push(spent);
            }
            undo.transactions.push(tx_undo);
        }

        store.set_last_processed(hash)?;
        debug!(hash = %hash, height, "applied block to UTXO set");
        Ok(undo)
    }

    /// Reverse a previously connected block.
    ///
    /// Transactions are processed in reverse block order: each one's outputs
    /// are removed and its inputs restored from the undo record, so spends
    /// of same-block outputs unwind correctly. The pointer moves to the
    /// block's parent.
    pub fn disconnect_block(&self, block: &Block, undo: &BlockUndo) -> Result<(), BeckError> {
        let mut store = self.store.write();

        for (position, tx) in block.transactions.iter().enumerate().rev() {
            let txid = tx.txid()?;
            for index in 0..tx.outputs.len() {
                let outpoint = OutPoint::new(txid, index as u64);
                store
                    .mark_spent(&outpoint)?
                    .ok_or_else(|| CorruptionError::UtxoSetDiverged(outpoint.to_string()))?;
            }

            if position == 0 {
                continue;
            }
            let tx_undo = undo
                .transactions
                .get(position - 1)
                .ok_or_else(|| CorruptionError::MissingUndoData(txid.to_string()))?;
            if tx_undo.spent.len() != tx.inputs.len() {
                return Err(StorageError::CorruptRecord(format!(
                    "undo record for {txid} has {} entries for {} inputs",
                    tx_undo.spent.len(),
                    tx.inputs.len()
                ))
                .into());
            }
            for (input, restored) in tx.inputs.iter().zip(&tx_undo.spent) {
                store.mark_unspent(input.previous_output, restored.clone())?;
            }
        }

        store.set_last_processed(block.header.parent_hash)?;
        debug!(hash = %block.hash(), "reversed block in UTXO set");
        Ok(())
    }
}

//! Mediates between transaction verdicts and pool mutation.
//!
//! Owns the [`TransactionPool`] and the pool UTXO view, and keeps the two
//! consistent: a transaction's outputs are visible in the view exactly
//! while it sits in a validated tier. Validation itself is delegated to
//! the consensus policy.

use std::sync::Arc;

use tracing::debug;

use beck_core::error::BeckError;
use beck_core::pool::TransactionPool;
use beck_core::traits::{ConsensusPolicy, SharedUtxoStore, TxRuleset, UtxoStore, Verdict};
use beck_core::types::{
    Block, Hash256, OutPoint, Transaction, UnspentOutputInfo,
};

use crate::config::NodeConfig;
use crate::events::ChainEvent;
use crate::rejected::RecentRejects;

/// Outcome of offering one transaction to the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedTransaction {
    /// Verdict for the offered transaction itself.
    pub status: Verdict,
    /// Former orphans that validated as a consequence and entered the pool.
    pub added_orphans: Vec<Transaction>,
}

impl ProcessedTransaction {
    fn alone(status: Verdict) -> Self {
        Self {
            status,
            added_orphans: Vec::new(),
        }
    }
}

pub struct TransactionProcessor {
    pool: TransactionPool,
    pool_view: SharedUtxoStore,
    policy: Arc<dyn ConsensusPolicy>,
    rejected: RecentRejects,
    events: Vec<ChainEvent>,
}

impl std::fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionProcessor")
            .field("validated", &self.pool.validated_len())
            .field("orphans", &self.pool.orphan_len())
            .finish_non_exhaustive()
    }
}

/// Record a pool transaction's outputs in the view, under the unconfirmed
/// height marker.
fn view_entry(output_value: u64, address: Hash256) -> UnspentOutputInfo {
    UnspentOutputInfo {
        value: output_value,
        address,
        block_height: beck_core::constants::UNCONFIRMED_OUTPUT_HEIGHT,
        is_coinbase: false,
    }
}

impl TransactionProcessor {
    pub fn new(
        pool_view: SharedUtxoStore,
        policy: Arc<dyn ConsensusPolicy>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            pool: TransactionPool::new(
                config.max_pool_transactions,
                config.max_orphan_transactions,
            ),
            pool_view,
            policy,
            rejected: RecentRejects::new(config.max_rejected_transactions),
            events: Vec::new(),
        }
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    /// Take everything that happened since the last drain.
    pub fn drain_events(&mut self) -> Vec<ChainEvent> {
        std::mem::take(&mut self.events)
    }

    /// Offer a new transaction.
    ///
    /// Recently rejected ids are answered without re-validation; ids
    /// already pooled are idempotently reported valid. A valid transaction
    /// is placed in its tier, and any orphans its arrival unblocks are
    /// promoted (transitively) and returned.
    pub fn process_new_transaction(
        &mut self,
        tx: Transaction,
    ) -> Result<ProcessedTransaction, BeckError> {
        let txid = tx.txid()?;
        if self.rejected.contains(&txid) {
            debug!(txid = %txid, "dropping recently rejected transaction");
            return Ok(ProcessedTransaction::alone(Verdict::Invalid));
        }
        if self.pool.contains(&txid) {
            return Ok(ProcessedTransaction::alone(Verdict::Valid));
        }

        match self.policy.validate_transaction(&tx, TxRuleset::Initial)? {
            Verdict::Invalid => {
                self.rejected.insert(txid);
                self.events.push(ChainEvent::TransactionRejected { txid });
                Ok(ProcessedTransaction::alone(Verdict::Invalid))
            }
            Verdict::Orphan => {
                self.pool.add_orphan(txid, tx);
                self.events.push(ChainEvent::TransactionOrphaned { txid });
                Ok(ProcessedTransaction::alone(Verdict::Orphan))
            }
            Verdict::Valid => {
                self.accept_validated(txid, tx)?;
                let added_orphans = self.promote_orphans_of(txid)?;
                let result = ProcessedTransaction {
                    status: Verdict::Valid,
                    added_orphans,
                };
                self.limit_pool()?;
                Ok(result)
            }
        }
    }

    /// The tip gained a block: everything it confirmed leaves the pool.
    ///
    /// Two passes. First every block transaction is removed and its view
    /// outputs retracted; only then are dependents of the confirmed ids
    /// re-classified, so classification sees the post-removal pool.
    pub fn process_top_block_connected(&mut self, block: &Block) -> Result<(), BeckError> {
        let mut confirmed_ids = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            let txid = tx.txid()?;
            if self.pool.remove(&txid).is_some() {
                self.retract_outputs(&txid, tx)?;
            }
            // The id may return in a future reorg; do not hold a rejection.
            self.rejected.forget(&txid);
            confirmed_ids.push(txid);
        }

        let policy = Arc::clone(&self.policy);
        for txid in &confirmed_ids {
            self.pool.promote_dependent_to_independent_from_parent(txid, |_, tx| {
                matches!(policy.is_independent(tx), Ok(true))
            });
        }
        self.limit_pool()
    }

    /// The tip lost a block: its transactions return to the pool.
    ///
    /// The coinbase is never reinserted; everything depending on it becomes
    /// an orphan. Other transactions re-enter as if newly validated, demote
    /// independents now depending on them, and re-offer orphans that were
    /// blocked on their input sources (a disconnected block can un-orphan
    /// double-spenders of the chain it replaced).
    pub fn process_top_block_disconnected(&mut self, block: &Block) -> Result<(), BeckError> {
        for tx in &block.transactions {
            let txid = tx.txid()?;
            if tx.is_coinbase() {
                let demoted = self.pool.demote_to_orphan(&txid);
                let mut view = self.pool_view.write();
                for (demoted_id, demoted_tx) in &demoted {
                    for index in 0..demoted_tx.outputs.len() {
                        view.mark_spent(&OutPoint::new(*demoted_id, index as u64))?;
                    }
                    self.events
                        .push(ChainEvent::TransactionOrphaned { txid: *demoted_id });
                }
                continue;
            }

            self.accept_validated(txid, tx.clone())?;
            self.pool.demote_independent_to_dependent(&txid);
            for input in &tx.inputs {
                self.promote_orphans_of(input.previous_output.txid)?;
            }
        }
        self.limit_pool()
    }

    /// Publish outputs to the view and file the transaction in its tier.
    fn accept_validated(&mut self, txid: Hash256, tx: Transaction) -> Result<(), BeckError> {
        {
            let mut view = self.pool_view.write();
            for (index, output) in tx.outputs.iter().enumerate() {
                view.mark_unspent(
                    OutPoint::new(txid, index as u64),
                    view_entry(output.value, output.address),
                )?;
            }
        }
        if self.policy.is_independent(&tx)? {
            self.pool.add_independent(txid, tx);
        } else {
            self.pool.add_dependent(txid, tx);
        }
        self.events.push(ChainEvent::TransactionAccepted { txid });
        Ok(())
    }

    /// Re-offer orphans transitively blocked on `source`.
    ///
    /// The predicate publishes an accepted orphan's outputs to the view
    /// before the walk continues, so a chain of orphans resolves in one
    /// pass, each link validating against its predecessor's outputs.
    fn promote_orphans_of(&mut self, source: Hash256) -> Result<Vec<Transaction>, BeckError> {
        let policy = Arc::clone(&self.policy);
        let view = self.pool_view.clone();
        let removed = self.pool.remove_valid_orphans_from_parent(&source, |txid, tx| {
            if !matches!(
                policy.validate_transaction(tx, TxRuleset::AfterOrphan),
                Ok(Verdict::Valid)
            ) {
                return false;
            }
            let mut view = view.write();
            for (index, output) in tx.outputs.iter().enumerate() {
                if view
                    .mark_unspent(
                        OutPoint::new(*txid, index as u64),
                        view_entry(output.value, output.address),
                    )
                    .is_err()
                {
                    return false;
                }
            }
            true
        });

        let mut promoted = Vec::with_capacity(removed.len());
        for (txid, tx) in removed {
            if self.policy.is_independent(&tx)? {
                self.pool.add_independent(txid, tx.clone());
            } else {
                self.pool.add_dependent(txid, tx.clone());
            }
            self.events.push(ChainEvent::TransactionAccepted { txid });
            debug!(txid = %txid, "promoted orphan transaction");
            promoted.push(tx);
        }
        Ok(promoted)
    }

    /// Remove a transaction's outputs from the pool view.
    fn retract_outputs(&mut self, txid: &Hash256, tx: &Transaction) -> Result<(), BeckError> {
        let mut view = self.pool_view.write();
        for index in 0..tx.outputs.len() {
            view.mark_spent(&OutPoint::new(*txid, index as u64))?;
        }
        Ok(())
    }

    /// Enforce the pool bound, retracting evicted outputs from the view.
    fn limit_pool(&mut self) -> Result<(), BeckError> {
        let evicted = self.pool.limit_pool_size();
        for (txid, tx) in evicted {
            self.retract_outputs(&txid, &tx)?;
            self.events.push(ChainEvent::TransactionRejected { txid });
        }
        Ok(())
    }
}

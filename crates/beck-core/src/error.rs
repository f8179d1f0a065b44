//! Error types for the Beck consensus-state core.
//!
//! Validation outcomes are not errors: blocks and transactions that fail a
//! ruleset travel as [`Verdict`](crate::traits::Verdict) values. Errors here
//! are genuine failures of the machinery itself.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("serialization: {0}")] Serialization(String),
    #[error("signature count {signatures} does not match input count {inputs}")] SignatureCountMismatch { signatures: usize, inputs: usize },
}

/// Failures of the underlying block or UTXO store.
///
/// Kept distinct from everything else so callers can tell "the disk went
/// away" apart from "the data is wrong".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage unavailable: {0}")] Unavailable(String),
    #[error("storage corrupt record: {0}")] CorruptRecord(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("unknown block: {0}")] UnknownBlock(String),
    #[error("unknown parent: {0}")] UnknownParent(String),
    #[error("non-contiguous push: expected height {expected}, got {got}")] NonContiguousPush { expected: u64, got: u64 },
    #[error("pushed block does not extend the tip: {0}")] DoesNotExtendTip(String),
    #[error("empty chain: no blocks connected")] EmptyChain,
}

/// Inconsistencies between stores that should never arise in a healthy node.
///
/// Any of these halts processing; there is no safe way to continue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorruptionError {
    #[error("block data missing for indexed block: {0}")] MissingBlockData(String),
    #[error("undo data missing for connected block: {0}")] MissingUndoData(String),
    #[error("UTXO set references unknown block: {0}")] UnknownUtxoPointer(String),
    #[error("no path from UTXO pointer {0} to the best chain")] NoForkToMainChain(String),
    #[error("UTXO set diverged from block index at {0}")] UtxoSetDiverged(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BeckError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Storage(#[from] StorageError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] Corruption(#[from] CorruptionError),
}

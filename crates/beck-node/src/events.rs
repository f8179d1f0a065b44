//! Chain events emitted by the processors.
//!
//! Mutating operations push events instead of invoking callbacks; the node
//! drains the queue after each operation and dispatches (currently: logs).
//! This keeps the processors free of callback-ordering concerns.

use beck_core::types::Hash256;

/// Something observable that happened to chain state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    /// A block was stored and indexed (not necessarily connected).
    BlockStored { hash: Hash256, height: u64 },
    /// A block was parked until its parent shows up.
    BlockOrphaned { hash: Hash256 },
    /// A block failed validation and was rejected.
    BlockRejected { hash: Hash256 },
    /// A block became part of the main chain.
    BlockConnected { hash: Hash256, height: u64 },
    /// A block was removed from the main chain during a reorganization.
    BlockDisconnected { hash: Hash256, height: u64 },
    /// A transaction entered a validated pool tier.
    TransactionAccepted { txid: Hash256 },
    /// A transaction was parked as an orphan.
    TransactionOrphaned { txid: Hash256 },
    /// A transaction failed validation and was rejected.
    TransactionRejected { txid: Hash256 },
}

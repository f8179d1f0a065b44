//! # beck-core
//! Foundation types and consensus-state components for the Beck ledger.

pub mod block_store;
pub mod chain;
pub mod constants;
pub mod error;
pub mod merkle;
pub mod pool;
pub mod traits;
pub mod types;
pub mod utxo_processor;
pub mod utxo_store;

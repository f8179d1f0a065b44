//! # beck-consensus
//! Concrete consensus rules for Beck: block and transaction verdicts,
//! subsidy schedule, and best-chain selection.

pub mod policy;

pub use policy::{PolicyEngine, block_subsidy, hash_meets_target};

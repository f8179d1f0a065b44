//! # beck-node
//! Block and transaction processors plus the node composition that
//! serializes all chain-state mutation behind one lock.

pub mod block_processor;
pub mod config;
pub mod events;
pub mod node;
pub mod rejected;
pub mod tx_processor;

pub use block_processor::BlockProcessor;
pub use config::NodeConfig;
pub use events::ChainEvent;
pub use node::Node;
pub use tx_processor::{ProcessedTransaction, TransactionProcessor};

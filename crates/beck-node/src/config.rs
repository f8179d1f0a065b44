//! Node configuration.
//!
//! Provides [`NodeConfig`] with production defaults for the network id and
//! every bounded collection the processors maintain. Configuration is set
//! programmatically at construction time.

use beck_core::constants::{
    DEFAULT_MAX_ORPHAN_BLOCKS, DEFAULT_MAX_ORPHAN_TRANSACTIONS, DEFAULT_MAX_POOL_TRANSACTIONS,
    DEFAULT_MAX_REJECTED_BLOCKS, DEFAULT_MAX_REJECTED_TRANSACTIONS, NETWORK_MAIN,
};

/// Configuration for a node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Network id every accepted block must commit to.
    pub network: u64,
    /// Cap on validated (independent + dependent) pool transactions.
    pub max_pool_transactions: usize,
    /// Cap on orphan transactions held for later promotion.
    pub max_orphan_transactions: usize,
    /// Cap on orphan blocks held across all missing parents.
    pub max_orphan_blocks: usize,
    /// Cap on remembered rejected block hashes.
    pub max_rejected_blocks: usize,
    /// Cap on remembered rejected transaction ids.
    pub max_rejected_transactions: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NETWORK_MAIN,
            max_pool_transactions: DEFAULT_MAX_POOL_TRANSACTIONS,
            max_orphan_transactions: DEFAULT_MAX_ORPHAN_TRANSACTIONS,
            max_orphan_blocks: DEFAULT_MAX_ORPHAN_BLOCKS,
            max_rejected_blocks: DEFAULT_MAX_REJECTED_BLOCKS,
            max_rejected_transactions: DEFAULT_MAX_REJECTED_TRANSACTIONS,
        }
    }
}

impl NodeConfig {
    /// Production defaults with the network id replaced.
    pub fn for_network(network: u64) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_main_network() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.network, NETWORK_MAIN);
    }

    #[test]
    fn default_bounds_are_nonzero() {
        let cfg = NodeConfig::default();
        assert!(cfg.max_pool_transactions > 0);
        assert!(cfg.max_orphan_transactions > 0);
        assert!(cfg.max_orphan_blocks > 0);
        assert!(cfg.max_rejected_blocks > 0);
        assert!(cfg.max_rejected_transactions > 0);
    }

    #[test]
    fn for_network_overrides_only_network() {
        let cfg = NodeConfig::for_network(42);
        assert_eq!(cfg.network, 42);
        assert_eq!(cfg.max_pool_transactions, DEFAULT_MAX_POOL_TRANSACTIONS);
    }
}

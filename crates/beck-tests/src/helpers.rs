//! Shared helpers for the integration scenarios.

use std::sync::Arc;

use parking_lot::RwLock;

use beck_consensus::{block_subsidy, PolicyEngine};
use beck_core::block_store::MemoryBlockStore;
use beck_core::constants::NETWORK_TEST;
use beck_core::merkle;
use beck_core::traits::{SharedBlockStore, SharedUtxoStore, UtxoStore};
use beck_core::types::*;
use beck_core::utxo_store::MemoryUtxoStore;
use beck_node::{BlockProcessor, NodeConfig};

/// Simple address hash from a seed byte.
pub fn pkh(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

/// A block processor over in-memory stores, with the store handles kept
/// for direct inspection.
pub struct TestChain {
    pub processor: BlockProcessor,
    pub blocks: SharedBlockStore,
    pub confirmed: SharedUtxoStore,
    pub pool_view: SharedUtxoStore,
}

pub fn test_chain(config: NodeConfig) -> TestChain {
    let blocks: SharedBlockStore = Arc::new(RwLock::new(MemoryBlockStore::new()));
    let confirmed: SharedUtxoStore = Arc::new(RwLock::new(MemoryUtxoStore::new()));
    let pool_view: SharedUtxoStore = Arc::new(RwLock::new(MemoryUtxoStore::new()));
    let policy = Arc::new(PolicyEngine::new(
        blocks.clone(),
        confirmed.clone(),
        pool_view.clone(),
        config.network,
    ));
    let processor = BlockProcessor::new(
        blocks.clone(),
        confirmed.clone(),
        pool_view.clone(),
        policy,
        &config,
    );
    TestChain {
        processor,
        blocks,
        confirmed,
        pool_view,
    }
}

pub fn default_chain() -> TestChain {
    test_chain(NodeConfig::for_network(NETWORK_TEST))
}

/// A coinbase claiming the full subsidy for `height`, paid to `miner`.
///
/// Use a distinct miner per block: the coinbase has no inputs, so the
/// payout address is what makes its txid unique.
pub fn make_coinbase(height: u64, miner: Hash256) -> Transaction {
    Transaction {
        inputs: vec![],
        outputs: vec![TxOutput {
            value: block_subsidy(height),
            address: miner,
        }],
        signatures: vec![],
    }
}

/// A spending transaction with placeholder signatures.
pub fn make_tx(inputs: Vec<OutPoint>, outputs: Vec<(u64, Hash256)>) -> Transaction {
    Transaction {
        signatures: inputs.iter().map(|_| vec![0u8; 64]).collect(),
        inputs: inputs
            .into_iter()
            .map(|previous_output| TxInput { previous_output })
            .collect(),
        outputs: outputs
            .into_iter()
            .map(|(value, address)| TxOutput { value, address })
            .collect(),
    }
}

/// A block at `height` on `parent`, with a coinbase paid to `miner`
/// followed by `extra`, an always-passing target, and a correct merkle
/// root.
pub fn build_block(parent: Hash256, height: u64, miner: Hash256, extra: Vec<Transaction>) -> Block {
    let mut transactions = vec![make_coinbase(height, miner)];
    transactions.extend(extra);
    let txids: Vec<Hash256> = transactions
        .iter()
        .map(|tx| tx.txid().unwrap())
        .collect();
    Block {
        header: BlockHeader {
            network: NETWORK_TEST,
            parent_hash: parent,
            merkle_root: merkle::merkle_root(&txids),
            target: u64::MAX,
            height,
            nonce: height,
        },
        transactions,
    }
}

/// A chain of empty blocks starting at `parent`/`start_height`, each mined
/// to a distinct address.
pub fn build_chain(parent: Hash256, start_height: u64, length: usize, miner_base: u8) -> Vec<Block> {
    let mut out = Vec::with_capacity(length);
    let mut parent = parent;
    for i in 0..length {
        let height = start_height + i as u64;
        let block = build_block(parent, height, pkh(miner_base.wrapping_add(i as u8)), vec![]);
        parent = block.hash();
        out.push(block);
    }
    out
}

/// Plant an already-confirmed, mature, non-coinbase output.
pub fn seed_output(confirmed: &SharedUtxoStore, outpoint: OutPoint, value: u64) {
    confirmed
        .write()
        .mark_unspent(
            outpoint,
            UnspentOutputInfo {
                value,
                address: pkh(0xAA),
                block_height: 0,
                is_coinbase: false,
            },
        )
        .unwrap();
}

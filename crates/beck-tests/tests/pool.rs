//! Transaction pool lifecycle scenarios.
//!
//! Orphan promotion, tier movement on block connection, and bounded
//! eviction, driven through a full block processor.

use beck_core::constants::{COIN, NETWORK_TEST};
use beck_core::pool::PoolTier;
use beck_core::traits::{UtxoStore, Verdict};
use beck_core::types::{Hash256, OutPoint};
use beck_node::NodeConfig;
use beck_tests::helpers::*;

#[test]
fn orphan_chain_promotes_in_one_submission() {
    let mut tc = default_chain();
    let funding = OutPoint::new(Hash256([0xF0; 32]), 0);
    seed_output(&tc.confirmed, funding, 10 * COIN);

    // a spends confirmed funding; b spends a; c spends b.
    let a = make_tx(vec![funding], vec![(9 * COIN, pkh(1))]);
    let a_id = a.txid().unwrap();
    let b = make_tx(vec![OutPoint::new(a_id, 0)], vec![(8 * COIN, pkh(2))]);
    let b_id = b.txid().unwrap();
    let c = make_tx(vec![OutPoint::new(b_id, 0)], vec![(7 * COIN, pkh(3))]);
    let c_id = c.txid().unwrap();

    let txp = tc.processor.transactions_mut();
    assert_eq!(
        txp.process_new_transaction(c.clone()).unwrap().status,
        Verdict::Orphan
    );
    assert_eq!(
        txp.process_new_transaction(b.clone()).unwrap().status,
        Verdict::Orphan
    );
    assert_eq!(txp.pool().orphan_len(), 2);

    // a arrives: the whole chain promotes in this one call.
    let result = txp.process_new_transaction(a).unwrap();
    assert_eq!(result.status, Verdict::Valid);
    assert_eq!(result.added_orphans.len(), 2);
    assert!(result.added_orphans.contains(&b));
    assert!(result.added_orphans.contains(&c));

    let pool = tc.processor.transactions().pool();
    assert_eq!(pool.tier_of(&a_id), Some(PoolTier::Independent));
    assert_eq!(pool.tier_of(&b_id), Some(PoolTier::Dependent));
    assert_eq!(pool.tier_of(&c_id), Some(PoolTier::Dependent));
    assert_eq!(pool.orphan_len(), 0);

    // Every promoted transaction's outputs are visible to later arrivals.
    for txid in [a_id, b_id, c_id] {
        assert!(tc.pool_view.read().is_unspent(&OutPoint::new(txid, 0)).unwrap());
    }
}

#[test]
fn connecting_a_block_confirms_and_reclassifies() {
    let mut tc = default_chain();
    let genesis = build_block(Hash256::ZERO, 0, pkh(1), vec![]);
    tc.processor.process_new_block(genesis.clone()).unwrap();

    let funding = OutPoint::new(Hash256([0xF0; 32]), 0);
    seed_output(&tc.confirmed, funding, 10 * COIN);
    let a = make_tx(vec![funding], vec![(9 * COIN, pkh(2))]);
    let a_id = a.txid().unwrap();
    let b = make_tx(vec![OutPoint::new(a_id, 0)], vec![(8 * COIN, pkh(3))]);
    let b_id = b.txid().unwrap();

    let txp = tc.processor.transactions_mut();
    txp.process_new_transaction(a.clone()).unwrap();
    txp.process_new_transaction(b).unwrap();
    assert_eq!(txp.pool().tier_of(&a_id), Some(PoolTier::Independent));
    assert_eq!(txp.pool().tier_of(&b_id), Some(PoolTier::Dependent));

    // a gets mined. It leaves the pool and b becomes independent: its
    // input is now satisfied by a confirmed output.
    let block = build_block(genesis.hash(), 1, pkh(0x10), vec![a]);
    tc.processor.process_new_block(block).unwrap();

    let pool = tc.processor.transactions().pool();
    assert!(pool.tier_of(&a_id).is_none());
    assert_eq!(pool.tier_of(&b_id), Some(PoolTier::Independent));

    // a's outputs moved from the pool view to the confirmed set.
    assert!(tc.confirmed.read().is_unspent(&OutPoint::new(a_id, 0)).unwrap());
}

#[test]
fn eviction_drops_dependent_subtrees_before_independents() {
    let mut config = NodeConfig::for_network(NETWORK_TEST);
    config.max_pool_transactions = 2;
    let mut tc = test_chain(config);

    let funding = OutPoint::new(Hash256([0xF0; 32]), 0);
    seed_output(&tc.confirmed, funding, 10 * COIN);
    let i = make_tx(vec![funding], vec![(9 * COIN, pkh(1))]);
    let i_id = i.txid().unwrap();
    let d1 = make_tx(vec![OutPoint::new(i_id, 0)], vec![(8 * COIN, pkh(2))]);
    let d1_id = d1.txid().unwrap();
    let d2 = make_tx(vec![OutPoint::new(d1_id, 0)], vec![(7 * COIN, pkh(3))]);
    let d2_id = d2.txid().unwrap();

    let txp = tc.processor.transactions_mut();
    txp.process_new_transaction(i).unwrap();
    txp.process_new_transaction(d1).unwrap();
    // The third submission exceeds the bound: the dependent subtree goes,
    // the independent stays.
    txp.process_new_transaction(d2).unwrap();

    let pool = tc.processor.transactions().pool();
    assert_eq!(pool.validated_len(), 1);
    assert_eq!(pool.tier_of(&i_id), Some(PoolTier::Independent));
    assert!(pool.tier_of(&d1_id).is_none());
    assert!(pool.tier_of(&d2_id).is_none());

    // Evicted outputs disappeared from the pool view.
    assert!(tc.pool_view.read().is_unspent(&OutPoint::new(i_id, 0)).unwrap());
    assert!(!tc.pool_view.read().is_unspent(&OutPoint::new(d1_id, 0)).unwrap());
    assert!(!tc.pool_view.read().is_unspent(&OutPoint::new(d2_id, 0)).unwrap());
}

#[test]
fn orphan_tier_is_bounded() {
    let mut config = NodeConfig::for_network(NETWORK_TEST);
    config.max_orphan_transactions = 2;
    let mut tc = test_chain(config);

    let txp = tc.processor.transactions_mut();
    for seed in 0..5u8 {
        let ghost = OutPoint::new(Hash256([seed + 1; 32]), 0);
        let tx = make_tx(vec![ghost], vec![(COIN, pkh(seed))]);
        assert_eq!(
            txp.process_new_transaction(tx).unwrap().status,
            Verdict::Orphan
        );
    }
    assert_eq!(txp.pool().orphan_len(), 2);
}

#[test]
fn double_submission_does_not_duplicate() {
    let mut tc = default_chain();
    let funding = OutPoint::new(Hash256([0xF0; 32]), 0);
    seed_output(&tc.confirmed, funding, 10 * COIN);
    let tx = make_tx(vec![funding], vec![(9 * COIN, pkh(1))]);

    let txp = tc.processor.transactions_mut();
    assert_eq!(
        txp.process_new_transaction(tx.clone()).unwrap().status,
        Verdict::Valid
    );
    assert_eq!(
        txp.process_new_transaction(tx).unwrap().status,
        Verdict::Valid
    );
    assert_eq!(txp.pool().validated_len(), 1);
}

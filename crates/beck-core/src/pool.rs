//! Three-tier transaction pool: independent, dependent, orphan.
//!
//! Independent transactions spend only confirmed outputs; dependent ones
//! spend at least one output of another pool transaction; orphans reference
//! something the node has never seen. Tiers are pairwise disjoint by txid.
//!
//! The dependent and orphan tiers carry a bidirectional multimap: the
//! primary map txid -> transaction, and a secondary map referenced-txid ->
//! set of tier members spending it. "Everything transitively depending on
//! H" is a breadth-first walk over the secondary map, proportional to the
//! subgraph, never the whole pool.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::seq::IteratorRandom;
use tracing::debug;

use crate::types::{Hash256, Transaction};

/// Which tier a pool transaction currently sits in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolTier {
    Independent,
    Dependent,
    Orphan,
}

/// One tier with a reverse dependency index.
#[derive(Debug, Default)]
struct Tier {
    txs: HashMap<Hash256, Transaction>,
    /// Referenced txid -> members of this tier spending one of its outputs.
    dependents: HashMap<Hash256, HashSet<Hash256>>,
}

impl Tier {
    fn len(&self) -> usize {
        self.txs.len()
    }

    fn contains(&self, txid: &Hash256) -> bool {
        self.txs.contains_key(txid)
    }

    fn get(&self, txid: &Hash256) -> Option<&Transaction> {
        self.txs.get(txid)
    }

    fn insert(&mut self, txid: Hash256, tx: Transaction) {
        if self.txs.contains_key(&txid) {
            return;
        }
        for input in &tx.inputs {
            self.dependents
                .entry(input.previous_output.txid)
                .or_default()
                .insert(txid);
        }
        self.txs.insert(txid, tx);
    }

    fn remove(&mut self, txid: &Hash256) -> Option<Transaction> {
        let tx = self.txs.remove(txid)?;
        for input in &tx.inputs {
            if let Some(set) = self.dependents.get_mut(&input.previous_output.txid) {
                set.remove(txid);
                if set.is_empty() {
                    self.dependents.remove(&input.previous_output.txid);
                }
            }
        }
        Some(tx)
    }

    /// Members transitively spending `root`, in breadth-first order.
    fn transitive_dependents(&self, root: &Hash256) -> Vec<Hash256> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*root]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            if let Some(children) = self.dependents.get(&current) {
                for child in children {
                    if seen.insert(*child) {
                        out.push(*child);
                        queue.push_back(*child);
                    }
                }
            }
        }
        out
    }

    /// Members that do not themselves spend another member of this tier.
    ///
    /// Eviction starts here so a cascade always covers the whole dependency
    /// subtree of the victim.
    fn roots(&self) -> Vec<Hash256> {
        self.txs
            .iter()
            .filter(|(_, tx)| {
                !tx.inputs
                    .iter()
                    .any(|input| self.txs.contains_key(&input.previous_output.txid))
            })
            .map(|(txid, _)| *txid)
            .collect()
    }
}

/// The transaction pool.
///
/// Not thread-safe; the transaction processor owns it behind the node's
/// single-writer lock.
#[derive(Debug)]
pub struct TransactionPool {
    independent: HashMap<Hash256, Transaction>,
    dependent: Tier,
    orphan: Tier,
    max_validated: usize,
    max_orphans: usize,
}

impl TransactionPool {
    pub fn new(max_validated: usize, max_orphans: usize) -> Self {
        Self {
            independent: HashMap::new(),
            dependent: Tier::default(),
            orphan: Tier::default(),
            max_validated,
            max_orphans,
        }
    }

    /// Number of validated (independent + dependent) transactions.
    pub fn validated_len(&self) -> usize {
        self.independent.len() + self.dependent.len()
    }

    pub fn orphan_len(&self) -> usize {
        self.orphan.len()
    }

    /// The tier currently holding `txid`, if any.
    pub fn tier_of(&self, txid: &Hash256) -> Option<PoolTier> {
        if self.independent.contains_key(txid) {
            Some(PoolTier::Independent)
        } else if self.dependent.contains(txid) {
            Some(PoolTier::Dependent)
        } else if self.orphan.contains(txid) {
            Some(PoolTier::Orphan)
        } else {
            None
        }
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.tier_of(txid).is_some()
    }

    /// Whether `txid` sits in a validated tier.
    pub fn has_validated(&self, txid: &Hash256) -> bool {
        matches!(
            self.tier_of(txid),
            Some(PoolTier::Independent | PoolTier::Dependent)
        )
    }

    /// Look up a validated (independent or dependent) transaction.
    pub fn validated(&self, txid: &Hash256) -> Option<&Transaction> {
        self.independent.get(txid).or_else(|| self.dependent.get(txid))
    }

    /// Look up an orphan.
    pub fn find_orphan(&self, txid: &Hash256) -> Option<&Transaction> {
        self.orphan.get(txid)
    }

    /// Insert into the independent tier, leaving the orphan tier if present.
    pub fn add_independent(&mut self, txid: Hash256, tx: Transaction) {
        self.remove(&txid);
        self.independent.insert(txid, tx);
    }

    /// Insert into the dependent tier, leaving the orphan tier if present.
    pub fn add_dependent(&mut self, txid: Hash256, tx: Transaction) {
        self.remove(&txid);
        self.dependent.insert(txid, tx);
    }

    /// Insert into the orphan tier, evicting random orphans past the cap.
    pub fn add_orphan(&mut self, txid: Hash256, tx: Transaction) {
        if self.contains(&txid) {
            return;
        }
        self.orphan.insert(txid, tx);
        let mut rng = rand::thread_rng();
        while self.orphan.len() > self.max_orphans {
            if let Some(victim) = self.orphan.txs.keys().choose(&mut rng).copied() {
                self.orphan.remove(&victim);
                debug!(txid = %victim, "evicted orphan transaction");
            } else {
                break;
            }
        }
    }

    /// Remove `txid` from whichever tier holds it.
    pub fn remove(&mut self, txid: &Hash256) -> Option<Transaction> {
        self.independent
            .remove(txid)
            .or_else(|| self.dependent.remove(txid))
            .or_else(|| self.orphan.remove(txid))
    }

    /// Remove and return orphans transitively depending on `parent` for
    /// which `accept` returns true.
    ///
    /// Orphans are offered in breadth-first order, so a dependency is always
    /// offered before its dependents. `accept` is expected to re-validate
    /// and, on success, make the transaction's outputs visible wherever
    /// validation of the next orphan needs them.
    pub fn remove_valid_orphans_from_parent(
        &mut self,
        parent: &Hash256,
        mut accept: impl FnMut(&Hash256, &Transaction) -> bool,
    ) -> Vec<(Hash256, Transaction)> {
        let candidates = self.orphan.transitive_dependents(parent);
        let mut removed = Vec::new();
        for txid in candidates {
            let Some(tx) = self.orphan.get(&txid) else {
                continue;
            };
            if accept(&txid, tx) {
                if let Some(tx) = self.orphan.remove(&txid) {
                    removed.push((txid, tx));
                }
            }
        }
        removed
    }

    /// Promote dependent-tier transactions transitively depending on
    /// `parent` into the independent tier where `promote` approves.
    pub fn promote_dependent_to_independent_from_parent(
        &mut self,
        parent: &Hash256,
        mut promote: impl FnMut(&Hash256, &Transaction) -> bool,
    ) {
        let candidates = self.dependent.transitive_dependents(parent);
        for txid in candidates {
            let Some(tx) = self.dependent.get(&txid) else {
                continue;
            };
            if promote(&txid, tx) {
                if let Some(tx) = self.dependent.remove(&txid) {
                    self.independent.insert(txid, tx);
                }
            }
        }
    }

    /// Move every independent transaction spending an output of
    /// `dependency` into the dependent tier.
    pub fn demote_independent_to_dependent(&mut self, dependency: &Hash256) {
        let moving: Vec<Hash256> = self
            .independent
            .iter()
            .filter(|(_, tx)| {
                tx.inputs
                    .iter()
                    .any(|input| input.previous_output.txid == *dependency)
            })
            .map(|(txid, _)| *txid)
            .collect();
        for txid in moving {
            if let Some(tx) = self.independent.remove(&txid) {
                self.dependent.insert(txid, tx);
            }
        }
    }

    /// Move everything that (transitively) depends on `dependency` into the
    /// orphan tier: dependent-tier descendants, independent transactions
    /// spending it directly, and their descendants in turn.
    ///
    /// Returns the demoted transactions so the caller can retract their
    /// outputs from the pool UTXO view.
    pub fn demote_to_orphan(&mut self, dependency: &Hash256) -> Vec<(Hash256, Transaction)> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([*dependency]);
        while let Some(current) = queue.pop_front() {
            if let Some(children) = self.dependent.dependents.get(&current) {
                for child in children {
                    if seen.insert(*child) {
                        order.push(*child);
                        queue.push_back(*child);
                    }
                }
            }
            // Independent spenders have no reverse index; scan.
            for (txid, tx) in &self.independent {
                if seen.contains(txid) {
                    continue;
                }
                if tx
                    .inputs
                    .iter()
                    .any(|input| input.previous_output.txid == current)
                {
                    seen.insert(*txid);
                    order.push(*txid);
                    queue.push_back(*txid);
                }
            }
        }

        let mut demoted = Vec::new();
        for txid in order {
            let tx = self
                .independent
                .remove(&txid)
                .or_else(|| self.dependent.remove(&txid));
            if let Some(tx) = tx {
                demoted.push((txid, tx.clone()));
                self.add_orphan(txid, tx);
            }
        }
        demoted
    }

    /// Enforce the validated-tier bound.
    ///
    /// Dependent transactions go first: a victim is drawn at random from
    /// the dependent tier's roots and evicted together with everything
    /// transitively depending on it. Only once the dependent tier is empty
    /// are random independent transactions dropped one at a time.
    ///
    /// Returns the evicted transactions so the caller can retract their
    /// outputs from the pool UTXO view.
    pub fn limit_pool_size(&mut self) -> Vec<(Hash256, Transaction)> {
        let mut rng = rand::thread_rng();
        let mut evicted = Vec::new();
        while self.validated_len() > self.max_validated {
            if self.dependent.len() > 0 {
                let Some(victim) = self.dependent.roots().into_iter().choose(&mut rng) else {
                    break;
                };
                let mut cascade = vec![victim];
                cascade.extend(self.dependent.transitive_dependents(&victim));
                for txid in cascade {
                    if let Some(tx) = self.dependent.remove(&txid) {
                        debug!(txid = %txid, "evicted dependent transaction");
                        evicted.push((txid, tx));
                    }
                }
            } else if let Some(victim) = self.independent.keys().choose(&mut rng).copied() {
                if let Some(tx) = self.independent.remove(&victim) {
                    debug!(txid = %victim, "evicted independent transaction");
                    evicted.push((victim, tx));
                }
            } else {
                break;
            }
        }
        evicted
    }
}

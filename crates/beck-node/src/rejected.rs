//! Bounded memory of recently rejected hashes.
//!
//! Resubmitting a hash that recently failed validation is answered from
//! here without re-running the rulesets. FIFO eviction: remembering is
//! best-effort, forgetting an old rejection only costs a re-validation.

use std::collections::{HashSet, VecDeque};

use beck_core::types::Hash256;

#[derive(Debug)]
pub struct RecentRejects {
    set: HashSet<Hash256>,
    order: VecDeque<Hash256>,
    max: usize,
}

impl RecentRejects {
    pub fn new(max: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            max,
        }
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.set.contains(hash)
    }

    pub fn insert(&mut self, hash: Hash256) {
        if self.max == 0 || !self.set.insert(hash) {
            return;
        }
        self.order.push_back(hash);
        while self.order.len() > self.max {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
    }

    /// Drop a remembered rejection (e.g. the hash validated elsewhere).
    pub fn forget(&mut self, hash: &Hash256) {
        if self.set.remove(hash) {
            self.order.retain(|h| h != hash);
        }
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash256 {
        Hash256([byte; 32])
    }

    #[test]
    fn remembers_and_forgets() {
        let mut rejects = RecentRejects::new(4);
        rejects.insert(h(1));
        assert!(rejects.contains(&h(1)));
        rejects.forget(&h(1));
        assert!(!rejects.contains(&h(1)));
        assert!(rejects.is_empty());
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let mut rejects = RecentRejects::new(4);
        rejects.insert(h(1));
        rejects.insert(h(1));
        assert_eq!(rejects.len(), 1);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut rejects = RecentRejects::new(2);
        rejects.insert(h(1));
        rejects.insert(h(2));
        rejects.insert(h(3));
        assert!(!rejects.contains(&h(1)));
        assert!(rejects.contains(&h(2)));
        assert!(rejects.contains(&h(3)));
        assert_eq!(rejects.len(), 2);
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let mut rejects = RecentRejects::new(0);
        rejects.insert(h(1));
        assert!(!rejects.contains(&h(1)));
    }
}

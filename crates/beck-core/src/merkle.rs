//! BLAKE3 Merkle commitment over a block's transaction ids.
//!
//! Domain-separated hashing prevents second-preimage attacks:
//! - Leaf hash: `BLAKE3(0x00 || txid)`
//! - Internal node: `BLAKE3(0x01 || left || right)`
//!
//! Odd-length layers duplicate their last element. An empty leaf set
//! produces [`Hash256::ZERO`].

use crate::types::Hash256;

/// Domain separation prefix for leaf hashes.
const LEAF_PREFIX: u8 = 0x00;

/// Domain separation prefix for internal node hashes.
const NODE_PREFIX: u8 = 0x01;

/// Compute a domain-separated leaf hash: `BLAKE3(0x00 || data)`.
pub fn leaf_hash(data: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Compute a domain-separated internal node hash: `BLAKE3(0x01 || left || right)`.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Compute the Merkle root from a slice of leaf values (transaction ids).
///
/// Returns [`Hash256::ZERO`] for an empty slice.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut current: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();

    while current.len() > 1 {
        current = next_layer(&current);
    }

    current[0]
}

/// Pairs adjacent hashes with [`node_hash`], duplicating the last element
/// when the layer has an odd number of entries.
fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() {
            &layer[i + 1]
        } else {
            left
        };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash256 {
        Hash256([byte; 32])
    }

    #[test]
    fn leaf_hash_differs_from_node_hash() {
        // The prefix byte must separate the two domains even on identical input.
        let a = h(0xAA);
        assert_ne!(leaf_hash(&a), node_hash(&a, &a));
    }

    #[test]
    fn node_hash_order_matters() {
        assert_ne!(node_hash(&h(1), &h(2)), node_hash(&h(2), &h(1)));
    }

    #[test]
    fn merkle_root_empty() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn merkle_root_single() {
        let a = h(0xAA);
        assert_eq!(merkle_root(&[a]), leaf_hash(&a));
    }

    #[test]
    fn merkle_root_two() {
        let expected = node_hash(&leaf_hash(&h(1)), &leaf_hash(&h(2)));
        assert_eq!(merkle_root(&[h(1), h(2)]), expected);
    }

    #[test]
    fn merkle_root_three_duplicates_last() {
        // Layer 0: [lh(1), lh(2), lh(3)]
        // Layer 1: [node(lh(1), lh(2)), node(lh(3), lh(3))]
        let la = leaf_hash(&h(1));
        let lb = leaf_hash(&h(2));
        let lc = leaf_hash(&h(3));
        let expected = node_hash(&node_hash(&la, &lb), &node_hash(&lc, &lc));
        assert_eq!(merkle_root(&[h(1), h(2), h(3)]), expected);
    }

    #[test]
    fn merkle_root_changes_with_any_leaf() {
        let a = vec![h(1), h(2), h(3)];
        let b = vec![h(1), h(2), h(4)];
        assert_ne!(merkle_root(&a), merkle_root(&b));
    }

    #[test]
    fn merkle_root_order_matters() {
        assert_ne!(merkle_root(&[h(1), h(2)]), merkle_root(&[h(2), h(1)]));
    }

    #[test]
    fn single_leaf_differs_from_two_identical() {
        // [A] hashes to leaf_hash(A); [A, A] adds a node layer on top.
        let a = h(0xAA);
        assert_ne!(merkle_root(&[a]), merkle_root(&[a, a]));
    }
}

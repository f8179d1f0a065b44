//! Core protocol types: transactions, blocks, UTXOs, undo data.
//!
//! All monetary values are in becks (1 BECK = 10^8 becks).
//! All numeric fields use u64 per protocol convention.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::constants::COINBASE_MATURITY;
use crate::error::TransactionError;

/// A 32-byte hash value.
///
/// Used for transaction IDs (BLAKE3), block header hashes (double SHA-256),
/// merkle roots (BLAKE3), and output addresses. Ordering compares the bytes
/// as an unsigned big-endian integer.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Used as the genesis parent pointer and
    /// as the "nothing processed yet" UTXO marker.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub index: u64,
}

impl OutPoint {
    pub fn new(txid: Hash256, index: u64) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input, spending a previous output.
///
/// Inputs carry no witness material; the signature authorizing input `i`
/// lives in [`Transaction::signatures`] at the same index. Two inputs are
/// equal exactly when they reference the same outpoint.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent.
    pub previous_output: OutPoint,
}

/// A transaction output, creating a new UTXO.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in becks (1 BECK = 10^8 becks).
    pub value: u64,
    /// Hash of the recipient's spending key.
    pub address: Hash256,
}

/// The portion of a transaction that signatures commit to.
///
/// [`signing_bytes`](Self::signing_bytes) is the exact byte string each
/// input signs, and the transaction id is the BLAKE3 hash of those bytes, so
/// attaching or replacing signatures never changes the txid.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UnsignedTransaction {
    /// Inputs consuming previous outputs. Empty for coinbase.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
}

impl UnsignedTransaction {
    /// The canonical encoding that signatures (and the txid) commit to.
    ///
    /// Uses bincode with standard config for deterministic serialization.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))
    }

    /// Compute the transaction ID (BLAKE3 hash of the signing bytes).
    pub fn txid(&self) -> Result<Hash256, TransactionError> {
        Ok(Hash256(blake3::hash(&self.signing_bytes()?).into()))
    }
}

/// A transaction transferring value between addresses.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Inputs consuming previous outputs. Empty for coinbase.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// One signature per input, positionally aligned with `inputs`.
    pub signatures: Vec<Vec<u8>>,
}

impl Transaction {
    /// The unsigned view of this transaction.
    pub fn unsigned(&self) -> UnsignedTransaction {
        UnsignedTransaction {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }

    /// Compute the transaction ID.
    ///
    /// Hashes the unsigned encoding only, so signatures do not affect it.
    pub fn txid(&self) -> Result<Hash256, TransactionError> {
        self.unsigned().txid()
    }

    /// Check if this is a coinbase transaction: no inputs, exactly one output.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty() && self.outputs.len() == 1
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }
}

/// Block header containing the proof-of-work puzzle.
///
/// The header records its own height so validation never has to walk the
/// chain to learn where a block claims to sit.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Network id this block belongs to.
    pub network: u64,
    /// Hash of the parent block header. Zero for the genesis block.
    pub parent_hash: Hash256,
    /// BLAKE3 merkle root of the block's transaction ids.
    pub merkle_root: Hash256,
    /// Proof-of-work difficulty target.
    pub target: u64,
    /// Height this block claims in the chain (genesis = 0).
    pub height: u64,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing (4 u64 fields + 2 * 32-byte hashes).
    const HASH_SIZE: usize = 4 * 8 + 2 * 32;

    /// Compute the block header hash (double SHA-256).
    ///
    /// Uses an explicit fixed byte layout: network || parent_hash ||
    /// merkle_root || target || height || nonce, all little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.network.to_le_bytes());
        data.extend_from_slice(self.parent_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.target.to_le_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }

    /// Expected work to find a header meeting this target.
    ///
    /// A smaller target admits fewer hashes and therefore represents more
    /// work. The `+ 1` keeps the value nonzero even at the easiest target.
    pub fn work(&self) -> u128 {
        (u64::MAX as u128) / (self.target as u128 + 1) + 1
    }
}

/// A complete block: header plus transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Block header with proof-of-work.
    pub header: BlockHeader,
    /// Ordered list of transactions. First transaction must be coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block hash (hash of the header).
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Transaction ids of every transaction, in block order.
    pub fn txids(&self) -> Result<Vec<Hash256>, TransactionError> {
        self.transactions.iter().map(Transaction::txid).collect()
    }
}

/// An entry in the unspent transaction output set.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UnspentOutputInfo {
    /// Value in becks.
    pub value: u64,
    /// Hash of the recipient's spending key.
    pub address: Hash256,
    /// Height of the block containing this output, or
    /// [`UNCONFIRMED_OUTPUT_HEIGHT`](crate::constants::UNCONFIRMED_OUTPUT_HEIGHT)
    /// for pool outputs.
    pub block_height: u64,
    /// Whether this output is from a coinbase transaction.
    pub is_coinbase: bool,
}

impl UnspentOutputInfo {
    /// Build the UTXO record for `output` confirmed at `block_height`.
    pub fn confirmed(output: &TxOutput, block_height: u64, is_coinbase: bool) -> Self {
        Self {
            value: output.value,
            address: output.address,
            block_height,
            is_coinbase,
        }
    }

    /// Check if this UTXO has matured and can be spent at `current_height`.
    ///
    /// Coinbase outputs need [`COINBASE_MATURITY`] confirmations; everything
    /// else is always mature.
    pub fn is_mature(&self, current_height: u64) -> bool {
        if !self.is_coinbase {
            return true;
        }
        current_height.saturating_sub(self.block_height) >= COINBASE_MATURITY
    }
}

/// Undo record for one connected transaction: the UTXO entries its inputs
/// consumed, positionally aligned with the inputs.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct TransactionUndo {
    pub spent: Vec<UnspentOutputInfo>,
}

/// Undo data for a connected block.
///
/// One [`TransactionUndo`] per non-coinbase transaction: the record for the
/// transaction at block position `i` (i >= 1) sits at `transactions[i - 1]`.
/// The coinbase spends nothing and gets no slot.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockUndo {
    pub transactions: Vec<TransactionUndo>,
}

/// Index metadata kept for every stored block.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockInfo {
    /// Hash of the parent block. Zero for genesis.
    pub parent_hash: Hash256,
    /// Height recorded in the block header.
    pub height: u64,
    /// Cumulative work of the chain ending at this block.
    pub chain_work: u128,
    /// False once the block (or a block it was connected under) failed
    /// validation; such blocks never become chain candidates again.
    pub valid: bool,
}

/// A block hash paired with its index metadata.
///
/// The hash is captured once when the handle is built, so chain operations
/// never re-hash headers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IndexedBlock {
    pub hash: Hash256,
    pub info: BlockInfo,
}

impl IndexedBlock {
    pub fn new(hash: Hash256, info: BlockInfo) -> Self {
        Self { hash, info }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{COIN, NETWORK_MAIN, UNCONFIRMED_OUTPUT_HEIGHT};

    fn sample_address() -> Hash256 {
        Hash256([0xAA; 32])
    }

    fn sample_tx() -> Transaction {
        Transaction {
            inputs: vec![TxInput {
                previous_output: OutPoint::new(Hash256([0x11; 32]), 0),
            }],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                address: sample_address(),
            }],
            signatures: vec![vec![0u8; 64]],
        }
    }

    fn sample_coinbase() -> Transaction {
        Transaction {
            inputs: vec![],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                address: sample_address(),
            }],
            signatures: vec![],
        }
    }

    fn sample_header() -> BlockHeader {
        BlockHeader {
            network: NETWORK_MAIN,
            parent_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            target: u64::MAX,
            height: 0,
            nonce: 0,
        }
    }

    // --- Hash256 ---

    #[test]
    fn hash256_zero_is_zero() {
        let h = Hash256::ZERO;
        assert!(h.is_zero());
        assert_eq!(h, Hash256::default());
    }

    #[test]
    fn hash256_display_hex() {
        let h = Hash256([0xAB; 32]);
        let s = format!("{h}");
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(&s[0..2], "ab");
    }

    #[test]
    fn hash256_orders_by_magnitude() {
        let mut small = [0u8; 32];
        small[31] = 0xFF;
        let mut big = [0u8; 32];
        big[0] = 0x01;
        assert!(Hash256(small) < Hash256(big));
    }

    // --- TxInput / OutPoint ---

    #[test]
    fn inputs_equal_on_outpoint_only() {
        let a = TxInput { previous_output: OutPoint::new(Hash256([1; 32]), 2) };
        let b = TxInput { previous_output: OutPoint::new(Hash256([1; 32]), 2) };
        assert_eq!(a, b);
        let c = TxInput { previous_output: OutPoint::new(Hash256([1; 32]), 3) };
        assert_ne!(a, c);
    }

    #[test]
    fn outpoint_display() {
        let op = OutPoint::new(Hash256([0xFF; 32]), 3);
        assert!(format!("{op}").ends_with(":3"));
    }

    // --- Transaction ---

    #[test]
    fn coinbase_detection() {
        assert!(sample_coinbase().is_coinbase());
        assert!(!sample_tx().is_coinbase());
    }

    #[test]
    fn coinbase_requires_single_output() {
        let mut tx = sample_coinbase();
        tx.outputs.push(TxOutput { value: 1, address: Hash256::ZERO });
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn txid_deterministic() {
        let tx = sample_tx();
        assert_eq!(tx.txid().unwrap(), tx.txid().unwrap());
    }

    #[test]
    fn txid_ignores_signatures() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.signatures = vec![vec![0xFF; 64]];
        assert_eq!(tx1.txid().unwrap(), tx2.txid().unwrap());
    }

    #[test]
    fn txid_changes_with_outputs() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.outputs[0].value += 1;
        assert_ne!(tx1.txid().unwrap(), tx2.txid().unwrap());
    }

    #[test]
    fn signing_bytes_match_unsigned_encoding() {
        let tx = sample_tx();
        let unsigned = tx.unsigned();
        let bytes = unsigned.signing_bytes().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(unsigned.txid().unwrap(), tx.txid().unwrap());
    }

    #[test]
    fn total_output_value_overflow_returns_none() {
        let tx = Transaction {
            inputs: vec![],
            outputs: vec![
                TxOutput { value: u64::MAX, address: Hash256::ZERO },
                TxOutput { value: 1, address: Hash256::ZERO },
            ],
            signatures: vec![],
        };
        assert_eq!(tx.total_output_value(), None);
    }

    // --- BlockHeader ---

    #[test]
    fn block_header_hash_deterministic() {
        let h = sample_header();
        assert_eq!(h.hash(), h.hash());
    }

    #[test]
    fn block_header_hash_changes_with_each_field() {
        let base = sample_header();
        let variants = [
            BlockHeader { network: base.network + 1, ..base.clone() },
            BlockHeader { parent_hash: Hash256([1; 32]), ..base.clone() },
            BlockHeader { merkle_root: Hash256([2; 32]), ..base.clone() },
            BlockHeader { target: base.target - 1, ..base.clone() },
            BlockHeader { height: base.height + 1, ..base.clone() },
            BlockHeader { nonce: base.nonce + 1, ..base.clone() },
        ];
        for v in &variants {
            assert_ne!(base.hash(), v.hash());
        }
    }

    #[test]
    fn block_header_hash_fixed_size_input() {
        let h = sample_header();
        let mut data = Vec::new();
        data.extend_from_slice(&h.network.to_le_bytes());
        data.extend_from_slice(h.parent_hash.as_bytes());
        data.extend_from_slice(h.merkle_root.as_bytes());
        data.extend_from_slice(&h.target.to_le_bytes());
        data.extend_from_slice(&h.height.to_le_bytes());
        data.extend_from_slice(&h.nonce.to_le_bytes());
        assert_eq!(data.len(), BlockHeader::HASH_SIZE);
    }

    #[test]
    fn easier_target_means_less_work() {
        let easy = BlockHeader { target: u64::MAX, ..sample_header() };
        let hard = BlockHeader { target: u64::MAX / 1024, ..sample_header() };
        assert!(hard.work() > easy.work());
        assert!(easy.work() >= 1);
    }

    // --- UnspentOutputInfo ---

    #[test]
    fn coinbase_output_matures_at_threshold() {
        let info = UnspentOutputInfo {
            value: 50 * COIN,
            address: Hash256::ZERO,
            block_height: 100,
            is_coinbase: true,
        };
        assert!(!info.is_mature(150));
        assert!(info.is_mature(200));
        assert!(info.is_mature(300));
    }

    #[test]
    fn non_coinbase_output_always_mature() {
        let info = UnspentOutputInfo {
            value: 100,
            address: Hash256::ZERO,
            block_height: 100,
            is_coinbase: false,
        };
        assert!(info.is_mature(0));
        assert!(info.is_mature(100));
    }

    #[test]
    fn pool_output_marker_never_matures_as_coinbase() {
        let info = UnspentOutputInfo {
            value: 100,
            address: Hash256::ZERO,
            block_height: UNCONFIRMED_OUTPUT_HEIGHT,
            is_coinbase: true,
        };
        assert!(!info.is_mature(1_000_000));
    }

    // --- Bincode round-trips ---

    #[test]
    fn bincode_round_trip_block() {
        let block = Block {
            header: sample_header(),
            transactions: vec![sample_coinbase(), sample_tx()],
        };
        let encoded = bincode::encode_to_vec(&block, bincode::config::standard()).unwrap();
        let (decoded, _): (Block, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn bincode_round_trip_undo() {
        let undo = BlockUndo {
            transactions: vec![TransactionUndo {
                spent: vec![UnspentOutputInfo {
                    value: 7 * COIN,
                    address: Hash256([0xCC; 32]),
                    block_height: 42,
                    is_coinbase: true,
                }],
            }],
        };
        let encoded = bincode::encode_to_vec(&undo, bincode::config::standard()).unwrap();
        let (decoded, _): (BlockUndo, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(undo, decoded);
    }
}

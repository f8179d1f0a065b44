//! Protocol constants.
//!
//! All monetary values are in becks (1 BECK = 10^8 becks).

/// Smallest unit conversion factor: 1 BECK = 10^8 becks.
pub const COIN: u64 = 100_000_000;

/// Coinbase subsidy for the first halving interval, in becks.
pub const INITIAL_REWARD: u64 = 50 * COIN;

/// Number of blocks between subsidy halvings.
pub const HALVING_INTERVAL: u64 = 210_000;

/// Confirmations a coinbase output needs before it can be spent.
pub const COINBASE_MATURITY: u64 = 100;

/// Network id committed to by every block header on the main network.
pub const NETWORK_MAIN: u64 = 0x4245_434B; // "BECK"

/// Network id for local test networks.
pub const NETWORK_TEST: u64 = 0x4245_434C;

/// Height marker recorded for unconfirmed outputs in the pool UTXO view.
///
/// Outputs created by pool transactions have no confirmed height yet; this
/// sentinel keeps them distinct from any real block height.
pub const UNCONFIRMED_OUTPUT_HEIGHT: u64 = u64::MAX;

/// Default cap on validated (independent + dependent) pool transactions.
pub const DEFAULT_MAX_POOL_TRANSACTIONS: usize = 5_000;

/// Default cap on orphan transactions held for later promotion.
pub const DEFAULT_MAX_ORPHAN_TRANSACTIONS: usize = 100;

/// Default cap on orphan blocks held per missing parent, summed over parents.
pub const DEFAULT_MAX_ORPHAN_BLOCKS: usize = 750;

/// Default cap on remembered rejected block hashes.
pub const DEFAULT_MAX_REJECTED_BLOCKS: usize = 1_000;

/// Default cap on remembered rejected transaction ids.
pub const DEFAULT_MAX_REJECTED_TRANSACTIONS: usize = 1_000;

//! Integration scenarios for the Beck consensus-state core.
//!
//! The tests in `tests/` drive a full block processor (without any
//! networking) through multi-block reorganizations and pool lifecycles,
//! verifying chain state, the confirmed UTXO set, and pool tier movement.

pub mod helpers;

//! Pari-mutuel odds and payout arithmetic.
//!
//! Pure functions over pool sizes; shared by the live odds board, the bet
//! preview and settlement.

pub mod parimutuel;

pub use parimutuel::{default_fee_rate, validate_fee_rate, OddsError, OddsResult, PoolShare};

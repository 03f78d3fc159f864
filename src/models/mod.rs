//! Domain models for the votepool backend.
//!
//! This module contains all database-backed models representing
//! the core entities of the betting ledger.

pub mod bet;
pub mod choice;
pub mod history;
pub mod option;
pub mod user;
pub mod vote;

// Re-export all models for convenient access
pub use bet::{Bet, BetRecord};
pub use choice::Choice;
pub use history::{OptionSettlement, Settlement, StatusChange};
pub use option::VoteOption;
pub use user::User;
pub use vote::{Vote, VoteStatus};

pub mod bet_repository;
pub mod history_repository;
pub mod pg_ledger;
pub mod user_repository;
pub mod vote_repository;

// Re-export all repositories for convenient access
pub use bet_repository::BetRepository;
pub use history_repository::HistoryRepository;
pub use pg_ledger::{PgLedger, PgLedgerTx};
pub use user_repository::UserRepository;
pub use vote_repository::VoteRepository;

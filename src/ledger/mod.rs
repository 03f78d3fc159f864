//! The betting ledger: the vote aggregate and the stores that persist it.

pub mod book;
pub mod memory;
pub mod store;

pub use book::{CounterDrift, ParticipationPolicy, PendingChanges, PoolSnapshot, Tally, VoteBook};
pub use memory::{MemoryLedger, MemoryTx};
pub use store::{LedgerStore, LedgerTx};

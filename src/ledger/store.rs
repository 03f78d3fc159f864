use super::VoteBook;
use crate::error::AppResult;
use crate::models::{Bet, BetRecord, Settlement, StatusChange, User};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use uuid::Uuid;

/// Durable home of votes, bets and balances.
///
/// Reads outside a transaction see committed state only. Every write goes
/// through a [`LedgerTx`].
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: LedgerTx;

    /// Start a transaction
    async fn begin(&self) -> AppResult<Self::Tx>;

    async fn load_book(&self, vote_id: Uuid) -> AppResult<Option<VoteBook>>;

    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>>;

    async fn create_user(&self, nickname: &str, points: i64) -> AppResult<User>;

    async fn find_bet(&self, bet_id: Uuid) -> AppResult<Option<Bet>>;

    /// Bets of a user joined with their vote and choice, newest vote first
    async fn bets_by_user(&self, user_id: Uuid) -> AppResult<Vec<BetRecord>>;

    /// ONGOING votes whose end time has passed
    async fn votes_due_for_finish(&self, now: NaiveDateTime) -> AppResult<Vec<Uuid>>;

    /// RESOLVED votes not yet rewarded
    async fn votes_awaiting_settlement(&self) -> AppResult<Vec<Uuid>>;

    /// Every vote id, for reconciliation sweeps
    async fn vote_ids(&self) -> AppResult<Vec<Uuid>>;

    async fn status_history(&self, vote_id: Uuid) -> AppResult<Vec<StatusChange>>;

    async fn find_settlement(&self, vote_id: Uuid) -> AppResult<Option<Settlement>>;
}

/// An all-or-nothing unit of ledger writes.
///
/// Locks are taken vote first, then users in ascending id order. Dropping a
/// transaction without [`LedgerTx::commit`] discards every write.
#[async_trait]
pub trait LedgerTx: Send {
    /// Load and lock a vote's aggregate
    async fn lock_book(&mut self, vote_id: Uuid) -> AppResult<Option<VoteBook>>;

    async fn lock_user(&mut self, user_id: Uuid) -> AppResult<Option<User>>;

    /// Lock several users in ascending id order; missing ids are omitted
    async fn lock_users(&mut self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, User>>;

    /// Persist a newly created vote with its options and choices
    async fn insert_book(&mut self, book: &mut VoteBook) -> AppResult<()>;

    /// Persist the book's counters and pending bet and status changes
    async fn save_book(&mut self, book: &mut VoteBook) -> AppResult<()>;

    async fn save_user(&mut self, user: &User) -> AppResult<()>;

    /// Fails with `AlreadyProcessed` if the vote already has a settlement
    async fn insert_settlement(&mut self, settlement: &Settlement) -> AppResult<()>;

    /// Delete choices, options, history and the vote, in that order
    async fn delete_book(&mut self, vote_id: Uuid) -> AppResult<()>;

    async fn commit(self) -> AppResult<()>;
}

use super::{LedgerStore, LedgerTx, VoteBook};
use crate::error::{AppError, AppResult};
use crate::models::{
    Bet, BetRecord, Choice, Settlement, StatusChange, User, Vote, VoteOption, VoteStatus,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    votes: HashMap<Uuid, Vote>,
    options: HashMap<Uuid, VoteOption>,
    choices: HashMap<Uuid, Choice>,
    bets: HashMap<Uuid, Bet>,
    history: Vec<StatusChange>,
    settlements: HashMap<Uuid, Settlement>,
}

impl MemoryState {
    fn book(&self, vote_id: Uuid) -> Option<VoteBook> {
        let vote = self.votes.get(&vote_id)?.clone();
        let options: Vec<VoteOption> = self
            .options
            .values()
            .filter(|o| o.vote_id == vote_id)
            .cloned()
            .collect();
        let choices = self
            .choices
            .values()
            .filter(|c| options.iter().any(|o| o.id == c.option_id))
            .cloned()
            .collect();
        let bets = self
            .bets
            .values()
            .filter(|b| b.vote_id == vote_id)
            .cloned()
            .collect();
        Some(VoteBook::load(vote, options, choices, bets))
    }

    fn write_aggregate(&mut self, book: &VoteBook) {
        self.votes.insert(book.vote.id, book.vote.clone());
        for option in &book.options {
            self.options.insert(option.id, option.clone());
        }
        for choice in &book.choices {
            self.choices.insert(choice.id, choice.clone());
        }
    }

    fn record(&self, bet: &Bet) -> Option<BetRecord> {
        let vote = self.votes.get(&bet.vote_id)?;
        let choice = self.choices.get(&bet.choice_id)?;
        let option = self.options.get(&bet.option_id)?;
        Some(BetRecord {
            bet: bet.clone(),
            vote_title: vote.title.clone(),
            vote_status: vote.status,
            vote_end_at: vote.end_at,
            vote_created_at: vote.created_at,
            choice_text: choice.text.clone(),
            correct_choice_id: option.correct_choice_id,
        })
    }
}

/// Ledger kept in process memory.
///
/// Transactions are serialized behind one mutex and work on a copy of the
/// state that replaces the shared state only on commit.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail after all its writes were staged
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Every user, for balance audits
    pub async fn users(&self) -> Vec<User> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        users
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            fail_commit: self.fail_next_commit.clone(),
        })
    }

    async fn load_book(&self, vote_id: Uuid) -> AppResult<Option<VoteBook>> {
        Ok(self.state.lock().await.book(vote_id))
    }

    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn create_user(&self, nickname: &str, points: i64) -> AppResult<User> {
        if points < 0 {
            return Err(AppError::Validation(
                "Initial points cannot be negative".to_string(),
            ));
        }
        let user = User::new(nickname.to_string(), points);
        self.state.lock().await.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_bet(&self, bet_id: Uuid) -> AppResult<Option<Bet>> {
        Ok(self.state.lock().await.bets.get(&bet_id).cloned())
    }

    async fn bets_by_user(&self, user_id: Uuid) -> AppResult<Vec<BetRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<BetRecord> = state
            .bets
            .values()
            .filter(|b| b.user_id == user_id)
            .filter_map(|b| state.record(b))
            .collect();
        records.sort_by(|a, b| {
            b.vote_created_at
                .cmp(&a.vote_created_at)
                .then(b.bet.created_at.cmp(&a.bet.created_at))
        });
        Ok(records)
    }

    async fn votes_due_for_finish(&self, now: NaiveDateTime) -> AppResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut due: Vec<&Vote> = state
            .votes
            .values()
            .filter(|v| v.status == VoteStatus::Ongoing && v.is_overdue(now))
            .collect();
        due.sort_by_key(|v| v.end_at);
        Ok(due.into_iter().map(|v| v.id).collect())
    }

    async fn votes_awaiting_settlement(&self) -> AppResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut pending: Vec<&Vote> = state
            .votes
            .values()
            .filter(|v| v.status == VoteStatus::Resolved && !v.rewarded)
            .collect();
        pending.sort_by_key(|v| v.updated_at);
        Ok(pending.into_iter().map(|v| v.id).collect())
    }

    async fn vote_ids(&self) -> AppResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut votes: Vec<&Vote> = state.votes.values().collect();
        votes.sort_by_key(|v| v.created_at);
        Ok(votes.into_iter().map(|v| v.id).collect())
    }

    async fn status_history(&self, vote_id: Uuid) -> AppResult<Vec<StatusChange>> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.vote_id == vote_id)
            .cloned()
            .collect())
    }

    async fn find_settlement(&self, vote_id: Uuid) -> AppResult<Option<Settlement>> {
        Ok(self.state.lock().await.settlements.get(&vote_id).cloned())
    }
}

/// Transaction over a [`MemoryLedger`]; holds the ledger mutex until dropped
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_book(&mut self, vote_id: Uuid) -> AppResult<Option<VoteBook>> {
        Ok(self.working.book(vote_id))
    }

    async fn lock_user(&mut self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn lock_users(&mut self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, User>> {
        let mut ids = user_ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.working.users.get(&id).cloned())
            .map(|u| (u.id, u))
            .collect())
    }

    async fn insert_book(&mut self, book: &mut VoteBook) -> AppResult<()> {
        if self.working.votes.contains_key(&book.id()) {
            return Err(AppError::AlreadyProcessed(format!(
                "Vote {} already exists",
                book.id()
            )));
        }
        self.working.write_aggregate(book);
        let pending = book.take_pending();
        self.working.history.extend(pending.status_changes);
        Ok(())
    }

    async fn save_book(&mut self, book: &mut VoteBook) -> AppResult<()> {
        if !self.working.votes.contains_key(&book.id()) {
            return Err(AppError::NotFound(format!("Vote {}", book.id())));
        }
        self.working.write_aggregate(book);

        let pending = book.take_pending();
        for bet_id in pending.inserted_bets.iter().chain(pending.updated_bets.iter()) {
            if let Some(bet) = book.bet(*bet_id) {
                self.working.bets.insert(bet.id, bet.clone());
            }
        }
        self.working.history.extend(pending.status_changes);
        Ok(())
    }

    async fn save_user(&mut self, user: &User) -> AppResult<()> {
        if user.points < 0 {
            return Err(AppError::Validation(format!(
                "Balance of user {} cannot go negative",
                user.id
            )));
        }
        match self.working.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("User {}", user.id))),
        }
    }

    async fn insert_settlement(&mut self, settlement: &Settlement) -> AppResult<()> {
        if self.working.settlements.contains_key(&settlement.vote_id) {
            return Err(AppError::AlreadyProcessed(format!(
                "Settlement for vote {} already recorded",
                settlement.vote_id
            )));
        }
        self.working
            .settlements
            .insert(settlement.vote_id, settlement.clone());
        Ok(())
    }

    async fn delete_book(&mut self, vote_id: Uuid) -> AppResult<()> {
        if self.working.bets.values().any(|b| b.vote_id == vote_id) {
            return Err(AppError::Validation(format!(
                "Vote {} still has bets",
                vote_id
            )));
        }

        let option_ids: Vec<Uuid> = self
            .working
            .options
            .values()
            .filter(|o| o.vote_id == vote_id)
            .map(|o| o.id)
            .collect();
        self.working
            .choices
            .retain(|_, c| !option_ids.contains(&c.option_id));
        self.working.options.retain(|_, o| o.vote_id != vote_id);
        self.working.history.retain(|h| h.vote_id != vote_id);
        self.working.settlements.remove(&vote_id);

        if self.working.votes.remove(&vote_id).is_none() {
            return Err(AppError::NotFound(format!("Vote {}", vote_id)));
        }
        Ok(())
    }

    async fn commit(self) -> AppResult<()> {
        let MemoryTx {
            mut guard,
            working,
            fail_commit,
        } = self;

        if fail_commit.swap(false, Ordering::SeqCst) {
            warn!("Injected commit failure, discarding transaction");
            return Err(AppError::Message("injected commit failure".to_string()));
        }

        *guard = working;
        debug!("memory ledger transaction committed");
        Ok(())
    }
}

use super::{BetRepository, HistoryRepository, UserRepository, VoteRepository};
use crate::error::{AppError, AppResult, RepositoryError};
use crate::ledger::{LedgerStore, LedgerTx, VoteBook};
use crate::models::{Bet, BetRecord, Settlement, StatusChange, User};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

fn repo_err(err: sqlx::Error) -> AppError {
    RepositoryError::from(err).into()
}

async fn fetch_book(conn: &mut PgConnection, vote_id: Uuid, lock: bool) -> AppResult<Option<VoteBook>> {
    // Vote row first: it is the lock every writer of this vote queues on
    let vote = match VoteRepository::fetch(conn, vote_id, lock).await.map_err(repo_err)? {
        Some(vote) => vote,
        None => return Ok(None),
    };
    let options = VoteRepository::fetch_options(conn, vote_id, lock)
        .await
        .map_err(repo_err)?;
    let choices = VoteRepository::fetch_choices(conn, vote_id, lock)
        .await
        .map_err(repo_err)?;
    let bets = BetRepository::fetch_by_vote(conn, vote_id)
        .await
        .map_err(repo_err)?;

    Ok(Some(VoteBook::load(vote, options, choices, bets)))
}

/// PostgreSQL-backed ledger
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
    vote_repo: Arc<VoteRepository>,
    bet_repo: Arc<BetRepository>,
    user_repo: Arc<UserRepository>,
    history_repo: Arc<HistoryRepository>,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            vote_repo: Arc::new(VoteRepository::new(pool.clone())),
            bet_repo: Arc::new(BetRepository::new(pool.clone())),
            user_repo: Arc::new(UserRepository::new(pool.clone())),
            history_repo: Arc::new(HistoryRepository::new(pool.clone())),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    type Tx = PgLedgerTx;

    async fn begin(&self) -> AppResult<PgLedgerTx> {
        let tx = self.pool.begin().await.map_err(repo_err)?;
        Ok(PgLedgerTx { tx })
    }

    async fn load_book(&self, vote_id: Uuid) -> AppResult<Option<VoteBook>> {
        let mut conn = self.pool.acquire().await.map_err(repo_err)?;
        fetch_book(&mut conn, vote_id, false).await
    }

    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        self.user_repo.find_by_id(user_id).await.map_err(repo_err)
    }

    async fn create_user(&self, nickname: &str, points: i64) -> AppResult<User> {
        if points < 0 {
            return Err(AppError::Validation(
                "Initial points cannot be negative".to_string(),
            ));
        }
        self.user_repo
            .create(&User::new(nickname.to_string(), points))
            .await
            .map_err(repo_err)
    }

    async fn find_bet(&self, bet_id: Uuid) -> AppResult<Option<Bet>> {
        self.bet_repo.find_by_id(bet_id).await.map_err(repo_err)
    }

    async fn bets_by_user(&self, user_id: Uuid) -> AppResult<Vec<BetRecord>> {
        self.bet_repo
            .find_records_by_user(user_id)
            .await
            .map_err(repo_err)
    }

    async fn votes_due_for_finish(&self, now: NaiveDateTime) -> AppResult<Vec<Uuid>> {
        self.vote_repo.find_due_for_finish(now).await.map_err(repo_err)
    }

    async fn votes_awaiting_settlement(&self) -> AppResult<Vec<Uuid>> {
        self.vote_repo
            .find_awaiting_settlement()
            .await
            .map_err(repo_err)
    }

    async fn vote_ids(&self) -> AppResult<Vec<Uuid>> {
        self.vote_repo.find_all_ids().await.map_err(repo_err)
    }

    async fn status_history(&self, vote_id: Uuid) -> AppResult<Vec<StatusChange>> {
        self.history_repo
            .find_status_history(vote_id)
            .await
            .map_err(repo_err)
    }

    async fn find_settlement(&self, vote_id: Uuid) -> AppResult<Option<Settlement>> {
        self.history_repo
            .find_settlement(vote_id)
            .await
            .map_err(repo_err)
    }
}

/// A PostgreSQL transaction; rolled back when dropped uncommitted
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_book(&mut self, vote_id: Uuid) -> AppResult<Option<VoteBook>> {
        fetch_book(&mut self.tx, vote_id, true).await
    }

    async fn lock_user(&mut self, user_id: Uuid) -> AppResult<Option<User>> {
        UserRepository::lock(&mut self.tx, user_id)
            .await
            .map_err(repo_err)
    }

    async fn lock_users(&mut self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, User>> {
        let mut ids = user_ids.to_vec();
        ids.sort();
        ids.dedup();
        let users = UserRepository::lock_many(&mut self.tx, &ids)
            .await
            .map_err(repo_err)?;
        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    async fn insert_book(&mut self, book: &mut VoteBook) -> AppResult<()> {
        VoteRepository::insert(&mut self.tx, &book.vote)
            .await
            .map_err(repo_err)?;
        for option in &book.options {
            VoteRepository::insert_option(&mut self.tx, option)
                .await
                .map_err(repo_err)?;
        }
        for choice in &book.choices {
            VoteRepository::insert_choice(&mut self.tx, choice)
                .await
                .map_err(repo_err)?;
        }
        for change in book.take_pending().status_changes {
            HistoryRepository::insert_status(&mut self.tx, &change)
                .await
                .map_err(repo_err)?;
        }
        Ok(())
    }

    async fn save_book(&mut self, book: &mut VoteBook) -> AppResult<()> {
        let updated = VoteRepository::update(&mut self.tx, &book.vote)
            .await
            .map_err(repo_err)?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("Vote {}", book.id())));
        }
        for option in &book.options {
            VoteRepository::update_option(&mut self.tx, option)
                .await
                .map_err(repo_err)?;
        }
        for choice in &book.choices {
            VoteRepository::update_choice(&mut self.tx, choice)
                .await
                .map_err(repo_err)?;
        }

        let pending = book.take_pending();
        for bet_id in &pending.inserted_bets {
            if let Some(bet) = book.bet(*bet_id) {
                BetRepository::insert(&mut self.tx, bet)
                    .await
                    .map_err(repo_err)?;
            }
        }
        for bet_id in &pending.updated_bets {
            if let Some(bet) = book.bet(*bet_id) {
                BetRepository::update(&mut self.tx, bet)
                    .await
                    .map_err(repo_err)?;
            }
        }
        for change in &pending.status_changes {
            HistoryRepository::insert_status(&mut self.tx, change)
                .await
                .map_err(repo_err)?;
        }

        debug!(
            vote_id = %book.id(),
            inserted = pending.inserted_bets.len(),
            updated = pending.updated_bets.len(),
            "vote book saved"
        );
        Ok(())
    }

    async fn save_user(&mut self, user: &User) -> AppResult<()> {
        let updated = UserRepository::update_points(&mut self.tx, user)
            .await
            .map_err(repo_err)?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("User {}", user.id)));
        }
        Ok(())
    }

    async fn insert_settlement(&mut self, settlement: &Settlement) -> AppResult<()> {
        HistoryRepository::insert_settlement(&mut self.tx, settlement)
            .await
            .map_err(repo_err)
    }

    async fn delete_book(&mut self, vote_id: Uuid) -> AppResult<()> {
        let bets = BetRepository::count_by_vote(&mut self.tx, vote_id)
            .await
            .map_err(repo_err)?;
        if bets > 0 {
            return Err(AppError::Validation(format!("Vote {} still has bets", vote_id)));
        }

        VoteRepository::delete_children(&mut self.tx, vote_id)
            .await
            .map_err(repo_err)?;
        HistoryRepository::delete_status_history(&mut self.tx, vote_id)
            .await
            .map_err(repo_err)?;
        let deleted = VoteRepository::delete(&mut self.tx, vote_id)
            .await
            .map_err(repo_err)?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Vote {}", vote_id)));
        }
        Ok(())
    }

    async fn commit(self) -> AppResult<()> {
        self.tx.commit().await.map_err(repo_err)
    }
}

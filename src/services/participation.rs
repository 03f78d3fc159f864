use crate::error::{AppError, AppResult};
use crate::ledger::{LedgerStore, LedgerTx, ParticipationPolicy};
use crate::services::{AuditTrailService, VoteDetail};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Places and cancels bets.
///
/// Each call is one transaction: the vote is locked first, then the user, and
/// the status check happens under that lock.
pub struct ParticipationService<S: LedgerStore> {
    store: Arc<S>,
    policy: ParticipationPolicy,
    audit: Option<Arc<AuditTrailService>>,
}

impl<S: LedgerStore> ParticipationService<S> {
    pub fn new(store: Arc<S>, policy: ParticipationPolicy) -> Self {
        Self {
            store,
            policy,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditTrailService>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policy(&self) -> ParticipationPolicy {
        self.policy
    }

    /// Stake `points` of the user's balance on a choice
    pub async fn place_bet(
        &self,
        vote_id: Uuid,
        choice_id: Uuid,
        user_id: Uuid,
        points: i64,
    ) -> AppResult<VoteDetail> {
        if points <= 0 {
            return Err(AppError::Validation(
                "Points must be greater than zero".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let mut book = tx
            .lock_book(vote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vote {}", vote_id)))?;
        let mut user = tx
            .lock_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        let bet = book.place_bet(&mut user, choice_id, points, self.policy)?;

        tx.save_book(&mut book).await?;
        tx.save_user(&user).await?;
        tx.commit().await?;

        info!(
            "Bet {} placed: user {} staked {} on choice {} of vote {}",
            bet.id, user_id, points, choice_id, vote_id
        );
        if let Some(audit) = &self.audit {
            audit.log_bet_placed(&bet).await;
        }

        Ok(VoteDetail::from_book(&book, Some(user_id)))
    }

    /// Cancel a bet and refund its stake
    pub async fn cancel_bet(&self, bet_id: Uuid, user_id: Uuid) -> AppResult<VoteDetail> {
        let bet = self
            .store
            .find_bet(bet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bet {}", bet_id)))?;
        if bet.user_id != user_id {
            return Err(AppError::Unauthorized(format!(
                "Bet {} does not belong to user {}",
                bet_id, user_id
            )));
        }

        self.cancel_in_vote(bet.vote_id, user_id, |_| Some(bet_id)).await
    }

    /// Cancel the caller's active bet on a vote
    pub async fn cancel_my_bet_on_vote(&self, vote_id: Uuid, user_id: Uuid) -> AppResult<VoteDetail> {
        self.cancel_in_vote(vote_id, user_id, |book| {
            book.active_bet_of(user_id).map(|b| b.id)
        })
        .await
    }

    async fn cancel_in_vote<F>(&self, vote_id: Uuid, user_id: Uuid, pick: F) -> AppResult<VoteDetail>
    where
        F: FnOnce(&crate::ledger::VoteBook) -> Option<Uuid> + Send,
    {
        let mut tx = self.store.begin().await?;
        let mut book = tx
            .lock_book(vote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vote {}", vote_id)))?;
        let bet_id = pick(&book).ok_or_else(|| {
            AppError::NotFound(format!("Active bet of user {} on vote {}", user_id, vote_id))
        })?;
        let mut user = tx
            .lock_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        let bet = book.cancel_bet(bet_id, &mut user)?;

        tx.save_book(&mut book).await?;
        tx.save_user(&user).await?;
        tx.commit().await?;

        info!(
            "Bet {} cancelled: {} points refunded to user {}",
            bet.id, bet.points_bet, user_id
        );
        if let Some(audit) = &self.audit {
            audit.log_bet_cancelled(&bet).await;
        }

        Ok(VoteDetail::from_book(&book, Some(user_id)))
    }
}

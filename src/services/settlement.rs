use crate::error::{AppError, AppResult};
use crate::ledger::{LedgerStore, LedgerTx, VoteBook};
use crate::lifecycle::Transition;
use crate::models::{Bet, Settlement};
use crate::services::AuditTrailService;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Drives votes through their lifecycle and pays out the pool
pub struct SettlementService<S: LedgerStore> {
    store: Arc<S>,
    audit: Option<Arc<AuditTrailService>>,
}

impl<S: LedgerStore> SettlementService<S> {
    /// Create a new settlement service
    pub fn new(store: Arc<S>) -> Self {
        Self { store, audit: None }
    }

    pub fn with_audit(mut self, audit: Arc<AuditTrailService>) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn lock(tx: &mut S::Tx, vote_id: Uuid) -> AppResult<VoteBook> {
        tx.lock_book(vote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vote {}", vote_id)))
    }

    /// Run a transition that touches only the vote aggregate
    async fn transition<F>(&self, vote_id: Uuid, apply: F) -> AppResult<Transition>
    where
        F: FnOnce(&mut VoteBook) -> AppResult<Transition> + Send,
    {
        let mut tx = self.store.begin().await?;
        let mut book = Self::lock(&mut tx, vote_id).await?;

        let transition = apply(&mut book)?;
        if transition.is_changed() {
            tx.save_book(&mut book).await?;
            tx.commit().await?;
            info!("Vote {} is now {}", vote_id, transition.status());
            if let Some(audit) = &self.audit {
                audit.log_status_change(vote_id, &transition).await;
            }
        }
        Ok(transition)
    }

    /// Approve a reviewed vote for betting
    pub async fn open_vote(&self, vote_id: Uuid) -> AppResult<Transition> {
        self.transition(vote_id, |book| book.open()).await
    }

    /// Close betting. Repeating the call once the vote is past ONGOING
    /// returns `Transition::Unchanged`.
    pub async fn finish_vote(&self, vote_id: Uuid) -> AppResult<Transition> {
        self.transition(vote_id, |book| book.finish()).await
    }

    /// Record the correct choice of one option of a finished vote
    pub async fn resolve_vote(&self, vote_id: Uuid, correct_choice_id: Uuid) -> AppResult<Transition> {
        self.resolve_options(vote_id, &[correct_choice_id]).await
    }

    /// Record one correct choice per option. The vote becomes RESOLVED once
    /// every option is answered; until then the call returns
    /// `Transition::Unchanged(Finished)` and the answers are kept.
    pub async fn resolve_options(&self, vote_id: Uuid, correct_choice_ids: &[Uuid]) -> AppResult<Transition> {
        let mut tx = self.store.begin().await?;
        let mut book = Self::lock(&mut tx, vote_id).await?;

        let transition = book.resolve(correct_choice_ids)?;
        tx.save_book(&mut book).await?;
        tx.commit().await?;

        if transition.is_changed() {
            info!("Vote {} is now {}", vote_id, transition.status());
            if let Some(audit) = &self.audit {
                audit.log_status_change(vote_id, &transition).await;
            }
        } else {
            let open = book.options.iter().filter(|o| !o.is_resolved()).count();
            info!("Vote {}: {} options still unresolved", vote_id, open);
        }
        Ok(transition)
    }

    /// Pay the winners of a resolved vote.
    ///
    /// Credits, bet rewards, the settlement record and the REWARDED status
    /// commit together or not at all, so a failed run can simply be retried.
    pub async fn settle_vote(&self, vote_id: Uuid) -> AppResult<Settlement> {
        let mut tx = self.store.begin().await?;
        let mut book = Self::lock(&mut tx, vote_id).await?;

        // Reject a settled vote before touching any user row
        if book.vote.rewarded {
            return Err(AppError::AlreadyProcessed(format!(
                "Vote {} is already settled",
                vote_id
            )));
        }

        let from = book.status();
        let mut users = tx.lock_users(&book.bettor_ids()).await?;
        let settlement = book.settle(&mut users)?;

        tx.save_book(&mut book).await?;
        for user in users.values() {
            tx.save_user(user).await?;
        }
        tx.insert_settlement(&settlement).await?;
        tx.commit().await?;

        info!(
            "Vote {} settled: pool {}, {} winners paid {}, fee retained {}",
            vote_id,
            settlement.total_pool,
            settlement.winner_count,
            settlement.distributed,
            settlement.fee_retained
        );
        if let Some(audit) = &self.audit {
            audit
                .log_status_change(vote_id, &Transition::Changed { from, to: book.status() })
                .await;
            audit.log_vote_settled(&settlement).await;
        }

        Ok(settlement)
    }

    /// Resolve and settle in one call, one correct choice per option. Each
    /// step is its own transaction; if settlement fails the vote stays
    /// RESOLVED and settlement can be retried. Answers that leave an option
    /// unresolved are kept and settlement fails with `InvalidState`.
    pub async fn resolve_and_settle(&self, vote_id: Uuid, correct_choice_ids: &[Uuid]) -> AppResult<Settlement> {
        self.resolve_options(vote_id, correct_choice_ids).await?;
        self.settle_vote(vote_id).await.map_err(|e| {
            warn!("Vote {} resolved but settlement failed: {}", vote_id, e);
            e
        })
    }

    /// Cancel a vote before resolution, refunding every active bet
    pub async fn cancel_vote(&self, vote_id: Uuid, reason: &str) -> AppResult<Vec<Bet>> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation(
                "A cancellation reason is required".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let mut book = Self::lock(&mut tx, vote_id).await?;
        let from = book.status();

        let mut users = tx.lock_users(&book.bettor_ids()).await?;
        let refunded = book.cancel(reason, &mut users)?;

        tx.save_book(&mut book).await?;
        for user in users.values() {
            tx.save_user(user).await?;
        }
        tx.commit().await?;

        info!(
            "Vote {} cancelled ({}): {} bets refunded",
            vote_id,
            reason,
            refunded.len()
        );
        if let Some(audit) = &self.audit {
            audit
                .log_status_change(vote_id, &Transition::Changed { from, to: book.status() })
                .await;
            audit.log_vote_cancelled(vote_id, reason, &refunded).await;
        }

        Ok(refunded)
    }

    pub async fn settlement_of(&self, vote_id: Uuid) -> AppResult<Option<Settlement>> {
        self.store.find_settlement(vote_id).await
    }
}

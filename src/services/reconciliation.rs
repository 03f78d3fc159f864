use crate::error::{AppError, AppResult};
use crate::ledger::{CounterDrift, LedgerStore, LedgerTx};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Recomputes cached vote/option/choice counters from the bets
pub struct ReconciliationService<S: LedgerStore> {
    store: Arc<S>,
    interval: Duration,
}

impl<S: LedgerStore> ReconciliationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            interval: Duration::from_secs(3600),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Repair one vote's counters, returning what was wrong
    pub async fn reconcile_vote(&self, vote_id: Uuid) -> AppResult<Vec<CounterDrift>> {
        let mut tx = self.store.begin().await?;
        let mut book = tx
            .lock_book(vote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vote {}", vote_id)))?;

        let drifts = book.reconcile();
        if drifts.is_empty() {
            return Ok(drifts);
        }

        for drift in &drifts {
            warn!(
                %vote_id,
                scope = drift.scope,
                id = %drift.id,
                field = drift.field,
                cached = drift.cached,
                actual = drift.actual,
                "Consistency anomaly: counter drift repaired"
            );
        }
        tx.save_book(&mut book).await?;
        tx.commit().await?;

        Ok(drifts)
    }

    /// Reconcile every vote; a failing vote is logged and skipped
    pub async fn reconcile_all(&self) -> AppResult<usize> {
        let vote_ids = self.store.vote_ids().await?;
        let mut repaired = 0;

        for vote_id in vote_ids {
            match self.reconcile_vote(vote_id).await {
                Ok(drifts) if !drifts.is_empty() => repaired += 1,
                Ok(_) => {}
                Err(e) => error!("Failed to reconcile vote {}: {}", vote_id, e),
            }
        }

        if repaired > 0 {
            info!("Reconciliation repaired counters of {} votes", repaired);
        }
        Ok(repaired)
    }

    /// Start the periodic reconciliation task
    pub async fn start(self) {
        let mut interval = time::interval(self.interval);
        info!("Reconciliation started, will run every {:?}", self.interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.reconcile_all().await {
                error!("Error reconciling counters: {}", e);
            }
        }
    }
}

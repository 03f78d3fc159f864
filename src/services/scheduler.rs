use crate::error::AppResult;
use crate::ledger::LedgerStore;
use crate::services::SettlementService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

/// Result of one scheduler pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub finished: usize,
    pub settled: usize,
    pub failed: usize,
}

/// Background task that closes overdue votes and pays out resolved ones
pub struct VoteScheduler<S: LedgerStore> {
    store: Arc<S>,
    settlement: Arc<SettlementService<S>>,
    sweep_interval: Duration,
}

impl<S: LedgerStore> VoteScheduler<S> {
    /// Create a new scheduler
    ///
    /// # Arguments
    /// * `store` - Ledger to sweep
    /// * `settlement` - Service performing the transitions
    pub fn new(store: Arc<S>, settlement: Arc<SettlementService<S>>) -> Self {
        Self {
            store,
            settlement,
            sweep_interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Start the scheduler background task
    pub async fn start(self) {
        let mut interval = time::interval(self.sweep_interval);
        info!("Vote scheduler started, will sweep every {:?}", self.sweep_interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.run_once().await {
                error!("Error sweeping votes: {}", e);
            }
        }
    }

    /// Finish every overdue ONGOING vote, then settle every RESOLVED one.
    /// A failure on one vote is logged and does not stop the sweep.
    pub async fn run_once(&self) -> AppResult<SweepReport> {
        let mut report = SweepReport::default();
        let now = chrono::Utc::now().naive_utc();

        for vote_id in self.store.votes_due_for_finish(now).await? {
            match self.settlement.finish_vote(vote_id).await {
                Ok(transition) if transition.is_changed() => report.finished += 1,
                Ok(_) => {}
                Err(e) => {
                    report.failed += 1;
                    error!("Failed to finish vote {}: {}", vote_id, e);
                }
            }
        }

        for vote_id in self.store.votes_awaiting_settlement().await? {
            match self.settlement.settle_vote(vote_id).await {
                Ok(_) => report.settled += 1,
                // Settled by another caller since the query ran
                Err(e) if e.is_already_processed() => {}
                Err(e) => {
                    report.failed += 1;
                    error!("Failed to settle vote {}: {}", vote_id, e);
                }
            }
        }

        if report.finished > 0 || report.settled > 0 {
            info!(
                "Scheduler sweep: {} finished, {} settled, {} failed",
                report.finished, report.settled, report.failed
            );
        }
        Ok(report)
    }
}

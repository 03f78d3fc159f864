//! Votepool Backend Library
//!
//! Pari-mutuel betting ledger for community votes: users stake points on a
//! choice, the pool is split among the winners once the vote is resolved.

pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod odds;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use config::LedgerConfig;
use ledger::LedgerStore;
use services::*;
use std::sync::Arc;

/// Application state containing every service over one ledger
pub struct AppState<S: LedgerStore> {
    pub store: Arc<S>,
    pub votes: Arc<VoteService<S>>,
    pub participation: Arc<ParticipationService<S>>,
    pub settlement: Arc<SettlementService<S>>,
    pub statistics: Arc<StatisticsService<S>>,
    pub reconciliation: Arc<ReconciliationService<S>>,
    pub audit: Option<Arc<AuditTrailService>>,
}

impl<S: LedgerStore> AppState<S> {
    /// Wire the services over `store`, auditing when `audit` is given
    pub fn new(store: Arc<S>, config: &LedgerConfig, audit: Option<Arc<AuditTrailService>>) -> Self {
        let mut votes = VoteService::new(store.clone(), config.default_fee_rate);
        let mut participation = ParticipationService::new(store.clone(), config.participation_policy);
        let mut settlement = SettlementService::new(store.clone());
        if let Some(audit) = &audit {
            votes = votes.with_audit(audit.clone());
            participation = participation.with_audit(audit.clone());
            settlement = settlement.with_audit(audit.clone());
        }

        Self {
            votes: Arc::new(votes),
            participation: Arc::new(participation),
            settlement: Arc::new(settlement),
            statistics: Arc::new(StatisticsService::new(store.clone())),
            reconciliation: Arc::new(ReconciliationService::new(store.clone())),
            store,
            audit,
        }
    }

    /// Scheduler sharing this state's settlement service
    pub fn scheduler(&self, config: &LedgerConfig) -> VoteScheduler<S> {
        VoteScheduler::new(self.store.clone(), self.settlement.clone())
            .with_interval(config.scheduler_interval())
    }

    /// Periodic counter reconciliation over this state's ledger
    pub fn reconciler(&self, config: &LedgerConfig) -> ReconciliationService<S> {
        ReconciliationService::new(self.store.clone()).with_interval(config.reconcile_interval())
    }
}

pub mod audit;
pub mod participation;
pub mod reconciliation;
pub mod scheduler;
pub mod settlement;
pub mod statistics;
pub mod vote_service;

pub use audit::{AuditLogEntry, AuditTrailService};
pub use participation::ParticipationService;
pub use reconciliation::ReconciliationService;
pub use scheduler::{SweepReport, VoteScheduler};
pub use settlement::SettlementService;
pub use statistics::{BetOutcome, BetStatistics, MyBet, StatisticsService};
pub use vote_service::{
    BetPreview, ChoiceOdds, ChoiceView, NewOption, NewVote, OptionView, VoteDetail, VoteService,
};

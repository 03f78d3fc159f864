use crate::error::{AppError, AppResult};
use crate::lifecycle::Transition;
use crate::models::{Bet, Settlement, Vote};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: i64,
    pub event_type: String, // "bet_placed", "bet_cancelled", "vote_settled", etc.
    pub vote_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub details: serde_json::Value,
}

/// Audit trail service for logging all ledger movements
pub struct AuditTrailService {
    log_file: PathBuf,
    file_handle: Arc<Mutex<std::fs::File>>,
}

impl AuditTrailService {
    /// Create a new audit trail service
    pub fn new(log_directory: PathBuf) -> AppResult<Self> {
        // Ensure directory exists
        std::fs::create_dir_all(&log_directory)
            .map_err(|e| AppError::Message(format!("Failed to create log directory: {}", e)))?;

        // Create log file with date
        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("audit_{}.log", date));

        // Open file in append mode
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Message(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            file_handle: Arc::new(Mutex::new(file)),
        })
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditLogEntry) -> AppResult<()> {
        let json = serde_json::to_string(&entry)?;

        let mut file = self.file_handle.lock().await;
        writeln!(file, "{}", json)
            .map_err(|e| AppError::Message(format!("Failed to write audit log: {}", e)))?;

        file.flush()
            .map_err(|e| AppError::Message(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// Log an entry for an operation that already committed; a failed write
    /// is reported and swallowed
    pub async fn record(&self, entry: AuditLogEntry) {
        let event_type = entry.event_type.clone();
        if let Err(e) = self.log(entry).await {
            warn!("Failed to write {} audit entry: {}", event_type, e);
        }
    }

    fn entry(
        event_type: &str,
        vote_id: Option<Uuid>,
        user_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> AuditLogEntry {
        AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: event_type.to_string(),
            vote_id,
            user_id,
            details,
        }
    }

    /// Log bet placement
    pub async fn log_bet_placed(&self, bet: &Bet) {
        let entry = Self::entry(
            "bet_placed",
            Some(bet.vote_id),
            Some(bet.user_id),
            serde_json::json!({
                "bet_id": bet.id.to_string(),
                "choice_id": bet.choice_id.to_string(),
                "points": bet.points_bet,
            }),
        );
        self.record(entry).await
    }

    /// Log bet cancellation and refund
    pub async fn log_bet_cancelled(&self, bet: &Bet) {
        let entry = Self::entry(
            "bet_cancelled",
            Some(bet.vote_id),
            Some(bet.user_id),
            serde_json::json!({
                "bet_id": bet.id.to_string(),
                "refunded": bet.points_bet,
            }),
        );
        self.record(entry).await
    }

    /// Log a lifecycle transition
    pub async fn log_status_change(&self, vote_id: Uuid, transition: &Transition) {
        if let Transition::Changed { from, to } = transition {
            let entry = Self::entry(
                "vote_status_changed",
                Some(vote_id),
                None,
                serde_json::json!({
                    "from": from.as_str(),
                    "to": to.as_str(),
                }),
            );
            self.record(entry).await
        }
    }

    /// Log vote settlement
    pub async fn log_vote_settled(&self, settlement: &Settlement) {
        let entry = Self::entry(
            "vote_settled",
            Some(settlement.vote_id),
            None,
            serde_json::json!({
                "correct_choice_ids": settlement
                    .options
                    .iter()
                    .map(|o| o.correct_choice_id.to_string())
                    .collect::<Vec<_>>(),
                "total_pool": settlement.total_pool,
                "winner_pool": settlement.winner_pool,
                "winner_count": settlement.winner_count,
                "distributed": settlement.distributed,
                "fee_retained": settlement.fee_retained,
            }),
        );
        self.record(entry).await
    }

    pub async fn log_vote_created(&self, vote: &Vote) {
        let entry = Self::entry(
            "vote_created",
            Some(vote.id),
            None,
            serde_json::json!({
                "title": vote.title,
                "status": vote.status.as_str(),
                "fee_rate": vote.fee_rate.to_string(),
                "end_at": vote.end_at.to_string(),
            }),
        );
        self.record(entry).await
    }

    pub async fn log_vote_deleted(&self, vote_id: Uuid) {
        let entry = Self::entry("vote_deleted", Some(vote_id), None, serde_json::json!({}));
        self.record(entry).await
    }

    /// Log vote cancellation with its refunds
    pub async fn log_vote_cancelled(&self, vote_id: Uuid, reason: &str, refunded: &[Bet]) {
        let entry = Self::entry(
            "vote_cancelled",
            Some(vote_id),
            None,
            serde_json::json!({
                "reason": reason,
                "refunded_bets": refunded.len(),
                "refunded_points": refunded.iter().map(|b| b.points_bet).sum::<i64>(),
            }),
        );
        self.record(entry).await
    }
}

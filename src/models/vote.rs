use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use std::fmt;
use uuid::Uuid;

/// Vote lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteStatus {
    Reviewing,
    Ongoing,
    Finished,
    Resolved,
    Rewarded,
    Cancelled,
}

impl VoteStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_uppercase().as_str() {
            "REVIEWING" => Ok(VoteStatus::Reviewing),
            "ONGOING" => Ok(VoteStatus::Ongoing),
            "FINISHED" => Ok(VoteStatus::Finished),
            "RESOLVED" => Ok(VoteStatus::Resolved),
            "REWARDED" => Ok(VoteStatus::Rewarded),
            "CANCELLED" => Ok(VoteStatus::Cancelled),
            _ => Err(format!("Invalid vote status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteStatus::Reviewing => "REVIEWING",
            VoteStatus::Ongoing => "ONGOING",
            VoteStatus::Finished => "FINISHED",
            VoteStatus::Resolved => "RESOLVED",
            VoteStatus::Rewarded => "REWARDED",
            VoteStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A betting market.
///
/// `total_points` and `total_participants` cache the sum and count of the
/// vote's active bets; they are maintained by the ledger and never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub issue_id: Option<Uuid>,
    pub title: String,
    pub status: VoteStatus,
    pub cancellation_reason: Option<String>,
    pub fee_rate: Decimal,
    pub total_points: i64,
    pub total_participants: i64,
    pub rewarded: bool,
    pub end_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Vote {
    /// Create a new Vote with empty counters
    pub fn new(
        title: String,
        status: VoteStatus,
        fee_rate: Decimal,
        end_at: NaiveDateTime,
        issue_id: Option<Uuid>,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            issue_id,
            title,
            status,
            cancellation_reason: None,
            fee_rate,
            total_points: 0,
            total_participants: 0,
            rewarded: false,
            end_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the vote accepts bets
    pub fn is_ongoing(&self) -> bool {
        self.status == VoteStatus::Ongoing
    }

    /// Check if the vote is past its end time
    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        self.end_at <= now
    }
}

impl<'r> FromRow<'r, PgRow> for Vote {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = VoteStatus::from_str(&status).map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: e.into(),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            issue_id: row.try_get("issue_id")?,
            title: row.try_get("title")?,
            status,
            cancellation_reason: row.try_get("cancellation_reason")?,
            fee_rate: row.try_get("fee_rate")?,
            total_points: row.try_get("total_points")?,
            total_participants: row.try_get("total_participants")?,
            rewarded: row.try_get("rewarded")?,
            end_at: row.try_get("end_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            VoteStatus::Reviewing,
            VoteStatus::Ongoing,
            VoteStatus::Finished,
            VoteStatus::Resolved,
            VoteStatus::Rewarded,
            VoteStatus::Cancelled,
        ] {
            assert_eq!(VoteStatus::from_str(status.as_str()), Ok(status));
        }
        assert_eq!(VoteStatus::from_str("ongoing"), Ok(VoteStatus::Ongoing));
        assert!(VoteStatus::from_str("closed").is_err());
    }

    #[test]
    fn test_new_vote_has_empty_counters() {
        let end_at = chrono::Utc::now().naive_utc();
        let vote = Vote::new(
            "Who wins?".into(),
            VoteStatus::Ongoing,
            Decimal::new(10, 2),
            end_at,
            None,
        );
        assert_eq!(vote.total_points, 0);
        assert_eq!(vote.total_participants, 0);
        assert!(!vote.rewarded);
        assert!(vote.is_ongoing());
        assert!(vote.is_overdue(end_at));
    }
}

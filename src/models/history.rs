//! Status history and settlement records

use super::VoteStatus;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// One lifecycle transition of a vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub vote_id: Uuid,
    pub status: VoteStatus,
    pub changed_at: NaiveDateTime,
}

impl StatusChange {
    pub fn now(vote_id: Uuid, status: VoteStatus) -> Self {
        Self {
            vote_id,
            status,
            changed_at: chrono::Utc::now().naive_utc(),
        }
    }
}

impl<'r> FromRow<'r, PgRow> for StatusChange {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = VoteStatus::from_str(&status).map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: e.into(),
        })?;

        Ok(Self {
            vote_id: row.try_get("vote_id")?,
            status,
            changed_at: row.try_get("changed_at")?,
        })
    }
}

/// Settlement record for a vote, written once in the settling transaction.
/// Totals span every option; `options` holds the per-option breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Settlement {
    pub vote_id: Uuid,
    pub total_pool: i64,
    pub winner_pool: i64,
    pub winner_count: i64,
    pub distributed: i64,
    pub fee_retained: i64,
    pub settled_at: NaiveDateTime,
    #[sqlx(skip)]
    pub options: Vec<OptionSettlement>,
}

impl Settlement {
    pub fn option(&self, option_id: Uuid) -> Option<&OptionSettlement> {
        self.options.iter().find(|o| o.option_id == option_id)
    }
}

/// How one option's pool was split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OptionSettlement {
    pub option_id: Uuid,
    pub correct_choice_id: Uuid,
    pub option_pool: i64,
    pub winner_pool: i64,
    pub winner_count: i64,
    pub distributed: i64,
    pub winner_odds: Option<Decimal>,
}

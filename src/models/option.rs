use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A sub-market of a vote ("Winner", "Margin"), aggregating its choices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VoteOption {
    pub id: Uuid,
    pub vote_id: Uuid,
    pub title: String,
    pub position: i32,
    pub points_total: i64,
    pub participants_count: i64,
    pub correct_choice_id: Option<Uuid>, // set on resolution
    pub created_at: NaiveDateTime,
}

impl VoteOption {
    pub fn new(vote_id: Uuid, title: String, position: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            vote_id,
            title,
            position,
            points_total: 0,
            participants_count: 0,
            correct_choice_id: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.correct_choice_id.is_some()
    }
}

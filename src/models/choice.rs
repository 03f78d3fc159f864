use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One selectable outcome of an option (YES / NO / DRAW)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Choice {
    pub id: Uuid,
    pub option_id: Uuid,
    pub text: String,
    pub position: i32,
    pub points_total: i64,
    pub participants_count: i64,
}

impl Choice {
    pub fn new(option_id: Uuid, text: String, position: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            option_id,
            text,
            position,
            points_total: 0,
            participants_count: 0,
        }
    }
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User account with its points balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub nickname: String,
    pub points: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    /// Create a new User with a starting balance
    pub fn new(nickname: String, points: i64) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            nickname,
            points,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_afford(&self, points: i64) -> bool {
        self.points >= points
    }
}

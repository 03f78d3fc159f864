use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user's participation in a vote.
///
/// Bets are never deleted. Cancellation flips `is_cancelled`; settlement
/// writes `reward_points` exactly once (the gross payout for a winner, zero
/// for a loser).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Bet {
    pub id: Uuid,
    pub vote_id: Uuid,
    pub option_id: Uuid,
    pub choice_id: Uuid,
    pub user_id: Uuid,
    pub points_bet: i64,
    pub is_cancelled: bool,
    pub reward_points: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Bet {
    /// Create a new Bet
    pub fn new(
        vote_id: Uuid,
        option_id: Uuid,
        choice_id: Uuid,
        user_id: Uuid,
        points_bet: i64,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            vote_id,
            option_id,
            choice_id,
            user_id,
            points_bet,
            is_cancelled: false,
            reward_points: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active bets count toward every aggregate
    pub fn is_active(&self) -> bool {
        !self.is_cancelled
    }

    pub fn is_settled(&self) -> bool {
        self.reward_points.is_some()
    }

    /// Validate that the stake is usable
    pub fn validate(&self) -> Result<(), String> {
        if self.points_bet <= 0 {
            return Err("Points must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// A bet joined with the vote/choice facts the read views need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    pub bet: Bet,
    pub vote_title: String,
    pub vote_status: super::VoteStatus,
    pub vote_end_at: NaiveDateTime,
    pub vote_created_at: NaiveDateTime,
    pub choice_text: String,
    /// Correct choice of the bet's option, once resolved
    pub correct_choice_id: Option<Uuid>,
}

impl BetRecord {
    /// `Some(true)` for a winning bet once the vote's result is known
    pub fn is_win(&self) -> Option<bool> {
        self.correct_choice_id
            .map(|correct| correct == self.bet.choice_id)
    }
}

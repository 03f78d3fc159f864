use crate::error::{AppError, AppResult};
use crate::ledger::LedgerStore;
use crate::models::{BetRecord, VoteStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Where a bet stands from its owner's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetOutcome {
    Pending,
    Win,
    Lose,
    Cancelled,
}

/// One row of a user's betting history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyBet {
    pub bet_id: Uuid,
    pub vote_id: Uuid,
    pub vote_title: String,
    pub vote_status: VoteStatus,
    pub choice_text: String,
    pub points_bet: i64,
    pub outcome: BetOutcome,
    /// Gross payout once paid; zero for cancelled bets
    pub reward_points: Option<i64>,
    /// Payout minus stake; zero for cancelled bets, `None` until paid
    pub net_reward: Option<i64>,
    pub vote_end_at: NaiveDateTime,
    pub placed_at: NaiveDateTime,
}

impl MyBet {
    pub fn from_record(record: &BetRecord) -> Self {
        let bet = &record.bet;
        let decided = matches!(record.vote_status, VoteStatus::Resolved | VoteStatus::Rewarded);

        let (outcome, reward_points, net_reward) = if bet.is_cancelled {
            (BetOutcome::Cancelled, Some(0), Some(0))
        } else if decided {
            let outcome = if record.is_win() == Some(true) {
                BetOutcome::Win
            } else {
                BetOutcome::Lose
            };
            // RESOLVED: result known, not yet paid
            let reward = if record.vote_status == VoteStatus::Rewarded {
                bet.reward_points
            } else {
                None
            };
            (outcome, reward, reward.map(|r| r - bet.points_bet))
        } else {
            (BetOutcome::Pending, None, None)
        };

        Self {
            bet_id: bet.id,
            vote_id: bet.vote_id,
            vote_title: record.vote_title.clone(),
            vote_status: record.vote_status,
            choice_text: record.choice_text.clone(),
            points_bet: bet.points_bet,
            outcome,
            reward_points,
            net_reward,
            vote_end_at: record.vote_end_at,
            placed_at: bet.created_at,
        }
    }
}

/// Aggregate betting record of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetStatistics {
    pub total_bets: i64,
    pub wins: i64,
    pub losses: i64,
    pub pending: i64,
    pub cancelled: i64,
    /// Wins over decided bets, in percent
    pub win_rate: f64,
    pub current_streak: i64,
    pub max_streak: i64,
    pub total_staked: i64,
    pub total_rewarded: i64,
    pub net_points: i64,
}

impl BetStatistics {
    pub fn from_bets(bets: &[MyBet]) -> Self {
        let count = |o: BetOutcome| bets.iter().filter(|b| b.outcome == o).count() as i64;
        let wins = count(BetOutcome::Win);
        let losses = count(BetOutcome::Lose);
        let decided = wins + losses;

        let win_rate = if decided > 0 {
            wins as f64 * 100.0 / decided as f64
        } else {
            0.0
        };

        // Decided bets in the order their votes closed
        let mut ordered: Vec<&MyBet> = bets
            .iter()
            .filter(|b| matches!(b.outcome, BetOutcome::Win | BetOutcome::Lose))
            .collect();
        ordered.sort_by_key(|b| (b.vote_end_at, b.placed_at));

        let mut max_streak: i64 = 0;
        let mut run: i64 = 0;
        for bet in &ordered {
            if bet.outcome == BetOutcome::Win {
                run += 1;
                max_streak = max_streak.max(run);
            } else {
                run = 0;
            }
        }
        let current_streak = ordered
            .iter()
            .rev()
            .take_while(|b| b.outcome == BetOutcome::Win)
            .count() as i64;

        Self {
            total_bets: bets.len() as i64,
            wins,
            losses,
            pending: count(BetOutcome::Pending),
            cancelled: count(BetOutcome::Cancelled),
            win_rate,
            current_streak,
            max_streak,
            total_staked: bets
                .iter()
                .filter(|b| b.outcome != BetOutcome::Cancelled)
                .map(|b| b.points_bet)
                .sum(),
            total_rewarded: bets.iter().filter_map(|b| b.reward_points).sum(),
            net_points: bets
                .iter()
                .filter(|b| b.outcome != BetOutcome::Cancelled)
                .filter_map(|b| b.net_reward)
                .sum(),
        }
    }
}

/// Per-user betting history and statistics
pub struct StatisticsService<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> StatisticsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn my_bets(&self, user_id: Uuid) -> AppResult<Vec<MyBet>> {
        if self.store.find_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {}", user_id)));
        }
        let records = self.store.bets_by_user(user_id).await?;
        Ok(records.iter().map(MyBet::from_record).collect())
    }

    pub async fn my_statistics(&self, user_id: Uuid) -> AppResult<BetStatistics> {
        let bets = self.my_bets(user_id).await?;
        Ok(BetStatistics::from_bets(&bets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bet;
    use chrono::Duration;

    fn record(status: VoteStatus, won: Option<bool>, reward: Option<i64>, end_offset: i64) -> BetRecord {
        let now = chrono::Utc::now().naive_utc();
        let mut bet = Bet::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 100);
        bet.reward_points = reward;
        let correct = won.map(|w| if w { bet.choice_id } else { Uuid::new_v4() });
        BetRecord {
            bet,
            vote_title: "vote".into(),
            vote_status: status,
            vote_end_at: now + Duration::hours(end_offset),
            vote_created_at: now,
            choice_text: "YES".into(),
            correct_choice_id: correct,
        }
    }

    #[test]
    fn test_outcomes() {
        let win = MyBet::from_record(&record(VoteStatus::Rewarded, Some(true), Some(120), 0));
        assert_eq!(win.outcome, BetOutcome::Win);
        assert_eq!(win.net_reward, Some(20));

        let lose = MyBet::from_record(&record(VoteStatus::Rewarded, Some(false), Some(0), 0));
        assert_eq!(lose.outcome, BetOutcome::Lose);
        assert_eq!(lose.net_reward, Some(-100));

        let known = MyBet::from_record(&record(VoteStatus::Resolved, Some(true), None, 0));
        assert_eq!(known.outcome, BetOutcome::Win);
        assert_eq!(known.reward_points, None);
        assert_eq!(known.net_reward, None);

        let pending = MyBet::from_record(&record(VoteStatus::Ongoing, None, None, 0));
        assert_eq!(pending.outcome, BetOutcome::Pending);

        let mut cancelled = record(VoteStatus::Ongoing, None, None, 0);
        cancelled.bet.is_cancelled = true;
        let cancelled = MyBet::from_record(&cancelled);
        assert_eq!(cancelled.outcome, BetOutcome::Cancelled);
        assert_eq!(cancelled.reward_points, Some(0));
        assert_eq!(cancelled.net_reward, Some(0));
    }

    #[test]
    fn test_streaks_follow_vote_end_order() {
        // W W L W W W, listed out of order
        let pattern = [(3, true), (0, true), (5, true), (1, true), (2, false), (4, true)];
        let bets: Vec<MyBet> = pattern
            .iter()
            .map(|(offset, won)| {
                let reward = if *won { 150 } else { 0 };
                MyBet::from_record(&record(VoteStatus::Rewarded, Some(*won), Some(reward), *offset))
            })
            .collect();

        let stats = BetStatistics::from_bets(&bets);
        assert_eq!(stats.wins, 5);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.max_streak, 3);
        assert_eq!(stats.current_streak, 3);
        assert!((stats.win_rate - 500.0 / 6.0).abs() < 1e-9);
        assert_eq!(stats.net_points, 5 * 50 - 100);
    }

    #[test]
    fn test_current_streak_broken_by_latest_loss() {
        let bets = vec![
            MyBet::from_record(&record(VoteStatus::Rewarded, Some(true), Some(200), 0)),
            MyBet::from_record(&record(VoteStatus::Rewarded, Some(true), Some(200), 1)),
            MyBet::from_record(&record(VoteStatus::Rewarded, Some(false), Some(0), 2)),
            MyBet::from_record(&record(VoteStatus::Ongoing, None, None, 3)),
        ];
        let stats = BetStatistics::from_bets(&bets);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.max_streak, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total_staked, 400);
    }

    #[test]
    fn test_empty_history() {
        let stats = BetStatistics::from_bets(&[]);
        assert_eq!(stats.total_bets, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.current_streak, 0);
    }
}

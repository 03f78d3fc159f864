//! The vote aggregate.
//!
//! A [`VoteBook`] is a vote together with its options, choices and every bet
//! placed on it. Stores hand out books under the vote lock; all mutation
//! happens here, in memory, and the store persists the result inside the same
//! transaction. Mutations record what they touched in [`PendingChanges`] so a
//! store can write only the affected rows.

use crate::error::{AppError, AppResult};
use crate::lifecycle::{self, Operation, Transition};
use crate::models::{
    Bet, Choice, OptionSettlement, Settlement, StatusChange, User, Vote, VoteOption, VoteStatus,
};
use crate::odds::PoolShare;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};
use uuid::Uuid;

/// How many active bets a user may hold on one vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationPolicy {
    #[default]
    SingleActiveBet,
    Multiple,
}

impl ParticipationPolicy {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "single" | "single_active_bet" => Ok(ParticipationPolicy::SingleActiveBet),
            "multiple" => Ok(ParticipationPolicy::Multiple),
            _ => Err(format!(
                "Invalid PARTICIPATION_POLICY: {}. Must be one of: single, multiple",
                s
            )),
        }
    }
}

/// Rows a mutation touched since the book was loaded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    pub inserted_bets: Vec<Uuid>,
    pub updated_bets: BTreeSet<Uuid>,
    pub status_changes: Vec<StatusChange>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.inserted_bets.is_empty()
            && self.updated_bets.is_empty()
            && self.status_changes.is_empty()
    }
}

/// Points and participant count of a set of active bets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub points: i64,
    pub participants: i64,
}

impl Tally {
    fn add(&mut self, points: i64) {
        self.points += points;
        self.participants += 1;
    }
}

/// Aggregates recomputed from active bets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub vote: Tally,
    pub options: HashMap<Uuid, Tally>,
    pub choices: HashMap<Uuid, Tally>,
}

impl PoolSnapshot {
    pub fn choice(&self, choice_id: Uuid) -> Tally {
        self.choices.get(&choice_id).copied().unwrap_or_default()
    }

    pub fn option(&self, option_id: Uuid) -> Tally {
        self.options.get(&option_id).copied().unwrap_or_default()
    }
}

/// A cached counter that disagreed with the bets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    pub scope: &'static str,
    pub id: Uuid,
    pub field: &'static str,
    pub cached: i64,
    pub actual: i64,
}

#[derive(Debug, Clone)]
pub struct VoteBook {
    pub vote: Vote,
    pub options: Vec<VoteOption>,
    pub choices: Vec<Choice>,
    pub bets: Vec<Bet>,
    pending: PendingChanges,
}

impl VoteBook {
    /// Assemble a book from stored rows
    pub fn load(
        vote: Vote,
        mut options: Vec<VoteOption>,
        mut choices: Vec<Choice>,
        mut bets: Vec<Bet>,
    ) -> Self {
        options.sort_by_key(|o| o.position);
        let option_rank: HashMap<Uuid, i32> = options.iter().map(|o| (o.id, o.position)).collect();
        choices.sort_by_key(|c| (option_rank.get(&c.option_id).copied(), c.position));
        bets.sort_by_key(|b| b.created_at);

        Self {
            vote,
            options,
            choices,
            bets,
            pending: PendingChanges::default(),
        }
    }

    /// A freshly created vote; its initial status is recorded as history
    pub fn create(vote: Vote, options: Vec<VoteOption>, choices: Vec<Choice>) -> Self {
        let mut book = Self::load(vote, options, choices, Vec::new());
        book.pending
            .status_changes
            .push(StatusChange::now(book.vote.id, book.vote.status));
        book
    }

    pub fn id(&self) -> Uuid {
        self.vote.id
    }

    pub fn status(&self) -> VoteStatus {
        self.vote.status
    }

    pub fn pending(&self) -> &PendingChanges {
        &self.pending
    }

    /// Drain the recorded changes once they are persisted
    pub fn take_pending(&mut self) -> PendingChanges {
        std::mem::take(&mut self.pending)
    }

    pub fn option(&self, option_id: Uuid) -> Option<&VoteOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    pub fn choice(&self, choice_id: Uuid) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }

    pub fn choices_of(&self, option_id: Uuid) -> impl Iterator<Item = &Choice> {
        self.choices.iter().filter(move |c| c.option_id == option_id)
    }

    pub fn bet(&self, bet_id: Uuid) -> Option<&Bet> {
        self.bets.iter().find(|b| b.id == bet_id)
    }

    pub fn active_bets(&self) -> impl Iterator<Item = &Bet> {
        self.bets.iter().filter(|b| b.is_active())
    }

    pub fn active_bet_of(&self, user_id: Uuid) -> Option<&Bet> {
        self.active_bets().find(|b| b.user_id == user_id)
    }

    /// Distinct users holding active bets, ascending (the lock order)
    pub fn bettor_ids(&self) -> Vec<Uuid> {
        let ids: BTreeSet<Uuid> = self.active_bets().map(|b| b.user_id).collect();
        ids.into_iter().collect()
    }

    /// Live share of a choice in its option's pool, from the cached counters
    pub fn pool_share(&self, choice_id: Uuid) -> AppResult<PoolShare> {
        let choice = self
            .choice(choice_id)
            .ok_or_else(|| AppError::NotFound(format!("Choice {} in vote {}", choice_id, self.id())))?;
        let option_pool = self.option(choice.option_id).map_or(0, |o| o.points_total);
        Ok(PoolShare::new(option_pool, choice.points_total)?)
    }

    /// Every option has its correct choice recorded
    pub fn is_fully_resolved(&self) -> bool {
        self.options.iter().all(|o| o.is_resolved())
    }

    /// A bet wins when its choice is the correct choice of its option
    pub fn is_winning(&self, bet: &Bet) -> bool {
        self.option(bet.option_id)
            .and_then(|o| o.correct_choice_id)
            .map_or(false, |correct| correct == bet.choice_id)
    }

    /// Recompute every aggregate from the active bets
    pub fn recompute(&self) -> PoolSnapshot {
        let mut snapshot = PoolSnapshot::default();
        for bet in self.active_bets() {
            snapshot.vote.add(bet.points_bet);
            snapshot.options.entry(bet.option_id).or_default().add(bet.points_bet);
            snapshot.choices.entry(bet.choice_id).or_default().add(bet.points_bet);
        }
        snapshot
    }

    /// Every bet must point at a choice of this vote under the right option
    pub fn check_integrity(&self) -> AppResult<()> {
        for bet in &self.bets {
            match self.choice(bet.choice_id) {
                Some(choice) if choice.option_id == bet.option_id && bet.vote_id == self.id() => {}
                _ => {
                    return Err(AppError::ConsistencyAnomaly(format!(
                        "Bet {} references choice {} outside vote {}",
                        bet.id,
                        bet.choice_id,
                        self.id()
                    )))
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // PARTICIPATION
    // =========================================================================

    /// Debit the user, record the bet and raise every counter on its path
    pub fn place_bet(
        &mut self,
        user: &mut User,
        choice_id: Uuid,
        points: i64,
        policy: ParticipationPolicy,
    ) -> AppResult<Bet> {
        if points <= 0 {
            return Err(AppError::Validation(
                "Points must be greater than zero".to_string(),
            ));
        }
        lifecycle::ensure_allowed(self.vote.status, Operation::PlaceBet)?;

        let option_id = self
            .choice(choice_id)
            .map(|c| c.option_id)
            .ok_or_else(|| AppError::NotFound(format!("Choice {} in vote {}", choice_id, self.id())))?;

        if policy == ParticipationPolicy::SingleActiveBet && self.active_bet_of(user.id).is_some() {
            return Err(AppError::DuplicateParticipation {
                vote_id: self.id(),
                user_id: user.id,
            });
        }

        if !user.can_afford(points) {
            return Err(AppError::InsufficientBalance {
                available: user.points,
                required: points,
            });
        }

        let bet = Bet::new(self.id(), option_id, choice_id, user.id, points);
        bet.validate().map_err(AppError::Validation)?;

        user.points -= points;
        user.updated_at = bet.created_at;

        if let Some(choice) = self.choices.iter_mut().find(|c| c.id == choice_id) {
            choice.points_total += points;
            choice.participants_count += 1;
        }
        if let Some(option) = self.options.iter_mut().find(|o| o.id == option_id) {
            option.points_total += points;
            option.participants_count += 1;
        }
        self.vote.total_points += points;
        self.vote.total_participants += 1;
        self.vote.updated_at = bet.created_at;

        self.pending.inserted_bets.push(bet.id);
        self.bets.push(bet.clone());
        Ok(bet)
    }

    /// Refund the stake and lower every counter on the bet's path.
    ///
    /// Counters never go below zero; a decrement that would is clamped and
    /// logged as a consistency anomaly.
    pub fn cancel_bet(&mut self, bet_id: Uuid, user: &mut User) -> AppResult<Bet> {
        let bet = self
            .bet(bet_id)
            .ok_or_else(|| AppError::NotFound(format!("Bet {}", bet_id)))?;
        if bet.user_id != user.id {
            return Err(AppError::Unauthorized(format!(
                "Bet {} does not belong to user {}",
                bet_id, user.id
            )));
        }
        if bet.is_cancelled {
            return Err(AppError::AlreadyProcessed(format!("Bet {} is already cancelled", bet_id)));
        }
        lifecycle::ensure_allowed(self.vote.status, Operation::CancelBet)?;

        let (option_id, choice_id, points) = (bet.option_id, bet.choice_id, bet.points_bet);
        let vote_id = self.id();
        let now = chrono::Utc::now().naive_utc();

        user.points = user
            .points
            .checked_add(points)
            .ok_or_else(|| AppError::ConsistencyAnomaly(format!("Balance overflow for user {}", user.id)))?;
        user.updated_at = now;

        if let Some(choice) = self.choices.iter_mut().find(|c| c.id == choice_id) {
            decrement(&mut choice.points_total, points, vote_id, "choice.points_total");
            decrement(&mut choice.participants_count, 1, vote_id, "choice.participants_count");
        }
        if let Some(option) = self.options.iter_mut().find(|o| o.id == option_id) {
            decrement(&mut option.points_total, points, vote_id, "option.points_total");
            decrement(&mut option.participants_count, 1, vote_id, "option.participants_count");
        }
        decrement(&mut self.vote.total_points, points, vote_id, "vote.total_points");
        decrement(&mut self.vote.total_participants, 1, vote_id, "vote.total_participants");
        self.vote.updated_at = now;

        let bet = self
            .bets
            .iter_mut()
            .find(|b| b.id == bet_id)
            .ok_or_else(|| AppError::NotFound(format!("Bet {}", bet_id)))?;
        bet.is_cancelled = true;
        bet.updated_at = now;
        let cancelled = bet.clone();
        self.mark_updated(bet_id);

        Ok(cancelled)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    fn transition(&mut self, operation: Operation) -> AppResult<Transition> {
        lifecycle::ensure_allowed(self.vote.status, operation)?;
        let from = self.vote.status;
        let to = operation.target().ok_or_else(|| {
            AppError::Message(format!("{} does not change vote status", operation))
        })?;

        self.vote.status = to;
        self.vote.updated_at = chrono::Utc::now().naive_utc();
        self.pending.status_changes.push(StatusChange::now(self.id(), to));
        debug!(vote_id = %self.id(), %from, %to, "vote status changed");

        Ok(Transition::Changed { from, to })
    }

    /// REVIEWING -> ONGOING
    pub fn open(&mut self) -> AppResult<Transition> {
        self.transition(Operation::OpenVote)
    }

    /// ONGOING -> FINISHED; repeat requests past that point change nothing
    pub fn finish(&mut self) -> AppResult<Transition> {
        if lifecycle::is_past_finish(self.vote.status) {
            return Ok(Transition::Unchanged(self.vote.status));
        }
        self.transition(Operation::FinishVote)
    }

    /// Record correct choices on their options. The vote moves FINISHED ->
    /// RESOLVED once every option has one; until then it stays FINISHED and
    /// further options can be resolved.
    ///
    /// All choices are checked before any is recorded.
    pub fn resolve(&mut self, correct_choice_ids: &[Uuid]) -> AppResult<Transition> {
        lifecycle::ensure_allowed(self.vote.status, Operation::ResolveVote)?;
        if correct_choice_ids.is_empty() {
            return Err(AppError::Validation(
                "At least one correct choice is required".to_string(),
            ));
        }

        let mut answers: Vec<(Uuid, Uuid)> = Vec::with_capacity(correct_choice_ids.len());
        for &choice_id in correct_choice_ids {
            let option = self
                .choice(choice_id)
                .and_then(|c| self.option(c.option_id))
                .ok_or_else(|| {
                    AppError::NotFound(format!("Choice {} in vote {}", choice_id, self.id()))
                })?;
            if option.is_resolved() {
                return Err(AppError::AlreadyProcessed(format!(
                    "Option {} of vote {} is already resolved",
                    option.id,
                    self.id()
                )));
            }
            if answers.iter().any(|(option_id, _)| *option_id == option.id) {
                return Err(AppError::Validation(format!(
                    "Option {} is given more than one correct choice",
                    option.id
                )));
            }
            answers.push((option.id, choice_id));
        }

        for (option_id, choice_id) in answers {
            if let Some(option) = self.options.iter_mut().find(|o| o.id == option_id) {
                option.correct_choice_id = Some(choice_id);
            }
        }
        self.vote.updated_at = chrono::Utc::now().naive_utc();

        if !self.is_fully_resolved() {
            debug!(vote_id = %self.id(), "vote partially resolved");
            return Ok(Transition::Unchanged(self.vote.status));
        }
        self.transition(Operation::ResolveVote)
    }

    /// Pay winners out of their option's pool and mark the vote REWARDED.
    ///
    /// `users` must hold every bettor of the vote, locked. Pools come from the
    /// active bets, not the cached counters. A winning bet takes
    /// `floor(stake * option_pool * (1 - fee) / winning_pool)`, so the fee
    /// absorbs rounding and no option pays out more than `pool * (1 - fee)`.
    pub fn settle(&mut self, users: &mut HashMap<Uuid, User>) -> AppResult<Settlement> {
        if self.vote.rewarded || self.vote.status == VoteStatus::Rewarded {
            return Err(AppError::AlreadyProcessed(format!(
                "Vote {} is already settled",
                self.id()
            )));
        }
        lifecycle::ensure_allowed(self.vote.status, Operation::SettleVote)?;
        self.check_integrity()?;

        let snapshot = self.recompute();
        if snapshot.vote.points != self.vote.total_points
            || snapshot.vote.participants != self.vote.total_participants
        {
            warn!(
                vote_id = %self.id(),
                cached_points = self.vote.total_points,
                actual_points = snapshot.vote.points,
                "Consistency anomaly: cached pool differs from bets, settling on bets"
            );
        }

        let mut outcomes = Vec::with_capacity(self.options.len());
        for option in &self.options {
            let correct = option.correct_choice_id.ok_or_else(|| {
                AppError::ConsistencyAnomaly(format!(
                    "Option {} of vote {} is resolved without a choice",
                    option.id,
                    self.id()
                ))
            })?;
            let share = PoolShare::new(snapshot.option(option.id).points, snapshot.choice(correct).points)?;
            outcomes.push(OptionSettlement {
                option_id: option.id,
                correct_choice_id: correct,
                option_pool: share.total_pool,
                winner_pool: share.choice_pool,
                winner_count: 0,
                distributed: 0,
                winner_odds: share.odds_decimal(),
            });
        }

        let fee_rate = self.vote.fee_rate;
        let mut rewards = Vec::new();
        for bet in self.active_bets() {
            let outcome = outcomes
                .iter_mut()
                .find(|o| o.option_id == bet.option_id)
                .ok_or_else(|| {
                    AppError::ConsistencyAnomaly(format!("Bet {} has no option in vote {}", bet.id, self.vote.id))
                })?;
            let reward = if self.is_winning(bet) {
                let reward = PoolShare::new(outcome.option_pool, outcome.winner_pool)?
                    .payout(bet.points_bet, fee_rate)?
                    .ok_or_else(|| {
                        AppError::ConsistencyAnomaly(format!("Winning bet {} has an empty pool", bet.id))
                    })?;
                outcome.winner_count += 1;
                outcome.distributed += reward;
                reward
            } else {
                0
            };
            rewards.push((bet.id, bet.user_id, reward));
        }

        let now = chrono::Utc::now().naive_utc();
        for (bet_id, user_id, reward) in rewards {
            let user = users.get_mut(&user_id).ok_or_else(|| {
                AppError::ConsistencyAnomaly(format!("Bettor {} was not locked for settlement", user_id))
            })?;
            user.points = user.points.checked_add(reward).ok_or_else(|| {
                AppError::ConsistencyAnomaly(format!("Balance overflow for user {}", user_id))
            })?;
            user.updated_at = now;

            if let Some(bet) = self.bets.iter_mut().find(|b| b.id == bet_id) {
                bet.reward_points = Some(reward);
                bet.updated_at = now;
            }
            self.mark_updated(bet_id);
        }

        let total_pool = snapshot.vote.points;
        let distributed: i64 = outcomes.iter().map(|o| o.distributed).sum();

        self.vote.rewarded = true;
        self.transition(Operation::SettleVote)?;

        Ok(Settlement {
            vote_id: self.id(),
            total_pool,
            winner_pool: outcomes.iter().map(|o| o.winner_pool).sum(),
            winner_count: outcomes.iter().map(|o| o.winner_count).sum(),
            distributed,
            fee_retained: total_pool - distributed,
            settled_at: now,
            options: outcomes,
        })
    }

    /// Refund every active bet in full, zero the counters and mark the vote
    /// CANCELLED. Returns the refunded bets.
    pub fn cancel(&mut self, reason: &str, users: &mut HashMap<Uuid, User>) -> AppResult<Vec<Bet>> {
        lifecycle::ensure_allowed(self.vote.status, Operation::CancelVote)?;

        let now = chrono::Utc::now().naive_utc();
        let mut refunded = Vec::new();
        for bet in self.bets.iter_mut().filter(|b| !b.is_cancelled) {
            let user = users.get_mut(&bet.user_id).ok_or_else(|| {
                AppError::ConsistencyAnomaly(format!("Bettor {} was not locked for refund", bet.user_id))
            })?;
            user.points = user.points.checked_add(bet.points_bet).ok_or_else(|| {
                AppError::ConsistencyAnomaly(format!("Balance overflow for user {}", user.id))
            })?;
            user.updated_at = now;

            bet.is_cancelled = true;
            bet.updated_at = now;
            refunded.push(bet.clone());
        }
        for bet in &refunded {
            self.mark_updated(bet.id);
        }

        for option in &mut self.options {
            option.points_total = 0;
            option.participants_count = 0;
        }
        for choice in &mut self.choices {
            choice.points_total = 0;
            choice.participants_count = 0;
        }
        self.vote.total_points = 0;
        self.vote.total_participants = 0;
        self.vote.cancellation_reason = Some(reason.to_string());

        self.transition(Operation::CancelVote)?;
        Ok(refunded)
    }

    /// Rewrite cached counters from the bets, returning every disagreement
    pub fn reconcile(&mut self) -> Vec<CounterDrift> {
        let snapshot = self.recompute();
        let mut drifts = Vec::new();

        let vote_id = self.vote.id;
        fix(&mut drifts, "vote", vote_id, "total_points", &mut self.vote.total_points, snapshot.vote.points);
        fix(
            &mut drifts,
            "vote",
            vote_id,
            "total_participants",
            &mut self.vote.total_participants,
            snapshot.vote.participants,
        );

        for option in &mut self.options {
            let actual = snapshot.option(option.id);
            fix(&mut drifts, "option", option.id, "points_total", &mut option.points_total, actual.points);
            fix(
                &mut drifts,
                "option",
                option.id,
                "participants_count",
                &mut option.participants_count,
                actual.participants,
            );
        }

        for choice in &mut self.choices {
            let actual = snapshot.choice(choice.id);
            fix(&mut drifts, "choice", choice.id, "points_total", &mut choice.points_total, actual.points);
            fix(
                &mut drifts,
                "choice",
                choice.id,
                "participants_count",
                &mut choice.participants_count,
                actual.participants,
            );
        }

        if !drifts.is_empty() {
            self.vote.updated_at = chrono::Utc::now().naive_utc();
        }
        drifts
    }

    fn mark_updated(&mut self, bet_id: Uuid) {
        if !self.pending.inserted_bets.contains(&bet_id) {
            self.pending.updated_bets.insert(bet_id);
        }
    }
}

fn decrement(counter: &mut i64, by: i64, vote_id: Uuid, name: &str) {
    if *counter < by {
        warn!(
            %vote_id,
            counter = name,
            cached = *counter,
            decrement = by,
            "Consistency anomaly: counter would go negative, clamping to zero"
        );
        *counter = 0;
    } else {
        *counter -= by;
    }
}

fn fix(
    drifts: &mut Vec<CounterDrift>,
    scope: &'static str,
    id: Uuid,
    field: &'static str,
    cached: &mut i64,
    actual: i64,
) {
    if *cached != actual {
        drifts.push(CounterDrift {
            scope,
            id,
            field,
            cached: *cached,
            actual,
        });
        *cached = actual;
    }
}

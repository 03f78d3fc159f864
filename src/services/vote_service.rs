use crate::error::{AppError, AppResult};
use crate::ledger::{LedgerStore, LedgerTx, VoteBook};
use crate::lifecycle::{self, Operation};
use crate::models::{Bet, Choice, StatusChange, Vote, VoteOption, VoteStatus};
use crate::odds::{validate_fee_rate, PoolShare};
use crate::services::AuditTrailService;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Live view of one choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceView {
    pub id: Uuid,
    pub text: String,
    pub points_total: i64,
    pub participants_count: i64,
    pub odds: Option<f64>,
    pub percentage: f64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: Uuid,
    pub title: String,
    pub points_total: i64,
    pub participants_count: i64,
    pub correct_choice_id: Option<Uuid>,
    pub choices: Vec<ChoiceView>,
}

/// Everything a client needs to render a vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteDetail {
    pub id: Uuid,
    pub title: String,
    pub status: VoteStatus,
    pub fee_rate: Decimal,
    pub total_points: i64,
    pub total_participants: i64,
    pub rewarded: bool,
    pub cancellation_reason: Option<String>,
    pub end_at: NaiveDateTime,
    pub options: Vec<OptionView>,
    /// The viewer's active bet, if any
    pub my_bet: Option<Bet>,
}

impl VoteDetail {
    pub fn from_book(book: &VoteBook, viewer: Option<Uuid>) -> Self {
        let options = book
            .options
            .iter()
            .map(|option| OptionView {
                id: option.id,
                title: option.title.clone(),
                points_total: option.points_total,
                participants_count: option.participants_count,
                correct_choice_id: option.correct_choice_id,
                choices: book
                    .choices_of(option.id)
                    .map(|choice| {
                        let share = PoolShare {
                            total_pool: option.points_total,
                            choice_pool: choice.points_total,
                        };
                        ChoiceView {
                            id: choice.id,
                            text: choice.text.clone(),
                            points_total: choice.points_total,
                            participants_count: choice.participants_count,
                            odds: share.odds(),
                            percentage: share.percentage(),
                            is_correct: option.correct_choice_id == Some(choice.id),
                        }
                    })
                    .collect(),
            })
            .collect();

        Self {
            id: book.vote.id,
            title: book.vote.title.clone(),
            status: book.vote.status,
            fee_rate: book.vote.fee_rate,
            total_points: book.vote.total_points,
            total_participants: book.vote.total_participants,
            rewarded: book.vote.rewarded,
            cancellation_reason: book.vote.cancellation_reason.clone(),
            end_at: book.vote.end_at,
            options,
            my_bet: viewer.and_then(|user_id| book.active_bet_of(user_id).cloned()),
        }
    }

    pub fn choice(&self, choice_id: Uuid) -> Option<&ChoiceView> {
        self.options
            .iter()
            .flat_map(|o| o.choices.iter())
            .find(|c| c.id == choice_id)
    }
}

/// Odds of one choice on the board, against its option's pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOdds {
    pub option_id: Uuid,
    pub choice_id: Uuid,
    pub text: String,
    pub option_pool: i64,
    pub pool: i64,
    pub odds: Option<f64>,
}

/// What a bet would return if placed now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetPreview {
    pub vote_id: Uuid,
    pub choice_id: Uuid,
    pub points: i64,
    pub current_odds: Option<f64>,
    pub expected_odds: Option<f64>,
    pub expected_payout: i64,
    pub expected_net: i64,
}

/// Input for a new option
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOption {
    pub title: String,
    pub choices: Vec<String>,
}

/// Input for a new vote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVote {
    pub title: String,
    pub issue_id: Option<Uuid>,
    pub end_at: NaiveDateTime,
    pub fee_rate: Option<Decimal>,
    pub initial_status: VoteStatus,
    pub options: Vec<NewOption>,
}

impl NewVote {
    /// Validate the request
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Vote title cannot be empty".to_string());
        }
        if !matches!(self.initial_status, VoteStatus::Reviewing | VoteStatus::Ongoing) {
            return Err(format!(
                "A vote must start REVIEWING or ONGOING, not {}",
                self.initial_status
            ));
        }
        if self.options.is_empty() {
            return Err("A vote needs at least one option".to_string());
        }
        for option in &self.options {
            if option.title.trim().is_empty() {
                return Err("Option title cannot be empty".to_string());
            }
            if option.choices.len() < 2 {
                return Err(format!("Option '{}' needs at least two choices", option.title));
            }
            let mut seen = HashSet::new();
            for text in &option.choices {
                let text = text.trim();
                if text.is_empty() {
                    return Err(format!("Option '{}' has an empty choice", option.title));
                }
                if !seen.insert(text.to_lowercase()) {
                    return Err(format!("Option '{}' repeats choice '{}'", option.title, text));
                }
            }
        }
        Ok(())
    }
}

/// Vote administration and read projections
pub struct VoteService<S: LedgerStore> {
    store: Arc<S>,
    default_fee_rate: Decimal,
    audit: Option<Arc<AuditTrailService>>,
}

impl<S: LedgerStore> VoteService<S> {
    pub fn new(store: Arc<S>, default_fee_rate: Decimal) -> Self {
        Self {
            store,
            default_fee_rate,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditTrailService>) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn book(&self, vote_id: Uuid) -> AppResult<VoteBook> {
        self.store
            .load_book(vote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vote {}", vote_id)))
    }

    /// Create a vote with its options and choices
    pub async fn create_vote(&self, request: NewVote) -> AppResult<VoteDetail> {
        request.validate().map_err(AppError::Validation)?;
        let fee_rate = validate_fee_rate(request.fee_rate.unwrap_or(self.default_fee_rate))?;

        let vote = Vote::new(
            request.title.trim().to_string(),
            request.initial_status,
            fee_rate,
            request.end_at,
            request.issue_id,
        );

        let mut options = Vec::new();
        let mut choices = Vec::new();
        for (i, new_option) in request.options.iter().enumerate() {
            let option = VoteOption::new(vote.id, new_option.title.trim().to_string(), i as i32);
            for (j, text) in new_option.choices.iter().enumerate() {
                choices.push(Choice::new(option.id, text.trim().to_string(), j as i32));
            }
            options.push(option);
        }

        let mut book = VoteBook::create(vote, options, choices);
        let mut tx = self.store.begin().await?;
        tx.insert_book(&mut book).await?;
        tx.commit().await?;

        info!(
            "Vote {} created ({}, {} options)",
            book.id(),
            book.status(),
            book.options.len()
        );
        if let Some(audit) = &self.audit {
            audit.log_vote_created(&book.vote).await;
        }
        Ok(VoteDetail::from_book(&book, None))
    }

    /// Delete a vote that never took a bet
    pub async fn delete_vote(&self, vote_id: Uuid) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let book = tx
            .lock_book(vote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vote {}", vote_id)))?;

        lifecycle::ensure_allowed(book.status(), Operation::DeleteVote)?;
        if !book.bets.is_empty() {
            return Err(AppError::InvalidState {
                status: book.status(),
                operation: Operation::DeleteVote,
            });
        }

        tx.delete_book(vote_id).await?;
        tx.commit().await?;

        info!("Vote {} deleted", vote_id);
        if let Some(audit) = &self.audit {
            audit.log_vote_deleted(vote_id).await;
        }
        Ok(())
    }

    pub async fn vote_detail(&self, vote_id: Uuid, viewer: Option<Uuid>) -> AppResult<VoteDetail> {
        let book = self.book(vote_id).await?;
        Ok(VoteDetail::from_book(&book, viewer))
    }

    /// Current odds of every choice; `None` where nobody has bet yet
    pub async fn odds_board(&self, vote_id: Uuid) -> AppResult<Vec<ChoiceOdds>> {
        let book = self.book(vote_id).await?;
        book.choices
            .iter()
            .map(|choice| {
                let share = book.pool_share(choice.id)?;
                Ok(ChoiceOdds {
                    option_id: choice.option_id,
                    choice_id: choice.id,
                    text: choice.text.clone(),
                    option_pool: share.total_pool,
                    pool: choice.points_total,
                    odds: share.odds(),
                })
            })
            .collect()
    }

    /// Odds and payout the bet would get if it were placed now and won.
    /// Later bets move the pool, so settlement may differ.
    pub async fn preview_bet(&self, vote_id: Uuid, choice_id: Uuid, points: i64) -> AppResult<BetPreview> {
        if points <= 0 {
            return Err(AppError::Validation(
                "Points must be greater than zero".to_string(),
            ));
        }
        let book = self.book(vote_id).await?;
        lifecycle::ensure_allowed(book.status(), Operation::PlaceBet)?;

        let current = book.pool_share(choice_id)?;
        let expected = current.with_stake(points)?;
        let payout = expected
            .payout(points, book.vote.fee_rate)?
            .ok_or_else(|| AppError::ConsistencyAnomaly("Preview pool is empty".to_string()))?;

        Ok(BetPreview {
            vote_id,
            choice_id,
            points,
            current_odds: current.odds(),
            expected_odds: expected.odds(),
            expected_payout: payout,
            expected_net: payout - points,
        })
    }

    pub async fn status_history(&self, vote_id: Uuid) -> AppResult<Vec<StatusChange>> {
        // Distinguish unknown votes from votes without history
        self.book(vote_id).await?;
        self.store.status_history(vote_id).await
    }
}

#![allow(dead_code)]

use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use votepool_backend::config::LedgerConfig;
use votepool_backend::ledger::{LedgerStore, MemoryLedger, ParticipationPolicy};
use votepool_backend::models::{User, VoteStatus};
use votepool_backend::services::{NewOption, NewVote, VoteDetail};
use votepool_backend::AppState;

/// Services over a fresh in-memory ledger
pub struct TestLedger {
    pub store: Arc<MemoryLedger>,
    pub app: AppState<MemoryLedger>,
}

impl TestLedger {
    pub fn new() -> Self {
        Self::with_policy(ParticipationPolicy::SingleActiveBet)
    }

    pub fn with_policy(policy: ParticipationPolicy) -> Self {
        let store = Arc::new(MemoryLedger::new());
        let config = LedgerConfig {
            participation_policy: policy,
            ..LedgerConfig::default()
        };
        let app = AppState::new(store.clone(), &config, None);
        Self { store, app }
    }

    pub async fn user(&self, nickname: &str, points: i64) -> User {
        self.store
            .create_user(nickname, points)
            .await
            .expect("Failed to create test user")
    }

    pub async fn balance(&self, user_id: Uuid) -> i64 {
        self.store
            .find_user(user_id)
            .await
            .expect("Failed to load user")
            .expect("User should exist")
            .points
    }

    /// Sum of every user's balance
    pub async fn total_balance(&self) -> i64 {
        self.store.users().await.iter().map(|u| u.points).sum()
    }

    /// ONGOING single-option vote ending in an hour
    pub async fn ongoing_vote(&self, choices: &[&str]) -> TestVote {
        self.create_vote(new_vote(choices, VoteStatus::Ongoing, hours_from_now(1))).await
    }

    pub async fn create_vote(&self, request: NewVote) -> TestVote {
        let detail = self
            .app
            .votes
            .create_vote(request)
            .await
            .expect("Failed to create test vote");
        TestVote::from_detail(detail)
    }

    pub async fn place(&self, vote: &TestVote, choice: usize, user: &User, points: i64) -> VoteDetail {
        self.app
            .participation
            .place_bet(vote.id, vote.choices[choice], user.id, points)
            .await
            .expect("Failed to place test bet")
    }

    pub async fn detail(&self, vote_id: Uuid) -> VoteDetail {
        self.app
            .votes
            .vote_detail(vote_id, None)
            .await
            .expect("Failed to load vote")
    }

    /// Move an ONGOING vote to FINISHED
    pub async fn finish(&self, vote: &TestVote) {
        self.app
            .settlement
            .finish_vote(vote.id)
            .await
            .expect("Failed to finish vote");
    }
}

/// Ids of a created vote. `choices` are the first option's, in creation
/// order; `options` lists every option with its choices.
pub struct TestVote {
    pub id: Uuid,
    pub option_id: Uuid,
    pub choices: Vec<Uuid>,
    pub options: Vec<(Uuid, Vec<Uuid>)>,
}

impl TestVote {
    pub fn from_detail(detail: VoteDetail) -> Self {
        let options: Vec<(Uuid, Vec<Uuid>)> = detail
            .options
            .iter()
            .map(|o| (o.id, o.choices.iter().map(|c| c.id).collect()))
            .collect();
        let (option_id, choices) = options[0].clone();
        Self {
            id: detail.id,
            option_id,
            choices,
            options,
        }
    }

    /// Choice `choice` of option `option`
    pub fn choice(&self, option: usize, choice: usize) -> Uuid {
        self.options[option].1[choice]
    }
}

pub fn hours_from_now(hours: i64) -> NaiveDateTime {
    chrono::Utc::now().naive_utc() + Duration::hours(hours)
}

pub fn new_vote(choices: &[&str], status: VoteStatus, end_at: NaiveDateTime) -> NewVote {
    NewVote {
        title: "Who wins the derby?".to_string(),
        issue_id: None,
        end_at,
        fee_rate: Some(Decimal::new(10, 2)),
        initial_status: status,
        options: vec![NewOption {
            title: "Winner".to_string(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }],
    }
}

/// ONGOING vote with two options: Winner {Home, Away} and Margin {Big, Small}
pub fn match_vote() -> NewVote {
    let mut request = new_vote(&["Home", "Away"], VoteStatus::Ongoing, hours_from_now(1));
    request.options.push(NewOption {
        title: "Margin".to_string(),
        choices: vec!["Big".to_string(), "Small".to_string()],
    });
    request
}

/// Cached counters at every level must equal the sums over active bets
pub async fn assert_counters_consistent(ledger: &TestLedger, vote_id: Uuid) {
    let book = ledger
        .store
        .load_book(vote_id)
        .await
        .expect("Failed to load book")
        .expect("Vote should exist");
    let snapshot = book.recompute();

    assert_eq!(book.vote.total_points, snapshot.vote.points, "vote points");
    assert_eq!(
        book.vote.total_participants, snapshot.vote.participants,
        "vote participants"
    );
    for option in &book.options {
        let actual = snapshot.option(option.id);
        assert_eq!(option.points_total, actual.points, "option points");
        assert_eq!(option.participants_count, actual.participants, "option participants");
    }
    for choice in &book.choices {
        let actual = snapshot.choice(choice.id);
        assert_eq!(choice.points_total, actual.points, "choice points");
        assert_eq!(choice.participants_count, actual.participants, "choice participants");
    }
}

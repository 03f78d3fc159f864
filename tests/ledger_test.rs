mod helpers;

use futures::future::join_all;
use helpers::*;
use votepool_backend::ledger::{LedgerStore, LedgerTx, ParticipationPolicy};
use votepool_backend::lifecycle::Operation;
use votepool_backend::models::VoteStatus;
use votepool_backend::services::BetOutcome;
use votepool_backend::AppError;

#[tokio::test]
async fn test_place_bet_updates_balance_and_counters() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 1_000).await;

    let detail = ledger.place(&vote, 0, &alice, 250).await;

    assert_eq!(ledger.balance(alice.id).await, 750);
    assert_eq!(detail.total_points, 250);
    assert_eq!(detail.total_participants, 1);
    assert_eq!(detail.options[0].points_total, 250);

    let choice = detail.choice(vote.choices[0]).unwrap();
    assert_eq!(choice.points_total, 250);
    assert_eq!(choice.participants_count, 1);
    assert_eq!(choice.odds, Some(1.0));

    let my_bet = detail.my_bet.expect("viewer should see their bet");
    assert_eq!(my_bet.points_bet, 250);
    assert_eq!(my_bet.choice_id, vote.choices[0]);

    assert_counters_consistent(&ledger, vote.id).await;
}

#[tokio::test]
async fn test_counters_match_bets_after_mixed_operations() {
    let ledger = TestLedger::with_policy(ParticipationPolicy::Multiple);
    let vote = ledger.ongoing_vote(&["A", "B", "C"]).await;
    let alice = ledger.user("alice", 1_000).await;
    let bob = ledger.user("bob", 1_000).await;

    let first = ledger.place(&vote, 0, &alice, 100).await.my_bet.unwrap();
    ledger.place(&vote, 1, &bob, 40).await;
    ledger.place(&vote, 2, &alice, 60).await;
    assert_counters_consistent(&ledger, vote.id).await;

    ledger
        .app
        .participation
        .cancel_bet(first.id, alice.id)
        .await
        .unwrap();
    assert_counters_consistent(&ledger, vote.id).await;

    ledger.place(&vote, 0, &bob, 15).await;
    assert_counters_consistent(&ledger, vote.id).await;

    let detail = ledger.detail(vote.id).await;
    assert_eq!(detail.total_points, 115);
    assert_eq!(detail.total_participants, 3);
    assert_eq!(ledger.balance(alice.id).await, 940);
    assert_eq!(ledger.balance(bob.id).await, 945);
}

#[tokio::test]
async fn test_cancel_restores_state_before_bet() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 500).await;
    let bob = ledger.user("bob", 500).await;
    ledger.place(&vote, 1, &bob, 80).await;

    let before = ledger.detail(vote.id).await;

    let bet = ledger.place(&vote, 0, &alice, 120).await.my_bet.unwrap();
    let after_cancel = ledger
        .app
        .participation
        .cancel_bet(bet.id, alice.id)
        .await
        .unwrap();

    assert_eq!(ledger.balance(alice.id).await, 500);
    assert_eq!(after_cancel.total_points, before.total_points);
    assert_eq!(after_cancel.total_participants, before.total_participants);
    assert_eq!(after_cancel.options, before.options);
    assert!(after_cancel.my_bet.is_none());

    let stored = ledger.store.find_bet(bet.id).await.unwrap().unwrap();
    assert!(stored.is_cancelled);
}

#[tokio::test]
async fn test_cancel_twice_is_already_processed() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 500).await;
    let bet = ledger.place(&vote, 0, &alice, 100).await.my_bet.unwrap();

    ledger
        .app
        .participation
        .cancel_bet(bet.id, alice.id)
        .await
        .unwrap();
    let err = ledger
        .app
        .participation
        .cancel_bet(bet.id, alice.id)
        .await
        .unwrap_err();

    assert!(err.is_already_processed());
    assert_eq!(ledger.balance(alice.id).await, 500);
}

#[tokio::test]
async fn test_cancel_someone_elses_bet_is_unauthorized() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 500).await;
    let mallory = ledger.user("mallory", 500).await;
    let bet = ledger.place(&vote, 0, &alice, 100).await.my_bet.unwrap();

    let err = ledger
        .app
        .participation
        .cancel_bet(bet.id, mallory.id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Unauthorized(_)));
    assert_eq!(ledger.balance(alice.id).await, 400);
    assert_eq!(ledger.detail(vote.id).await.total_points, 100);
}

#[tokio::test]
async fn test_cancel_unknown_bet_is_not_found() {
    let ledger = TestLedger::new();
    let alice = ledger.user("alice", 500).await;

    let err = ledger
        .app
        .participation
        .cancel_bet(uuid::Uuid::new_v4(), alice.id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_cancel_my_bet_on_vote() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 300).await;
    ledger.place(&vote, 1, &alice, 200).await;

    let detail = ledger
        .app
        .participation
        .cancel_my_bet_on_vote(vote.id, alice.id)
        .await
        .unwrap();

    assert_eq!(detail.total_points, 0);
    assert_eq!(ledger.balance(alice.id).await, 300);

    let err = ledger
        .app
        .participation
        .cancel_my_bet_on_vote(vote.id, alice.id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_insufficient_balance_changes_nothing() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 50).await;

    let err = ledger
        .app
        .participation
        .place_bet(vote.id, vote.choices[0], alice.id, 100)
        .await
        .unwrap_err();

    match err {
        AppError::InsufficientBalance {
            available,
            required,
        } => {
            assert_eq!(available, 50);
            assert_eq!(required, 100);
        }
        other => panic!("expected InsufficientBalance, got {:?}", other),
    }
    assert_eq!(ledger.balance(alice.id).await, 50);

    let detail = ledger.detail(vote.id).await;
    assert_eq!(detail.total_points, 0);
    assert_eq!(detail.total_participants, 0);
}

#[tokio::test]
async fn test_place_bet_validation_order() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let other = ledger.ongoing_vote(&["X", "Y"]).await;
    let alice = ledger.user("alice", 100).await;
    let participation = &ledger.app.participation;

    let err = participation
        .place_bet(vote.id, vote.choices[0], alice.id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Choice of another vote
    let err = participation
        .place_bet(vote.id, other.choices[0], alice.id, 10)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = participation
        .place_bet(uuid::Uuid::new_v4(), vote.choices[0], alice.id, 10)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = participation
        .place_bet(vote.id, vote.choices[0], uuid::Uuid::new_v4(), 10)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_single_active_bet_policy() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 1_000).await;

    let bet = ledger.place(&vote, 0, &alice, 100).await.my_bet.unwrap();
    let err = ledger
        .app
        .participation
        .place_bet(vote.id, vote.choices[1], alice.id, 100)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateParticipation { .. }));

    // A cancelled bet does not block a new one
    ledger
        .app
        .participation
        .cancel_bet(bet.id, alice.id)
        .await
        .unwrap();
    ledger.place(&vote, 1, &alice, 100).await;
    assert_eq!(ledger.balance(alice.id).await, 900);
}

#[tokio::test]
async fn test_no_bets_after_finish() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 500).await;
    let bob = ledger.user("bob", 500).await;
    let bet = ledger.place(&vote, 0, &alice, 100).await.my_bet.unwrap();

    ledger.finish(&vote).await;

    let err = ledger
        .app
        .participation
        .cancel_bet(bet.id, alice.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidState {
            status: VoteStatus::Finished,
            operation: Operation::CancelBet,
        }
    ));
    assert_eq!(ledger.balance(alice.id).await, 400);

    let err = ledger
        .app
        .participation
        .place_bet(vote.id, vote.choices[1], bob.id, 100)
        .await
        .unwrap_err();
    assert!(err.is_invalid_state());
    assert_eq!(ledger.balance(bob.id).await, 500);
    assert_eq!(ledger.detail(vote.id).await.total_points, 100);
}

#[tokio::test]
async fn test_no_bets_while_reviewing() {
    let ledger = TestLedger::new();
    let vote = ledger
        .create_vote(new_vote(&["A", "B"], VoteStatus::Reviewing, hours_from_now(1)))
        .await;
    let alice = ledger.user("alice", 500).await;

    let err = ledger
        .app
        .participation
        .place_bet(vote.id, vote.choices[0], alice.id, 10)
        .await
        .unwrap_err();
    assert!(err.is_invalid_state());

    ledger.app.settlement.open_vote(vote.id).await.unwrap();
    ledger.place(&vote, 0, &alice, 10).await;
}

#[tokio::test]
async fn test_concurrent_bets_keep_counters_exact() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;

    let mut users = Vec::new();
    for i in 0..20 {
        users.push(ledger.user(&format!("user{}", i), 100).await);
    }

    let handles: Vec<_> = users
        .iter()
        .enumerate()
        .map(|(i, user)| {
            let participation = ledger.app.participation.clone();
            let vote_id = vote.id;
            let choice_id = vote.choices[i % 2];
            let user_id = user.id;
            tokio::spawn(async move { participation.place_bet(vote_id, choice_id, user_id, 30).await })
        })
        .collect();

    for result in join_all(handles).await {
        result.expect("task panicked").expect("bet failed");
    }

    let detail = ledger.detail(vote.id).await;
    assert_eq!(detail.total_points, 600);
    assert_eq!(detail.total_participants, 20);
    assert_eq!(detail.choice(vote.choices[0]).unwrap().points_total, 300);
    assert_eq!(ledger.total_balance().await, 20 * 70);
    assert_counters_consistent(&ledger, vote.id).await;
}

#[tokio::test]
async fn test_concurrent_double_spend_is_rejected() {
    let ledger = TestLedger::with_policy(ParticipationPolicy::Multiple);
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 100).await;

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let participation = ledger.app.participation.clone();
            let (vote_id, choice_id, user_id) = (vote.id, vote.choices[0], alice.id);
            tokio::spawn(async move { participation.place_bet(vote_id, choice_id, user_id, 60).await })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(ledger.balance(alice.id).await, 40);
    assert_eq!(ledger.detail(vote.id).await.total_points, 60);
}

#[tokio::test]
async fn test_odds_board_and_preview() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B", "C"]).await;
    let alice = ledger.user("alice", 1_000).await;
    let bob = ledger.user("bob", 1_000).await;
    ledger.place(&vote, 0, &alice, 300).await;
    ledger.place(&vote, 1, &bob, 100).await;

    let board = ledger.app.votes.odds_board(vote.id).await.unwrap();
    assert_eq!(board.len(), 3);
    assert_eq!(board[0].odds, Some(400.0 / 300.0));
    assert_eq!(board[1].odds, Some(4.0));
    // Nobody backed C
    assert_eq!(board[2].odds, None);

    let preview = ledger
        .app
        .votes
        .preview_bet(vote.id, vote.choices[1], 100)
        .await
        .unwrap();
    assert_eq!(preview.current_odds, Some(4.0));
    assert_eq!(preview.expected_odds, Some(2.5));
    // floor(100 * 500 * 0.9 / 200)
    assert_eq!(preview.expected_payout, 225);
    assert_eq!(preview.expected_net, 125);

    let preview = ledger
        .app
        .votes
        .preview_bet(vote.id, vote.choices[2], 50)
        .await
        .unwrap();
    assert_eq!(preview.current_odds, None);
    assert_eq!(preview.expected_payout, 405);
}

#[tokio::test]
async fn test_create_and_delete_vote() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;

    let history = ledger.app.votes.status_history(vote.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, VoteStatus::Ongoing);

    ledger.app.votes.delete_vote(vote.id).await.unwrap();
    assert!(ledger.store.load_book(vote.id).await.unwrap().is_none());
    assert!(ledger
        .app
        .votes
        .status_history(vote.id)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_delete_vote_with_bets_is_refused() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 100).await;
    let bet = ledger.place(&vote, 0, &alice, 10).await.my_bet.unwrap();
    ledger
        .app
        .participation
        .cancel_bet(bet.id, alice.id)
        .await
        .unwrap();

    // Cancelled bets still belong to the vote
    let err = ledger.app.votes.delete_vote(vote.id).await.unwrap_err();
    assert!(err.is_invalid_state());
    assert!(ledger.store.load_book(vote.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_create_vote_rejects_bad_fee_rate() {
    let ledger = TestLedger::new();
    let mut request = new_vote(&["A", "B"], VoteStatus::Ongoing, hours_from_now(1));
    request.fee_rate = Some(rust_decimal::Decimal::ONE);

    let err = ledger.app.votes.create_vote(request).await.unwrap_err();
    assert!(matches!(err, AppError::Odds(_)));
    assert!(ledger.store.vote_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconciliation_repairs_drift() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 500).await;
    ledger.place(&vote, 0, &alice, 100).await;

    // Corrupt the cached counters
    let mut tx = ledger.store.begin().await.unwrap();
    let mut book = tx.lock_book(vote.id).await.unwrap().unwrap();
    book.vote.total_points = 999;
    book.choices[0].participants_count = 7;
    tx.save_book(&mut book).await.unwrap();
    tx.commit().await.unwrap();

    let drifts = ledger
        .app
        .reconciliation
        .reconcile_vote(vote.id)
        .await
        .unwrap();
    assert_eq!(drifts.len(), 2);
    assert!(drifts
        .iter()
        .any(|d| d.field == "total_points" && d.cached == 999 && d.actual == 100));
    assert_counters_consistent(&ledger, vote.id).await;

    // Nothing left to repair
    assert_eq!(ledger.app.reconciliation.reconcile_all().await.unwrap(), 0);
}

#[tokio::test]
async fn test_my_bets_and_statistics() {
    let ledger = TestLedger::new();
    let alice = ledger.user("alice", 1_000).await;
    let bob = ledger.user("bob", 1_000).await;

    let won = ledger.ongoing_vote(&["A", "B"]).await;
    ledger.place(&won, 0, &alice, 100).await;
    ledger.place(&won, 1, &bob, 100).await;
    ledger.finish(&won).await;
    ledger
        .app
        .settlement
        .resolve_and_settle(won.id, &[won.choices[0]])
        .await
        .unwrap();

    let open = ledger.ongoing_vote(&["A", "B"]).await;
    ledger.place(&open, 1, &alice, 50).await;

    let bets = ledger.app.statistics.my_bets(alice.id).await.unwrap();
    assert_eq!(bets.len(), 2);
    let win = bets.iter().find(|b| b.vote_id == won.id).unwrap();
    assert_eq!(win.outcome, BetOutcome::Win);
    // floor(100 * 200 * 0.9 / 100)
    assert_eq!(win.reward_points, Some(180));
    assert_eq!(win.net_reward, Some(80));
    let pending = bets.iter().find(|b| b.vote_id == open.id).unwrap();
    assert_eq!(pending.outcome, BetOutcome::Pending);

    let stats = ledger.app.statistics.my_statistics(alice.id).await.unwrap();
    assert_eq!(stats.total_bets, 2);
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.current_streak, 1);
    assert_eq!(stats.net_points, 80);

    let stats = ledger.app.statistics.my_statistics(bob.id).await.unwrap();
    assert_eq!(stats.losses, 1);
    assert_eq!(stats.net_points, -100);
    assert_eq!(stats.win_rate, 0.0);

    let err = ledger
        .app
        .statistics
        .my_bets(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_cancelled_bet_reports_zero_reward() {
    let ledger = TestLedger::new();
    let vote = ledger.ongoing_vote(&["A", "B"]).await;
    let alice = ledger.user("alice", 300).await;
    let bet = ledger.place(&vote, 1, &alice, 120).await.my_bet.unwrap();
    ledger
        .app
        .participation
        .cancel_bet(bet.id, alice.id)
        .await
        .unwrap();

    let bets = ledger.app.statistics.my_bets(alice.id).await.unwrap();
    assert_eq!(bets[0].outcome, BetOutcome::Cancelled);
    assert_eq!(bets[0].reward_points, Some(0));
    assert_eq!(bets[0].net_reward, Some(0));

    let stats = ledger.app.statistics.my_statistics(alice.id).await.unwrap();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.total_rewarded, 0);
    assert_eq!(stats.net_points, 0);
}

#[test]
fn test_memory_ledger_blocking_roundtrip() {
    let ledger = TestLedger::new();
    let user = tokio_test::block_on(ledger.user("carol", 42));
    assert_eq!(tokio_test::block_on(ledger.balance(user.id)), 42);
}

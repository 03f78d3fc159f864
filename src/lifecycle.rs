//! Vote lifecycle state machine.
//!
//! ```text
//! REVIEWING -> ONGOING -> FINISHED -> RESOLVED -> REWARDED
//!      \           \          \
//!       \-----------\----------\--> CANCELLED
//! ```
//!
//! Every mutating ledger operation consults [`ensure_allowed`] while holding
//! the vote lock, so the status it checks is the status it writes against.

use crate::error::{AppError, AppResult};
use crate::models::VoteStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operations gated by the vote's status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    PlaceBet,
    CancelBet,
    OpenVote,
    FinishVote,
    ResolveVote,
    SettleVote,
    CancelVote,
    DeleteVote,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::PlaceBet => "place_bet",
            Operation::CancelBet => "cancel_bet",
            Operation::OpenVote => "open_vote",
            Operation::FinishVote => "finish_vote",
            Operation::ResolveVote => "resolve_vote",
            Operation::SettleVote => "settle_vote",
            Operation::CancelVote => "cancel_vote",
            Operation::DeleteVote => "delete_vote",
        }
    }

    /// Status the vote moves to when the operation succeeds, if it moves
    pub fn target(&self) -> Option<VoteStatus> {
        match self {
            Operation::OpenVote => Some(VoteStatus::Ongoing),
            Operation::FinishVote => Some(VoteStatus::Finished),
            Operation::ResolveVote => Some(VoteStatus::Resolved),
            Operation::SettleVote => Some(VoteStatus::Rewarded),
            Operation::CancelVote => Some(VoteStatus::Cancelled),
            Operation::PlaceBet | Operation::CancelBet | Operation::DeleteVote => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an idempotent transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Changed { from: VoteStatus, to: VoteStatus },
    Unchanged(VoteStatus),
}

impl Transition {
    pub fn is_changed(&self) -> bool {
        matches!(self, Transition::Changed { .. })
    }

    /// Status after the request
    pub fn status(&self) -> VoteStatus {
        match self {
            Transition::Changed { to, .. } => *to,
            Transition::Unchanged(status) => *status,
        }
    }
}

/// The transition table
pub fn is_allowed(status: VoteStatus, operation: Operation) -> bool {
    use Operation::*;
    use VoteStatus::*;

    match operation {
        PlaceBet | CancelBet | FinishVote => status == Ongoing,
        OpenVote => status == Reviewing,
        ResolveVote => status == Finished,
        SettleVote => status == Resolved,
        CancelVote => matches!(status, Reviewing | Ongoing | Finished),
        DeleteVote => status != Rewarded,
    }
}

/// Fail with `InvalidState` unless `operation` is allowed from `status`
pub fn ensure_allowed(status: VoteStatus, operation: Operation) -> AppResult<()> {
    if is_allowed(status, operation) {
        Ok(())
    } else {
        Err(AppError::InvalidState { status, operation })
    }
}

/// Terminal statuses accept no further transitions
pub fn is_terminal(status: VoteStatus) -> bool {
    matches!(status, VoteStatus::Rewarded | VoteStatus::Cancelled)
}

/// Statuses from which a finish request is a no-op rather than an error
pub fn is_past_finish(status: VoteStatus) -> bool {
    matches!(
        status,
        VoteStatus::Finished | VoteStatus::Resolved | VoteStatus::Rewarded | VoteStatus::Cancelled
    )
}

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for odds and payout arithmetic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OddsError {
    #[error("Invalid fee rate: {0} (must be in [0, 1))")]
    InvalidFeeRate(Decimal),

    #[error("Negative pool: total {total_pool}, choice {choice_pool}")]
    NegativePool { total_pool: i64, choice_pool: i64 },

    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

/// Result type for odds operations
pub type OddsResult<T> = Result<T, OddsError>;

/// Default house fee (10%)
pub fn default_fee_rate() -> Decimal {
    Decimal::new(10, 2)
}

/// Reject fee rates outside `[0, 1)`
pub fn validate_fee_rate(fee_rate: Decimal) -> OddsResult<Decimal> {
    if fee_rate < Decimal::ZERO || fee_rate >= Decimal::ONE {
        return Err(OddsError::InvalidFeeRate(fee_rate));
    }
    Ok(fee_rate)
}

/// Pool composition seen from one choice.
///
/// `total_pool` is the sum of every active stake on the option; `choice_pool`
/// is the part of it backing this choice. Odds are `total / choice`, and
/// undefined while nobody has backed the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolShare {
    pub total_pool: i64,
    pub choice_pool: i64,
}

impl PoolShare {
    pub fn new(total_pool: i64, choice_pool: i64) -> OddsResult<Self> {
        if total_pool < 0 || choice_pool < 0 {
            return Err(OddsError::NegativePool {
                total_pool,
                choice_pool,
            });
        }
        Ok(Self {
            total_pool,
            choice_pool,
        })
    }

    /// Display odds, `None` while the choice pool is empty
    pub fn odds(&self) -> Option<f64> {
        if self.choice_pool <= 0 {
            return None;
        }
        Some(self.total_pool as f64 / self.choice_pool as f64)
    }

    /// Odds as a decimal rounded to 4 places, for persisted records
    pub fn odds_decimal(&self) -> Option<Decimal> {
        if self.choice_pool <= 0 {
            return None;
        }
        Decimal::from(self.total_pool)
            .checked_div(Decimal::from(self.choice_pool))
            .map(|odds| odds.round_dp(4))
    }

    /// Share of the total pool backing this choice, in percent
    pub fn percentage(&self) -> f64 {
        if self.total_pool <= 0 {
            return 0.0;
        }
        self.choice_pool as f64 * 100.0 / self.total_pool as f64
    }

    /// Gross payout for a winning `stake`:
    /// `floor(stake * total * (1 - fee) / choice)`.
    ///
    /// The product is formed before the single division so that exact
    /// results (e.g. 100 * 400 * 0.9 / 300 = 120) are not floored down by a
    /// repeating intermediate quotient.
    pub fn payout(&self, stake: i64, fee_rate: Decimal) -> OddsResult<Option<i64>> {
        let fee_rate = validate_fee_rate(fee_rate)?;
        if self.choice_pool <= 0 {
            return Ok(None);
        }

        let keep = Decimal::ONE - fee_rate;
        let gross = Decimal::from(stake)
            .checked_mul(Decimal::from(self.total_pool))
            .and_then(|v| v.checked_mul(keep))
            .ok_or(OddsError::Overflow("payout numerator"))?;
        let payout = gross
            .checked_div(Decimal::from(self.choice_pool))
            .ok_or(OddsError::Overflow("payout quotient"))?
            .floor();

        payout
            .to_i64()
            .map(Some)
            .ok_or(OddsError::Overflow("payout conversion"))
    }

    /// Payout minus the stake
    pub fn net_reward(&self, stake: i64, fee_rate: Decimal) -> OddsResult<Option<i64>> {
        Ok(self.payout(stake, fee_rate)?.map(|payout| payout - stake))
    }

    /// The pool as it would look after `stake` joins this choice
    pub fn with_stake(&self, stake: i64) -> OddsResult<Self> {
        let total_pool = self
            .total_pool
            .checked_add(stake)
            .ok_or(OddsError::Overflow("total pool"))?;
        let choice_pool = self
            .choice_pool
            .checked_add(stake)
            .ok_or(OddsError::Overflow("choice pool"))?;
        Self::new(total_pool, choice_pool)
    }
}

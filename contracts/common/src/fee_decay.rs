//! Base Rate Decay Model
//!
//! Borrowing and redemption fees share one `base_rate`. Redemptions bump it
//! in proportion to the share of supply redeemed; it then decays
//! exponentially with a 12 hour half-life, measured in whole minutes since
//! the last fee operation.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{fees, precision, time};
use crate::errors::MoneypResult;
use crate::math::{apply_rate, dec_pow, mul_div};

const DECIMAL_PRECISION: u128 = precision::DECIMAL_PRECISION;

/// Persistent fee state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FeeDecayState {
    /// Current base rate (wad)
    pub base_rate: u128,
    /// Timestamp of the last base rate update, seconds
    pub last_fee_operation_time: u64,
}

impl FeeDecayState {
    pub fn new(now: u64) -> Self {
        Self { base_rate: 0, last_fee_operation_time: now }
    }

    /// Whole minutes since the last fee operation
    pub fn minutes_passed(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_fee_operation_time) / time::SECONDS_IN_ONE_MINUTE
    }

    /// Base rate after decaying to `now`
    pub fn decayed_base_rate(&self, now: u64) -> MoneypResult<u128> {
        let factor = dec_pow(fees::MINUTE_DECAY_FACTOR, self.minutes_passed(now))?;
        mul_div(self.base_rate, factor, DECIMAL_PRECISION)
    }

    /// Decay on a debt-increasing borrower operation.
    ///
    /// Borrowing never bumps the rate, it only lets it decay.
    pub fn decay_base_rate_from_borrowing(&mut self, now: u64) -> MoneypResult<u128> {
        let decayed = self.decayed_base_rate(now)?.min(DECIMAL_PRECISION);
        self.base_rate = decayed;
        log::trace!(target: crate::LOG_TARGET, "base rate decayed to {}", decayed);
        self.update_last_fee_op_time(now);
        Ok(decayed)
    }

    /// Decay, then bump by `collateral_drawn * price / total_debt / BETA`
    pub fn update_base_rate_from_redemption(
        &mut self,
        collateral_drawn: u128,
        price: u128,
        total_debt: u128,
        now: u64,
    ) -> MoneypResult<u128> {
        let decayed = self.decayed_base_rate(now)?;
        let redeemed_fraction = if total_debt == 0 {
            0
        } else {
            mul_div(collateral_drawn, price, total_debt)?
        };
        let new_base_rate = decayed
            .saturating_add(redeemed_fraction / fees::BETA)
            .min(DECIMAL_PRECISION);

        self.base_rate = new_base_rate;
        log::debug!(
            target: crate::LOG_TARGET,
            "base rate bumped to {} (decayed {}, redeemed fraction {})",
            new_base_rate,
            decayed,
            redeemed_fraction
        );
        self.update_last_fee_op_time(now);
        Ok(new_base_rate)
    }

    /// Only advance the clock once a full minute has passed, so a stream of
    /// operations inside the same minute cannot freeze the decay.
    fn update_last_fee_op_time(&mut self, now: u64) {
        if now.saturating_sub(self.last_fee_operation_time) >= time::SECONDS_IN_ONE_MINUTE {
            self.last_fee_operation_time = now;
        }
    }

    /// Borrowing rate at the current (already decayed) base rate
    pub fn borrowing_rate(&self) -> u128 {
        borrowing_rate_for(self.base_rate)
    }

    /// Borrowing rate if the base rate were decayed to `now`
    pub fn borrowing_rate_with_decay(&self, now: u64) -> MoneypResult<u128> {
        Ok(borrowing_rate_for(self.decayed_base_rate(now)?))
    }

    /// Fee charged on `debt` newly drawn
    pub fn borrowing_fee(&self, debt: u128) -> MoneypResult<u128> {
        apply_rate(debt, self.borrowing_rate())
    }

    /// Redemption rate at the current base rate
    pub fn redemption_rate(&self) -> u128 {
        redemption_rate_for(self.base_rate)
    }

    /// Redemption rate if the base rate were decayed to `now`
    pub fn redemption_rate_with_decay(&self, now: u64) -> MoneypResult<u128> {
        Ok(redemption_rate_for(self.decayed_base_rate(now)?))
    }

    /// Fee charged on `collateral_drawn`
    pub fn redemption_fee(&self, collateral_drawn: u128) -> MoneypResult<u128> {
        apply_rate(collateral_drawn, self.redemption_rate())
    }
}

fn borrowing_rate_for(base_rate: u128) -> u128 {
    base_rate
        .max(fees::BORROWING_FEE_FLOOR)
        .min(fees::MAX_BORROWING_FEE)
}

fn redemption_rate_for(base_rate: u128) -> u128 {
    base_rate
        .max(fees::REDEMPTION_FEE_FLOOR)
        .min(DECIMAL_PRECISION)
}

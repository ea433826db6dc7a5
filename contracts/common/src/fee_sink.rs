//! MP Staking Fee Collector
//!
//! Reference [`FeeSink`]: borrowing fees (BPD) and redemption fees (RBTC)
//! are shared among MP stakers pro rata to their stake, using per-unit
//! accumulators `F_collateral` and `F_bpd`. Fees that arrive while nothing
//! is staked are held as unallocated.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::precision::DECIMAL_PRECISION;
use crate::errors::{MoneypError, MoneypResult};
use crate::interfaces::FeeSink;
use crate::math::{mul_div, safe_add, safe_sub};
use crate::types::Address;

/// A staker's position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StakeEntry {
    pub amount: u128,
    pub f_collateral_snapshot: u128,
    pub f_bpd_snapshot: u128,
}

/// Gains paid out on a stake change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StakingGains {
    pub collateral: u128,
    pub bpd: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StakingFeeCollector {
    total_staked: u128,
    f_collateral: u128,
    f_bpd: u128,
    unallocated_collateral: u128,
    unallocated_bpd: u128,
    stakes: BTreeMap<Address, StakeEntry>,
}

impl StakingFeeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_staked(&self) -> u128 {
        self.total_staked
    }

    pub fn stake_of(&self, staker: Address) -> u128 {
        self.stakes.get(&staker).map(|s| s.amount).unwrap_or(0)
    }

    /// Fees received while nothing was staked: `(collateral, bpd)`
    pub fn unallocated(&self) -> (u128, u128) {
        (self.unallocated_collateral, self.unallocated_bpd)
    }

    pub fn pending_gains(&self, staker: Address) -> MoneypResult<StakingGains> {
        let Some(entry) = self.stakes.get(&staker) else {
            return Ok(StakingGains::default());
        };
        Ok(StakingGains {
            collateral: mul_div(
                entry.amount,
                self.f_collateral.saturating_sub(entry.f_collateral_snapshot),
                DECIMAL_PRECISION,
            )?,
            bpd: mul_div(
                entry.amount,
                self.f_bpd.saturating_sub(entry.f_bpd_snapshot),
                DECIMAL_PRECISION,
            )?,
        })
    }

    /// Add MP stake; pays out gains accrued so far
    pub fn stake(&mut self, staker: Address, amount: u128) -> MoneypResult<StakingGains> {
        if amount == 0 {
            return Err(MoneypError::ZeroAmount);
        }
        let gains = self.pending_gains(staker)?;
        let current = self.stake_of(staker);
        self.stakes.insert(
            staker,
            StakeEntry {
                amount: safe_add(current, amount)?,
                f_collateral_snapshot: self.f_collateral,
                f_bpd_snapshot: self.f_bpd,
            },
        );
        self.total_staked = safe_add(self.total_staked, amount)?;
        Ok(gains)
    }

    /// Remove up to `amount` of stake; pays out gains accrued so far
    pub fn unstake(&mut self, staker: Address, amount: u128) -> MoneypResult<(u128, StakingGains)> {
        let current = self.stake_of(staker);
        if current == 0 {
            return Err(MoneypError::InsufficientBalance { available: 0, requested: amount });
        }
        let gains = self.pending_gains(staker)?;
        let withdrawn = amount.min(current);
        let remaining = current - withdrawn;
        if remaining == 0 {
            self.stakes.remove(&staker);
        } else {
            self.stakes.insert(
                staker,
                StakeEntry {
                    amount: remaining,
                    f_collateral_snapshot: self.f_collateral,
                    f_bpd_snapshot: self.f_bpd,
                },
            );
        }
        self.total_staked = safe_sub(self.total_staked, withdrawn)?;
        Ok((withdrawn, gains))
    }

    fn per_unit(&self, fee: u128) -> MoneypResult<u128> {
        mul_div(fee, DECIMAL_PRECISION, self.total_staked)
    }
}

impl FeeSink for StakingFeeCollector {
    fn receive_collateral_fee(&mut self, amount: u128) -> MoneypResult<()> {
        if self.total_staked == 0 {
            self.unallocated_collateral = safe_add(self.unallocated_collateral, amount)?;
            return Ok(());
        }
        self.f_collateral = safe_add(self.f_collateral, self.per_unit(amount)?)?;
        Ok(())
    }

    fn receive_bpd_fee(&mut self, amount: u128) -> MoneypResult<()> {
        if self.total_staked == 0 {
            self.unallocated_bpd = safe_add(self.unallocated_bpd, amount)?;
            return Ok(());
        }
        self.f_bpd = safe_add(self.f_bpd, self.per_unit(amount)?)?;
        Ok(())
    }
}

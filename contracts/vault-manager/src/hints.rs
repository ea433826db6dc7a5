//! Hint Helpers
//!
//! Read-only helpers that let callers precompute the hints sorted-list
//! insertions and redemptions accept. Hints only save work: a stale hint
//! costs a longer walk or, for redemptions, a cancelled partial step.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use moneyp_common::{
    constants::{limits, precision::DECIMAL_PRECISION},
    errors::MoneypResult,
    interfaces::{FeeSink, PriceOracle, StabilityPoolOffset, StablecoinLedger},
    math::{self, mul_div, safe_add},
    types::Address,
};

use crate::VaultManager;

/// Closest sampled vault to a target NICR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproxHint {
    pub hint: Option<Address>,
    /// `|NICR(hint) - target|`
    pub diff: u128,
    /// Feed back in as the next seed
    pub latest_seed: [u8; 32],
}

/// Precomputed arguments for a redemption
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionHints {
    pub first_hint: Option<Address>,
    /// NICR the last vault ends at, 0 if no partial redemption happens
    pub partial_nicr: u128,
    /// Part of the requested amount that can actually be redeemed
    pub truncated_amount: u128,
}

impl<O, T, S, F> VaultManager<O, T, S, F>
where
    O: PriceOracle,
    T: StablecoinLedger,
    S: StabilityPoolOffset,
    F: FeeSink,
{
    /// Sample `num_trials` vaults (the tail plus pseudo-random picks from
    /// the owners array) and return the one whose NICR is closest to `nicr`
    pub fn get_approx_hint(&self, nicr: u128, num_trials: u32, seed: [u8; 32]) -> MoneypResult<ApproxHint> {
        let owners = self.vault_owners_count();
        let Some(tail) = self.state.sorted.last().filter(|_| owners > 0) else {
            return Ok(ApproxHint { hint: None, diff: 0, latest_seed: seed });
        };

        let mut hint = tail;
        let mut diff = self.nominal_icr(&tail)?.abs_diff(nicr);
        let mut latest_seed = seed;

        for _ in 1..num_trials {
            let digest = Sha256::digest(latest_seed);
            latest_seed.copy_from_slice(&digest);
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&latest_seed[..8]);
            let index = (u64::from_be_bytes(index_bytes) % owners as u64) as usize;

            let Some(candidate) = self.vault_from_owners_array(index) else {
                continue;
            };
            let candidate_diff = self.nominal_icr(&candidate)?.abs_diff(nicr);
            if candidate_diff < diff {
                diff = candidate_diff;
                hint = candidate;
            }
        }

        Ok(ApproxHint { hint: Some(hint), diff, latest_seed })
    }

    /// Simulate a redemption of `amount` at `price` without touching state
    pub fn get_redemption_hints(&self, amount: u128, price: u128, max_iterations: u32) -> MoneypResult<RedemptionHints> {
        let first_hint = self.first_redeemable_vault(price)?;

        let mut remaining = amount;
        let mut partial_nicr = 0;
        let mut current = first_hint;
        let mut iterations_left = if max_iterations == 0 { u32::MAX } else { max_iterations };

        while let Some(borrower) = current {
            if remaining == 0 || iterations_left == 0 {
                break;
            }
            iterations_left -= 1;

            let entire = self.entire_debt_and_coll(&borrower)?;
            let net_debt = entire.debt.saturating_sub(limits::GAS_COMPENSATION);

            if net_debt > remaining {
                if net_debt > limits::MIN_NET_DEBT {
                    let max_redeemable = remaining.min(net_debt - limits::MIN_NET_DEBT);
                    let new_collateral = entire
                        .collateral
                        .saturating_sub(mul_div(max_redeemable, DECIMAL_PRECISION, price)?);
                    let new_debt = safe_add(net_debt - max_redeemable, limits::GAS_COMPENSATION)?;
                    partial_nicr = math::compute_nominal_cr(new_collateral, new_debt)?;
                    remaining -= max_redeemable;
                }
                break;
            }
            remaining -= net_debt;
            current = self.state.sorted.prev(&borrower);
        }

        Ok(RedemptionHints { first_hint, partial_nicr, truncated_amount: amount - remaining })
    }

    pub fn compute_nominal_cr(&self, collateral: u128, debt: u128) -> MoneypResult<u128> {
        math::compute_nominal_cr(collateral, debt)
    }

    pub fn compute_cr(&self, collateral: u128, debt: u128, price: u128) -> MoneypResult<u128> {
        math::compute_cr(collateral, debt, price)
    }
}

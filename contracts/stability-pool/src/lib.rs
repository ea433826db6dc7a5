//! Stability Pool
//!
//! First line of defense for the Moneyp system. Depositors provide BPD;
//! liquidations cancel vault debt against the pool and hand the vault's
//! collateral to depositors pro rata.
//!
//! ## Scaled-sum accounting
//!
//! Per-depositor balances are never touched by an offset. Instead the pool
//! keeps:
//! - `P`, the running product by which every deposit has shrunk,
//! - `S[epoch][scale]`, the collateral gain per unit staked,
//! - `G[epoch][scale]`, the MP issuance per unit staked.
//!
//! A deposit snapshots `P`, `S`, `G`, the scale and the epoch; its
//! compounded value and gains are derived from those snapshots. When `P`
//! would drop below `SCALE_FACTOR` it is multiplied by `SCALE_FACTOR` and
//! the scale advances; an offset that empties the pool starts a new epoch.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

pub mod issuance;
pub mod sums;

pub use issuance::CommunityIssuance;
pub use sums::RewardSum;

use moneyp_common::{
    constants::{precision::DECIMAL_PRECISION, stability_pool::SCALE_FACTOR},
    errors::{MoneypError, MoneypResult},
    interfaces::StabilityPoolOffset,
    math::{mul_div, safe_add, safe_sub},
    types::Address,
};

/// `log` target for diagnostics emitted by this crate
pub const LOG_TARGET: &str = "moneyp::stability_pool";

// ============ Deposit Types ============

/// Snapshot of the pool accumulators taken when a deposit last changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DepositSnapshot {
    pub s: RewardSum,
    pub p: u128,
    pub g: RewardSum,
    pub scale: u64,
    pub epoch: u64,
}

/// A depositor's position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Deposit {
    /// Value at the last deposit change, before any later offsets
    pub initial_value: u128,
    pub snapshot: DepositSnapshot,
}

// ============ Stability Pool ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StabilityPool {
    /// BPD currently deposited
    total_bpd_deposits: u128,
    /// Collateral held for depositors
    collateral: u128,
    /// Running product, starts at 1e18
    p: u128,
    current_scale: u64,
    current_epoch: u64,
    epoch_to_scale_to_sum: BTreeMap<(u64, u64), RewardSum>,
    epoch_to_scale_to_g: BTreeMap<(u64, u64), RewardSum>,
    last_mp_error: u128,
    last_collateral_error_offset: u128,
    last_bpd_loss_error_offset: u128,
    deposits: BTreeMap<Address, Deposit>,
    issuance: CommunityIssuance,
    /// Collateral paid to each depositor
    collateral_paid: BTreeMap<Address, u128>,
    /// MP paid to each depositor
    mp_paid: BTreeMap<Address, u128>,
}

impl StabilityPool {
    pub fn new(deployment_time: u64) -> Self {
        Self::with_issuance(CommunityIssuance::new(deployment_time))
    }

    pub fn with_issuance(issuance: CommunityIssuance) -> Self {
        Self {
            total_bpd_deposits: 0,
            collateral: 0,
            p: DECIMAL_PRECISION,
            current_scale: 0,
            current_epoch: 0,
            epoch_to_scale_to_sum: BTreeMap::new(),
            epoch_to_scale_to_g: BTreeMap::new(),
            last_mp_error: 0,
            last_collateral_error_offset: 0,
            last_bpd_loss_error_offset: 0,
            deposits: BTreeMap::new(),
            issuance,
            collateral_paid: BTreeMap::new(),
            mp_paid: BTreeMap::new(),
        }
    }

    // ============ Queries ============

    pub fn collateral(&self) -> u128 {
        self.collateral
    }

    pub fn product(&self) -> u128 {
        self.p
    }

    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    pub fn sum_at(&self, epoch: u64, scale: u64) -> RewardSum {
        self.epoch_to_scale_to_sum.get(&(epoch, scale)).copied().unwrap_or_default()
    }

    pub fn g_at(&self, epoch: u64, scale: u64) -> RewardSum {
        self.epoch_to_scale_to_g.get(&(epoch, scale)).copied().unwrap_or_default()
    }

    pub fn deposit(&self, depositor: Address) -> Option<&Deposit> {
        self.deposits.get(&depositor)
    }

    pub fn total_mp_issued(&self) -> u128 {
        self.issuance.total_issued
    }

    pub fn collateral_paid_to(&self, depositor: Address) -> u128 {
        self.collateral_paid.get(&depositor).copied().unwrap_or(0)
    }

    pub fn mp_paid_to(&self, depositor: Address) -> u128 {
        self.mp_paid.get(&depositor).copied().unwrap_or(0)
    }

    /// Gain accrued in one of the per-unit sums since `snapshot`.
    ///
    /// Covers the snapshot's scale and the one after it; gains further out
    /// are negligible because the deposit has shrunk by at least 1e9 by then.
    fn gain_from_snapshot(
        &self,
        initial: u128,
        snapshot: &DepositSnapshot,
        snapshot_sum: RewardSum,
        sums: &BTreeMap<(u64, u64), RewardSum>,
    ) -> u128 {
        if initial == 0 || snapshot.p == 0 {
            return 0;
        }
        let at = |scale: u64| sums.get(&(snapshot.epoch, scale)).copied().unwrap_or_default();
        let first_portion = at(snapshot.scale).saturating_sub(snapshot_sum);
        let second_portion = at(snapshot.scale + 1).0 / U256::from(SCALE_FACTOR);
        let portion = first_portion.saturating_add(second_portion);

        let gain = match U256::from(initial).checked_mul(portion) {
            Some(product) => product / U256::from(snapshot.p) / U256::from(DECIMAL_PRECISION),
            None => return u128::MAX,
        };
        if gain > U256::from(u128::MAX) {
            u128::MAX
        } else {
            gain.low_u128()
        }
    }

    /// Collateral gain of a depositor since their last deposit change
    pub fn depositor_collateral_gain(&self, depositor: Address) -> u128 {
        match self.deposits.get(&depositor) {
            Some(d) => self.gain_from_snapshot(
                d.initial_value,
                &d.snapshot,
                d.snapshot.s,
                &self.epoch_to_scale_to_sum,
            ),
            None => 0,
        }
    }

    /// MP gain of a depositor since their last deposit change
    pub fn depositor_mp_gain(&self, depositor: Address) -> u128 {
        match self.deposits.get(&depositor) {
            Some(d) => self.gain_from_snapshot(
                d.initial_value,
                &d.snapshot,
                d.snapshot.g,
                &self.epoch_to_scale_to_g,
            ),
            None => 0,
        }
    }

    /// Deposit value after all offsets so far
    pub fn compounded_bpd_deposit(&self, depositor: Address) -> u128 {
        let Some(deposit) = self.deposits.get(&depositor) else {
            return 0;
        };
        let initial = deposit.initial_value;
        let snapshot = &deposit.snapshot;
        if initial == 0 || snapshot.epoch < self.current_epoch || snapshot.p == 0 {
            return 0;
        }

        let compounded = match self.current_scale.saturating_sub(snapshot.scale) {
            0 => mul_div(initial, self.p, snapshot.p).unwrap_or(0),
            1 => mul_div(initial, self.p, snapshot.p).unwrap_or(0) / SCALE_FACTOR,
            _ => 0,
        };

        // Below a billionth of the initial value the result is rounding noise
        if compounded < initial / 1_000_000_000 {
            return 0;
        }
        compounded
    }

    // ============ Internal Accounting ============

    fn trigger_issuance(&mut self, now: u64) -> MoneypResult<()> {
        let issued = self.issuance.issue(now)?;
        self.update_g(issued)
    }

    fn update_g(&mut self, issued: u128) -> MoneypResult<()> {
        if self.total_bpd_deposits == 0 || issued == 0 {
            return Ok(());
        }
        let (per_unit, error) = per_unit_staked(issued, self.last_mp_error, self.total_bpd_deposits);
        self.last_mp_error = error;

        let marginal = per_unit.checked_mul(U256::from(self.p)).ok_or(MoneypError::Overflow)?;
        let key = (self.current_epoch, self.current_scale);
        let g = self.epoch_to_scale_to_g.entry(key).or_insert(RewardSum::ZERO);
        *g = g.checked_add(marginal)?;
        log::trace!(target: LOG_TARGET, "G[{:?}] += {}", key, marginal);
        Ok(())
    }

    /// Collateral gain and BPD loss per unit staked, with error carries
    fn compute_rewards_per_unit_staked(
        &mut self,
        collateral: u128,
        debt: u128,
        total: u128,
    ) -> MoneypResult<(U256, u128)> {
        let (collateral_gain_per_unit, collateral_error) =
            per_unit_staked(collateral, self.last_collateral_error_offset, total);
        self.last_collateral_error_offset = collateral_error;

        let bpd_loss_per_unit = if debt == total {
            self.last_bpd_loss_error_offset = 0;
            DECIMAL_PRECISION
        } else {
            // Round the loss up so deposits never claim more than remains
            let numerator = U256::from(debt) * U256::from(DECIMAL_PRECISION)
                - U256::from(self.last_bpd_loss_error_offset);
            let total_wide = U256::from(total);
            let per_unit = numerator / total_wide + U256::one();
            self.last_bpd_loss_error_offset = (per_unit * total_wide - numerator).low_u128();
            per_unit.low_u128()
        };

        Ok((collateral_gain_per_unit, bpd_loss_per_unit))
    }

    fn update_reward_sum_and_product(
        &mut self,
        collateral_gain_per_unit: U256,
        bpd_loss_per_unit: u128,
    ) -> MoneypResult<()> {
        let current_p = self.p;
        let new_product_factor = safe_sub(DECIMAL_PRECISION, bpd_loss_per_unit)?;

        let marginal_gain = collateral_gain_per_unit
            .checked_mul(U256::from(current_p))
            .ok_or(MoneypError::Overflow)?;
        let key = (self.current_epoch, self.current_scale);
        let s = self.epoch_to_scale_to_sum.entry(key).or_insert(RewardSum::ZERO);
        *s = s.checked_add(marginal_gain)?;

        let new_p = if new_product_factor == 0 {
            // Pool emptied: every deposit is wiped, start a new epoch
            self.current_epoch += 1;
            self.current_scale = 0;
            log::debug!(target: LOG_TARGET, "pool emptied, epoch {}", self.current_epoch);
            DECIMAL_PRECISION
        } else {
            let scaled = mul_div(current_p, new_product_factor, DECIMAL_PRECISION)?;
            if scaled < SCALE_FACTOR {
                self.current_scale += 1;
                log::debug!(target: LOG_TARGET, "P rescaled, scale {}", self.current_scale);
                mul_div(current_p, new_product_factor * SCALE_FACTOR, DECIMAL_PRECISION)?
            } else {
                scaled
            }
        };

        if new_p == 0 {
            return Err(MoneypError::Underflow);
        }
        self.p = new_p;
        Ok(())
    }

    fn update_deposit_and_snapshots(&mut self, depositor: Address, new_value: u128) {
        if new_value == 0 {
            self.deposits.remove(&depositor);
            return;
        }
        let snapshot = DepositSnapshot {
            s: self.sum_at(self.current_epoch, self.current_scale),
            p: self.p,
            g: self.g_at(self.current_epoch, self.current_scale),
            scale: self.current_scale,
            epoch: self.current_epoch,
        };
        self.deposits.insert(depositor, Deposit { initial_value: new_value, snapshot });
    }

    fn pay_out_gains(&mut self, depositor: Address, collateral_gain: u128, mp_gain: u128) -> MoneypResult<()> {
        if collateral_gain > 0 {
            self.collateral = safe_sub(self.collateral, collateral_gain)?;
            let paid = self.collateral_paid.entry(depositor).or_insert(0);
            *paid = safe_add(*paid, collateral_gain)?;
        }
        if mp_gain > 0 {
            let paid = self.mp_paid.entry(depositor).or_insert(0);
            *paid = safe_add(*paid, mp_gain)?;
        }
        Ok(())
    }
}

/// `(amount * 1e18 + carry) / total` and the remainder to carry into the next division
fn per_unit_staked(amount: u128, carry: u128, total: u128) -> (U256, u128) {
    let numerator = U256::from(amount) * U256::from(DECIMAL_PRECISION) + U256::from(carry);
    let total = U256::from(total);
    (numerator / total, (numerator % total).low_u128())
}

impl StabilityPoolOffset for StabilityPool {
    fn total_deposits(&self) -> u128 {
        self.total_bpd_deposits
    }

    fn offset(&mut self, debt: u128, collateral: u128, now: u64) -> MoneypResult<()> {
        let total = self.total_bpd_deposits;
        if total == 0 || debt == 0 {
            return Ok(());
        }
        if debt > total {
            return Err(MoneypError::InsufficientPoolBalance { available: total, required: debt });
        }

        self.trigger_reward_event(now)?;

        let (gain_per_unit, loss_per_unit) =
            self.compute_rewards_per_unit_staked(collateral, debt, total)?;
        self.update_reward_sum_and_product(gain_per_unit, loss_per_unit)?;

        self.total_bpd_deposits = total - debt;
        self.collateral = safe_add(self.collateral, collateral)?;
        log::debug!(
            target: LOG_TARGET,
            "offset {} debt against pool, {} collateral gained, {} remaining",
            debt,
            collateral,
            self.total_bpd_deposits
        );
        Ok(())
    }

    fn trigger_reward_event(&mut self, now: u64) -> MoneypResult<()> {
        self.trigger_issuance(now)
    }

    fn provide(&mut self, depositor: Address, amount: u128, now: u64) -> MoneypResult<u128> {
        if amount == 0 {
            return Err(MoneypError::ZeroAmount);
        }
        self.trigger_issuance(now)?;

        let collateral_gain = self.depositor_collateral_gain(depositor);
        let mp_gain = self.depositor_mp_gain(depositor);
        let compounded = self.compounded_bpd_deposit(depositor);

        self.total_bpd_deposits = safe_add(self.total_bpd_deposits, amount)?;
        self.update_deposit_and_snapshots(depositor, safe_add(compounded, amount)?);
        self.pay_out_gains(depositor, collateral_gain, mp_gain)?;
        Ok(collateral_gain)
    }

    fn withdraw(&mut self, depositor: Address, amount: u128, now: u64) -> MoneypResult<(u128, u128)> {
        let initial = self.deposits.get(&depositor).map(|d| d.initial_value).unwrap_or(0);
        if initial == 0 {
            return Err(MoneypError::InsufficientBalance { available: 0, requested: amount });
        }
        self.trigger_issuance(now)?;

        let collateral_gain = self.depositor_collateral_gain(depositor);
        let mp_gain = self.depositor_mp_gain(depositor);
        let compounded = self.compounded_bpd_deposit(depositor);
        let withdrawn = amount.min(compounded);

        self.total_bpd_deposits = safe_sub(self.total_bpd_deposits, withdrawn)?;
        self.update_deposit_and_snapshots(depositor, compounded - withdrawn);
        self.pay_out_gains(depositor, collateral_gain, mp_gain)?;
        Ok((withdrawn, collateral_gain))
    }

    fn compounded_deposit(&self, depositor: Address) -> u128 {
        self.compounded_bpd_deposit(depositor)
    }

    fn collateral_gain(&self, depositor: Address) -> u128 {
        self.depositor_collateral_gain(depositor)
    }
}

// ============ Tests ============

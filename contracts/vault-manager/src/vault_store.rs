//! Vault Store
//!
//! Owns every vault record together with the redistribution bookkeeping:
//! stakes, the `L_collateral` / `L_debt` accumulators with their rounding
//! carries, per-vault reward snapshots and the owners array.
//!
//! Pending rewards of a vault are `stake * (L - snapshot) / 1e18`. They are
//! folded into the vault (and moved from the default to the active pool)
//! by [`VaultStore::apply_pending_rewards`] before any operation reads the
//! vault's debt or collateral.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use moneyp_common::{
    constants::precision::DECIMAL_PRECISION,
    errors::{MoneypError, MoneypResult},
    math::{mul_add_div_rem, mul_div, safe_add, safe_sub},
    pools::{PoolKind, PoolLedger},
    types::{Address, EntireDebtAndColl, RewardSnapshot, Vault, VaultStatus},
};

use crate::sorted_vaults::SortedVaults;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultStore {
    vaults: BTreeMap<Address, Vault>,
    /// Active vault owners, indexed by `Vault::array_index`
    owners: Vec<Address>,
    snapshots: BTreeMap<Address, RewardSnapshot>,

    total_stakes: u128,
    total_stakes_snapshot: u128,
    total_collateral_snapshot: u128,

    /// Collateral reward per unit staked
    l_collateral: u128,
    /// Debt reward per unit staked
    l_debt: u128,
    last_collateral_error: u128,
    last_debt_error: u128,
}

impl VaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Queries ============

    pub fn vault(&self, id: &Address) -> Option<&Vault> {
        self.vaults.get(id)
    }

    pub fn status(&self, id: &Address) -> VaultStatus {
        self.vaults.get(id).map(|v| v.status).unwrap_or_default()
    }

    pub fn is_active(&self, id: &Address) -> bool {
        self.vaults.get(id).is_some_and(Vault::is_active)
    }

    pub fn snapshot(&self, id: &Address) -> RewardSnapshot {
        self.snapshots.get(id).copied().unwrap_or_default()
    }

    pub fn total_stakes(&self) -> u128 {
        self.total_stakes
    }

    pub fn total_stakes_snapshot(&self) -> u128 {
        self.total_stakes_snapshot
    }

    pub fn total_collateral_snapshot(&self) -> u128 {
        self.total_collateral_snapshot
    }

    pub fn l_collateral(&self) -> u128 {
        self.l_collateral
    }

    pub fn l_debt(&self) -> u128 {
        self.l_debt
    }

    pub fn vault_owners_count(&self) -> usize {
        self.owners.len()
    }

    pub fn vault_from_owners_array(&self, index: usize) -> Option<Address> {
        self.owners.get(index).copied()
    }

    /// Active vaults in owners-array order
    pub fn active_vaults(&self) -> impl Iterator<Item = (&Address, &Vault)> + '_ {
        self.owners.iter().filter_map(|id| self.vaults.get_key_value(id))
    }

    // ============ Pending Rewards ============

    pub fn has_pending_rewards(&self, id: &Address) -> bool {
        self.is_active(id) && self.snapshot(id).collateral < self.l_collateral
    }

    pub fn pending_collateral_reward(&self, id: &Address) -> MoneypResult<u128> {
        let snapshot = self.snapshot(id).collateral;
        self.pending_reward(id, self.l_collateral, snapshot)
    }

    pub fn pending_debt_reward(&self, id: &Address) -> MoneypResult<u128> {
        let snapshot = self.snapshot(id).debt;
        self.pending_reward(id, self.l_debt, snapshot)
    }

    fn pending_reward(&self, id: &Address, accumulator: u128, snapshot: u128) -> MoneypResult<u128> {
        let Some(vault) = self.vaults.get(id).filter(|v| v.is_active()) else {
            return Ok(0);
        };
        let per_unit = safe_sub(accumulator, snapshot)?;
        if per_unit == 0 {
            return Ok(0);
        }
        mul_div(vault.stake, per_unit, DECIMAL_PRECISION)
    }

    /// Recorded debt and collateral plus pending rewards
    pub fn entire_debt_and_coll(&self, id: &Address) -> MoneypResult<EntireDebtAndColl> {
        let (debt, collateral) = self
            .vaults
            .get(id)
            .map(|v| (v.debt, v.collateral))
            .unwrap_or_default();
        let pending_debt_reward = self.pending_debt_reward(id)?;
        let pending_collateral_reward = self.pending_collateral_reward(id)?;
        Ok(EntireDebtAndColl {
            debt: safe_add(debt, pending_debt_reward)?,
            collateral: safe_add(collateral, pending_collateral_reward)?,
            pending_debt_reward,
            pending_collateral_reward,
        })
    }

    /// Fold pending rewards into the vault. Returns false when nothing was pending.
    pub fn apply_pending_rewards(&mut self, id: &Address, pools: &mut PoolLedger) -> MoneypResult<bool> {
        if !self.has_pending_rewards(id) {
            return Ok(false);
        }
        let pending_collateral = self.pending_collateral_reward(id)?;
        let pending_debt = self.pending_debt_reward(id)?;

        let vault = self.vaults.get_mut(id).ok_or(MoneypError::VaultNotActive { borrower: *id })?;
        vault.collateral = safe_add(vault.collateral, pending_collateral)?;
        vault.debt = safe_add(vault.debt, pending_debt)?;
        self.update_reward_snapshots(id);

        pools.move_debt(PoolKind::Default, PoolKind::Active, pending_debt)?;
        pools.move_collateral(PoolKind::Default, PoolKind::Active, pending_collateral)?;
        Ok(true)
    }

    fn update_reward_snapshots(&mut self, id: &Address) {
        self.snapshots.insert(
            *id,
            RewardSnapshot { collateral: self.l_collateral, debt: self.l_debt },
        );
    }

    // ============ Lifecycle ============

    /// Create an active vault and append it to the owners array
    pub fn open(&mut self, id: Address, collateral: u128, debt: u128) -> MoneypResult<u128> {
        if self.is_active(&id) {
            return Err(MoneypError::VaultAlreadyActive { borrower: id });
        }
        self.vaults.insert(
            id,
            Vault {
                debt,
                collateral,
                stake: 0,
                status: VaultStatus::Active,
                array_index: self.owners.len() as u64,
            },
        );
        self.owners.push(id);
        self.update_reward_snapshots(&id);
        self.update_stake_and_total(&id)
    }

    /// Overwrite an active vault's debt and collateral
    pub fn set_debt_and_coll(&mut self, id: &Address, debt: u128, collateral: u128) -> MoneypResult<()> {
        let vault = self
            .vaults
            .get_mut(id)
            .filter(|v| v.is_active())
            .ok_or(MoneypError::VaultNotActive { borrower: *id })?;
        vault.debt = debt;
        vault.collateral = collateral;
        Ok(())
    }

    /// Close a vault with a terminal status.
    ///
    /// The last vault in the system can never be closed.
    pub fn close(&mut self, id: &Address, status: VaultStatus, sorted: &mut SortedVaults) -> MoneypResult<()> {
        if !self.is_active(id) {
            return Err(MoneypError::VaultNotActive { borrower: *id });
        }
        if self.owners.len() <= 1 || sorted.len() <= 1 {
            return Err(MoneypError::OnlyOneVaultInSystem);
        }

        self.remove_stake(id)?;
        if let Some(vault) = self.vaults.get_mut(id) {
            vault.status = status;
            vault.collateral = 0;
            vault.debt = 0;
        }
        self.snapshots.remove(id);
        self.remove_from_owners_array(id)?;
        sorted.remove(id);
        Ok(())
    }

    /// Swap-with-last removal, fixing up the moved vault's index
    pub fn remove_from_owners_array(&mut self, id: &Address) -> MoneypResult<()> {
        if self.owners.len() <= 1 {
            return Err(MoneypError::OnlyOneVaultInSystem);
        }
        let index = self
            .vaults
            .get(id)
            .map(|v| v.array_index as usize)
            .filter(|&i| self.owners.get(i) == Some(id))
            .ok_or(MoneypError::VaultNotActive { borrower: *id })?;

        self.owners.swap_remove(index);
        if let Some(moved) = self.owners.get(index).copied() {
            if let Some(vault) = self.vaults.get_mut(&moved) {
                vault.array_index = index as u64;
            }
        }
        Ok(())
    }

    // ============ Stakes ============

    /// Stake for `collateral` given the last liquidation snapshots
    pub fn compute_new_stake(&self, collateral: u128) -> MoneypResult<u128> {
        if self.total_collateral_snapshot == 0 {
            return Ok(collateral);
        }
        mul_div(collateral, self.total_stakes_snapshot, self.total_collateral_snapshot)
    }

    pub fn update_stake_and_total(&mut self, id: &Address) -> MoneypResult<u128> {
        let vault = self.vaults.get(id).ok_or(MoneypError::VaultNotActive { borrower: *id })?;
        let old_stake = vault.stake;
        let new_stake = self.compute_new_stake(vault.collateral)?;

        self.total_stakes = safe_add(safe_sub(self.total_stakes, old_stake)?, new_stake)?;
        if let Some(vault) = self.vaults.get_mut(id) {
            vault.stake = new_stake;
        }
        Ok(new_stake)
    }

    pub fn remove_stake(&mut self, id: &Address) -> MoneypResult<()> {
        let vault = self.vaults.get_mut(id).ok_or(MoneypError::VaultNotActive { borrower: *id })?;
        self.total_stakes = safe_sub(self.total_stakes, vault.stake)?;
        vault.stake = 0;
        Ok(())
    }

    // ============ Redistribution ============

    /// Share `debt` and `collateral` across all stakes and park them in the
    /// default pool until each vault applies its rewards
    pub fn redistribute(&mut self, debt: u128, collateral: u128, pools: &mut PoolLedger) -> MoneypResult<()> {
        if debt == 0 {
            return Ok(());
        }

        let (collateral_per_stake, collateral_error) = mul_add_div_rem(
            collateral,
            DECIMAL_PRECISION,
            self.last_collateral_error,
            self.total_stakes,
        )?;
        let (debt_per_stake, debt_error) =
            mul_add_div_rem(debt, DECIMAL_PRECISION, self.last_debt_error, self.total_stakes)?;

        self.last_collateral_error = collateral_error;
        self.last_debt_error = debt_error;
        self.l_collateral = safe_add(self.l_collateral, collateral_per_stake)?;
        self.l_debt = safe_add(self.l_debt, debt_per_stake)?;

        pools.move_debt(PoolKind::Active, PoolKind::Default, debt)?;
        pools.move_collateral(PoolKind::Active, PoolKind::Default, collateral)?;
        Ok(())
    }

    /// Record stake/collateral ratio for future stakes, leaving out
    /// collateral that is about to leave the active pool
    pub fn update_system_snapshots_exclude_coll_remainder(
        &mut self,
        pools: &PoolLedger,
        collateral_remainder: u128,
    ) -> MoneypResult<()> {
        self.total_stakes_snapshot = self.total_stakes;
        let active = safe_sub(pools.collateral(PoolKind::Active), collateral_remainder)?;
        self.total_collateral_snapshot = safe_add(active, pools.collateral(PoolKind::Default))?;
        Ok(())
    }
}

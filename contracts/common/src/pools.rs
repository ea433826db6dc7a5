//! Collateral Pools
//!
//! Bookkeeping for where RBTC and system debt sit:
//! - the Active pool backs every active vault,
//! - the Default pool holds redistributed amounts not yet applied to vaults,
//! - the Surplus pool holds collateral claimable by owners after a capped
//!   liquidation or a full redemption.
//!
//! Collateral leaving the system is credited to `sent`, keyed by recipient.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{MoneypError, MoneypResult};
use crate::math::{safe_add, safe_sub};
use crate::types::Address;

/// Which pool an amount lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolKind {
    Active,
    Default,
    Surplus,
}

/// Pool balances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolLedger {
    active_collateral: u128,
    active_debt: u128,
    default_collateral: u128,
    default_debt: u128,
    surplus_collateral: u128,
    surplus_balances: BTreeMap<Address, u128>,
    sent: BTreeMap<Address, u128>,
}

impl PoolLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collateral(&self, kind: PoolKind) -> u128 {
        match kind {
            PoolKind::Active => self.active_collateral,
            PoolKind::Default => self.default_collateral,
            PoolKind::Surplus => self.surplus_collateral,
        }
    }

    /// Debt tracked by a pool; the surplus pool never carries debt
    pub fn debt(&self, kind: PoolKind) -> u128 {
        match kind {
            PoolKind::Active => self.active_debt,
            PoolKind::Default => self.default_debt,
            PoolKind::Surplus => 0,
        }
    }

    /// Collateral backing the system: active plus default
    pub fn entire_system_collateral(&self) -> u128 {
        self.active_collateral.saturating_add(self.default_collateral)
    }

    /// Debt owed to the system: active plus default
    pub fn entire_system_debt(&self) -> u128 {
        self.active_debt.saturating_add(self.default_debt)
    }

    fn collateral_mut(&mut self, kind: PoolKind) -> &mut u128 {
        match kind {
            PoolKind::Active => &mut self.active_collateral,
            PoolKind::Default => &mut self.default_collateral,
            PoolKind::Surplus => &mut self.surplus_collateral,
        }
    }

    fn debt_mut(&mut self, kind: PoolKind) -> MoneypResult<&mut u128> {
        match kind {
            PoolKind::Active => Ok(&mut self.active_debt),
            PoolKind::Default => Ok(&mut self.default_debt),
            PoolKind::Surplus => Err(MoneypError::InsufficientPoolBalance { available: 0, required: 0 }),
        }
    }

    /// RBTC entering the system from a borrower
    pub fn deposit_collateral(&mut self, amount: u128) -> MoneypResult<()> {
        self.active_collateral = safe_add(self.active_collateral, amount)?;
        Ok(())
    }

    pub fn increase_debt(&mut self, kind: PoolKind, amount: u128) -> MoneypResult<()> {
        let debt = self.debt_mut(kind)?;
        *debt = safe_add(*debt, amount)?;
        Ok(())
    }

    pub fn decrease_debt(&mut self, kind: PoolKind, amount: u128) -> MoneypResult<()> {
        let debt = self.debt_mut(kind)?;
        *debt = safe_sub(*debt, amount)?;
        Ok(())
    }

    fn withdraw_collateral(&mut self, kind: PoolKind, amount: u128) -> MoneypResult<()> {
        let balance = self.collateral_mut(kind);
        if *balance < amount {
            return Err(MoneypError::InsufficientPoolBalance { available: *balance, required: amount });
        }
        *balance -= amount;
        Ok(())
    }

    /// Move collateral between pools
    pub fn move_collateral(&mut self, from: PoolKind, to: PoolKind, amount: u128) -> MoneypResult<()> {
        self.withdraw_collateral(from, amount)?;
        let balance = self.collateral_mut(to);
        *balance = safe_add(*balance, amount)?;
        Ok(())
    }

    /// Move debt between the active and default pools
    pub fn move_debt(&mut self, from: PoolKind, to: PoolKind, amount: u128) -> MoneypResult<()> {
        self.decrease_debt(from, amount)?;
        self.increase_debt(to, amount)
    }

    /// Pay collateral out of a pool to an external account
    pub fn send_collateral(&mut self, from: PoolKind, to: Address, amount: u128) -> MoneypResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.withdraw_collateral(from, amount)?;
        let entry = self.sent.entry(to).or_insert(0);
        *entry = safe_add(*entry, amount)?;
        Ok(())
    }

    /// Move collateral from the active pool into `owner`'s claimable surplus
    pub fn record_surplus(&mut self, owner: Address, amount: u128) -> MoneypResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.move_collateral(PoolKind::Active, PoolKind::Surplus, amount)?;
        let entry = self.surplus_balances.entry(owner).or_insert(0);
        *entry = safe_add(*entry, amount)?;
        Ok(())
    }

    pub fn surplus_of(&self, owner: Address) -> u128 {
        self.surplus_balances.get(&owner).copied().unwrap_or(0)
    }

    /// Pay out `owner`'s whole surplus
    pub fn claim_surplus(&mut self, owner: Address) -> MoneypResult<u128> {
        let amount = self.surplus_of(owner);
        if amount == 0 {
            return Err(MoneypError::NoSurplusToClaim { owner });
        }
        self.surplus_balances.remove(&owner);
        self.send_collateral(PoolKind::Surplus, owner, amount)?;
        Ok(amount)
    }

    /// Total collateral ever paid out to `account`
    pub fn collateral_sent_to(&self, account: Address) -> u128 {
        self.sent.get(&account).copied().unwrap_or(0)
    }
}

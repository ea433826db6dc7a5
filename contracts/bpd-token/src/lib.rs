//! BPD Token
//!
//! Fungible ledger for the BPD stablecoin. Only authorised minters (the
//! vault manager and the Stability Pool) can mint or burn; anyone can
//! transfer their own balance.

use std::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use moneyp_common::{
    constants::{addresses, token},
    errors::{MoneypError, MoneypResult},
    interfaces::StablecoinLedger,
    math::{safe_add, safe_sub},
    types::Address,
};

/// `log` target for diagnostics emitted by this crate
pub const LOG_TARGET: &str = "moneyp::bpd_token";

// ============ Token State ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BpdToken {
    balances: BTreeMap<Address, u128>,
    total_supply: u128,
    minters: BTreeSet<Address>,
}

impl Default for BpdToken {
    fn default() -> Self {
        Self::new()
    }
}

impl BpdToken {
    /// Ledger with the vault manager and Stability Pool as minters
    pub fn new() -> Self {
        Self::with_minters([addresses::VAULT_MANAGER, addresses::STABILITY_POOL])
    }

    pub fn with_minters(minters: impl IntoIterator<Item = Address>) -> Self {
        Self {
            balances: BTreeMap::new(),
            total_supply: 0,
            minters: minters.into_iter().collect(),
        }
    }

    pub fn name() -> &'static str {
        token::NAME
    }

    pub fn symbol() -> &'static str {
        token::SYMBOL
    }

    pub fn decimals() -> u8 {
        token::DECIMALS
    }

    pub fn is_minter(&self, account: Address) -> bool {
        self.minters.contains(&account)
    }

    fn require_minter(&self, caller: Address) -> MoneypResult<()> {
        if !self.is_minter(caller) {
            return Err(MoneypError::Unauthorized { caller });
        }
        Ok(())
    }

    fn debit(&mut self, account: Address, amount: u128) -> MoneypResult<()> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(MoneypError::InsufficientBalance { available, requested: amount });
        }
        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, remaining);
        }
        Ok(())
    }

    fn credit(&mut self, account: Address, amount: u128) -> MoneypResult<()> {
        let balance = safe_add(self.balance_of(account), amount)?;
        self.balances.insert(account, balance);
        Ok(())
    }
}

impl StablecoinLedger for BpdToken {
    fn mint(&mut self, caller: Address, to: Address, amount: u128) -> MoneypResult<()> {
        self.require_minter(caller)?;
        if amount == 0 {
            return Ok(());
        }
        self.total_supply = safe_add(self.total_supply, amount)?;
        self.credit(to, amount)?;
        log::trace!(target: LOG_TARGET, "minted {}", amount);
        Ok(())
    }

    fn burn(&mut self, caller: Address, from: Address, amount: u128) -> MoneypResult<()> {
        self.require_minter(caller)?;
        if amount == 0 {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.total_supply = safe_sub(self.total_supply, amount)?;
        log::trace!(target: LOG_TARGET, "burned {}", amount);
        Ok(())
    }

    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> MoneypResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    fn balance_of(&self, account: Address) -> u128 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }
}

// ============ Tests ============

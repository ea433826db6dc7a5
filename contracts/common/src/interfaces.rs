//! Collaborator Interfaces
//!
//! The engine reaches the price feed, the BPD ledger, the Stability Pool
//! and the fee sink only through these traits. Implementations must be
//! `Clone` so a transaction can checkpoint and restore them.

use crate::errors::MoneypResult;
use crate::types::Address;

/// Source of the RBTC/USD price (wad)
pub trait PriceOracle: Clone {
    /// Current price; may update internal state such as the last good price
    fn fetch_price(&mut self) -> MoneypResult<u128>;
}

/// The BPD token ledger
pub trait StablecoinLedger: Clone {
    /// Mint `amount` to `to`; `caller` must be an authorised minter
    fn mint(&mut self, caller: Address, to: Address, amount: u128) -> MoneypResult<()>;

    /// Burn `amount` held by `from`; `caller` must be an authorised minter
    fn burn(&mut self, caller: Address, from: Address, amount: u128) -> MoneypResult<()>;

    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> MoneypResult<()>;

    fn balance_of(&self, account: Address) -> u128;

    fn total_supply(&self) -> u128;
}

/// What the liquidation engine needs from the Stability Pool
pub trait StabilityPoolOffset: Clone {
    /// BPD currently deposited
    fn total_deposits(&self) -> u128;

    /// Cancel `debt` against deposits and hand `collateral` to depositors.
    /// No-op for an empty pool or zero debt.
    fn offset(&mut self, debt: u128, collateral: u128, now: u64) -> MoneypResult<()>;

    /// Accrue community issuance up to `now`
    fn trigger_reward_event(&mut self, now: u64) -> MoneypResult<()>;

    /// Add to a deposit; returns the collateral gain paid out
    fn provide(&mut self, depositor: Address, amount: u128, now: u64) -> MoneypResult<u128>;

    /// Withdraw up to `amount`; returns `(bpd_withdrawn, collateral_gain)`
    fn withdraw(&mut self, depositor: Address, amount: u128, now: u64) -> MoneypResult<(u128, u128)>;

    /// Deposit after all offsets so far
    fn compounded_deposit(&self, depositor: Address) -> u128;

    /// Unclaimed collateral gain of a depositor
    fn collateral_gain(&self, depositor: Address) -> u128;
}

/// Receiver of borrowing and redemption fees
pub trait FeeSink: Clone {
    fn receive_collateral_fee(&mut self, amount: u128) -> MoneypResult<()>;

    fn receive_bpd_fee(&mut self, amount: u128) -> MoneypResult<()>;
}

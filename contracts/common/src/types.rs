//! Core Types for Moneyp Protocol
//!
//! Data structures shared by the engine and its collaborators.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{limits, precision, time};

/// Type alias for addresses (32-byte account identifier)
pub type Address = [u8; 32];

/// Vaults are keyed by their owner's address
pub type VaultId = Address;

// ============ Vault Types ============

/// Lifecycle status of a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum VaultStatus {
    /// Never opened
    #[default]
    NonExistent,
    /// Open and backing debt
    Active,
    /// Closed by its owner after repaying
    ClosedByOwner,
    /// Closed by a liquidation
    ClosedByLiquidation,
    /// Fully redeemed against
    ClosedByRedemption,
}

impl VaultStatus {
    /// True for any of the terminal `Closed*` states
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            Self::ClosedByOwner | Self::ClosedByLiquidation | Self::ClosedByRedemption
        )
    }
}

/// Individual vault state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Vault {
    /// Recorded debt in BPD (wad), including the gas compensation reserve
    pub debt: u128,
    /// Recorded collateral in RBTC (wad)
    pub collateral: u128,
    /// Weight in reward redistribution
    pub stake: u128,
    /// Current status
    pub status: VaultStatus,
    /// Position in the owners array
    pub array_index: u64,
}

impl Vault {
    /// Returns true if vault is active
    pub fn is_active(&self) -> bool {
        self.status == VaultStatus::Active
    }

    /// Debt excluding the gas compensation reserve
    pub fn net_debt(&self) -> u128 {
        self.debt.saturating_sub(limits::GAS_COMPENSATION)
    }
}

/// Reward accumulators observed by a vault at its last update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RewardSnapshot {
    /// `L_collateral` at last application
    pub collateral: u128,
    /// `L_debt` at last application
    pub debt: u128,
}

/// Debt and collateral of a vault with pending rewards folded in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntireDebtAndColl {
    pub debt: u128,
    pub collateral: u128,
    pub pending_debt_reward: u128,
    pub pending_collateral_reward: u128,
}

/// Operation that touched a vault, carried on vault events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum VaultOperation {
    Open = 0,
    Close = 1,
    Adjust = 2,
    ApplyPendingRewards = 3,
    LiquidateInNormalMode = 4,
    LiquidateInRecoveryMode = 5,
    RedeemCollateral = 6,
}

/// System operating mode, derived from TCR on every read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemMode {
    Normal,
    Recovery,
}

// ============ Transaction Context ============

/// Caller and clock for a single transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    /// Address invoking the operation
    pub caller: Address,
    /// Unix timestamp in seconds
    pub timestamp: u64,
}

impl TxContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }
}

// ============ Configuration ============

/// Runtime-tunable protocol parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProtocolParams {
    /// Seconds after deployment during which redemptions are rejected
    pub bootstrap_period: u64,
    /// Vaults with ICR below this are skipped by redemptions (wad)
    pub redemption_icr_floor: u128,
    /// Maximum number of vaults in the sorted list, `None` for unbounded
    pub max_sorted_vaults: Option<u64>,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            bootstrap_period: time::BOOTSTRAP_PERIOD,
            redemption_icr_floor: precision::ONE_HUNDRED_PERCENT,
            max_sorted_vaults: None,
        }
    }
}

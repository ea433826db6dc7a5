//! Protocol Events for Moneyp
//!
//! Events are collected in an [`EventLog`] during execution and can be
//! indexed off-chain. They are borsh-encodable for storage.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{Address, VaultOperation};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Vault Events (0x01 - 0x1F)
    VaultUpdated = 0x01,
    VaultLiquidated = 0x02,
    BorrowingFeePaid = 0x03,
    CollateralSurplusRecorded = 0x04,
    CollateralClaimed = 0x05,

    // Liquidation Events (0x20 - 0x3F)
    Liquidation = 0x20,
    Redistribution = 0x21,
    SystemSnapshotsUpdated = 0x22,

    // Redemption / Fee Events (0x40 - 0x5F)
    Redemption = 0x40,
    BaseRateUpdated = 0x41,
    LastFeeOpTimeUpdated = 0x42,

    // Stability Pool Events (0x60 - 0x7F)
    StabilityDeposit = 0x60,
    StabilityWithdrawal = 0x61,
}

/// Main event enum containing all possible protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum MoneypEvent {
    // ============ Vault Events ============

    /// A vault's debt, collateral or stake changed
    VaultUpdated {
        borrower: Address,
        debt: u128,
        collateral: u128,
        stake: u128,
        operation: VaultOperation,
        timestamp: u64,
    },

    /// A vault was closed by liquidation
    VaultLiquidated {
        borrower: Address,
        debt: u128,
        collateral: u128,
        operation: VaultOperation,
        timestamp: u64,
    },

    /// Borrowing fee minted to the fee sink
    BorrowingFeePaid {
        borrower: Address,
        fee: u128,
        timestamp: u64,
    },

    /// Collateral left after a capped liquidation or full redemption
    CollateralSurplusRecorded {
        owner: Address,
        amount: u128,
        timestamp: u64,
    },

    /// Owner withdrew their surplus collateral
    CollateralClaimed {
        owner: Address,
        amount: u128,
        timestamp: u64,
    },

    // ============ Liquidation Events ============

    /// Aggregate result of a liquidation call
    Liquidation {
        liquidated_debt: u128,
        liquidated_collateral: u128,
        collateral_gas_compensation: u128,
        bpd_gas_compensation: u128,
        timestamp: u64,
    },

    /// Reward accumulators after a redistribution
    Redistribution {
        l_collateral: u128,
        l_debt: u128,
        timestamp: u64,
    },

    /// Stake snapshots refreshed after a liquidation
    SystemSnapshotsUpdated {
        total_stakes_snapshot: u128,
        total_collateral_snapshot: u128,
        timestamp: u64,
    },

    // ============ Redemption / Fee Events ============

    /// Aggregate result of a redemption call
    Redemption {
        redeemer: Address,
        attempted_bpd: u128,
        actual_bpd: u128,
        collateral_drawn: u128,
        collateral_fee: u128,
        timestamp: u64,
    },

    /// Base rate written
    BaseRateUpdated {
        base_rate: u128,
        timestamp: u64,
    },

    /// Fee operation clock advanced
    LastFeeOpTimeUpdated {
        last_fee_operation_time: u64,
        timestamp: u64,
    },

    // ============ Stability Pool Events ============

    /// BPD provided to the Stability Pool
    StabilityDeposit {
        depositor: Address,
        amount: u128,
        new_deposit: u128,
        timestamp: u64,
    },

    /// BPD and gains withdrawn from the Stability Pool
    StabilityWithdrawal {
        depositor: Address,
        amount: u128,
        collateral_gain: u128,
        timestamp: u64,
    },
}

impl MoneypEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::VaultUpdated { .. } => EventType::VaultUpdated,
            Self::VaultLiquidated { .. } => EventType::VaultLiquidated,
            Self::BorrowingFeePaid { .. } => EventType::BorrowingFeePaid,
            Self::CollateralSurplusRecorded { .. } => EventType::CollateralSurplusRecorded,
            Self::CollateralClaimed { .. } => EventType::CollateralClaimed,
            Self::Liquidation { .. } => EventType::Liquidation,
            Self::Redistribution { .. } => EventType::Redistribution,
            Self::SystemSnapshotsUpdated { .. } => EventType::SystemSnapshotsUpdated,
            Self::Redemption { .. } => EventType::Redemption,
            Self::BaseRateUpdated { .. } => EventType::BaseRateUpdated,
            Self::LastFeeOpTimeUpdated { .. } => EventType::LastFeeOpTimeUpdated,
            Self::StabilityDeposit { .. } => EventType::StabilityDeposit,
            Self::StabilityWithdrawal { .. } => EventType::StabilityWithdrawal,
        }
    }

    /// Timestamp of the transaction that emitted the event
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::VaultUpdated { timestamp, .. }
            | Self::VaultLiquidated { timestamp, .. }
            | Self::BorrowingFeePaid { timestamp, .. }
            | Self::CollateralSurplusRecorded { timestamp, .. }
            | Self::CollateralClaimed { timestamp, .. }
            | Self::Liquidation { timestamp, .. }
            | Self::Redistribution { timestamp, .. }
            | Self::SystemSnapshotsUpdated { timestamp, .. }
            | Self::Redemption { timestamp, .. }
            | Self::BaseRateUpdated { timestamp, .. }
            | Self::LastFeeOpTimeUpdated { timestamp, .. }
            | Self::StabilityDeposit { timestamp, .. }
            | Self::StabilityWithdrawal { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<MoneypEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: MoneypEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[MoneypEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<MoneypEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&MoneypEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop events past `len`, used when a transaction rolls back
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

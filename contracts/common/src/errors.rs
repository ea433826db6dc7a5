//! Error Types for Moneyp Protocol
//!
//! Typed errors give callers a precise reason for every rejected
//! transaction. Each variant carries the values that caused the rejection,
//! a stable `code()` for logs, and a coarse [`ErrorKind`] for callers that
//! only care about the category.

use core::fmt;

use crate::types::Address;

/// Result type alias for Moneyp operations
pub type MoneypResult<T> = Result<T, MoneypError>;

/// Main error enum for all Moneyp protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneypError {
    // ============ Vault State Errors ============
    /// Vault does not exist or has been closed
    VaultNotActive { borrower: Address },

    /// Borrower already has an active vault
    VaultAlreadyActive { borrower: Address },

    /// Closing this vault would leave the system without vaults
    OnlyOneVaultInSystem,

    // ============ Collateral Ratio Errors ============
    /// Vault ICR would fall under the required ratio
    BelowMinCollateralRatio { icr: u128, required: u128 },

    /// System TCR would fall under CCR
    TcrBelowCcr { new_tcr: u128 },

    /// Redemptions are disabled while TCR < MCR
    TcrBelowMcr { tcr: u128 },

    // ============ Recovery Mode Errors ============
    /// Operation not allowed in Recovery Mode
    RecoveryModeRestriction { operation: RecoveryModeOp },

    // ============ Amount Errors ============
    /// Net debt would fall under the minimum
    BelowMinNetDebt { net_debt: u128, minimum: u128 },

    /// Zero amount not allowed
    ZeroAmount,

    /// Adjustment changes neither collateral nor debt
    ZeroAdjustment,

    /// Collateral top-up and withdrawal in the same adjustment
    SingularCollateralChange,

    /// Withdrawal exceeds the vault's collateral
    CollateralWithdrawalExceedsCollateral { collateral: u128, requested: u128 },

    /// Repayment would eat into the gas compensation reserve
    RepaymentExceedsDebt { repayable: u128, requested: u128 },

    /// Insufficient balance for operation
    InsufficientBalance { available: u128, requested: u128 },

    /// Nothing could be redeemed from any vault
    UnableToRedeem,

    /// No surplus collateral to claim
    NoSurplusToClaim { owner: Address },

    // ============ Fee Errors ============
    /// Max fee percentage outside the accepted bounds
    InvalidMaxFee { max_fee: u128, min: u128, max: u128 },

    /// Fee would exceed the caller's max fee percentage
    FeeExceedsMax { fee_percentage: u128, max_fee: u128 },

    // ============ Liquidation Errors ============
    /// Batch liquidation called with an empty list
    EmptyBatch,

    /// No vault in the candidate set was liquidated
    NothingToLiquidate,

    // ============ Redemption Errors ============
    /// Redemptions still in the bootstrap period
    RedemptionsBootstrapping { unlock_time: u64 },

    // ============ Sorted List Errors ============
    /// Node already present in the sorted list
    DuplicateNode { id: Address },

    /// Nominal ICR must be positive
    InvalidNicr,

    /// Sorted list is at its maximum size
    ListFull { max_size: usize },

    // ============ Collaborator Errors ============
    /// Price feed returned an unusable price
    InvalidPrice { price: u128 },

    /// Caller not allowed to mint/burn
    Unauthorized { caller: Address },

    /// Pool does not hold enough to cover a transfer
    InsufficientPoolBalance { available: u128, required: u128 },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,
}

/// Coarse error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidState,
    BelowMinCollateralRatio,
    RecoveryModeRestriction,
    BelowMinNetDebt,
    InvalidFeeBounds,
    FeeExceedsMax,
    InsufficientBalance,
    EmptyBatch,
    NothingToLiquidate,
    ZeroAmount,
    InvalidInput,
    Arithmetic,
}

/// Operations restricted during Recovery Mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryModeOp {
    /// Withdrawing collateral
    WithdrawCollateral,
    /// Closing a vault
    CloseVault,
    /// Debt increase that lowers the vault's ICR
    DecreaseIcr,
}

impl MoneypError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::VaultNotActive { .. } => "E001_VAULT_NOT_ACTIVE",
            Self::VaultAlreadyActive { .. } => "E002_VAULT_ALREADY_ACTIVE",
            Self::OnlyOneVaultInSystem => "E003_ONLY_ONE_VAULT",
            Self::BelowMinCollateralRatio { .. } => "E010_BELOW_MIN_CR",
            Self::TcrBelowCcr { .. } => "E011_TCR_BELOW_CCR",
            Self::TcrBelowMcr { .. } => "E012_TCR_BELOW_MCR",
            Self::RecoveryModeRestriction { .. } => "E020_RECOVERY_MODE",
            Self::BelowMinNetDebt { .. } => "E030_BELOW_MIN_NET_DEBT",
            Self::ZeroAmount => "E031_ZERO_AMOUNT",
            Self::ZeroAdjustment => "E032_ZERO_ADJUSTMENT",
            Self::SingularCollateralChange => "E033_SINGULAR_COLL_CHANGE",
            Self::CollateralWithdrawalExceedsCollateral { .. } => "E034_WITHDRAWAL_EXCEEDS_COLL",
            Self::RepaymentExceedsDebt { .. } => "E035_REPAYMENT_EXCEEDS_DEBT",
            Self::InsufficientBalance { .. } => "E036_INSUFFICIENT_BALANCE",
            Self::UnableToRedeem => "E037_UNABLE_TO_REDEEM",
            Self::NoSurplusToClaim { .. } => "E038_NO_SURPLUS",
            Self::InvalidMaxFee { .. } => "E040_INVALID_MAX_FEE",
            Self::FeeExceedsMax { .. } => "E041_FEE_EXCEEDS_MAX",
            Self::EmptyBatch => "E050_EMPTY_BATCH",
            Self::NothingToLiquidate => "E051_NOTHING_TO_LIQUIDATE",
            Self::RedemptionsBootstrapping { .. } => "E060_BOOTSTRAP_PERIOD",
            Self::DuplicateNode { .. } => "E070_DUPLICATE_NODE",
            Self::InvalidNicr => "E071_INVALID_NICR",
            Self::ListFull { .. } => "E072_LIST_FULL",
            Self::InvalidPrice { .. } => "E080_INVALID_PRICE",
            Self::Unauthorized { .. } => "E081_UNAUTHORIZED",
            Self::InsufficientPoolBalance { .. } => "E082_POOL_INSUFFICIENT",
            Self::Overflow => "E090_OVERFLOW",
            Self::Underflow => "E091_UNDERFLOW",
            Self::DivisionByZero => "E092_DIV_ZERO",
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VaultNotActive { .. }
            | Self::VaultAlreadyActive { .. }
            | Self::OnlyOneVaultInSystem
            | Self::NoSurplusToClaim { .. }
            | Self::UnableToRedeem
            | Self::RedemptionsBootstrapping { .. }
            | Self::DuplicateNode { .. }
            | Self::ListFull { .. } => ErrorKind::InvalidState,
            Self::BelowMinCollateralRatio { .. }
            | Self::TcrBelowCcr { .. }
            | Self::TcrBelowMcr { .. } => ErrorKind::BelowMinCollateralRatio,
            Self::RecoveryModeRestriction { .. } => ErrorKind::RecoveryModeRestriction,
            Self::BelowMinNetDebt { .. } => ErrorKind::BelowMinNetDebt,
            Self::InvalidMaxFee { .. } => ErrorKind::InvalidFeeBounds,
            Self::FeeExceedsMax { .. } => ErrorKind::FeeExceedsMax,
            Self::InsufficientBalance { .. }
            | Self::InsufficientPoolBalance { .. }
            | Self::RepaymentExceedsDebt { .. }
            | Self::CollateralWithdrawalExceedsCollateral { .. } => ErrorKind::InsufficientBalance,
            Self::EmptyBatch => ErrorKind::EmptyBatch,
            Self::NothingToLiquidate => ErrorKind::NothingToLiquidate,
            Self::ZeroAmount | Self::ZeroAdjustment => ErrorKind::ZeroAmount,
            Self::SingularCollateralChange
            | Self::InvalidNicr
            | Self::InvalidPrice { .. }
            | Self::Unauthorized { .. } => ErrorKind::InvalidInput,
            Self::Overflow | Self::Underflow | Self::DivisionByZero => ErrorKind::Arithmetic,
        }
    }

    /// Returns true if the caller can fix this by resubmitting with other inputs
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::BelowMinCollateralRatio
                | ErrorKind::BelowMinNetDebt
                | ErrorKind::InvalidFeeBounds
                | ErrorKind::FeeExceedsMax
                | ErrorKind::InsufficientBalance
                | ErrorKind::ZeroAmount
        )
    }
}

impl fmt::Display for MoneypError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VaultNotActive { .. } => write!(f, "vault does not exist or is closed"),
            Self::VaultAlreadyActive { .. } => write!(f, "vault is already active"),
            Self::OnlyOneVaultInSystem => write!(f, "only one vault in the system"),
            Self::BelowMinCollateralRatio { icr, required } => {
                write!(f, "ICR {} below required {}", icr, required)
            }
            Self::TcrBelowCcr { new_tcr } => {
                write!(f, "operation would leave TCR {} below CCR", new_tcr)
            }
            Self::TcrBelowMcr { tcr } => {
                write!(f, "cannot redeem when TCR {} is below MCR", tcr)
            }
            Self::RecoveryModeRestriction { operation } => {
                write!(f, "{:?} not allowed in Recovery Mode", operation)
            }
            Self::BelowMinNetDebt { net_debt, minimum } => {
                write!(f, "net debt {} below minimum {}", net_debt, minimum)
            }
            Self::ZeroAmount => write!(f, "amount must be greater than zero"),
            Self::ZeroAdjustment => write!(f, "debt or collateral change must be non-zero"),
            Self::SingularCollateralChange => {
                write!(f, "cannot withdraw and add collateral at the same time")
            }
            Self::CollateralWithdrawalExceedsCollateral { collateral, requested } => {
                write!(f, "withdrawal {} exceeds collateral {}", requested, collateral)
            }
            Self::RepaymentExceedsDebt { repayable, requested } => {
                write!(f, "repayment {} exceeds repayable debt {}", requested, repayable)
            }
            Self::InsufficientBalance { available, requested } => {
                write!(f, "insufficient balance: {} available, {} requested", available, requested)
            }
            Self::UnableToRedeem => write!(f, "unable to redeem any amount"),
            Self::NoSurplusToClaim { .. } => write!(f, "no collateral available to claim"),
            Self::InvalidMaxFee { max_fee, min, max } => {
                write!(f, "max fee {} outside [{}, {}]", max_fee, min, max)
            }
            Self::FeeExceedsMax { fee_percentage, max_fee } => {
                write!(f, "fee {} exceeds max fee {}", fee_percentage, max_fee)
            }
            Self::EmptyBatch => write!(f, "calldata address array must not be empty"),
            Self::NothingToLiquidate => write!(f, "nothing to liquidate"),
            Self::RedemptionsBootstrapping { unlock_time } => {
                write!(f, "redemptions not allowed until {}", unlock_time)
            }
            Self::DuplicateNode { .. } => write!(f, "list already contains the node"),
            Self::InvalidNicr => write!(f, "NICR must be positive"),
            Self::ListFull { max_size } => write!(f, "list is full ({} nodes)", max_size),
            Self::InvalidPrice { price } => write!(f, "invalid price {}", price),
            Self::Unauthorized { .. } => write!(f, "caller is not authorised"),
            Self::InsufficientPoolBalance { available, required } => {
                write!(f, "pool holds {}, {} required", available, required)
            }
            Self::Overflow => write!(f, "arithmetic overflow"),
            Self::Underflow => write!(f, "arithmetic underflow"),
            Self::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl std::error::Error for MoneypError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_error_codes_unique() {
        let errors = [
            MoneypError::VaultNotActive { borrower: [0u8; 32] },
            MoneypError::BelowMinCollateralRatio { icr: 1, required: 2 },
            MoneypError::ZeroAmount,
            MoneypError::ZeroAdjustment,
            MoneypError::EmptyBatch,
            MoneypError::NothingToLiquidate,
            MoneypError::Overflow,
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(MoneypError::EmptyBatch.kind(), ErrorKind::EmptyBatch);
        assert_eq!(
            MoneypError::TcrBelowCcr { new_tcr: 0 }.kind(),
            ErrorKind::BelowMinCollateralRatio
        );
        assert_eq!(
            MoneypError::InvalidMaxFee { max_fee: 0, min: 1, max: 2 }.kind(),
            ErrorKind::InvalidFeeBounds
        );
        assert!(MoneypError::ZeroAmount.is_recoverable());
        assert!(!MoneypError::NothingToLiquidate.is_recoverable());
    }
}

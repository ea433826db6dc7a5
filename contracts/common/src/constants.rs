//! Protocol Constants
//!
//! All magic numbers and configuration values for the Moneyp protocol.
//! Every ratio, rate and amount is an 18-decimal fixed-point "wad"
//! unless stated otherwise.
//!
//! Runtime-tunable values live in [`crate::types::ProtocolParams`], whose
//! `Default` is built from the constants below.

/// Token Metadata
pub mod token {
    /// Token name
    pub const NAME: &str = "BPD Stablecoin";
    /// Token symbol
    pub const SYMBOL: &str = "BPD";
    /// Decimal places
    pub const DECIMALS: u8 = 18;
    /// One unit with decimals (1 BPD = 1e18 base units)
    pub const ONE: u128 = 1_000_000_000_000_000_000;
}

/// Precision constants
pub mod precision {
    /// Fixed-point scale (1e18)
    pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

    /// Scale used for nominal collateral ratios (1e20), so that NICR keeps
    /// precision for small collateral amounts
    pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

    /// 100% as a wad
    pub const ONE_HUNDRED_PERCENT: u128 = DECIMAL_PRECISION;
}

/// Collateralization Ratios (wads, 1e18 = 100%)
pub mod ratios {
    /// Minimum Collateral Ratio - below this, a vault can be liquidated
    pub const MCR: u128 = 1_100_000_000_000_000_000; // 110%

    /// Critical Collateral Ratio - system enters Recovery Mode below this TCR
    pub const CCR: u128 = 1_500_000_000_000_000_000; // 150%
}

/// Debt Limits
pub mod limits {
    use super::token::ONE;

    /// BPD reserved in the gas pool for every vault, paid to the liquidator
    pub const GAS_COMPENSATION: u128 = 200 * ONE;

    /// Minimum net debt (debt excluding the gas compensation reserve)
    pub const MIN_NET_DEBT: u128 = 1_800 * ONE;

    /// Liquidated collateral share paid to the liquidator: 1 / 200 = 0.5%
    pub const PERCENT_DIVISOR: u128 = 200;
}

/// Fee Configuration (wads)
pub mod fees {
    /// Borrowing fee floor (0.5%)
    pub const BORROWING_FEE_FLOOR: u128 = 5_000_000_000_000_000;

    /// Borrowing fee ceiling (5%)
    pub const MAX_BORROWING_FEE: u128 = 50_000_000_000_000_000;

    /// Redemption fee floor (0.5%), also the lowest accepted max-fee
    pub const REDEMPTION_FEE_FLOOR: u128 = 5_000_000_000_000_000;

    /// Per-minute base rate decay factor; gives a 12 hour half-life
    pub const MINUTE_DECAY_FACTOR: u128 = 999_037_758_833_783_000;

    /// Divisor applied to the redeemed fraction when bumping the base rate
    pub const BETA: u128 = 2;
}

/// Time-related constants (seconds)
pub mod time {
    /// Debounce window for `last_fee_operation_time`
    pub const SECONDS_IN_ONE_MINUTE: u64 = 60;

    /// Redemptions are disabled for this long after deployment
    pub const BOOTSTRAP_PERIOD: u64 = 14 * 24 * 60 * 60;

    /// Cap on the exponent fed into `dec_pow` (1000 years of minutes)
    pub const MAX_DECAY_MINUTES: u64 = 525_600_000;
}

/// Stability Pool Configuration
pub mod stability_pool {
    /// Scale factor applied to P when it would lose too much precision (1e9)
    pub const SCALE_FACTOR: u128 = 1_000_000_000;
}

/// Community issuance schedule for Stability Pool depositors
pub mod issuance {
    use super::token::ONE;

    /// Per-minute issuance factor; halves the remaining supply every year
    pub const ISSUANCE_FACTOR: u128 = 999_998_681_227_695_000;

    /// Total MP ever issued to Stability Pool depositors
    pub const SUPPLY_CAP: u128 = 32_000_000 * ONE;
}

/// Well-known ledger addresses used by the engine
pub mod addresses {
    use crate::types::Address;

    /// Holds the BPD gas compensation reserve of every active vault
    pub const GAS_POOL: Address = [0x6a; 32];

    /// Stability Pool account on the BPD ledger and collateral receiver
    pub const STABILITY_POOL: Address = [0x5b; 32];

    /// Fee sink (MP staking) account
    pub const FEE_SINK: Address = [0xfe; 32];

    /// The engine itself, the only authorised BPD minter
    pub const VAULT_MANAGER: Address = [0x7a; 32];
}

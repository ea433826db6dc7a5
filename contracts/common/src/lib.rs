//! Moneyp Common Library
//!
//! Shared types, constants, and utilities for all Moneyp contracts.
//!
//! Moneyp is a collateralized-debt-position stablecoin: borrowers lock RBTC
//! in vaults and mint BPD against it. This crate holds the pieces every
//! other crate depends on:
//!
//! - **constants**: ratios, fees, limits and well-known addresses
//! - **errors**: [`MoneypError`] and its [`ErrorKind`] taxonomy
//! - **types**: vaults, reward snapshots, transaction context, parameters
//! - **math**: 18-decimal fixed-point arithmetic with 256-bit intermediates
//! - **fee_decay**: the base rate shared by borrowing and redemption fees
//! - **events**: typed protocol events and the per-engine [`EventLog`]
//! - **interfaces**: traits for the price feed, BPD ledger, Stability Pool
//!   and fee sink
//! - **pools**: active/default/surplus collateral bookkeeping
//! - **fee_sink**: MP staking fee collector

/// `log` target for diagnostics emitted by this crate
pub const LOG_TARGET: &str = "moneyp::common";

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod fee_decay;
pub mod events;
pub mod interfaces;
pub mod pools;
pub mod fee_sink;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
pub use fee_decay::*;
pub use events::*;
pub use interfaces::*;
pub use pools::*;
pub use fee_sink::*;

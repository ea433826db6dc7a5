//! Price Feed
//!
//! Provides the RBTC/USD price (wad) to the Moneyp engine. A trusted
//! operator submits prices; `fetch_price` hands out the latest submission
//! and remembers it as the last good price. Submissions that are zero or
//! jump too far from the last good price are refused, so the engine keeps
//! running on the last good price until the operator recovers.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use moneyp_common::{
    constants::precision::DECIMAL_PRECISION,
    errors::{MoneypError, MoneypResult},
    interfaces::PriceOracle,
    math::mul_div,
    types::Address,
};

/// `log` target for diagnostics emitted by this crate
pub const LOG_TARGET: &str = "moneyp::price_oracle";

/// Largest accepted move between consecutive prices (50%)
pub const MAX_PRICE_DEVIATION: u128 = DECIMAL_PRECISION / 2;

/// Whether the last submission was accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum FeedStatus {
    #[default]
    Working,
    /// Last submission was refused; serving the last good price
    Frozen,
}

/// A submitted price
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceReport {
    pub price: u128,
    pub timestamp: u64,
}

// ============ Price Feed State ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceFeed {
    /// Can submit prices
    operator: Address,
    /// Can change the operator
    admin: Address,
    /// Latest accepted submission
    latest: PriceReport,
    /// Price last handed to the engine
    last_good_price: u128,
    status: FeedStatus,
    /// `None` disables the deviation guard
    max_deviation: Option<u128>,
}

impl PriceFeed {
    /// Create a feed with an initial price
    pub fn new(admin: Address, operator: Address, initial_price: u128, timestamp: u64) -> MoneypResult<Self> {
        if initial_price == 0 {
            return Err(MoneypError::InvalidPrice { price: 0 });
        }
        Ok(Self {
            operator,
            admin,
            latest: PriceReport { price: initial_price, timestamp },
            last_good_price: initial_price,
            status: FeedStatus::Working,
            max_deviation: Some(MAX_PRICE_DEVIATION),
        })
    }

    /// Replace the deviation guard
    pub fn with_max_deviation(mut self, max_deviation: Option<u128>) -> Self {
        self.max_deviation = max_deviation;
        self
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn last_good_price(&self) -> u128 {
        self.last_good_price
    }

    pub fn status(&self) -> FeedStatus {
        self.status
    }

    pub fn latest(&self) -> PriceReport {
        self.latest
    }

    /// Submit a new price. Refused submissions freeze the feed on the last
    /// good price and return the reason.
    pub fn submit_price(&mut self, caller: Address, price: u128, timestamp: u64) -> MoneypResult<()> {
        // 1. Only operator can update price
        if caller != self.operator {
            return Err(MoneypError::Unauthorized { caller });
        }

        // 2. Price must be positive and within the deviation guard
        if price == 0 || self.deviation_too_large(price)? {
            self.status = FeedStatus::Frozen;
            log::debug!(
                target: LOG_TARGET,
                "refused price {}, keeping last good price {}",
                price,
                self.last_good_price
            );
            return Err(MoneypError::InvalidPrice { price });
        }

        // 3. Store
        self.latest = PriceReport { price, timestamp };
        self.status = FeedStatus::Working;
        log::trace!(target: LOG_TARGET, "price updated to {}", price);
        Ok(())
    }

    /// Change the operator
    pub fn set_operator(&mut self, caller: Address, operator: Address) -> MoneypResult<()> {
        if caller != self.admin {
            return Err(MoneypError::Unauthorized { caller });
        }
        self.operator = operator;
        Ok(())
    }

    fn deviation_too_large(&self, price: u128) -> MoneypResult<bool> {
        let Some(max) = self.max_deviation else {
            return Ok(false);
        };
        let previous = self.last_good_price;
        let deviation = mul_div(previous.abs_diff(price), DECIMAL_PRECISION, previous)?;
        Ok(deviation > max)
    }
}

impl PriceOracle for PriceFeed {
    fn fetch_price(&mut self) -> MoneypResult<u128> {
        if self.status == FeedStatus::Working {
            self.last_good_price = self.latest.price;
        }
        if self.last_good_price == 0 {
            return Err(MoneypError::InvalidPrice { price: 0 });
        }
        Ok(self.last_good_price)
    }
}

// ============ Tests ============

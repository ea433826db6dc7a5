//! Community Issuance
//!
//! MP rewards for Stability Pool depositors follow a yearly-halving
//! schedule. The cumulative amount issued by time `t` is
//! `supply_cap * (1 - ISSUANCE_FACTOR ^ minutes_since_deployment)`.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use moneyp_common::{
    constants::{issuance, precision::DECIMAL_PRECISION, time},
    errors::MoneypResult,
    math::{dec_pow, mul_div},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CommunityIssuance {
    /// Start of the schedule, seconds
    pub deployment_time: u64,
    /// Total MP ever issued
    pub supply_cap: u128,
    /// MP issued so far
    pub total_issued: u128,
}

impl CommunityIssuance {
    pub fn new(deployment_time: u64) -> Self {
        Self::with_supply_cap(deployment_time, issuance::SUPPLY_CAP)
    }

    pub fn with_supply_cap(deployment_time: u64, supply_cap: u128) -> Self {
        Self { deployment_time, supply_cap, total_issued: 0 }
    }

    /// Share of the supply cap issued by `now` (wad)
    pub fn cumulative_issuance_fraction(&self, now: u64) -> MoneypResult<u128> {
        let minutes = now.saturating_sub(self.deployment_time) / time::SECONDS_IN_ONE_MINUTE;
        let power = dec_pow(issuance::ISSUANCE_FACTOR, minutes)?;
        Ok(DECIMAL_PRECISION.saturating_sub(power))
    }

    /// Issue everything accrued since the last call; returns the new amount
    pub fn issue(&mut self, now: u64) -> MoneypResult<u128> {
        let fraction = self.cumulative_issuance_fraction(now)?;
        let latest_total = mul_div(self.supply_cap, fraction, DECIMAL_PRECISION)?;
        let issued = latest_total.saturating_sub(self.total_issued);
        self.total_issued = self.total_issued.max(latest_total);
        Ok(issued)
    }
}

//! Shared fixtures for the engine tests

use moneyp_bpd_token::BpdToken;
use moneyp_common::{
    constants::{limits, time, token},
    fee_sink::StakingFeeCollector,
    math::mul_div,
    types::{Address, ProtocolParams, TxContext},
};
use moneyp_price_oracle::PriceFeed;
use moneyp_stability_pool::StabilityPool;

use crate::VaultManager;

pub type TestEngine = VaultManager<PriceFeed, BpdToken, StabilityPool, StakingFeeCollector>;

pub const ONE: u128 = token::ONE;

pub const ALICE: Address = [1u8; 32];
pub const BOB: Address = [2u8; 32];
pub const CAROL: Address = [3u8; 32];
pub const DENNIS: Address = [4u8; 32];
pub const ERIN: Address = [5u8; 32];
pub const WHALE: Address = [0x77; 32];
pub const LIQUIDATOR: Address = [0x11; 32];

const FEED_ADMIN: Address = [0xa0; 32];
const FEED_OPERATOR: Address = [0xa1; 32];

pub const DEPLOY_TIME: u64 = 1_000;
pub const T0: u64 = DEPLOY_TIME;
pub const BOOTSTRAP: u64 = time::BOOTSTRAP_PERIOD;
pub const AFTER_BOOTSTRAP: u64 = DEPLOY_TIME + BOOTSTRAP;

/// Engine with default parameters and an unguarded price feed
pub fn engine_at_price(price: u128) -> TestEngine {
    engine_with_params(ProtocolParams::default(), price)
}

pub fn engine_with_params(params: ProtocolParams, price: u128) -> TestEngine {
    let feed = PriceFeed::new(FEED_ADMIN, FEED_OPERATOR, price, DEPLOY_TIME)
        .unwrap()
        .with_max_deviation(None);
    VaultManager::new(
        params,
        feed,
        BpdToken::new(),
        StabilityPool::new(DEPLOY_TIME),
        StakingFeeCollector::new(),
        DEPLOY_TIME,
    )
}

pub fn set_price(engine: &mut TestEngine, price: u128) {
    engine.oracle_mut().submit_price(FEED_OPERATOR, price, DEPLOY_TIME).unwrap();
}

pub fn ctx(caller: Address, timestamp: u64) -> TxContext {
    TxContext::new(caller, timestamp)
}

/// Open a vault at `T0` accepting any fee
pub fn open(engine: &mut TestEngine, owner: Address, bpd_amount: u128, collateral: u128) {
    engine
        .open_vault(&ctx(owner, T0), ONE, bpd_amount, collateral, None, None)
        .unwrap();
}

/// Composite debt of a vault opened for `bpd_amount` at the fee floor
pub fn composite_debt(bpd_amount: u128) -> u128 {
    bpd_amount + bpd_amount / 200 + limits::GAS_COMPENSATION
}

/// Collateral giving `icr` at `price` for a vault opened for `bpd_amount`
pub fn collateral_for_icr(bpd_amount: u128, icr: u128, price: u128) -> u128 {
    mul_div(composite_debt(bpd_amount), icr, price).unwrap()
}

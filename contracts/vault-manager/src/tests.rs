//! End-to-end scenarios across borrower operations, liquidation,
//! redemption and the Stability Pool

use proptest::prelude::*;

use moneyp_common::{
    constants::{addresses, fees, limits, ratios},
    errors::{MoneypError, RecoveryModeOp},
    events::{EventType, MoneypEvent},
    fee_decay::FeeDecayState,
    interfaces::{StabilityPoolOffset, StablecoinLedger},
    math::{dec_pow, mul_div},
    pools::PoolKind,
    types::{SystemMode, VaultStatus},
};

use crate::test_utils::*;
use crate::RedemptionRequest;

/// Structural invariants that must hold after every committed operation
fn assert_invariants(engine: &TestEngine) {
    let state = engine.state();

    let stakes: u128 = state.vaults.active_vaults().map(|(_, v)| v.stake).sum();
    assert_eq!(stakes, state.vaults.total_stakes(), "stake sum");

    assert_eq!(state.sorted.len(), engine.vault_owners_count());
    for (id, _) in state.vaults.active_vaults() {
        assert!(state.sorted.contains(id));
    }
    let keys: Vec<u128> = state
        .sorted
        .iter()
        .map(|id| state.sorted.nicr_of(&id).unwrap())
        .collect();
    assert!(keys.windows(2).all(|w| w[0] >= w[1]), "list out of order: {:?}", keys);

    // Vault collateral including pending rewards is backed by the pools,
    // up to redistribution rounding
    let owed: u128 = state
        .vaults
        .active_vaults()
        .map(|(id, _)| engine.entire_debt_and_coll(id).unwrap().collateral)
        .sum();
    let held = state.pools.collateral(PoolKind::Active) + state.pools.collateral(PoolKind::Default);
    assert!(owed <= held, "owed {} > held {}", owed, held);
    assert!(held - owed < 1_000_000, "dust {}", held - owed);
}

// ============ Redistribution ============

#[test]
fn test_liquidation_with_empty_pool_redistributes() {
    let mut engine = engine_at_price(10_000 * ONE);
    let healthy = collateral_for_icr(2_000 * ONE, 20 * ONE, 10_000 * ONE);
    let risky = collateral_for_icr(2_000 * ONE, 12 * ONE / 10, 10_000 * ONE);
    assert_eq!(risky, 2_652 * ONE / 10_000);
    open(&mut engine, ALICE, 2_000 * ONE, healthy);
    open(&mut engine, BOB, 2_000 * ONE, risky);

    set_price(&mut engine, 9_000 * ONE);
    assert!(engine.current_icr(&BOB, 9_000 * ONE).unwrap() < ratios::MCR);
    assert_eq!(engine.system_mode(9_000 * ONE).unwrap(), SystemMode::Normal);

    let totals = engine.liquidate(&ctx(LIQUIDATOR, T0), BOB).unwrap();
    let gas_collateral = risky / limits::PERCENT_DIVISOR;
    assert_eq!(totals.liquidated, vec![BOB]);
    assert_eq!(totals.debt_to_offset, 0);
    assert_eq!(totals.debt_to_redistribute, composite_debt(2_000 * ONE));
    assert_eq!(totals.collateral_to_redistribute, risky - gas_collateral);
    assert_eq!(engine.vault_status(&BOB), VaultStatus::ClosedByLiquidation);

    let pools = &engine.state().pools;
    assert_eq!(pools.debt(PoolKind::Default), composite_debt(2_000 * ONE));
    assert_eq!(pools.collateral(PoolKind::Default), risky - gas_collateral);
    assert_eq!(pools.collateral_sent_to(LIQUIDATOR), gas_collateral);
    assert_eq!(engine.ledger().balance_of(LIQUIDATOR), limits::GAS_COMPENSATION);

    // Alice is the only remaining stake and inherits everything
    assert!(engine.has_pending_rewards(&ALICE));
    let pending_collateral = engine.pending_collateral_reward(&ALICE).unwrap();
    let pending_debt = engine.pending_debt_reward(&ALICE).unwrap();
    assert!(pending_collateral > 0);
    assert!((risky - gas_collateral).abs_diff(pending_collateral) < 1_000);
    assert!(composite_debt(2_000 * ONE).abs_diff(pending_debt) < 1_000);
    assert_invariants(&engine);

    // Touching the vault folds the rewards in
    engine.add_collateral(&ctx(ALICE, T0), ONE, None, None).unwrap();
    assert!(!engine.has_pending_rewards(&ALICE));
    let vault = engine.vault(&ALICE).unwrap();
    assert_eq!(vault.collateral, healthy + ONE + pending_collateral);
    assert_eq!(vault.debt, composite_debt(2_000 * ONE) + pending_debt);
    assert_invariants(&engine);
}

// ============ Stability Pool Offset ============

/// Whale vault funding the Stability Pool, plus a risky vault for Dennis
fn engine_with_funded_pool() -> TestEngine {
    let mut engine = engine_at_price(10_000 * ONE);
    let whale_bpd = 1_000_000_000 * ONE;
    open(&mut engine, WHALE, whale_bpd, 300_000 * ONE);
    engine.provide_to_stability_pool(&ctx(WHALE, T0), whale_bpd).unwrap();
    open(
        &mut engine,
        DENNIS,
        2_000 * ONE,
        collateral_for_icr(2_000 * ONE, 12 * ONE / 10, 10_000 * ONE),
    );
    set_price(&mut engine, 9_000 * ONE);
    engine
}

#[test]
fn test_liquidation_offsets_against_pool() {
    let mut engine = engine_with_funded_pool();
    let deposits_before = engine.stability_pool().total_deposits();
    let risky = engine.vault(&DENNIS).unwrap().collateral;
    let debt = composite_debt(2_000 * ONE);

    let totals = engine.liquidate(&ctx(LIQUIDATOR, T0 + 3_600), DENNIS).unwrap();
    let gas_collateral = risky / limits::PERCENT_DIVISOR;
    assert_eq!(totals.debt_to_offset, debt);
    assert_eq!(totals.debt_to_redistribute, 0);

    // Nothing redistributed, the pool absorbed all of it
    let pools = &engine.state().pools;
    assert_eq!(pools.debt(PoolKind::Default), 0);
    assert_eq!(pools.collateral(PoolKind::Default), 0);
    assert_eq!(pools.collateral_sent_to(addresses::STABILITY_POOL), risky - gas_collateral);

    let pool = engine.stability_pool();
    assert_eq!(pool.total_deposits(), deposits_before - debt);
    assert_eq!(pool.collateral(), risky - gas_collateral);
    assert_eq!(engine.ledger().balance_of(addresses::STABILITY_POOL), deposits_before - debt);
    let gain = pool.collateral_gain(WHALE);
    assert!(gain <= risky - gas_collateral);
    assert!((risky - gas_collateral) - gain < 1_000_000);

    // An hour of issuance reached the depositor
    assert!(pool.total_mp_issued() > 0);
    assert!(!pool.g_at(0, 0).is_zero());
    assert!(!engine.has_pending_rewards(&WHALE));
    assert_invariants(&engine);
}

#[test]
fn test_liquidation_with_empty_pool_issues_nothing() {
    let mut engine = engine_at_price(10_000 * ONE);
    open(&mut engine, ALICE, 2_000 * ONE, 10 * ONE);
    open(
        &mut engine,
        DENNIS,
        2_000 * ONE,
        collateral_for_icr(2_000 * ONE, 12 * ONE / 10, 10_000 * ONE),
    );
    set_price(&mut engine, 9_000 * ONE);
    let g_before = engine.stability_pool().g_at(0, 0);
    let issued_before = engine.stability_pool().total_mp_issued();

    let totals = engine.liquidate(&ctx(LIQUIDATOR, T0 + 86_400), DENNIS).unwrap();
    assert_eq!(totals.debt_to_offset, 0);
    assert_eq!(totals.debt_to_redistribute, composite_debt(2_000 * ONE));

    let pool = engine.stability_pool();
    assert_eq!(pool.g_at(0, 0), g_before);
    assert_eq!(pool.total_mp_issued(), issued_before);
    assert_eq!(pool.collateral(), 0);
    assert_invariants(&engine);
}

#[test]
fn test_day_of_issuance_into_small_pool() {
    let mut engine = engine_at_price(10_000 * ONE);
    open(&mut engine, ALICE, 2_000 * ONE, 10 * ONE);
    engine.provide_to_stability_pool(&ctx(ALICE, T0), 100 * ONE).unwrap();
    open(
        &mut engine,
        DENNIS,
        2_000 * ONE,
        collateral_for_icr(2_000 * ONE, 12 * ONE / 10, 10_000 * ONE),
    );
    set_price(&mut engine, 9_000 * ONE);

    let totals = engine.liquidate(&ctx(LIQUIDATOR, T0 + 86_400), DENNIS).unwrap();
    assert_eq!(totals.debt_to_offset, 100 * ONE);
    assert_eq!(totals.debt_to_redistribute, composite_debt(2_000 * ONE) - 100 * ONE);
    assert!(engine.stability_pool().total_mp_issued() > 0);

    // Collecting gains after the day still works
    let (withdrawn, gain) = engine
        .withdraw_from_stability_pool(&ctx(ALICE, T0 + 86_400), 0)
        .unwrap();
    assert_eq!(withdrawn, 0);
    assert!(gain > 0);
    let pool = engine.stability_pool();
    assert!(pool.mp_paid_to(ALICE) > 0);
    assert!(pool.mp_paid_to(ALICE) <= pool.total_mp_issued());
    assert_invariants(&engine);
}

#[test]
fn test_pool_withdrawal_blocked_by_undercollateralized_vault() {
    let mut engine = engine_with_funded_pool();

    assert!(matches!(
        engine.withdraw_from_stability_pool(&ctx(WHALE, T0), 100 * ONE),
        Err(MoneypError::BelowMinCollateralRatio { .. })
    ));
    // A zero withdrawal only collects gains and stays allowed
    assert_eq!(engine.withdraw_from_stability_pool(&ctx(WHALE, T0), 0).unwrap(), (0, 0));

    engine.liquidate(&ctx(LIQUIDATOR, T0), DENNIS).unwrap();
    let balance_before = engine.ledger().balance_of(WHALE);
    let (withdrawn, gain) = engine.withdraw_from_stability_pool(&ctx(WHALE, T0), 100 * ONE).unwrap();
    assert_eq!(withdrawn, 100 * ONE);
    assert!(gain > 0);
    assert_eq!(engine.ledger().balance_of(WHALE), balance_before + 100 * ONE);
}

// ============ Sequential Liquidation ============

#[test]
fn test_sequence_stops_at_first_healthy_vault() {
    let mut engine = engine_at_price(10_000 * ONE);
    let p0 = 10_000 * ONE;
    // ICRs after the price halves: 90%, 95%, 120%, 200%, 300%
    open(&mut engine, ALICE, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 18 * ONE / 10, p0));
    open(&mut engine, BOB, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 19 * ONE / 10, p0));
    open(&mut engine, CAROL, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 24 * ONE / 10, p0));
    open(&mut engine, DENNIS, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 4 * ONE, p0));
    open(&mut engine, ERIN, 20_000 * ONE, collateral_for_icr(20_000 * ONE, 6 * ONE, p0));
    engine.provide_to_stability_pool(&ctx(ERIN, T0), 20_000 * ONE).unwrap();

    set_price(&mut engine, 5_000 * ONE);
    assert_eq!(engine.system_mode(5_000 * ONE).unwrap(), SystemMode::Normal);

    let totals = engine.liquidate_vaults(&ctx(LIQUIDATOR, T0), 5).unwrap();
    assert_eq!(totals.liquidated, vec![ALICE, BOB]);
    assert_eq!(totals.debt_in_sequence, 2 * composite_debt(2_000 * ONE));
    assert_eq!(totals.debt_to_redistribute, 0);
    assert_eq!(engine.vault_owners_count(), 3);
    for survivor in [CAROL, DENNIS, ERIN] {
        assert_eq!(engine.vault_status(&survivor), VaultStatus::Active);
        assert!(!engine.has_pending_rewards(&survivor));
    }
    assert_eq!(engine.ledger().balance_of(LIQUIDATOR), 2 * limits::GAS_COMPENSATION);
    assert_eq!(
        engine.stability_pool().total_deposits(),
        20_000 * ONE - 2 * composite_debt(2_000 * ONE)
    );

    // Nothing left to do
    assert_eq!(
        engine.liquidate_vaults(&ctx(LIQUIDATOR, T0), 5),
        Err(MoneypError::NothingToLiquidate)
    );
    assert_invariants(&engine);
}

#[test]
fn test_sequence_never_liquidates_the_head() {
    let mut engine = engine_at_price(10_000 * ONE);
    let collateral = collateral_for_icr(2_000 * ONE, 21 * ONE / 10, 10_000 * ONE);
    open(&mut engine, ALICE, 2_000 * ONE, collateral);
    open(&mut engine, BOB, 2_000 * ONE, collateral);

    // Both at 105%, which is also the TCR
    set_price(&mut engine, 5_000 * ONE);
    assert_eq!(engine.system_mode(5_000 * ONE).unwrap(), SystemMode::Recovery);

    let totals = engine.liquidate_vaults(&ctx(LIQUIDATOR, T0), 10).unwrap();
    assert_eq!(totals.liquidated, vec![ALICE]);
    assert_eq!(engine.vault_status(&BOB), VaultStatus::Active);
    assert!(composite_debt(2_000 * ONE).abs_diff(engine.pending_debt_reward(&BOB).unwrap()) < 1_000);
    assert_invariants(&engine);
}

#[test]
fn test_batch_liquidation_skips_ineligible_ids() {
    let mut engine = engine_at_price(10_000 * ONE);
    let p0 = 10_000 * ONE;
    open(&mut engine, ALICE, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 12 * ONE / 10, p0));
    open(&mut engine, BOB, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 5 * ONE, p0));
    open(&mut engine, CAROL, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 5 * ONE, p0));
    set_price(&mut engine, 9_000 * ONE);

    assert_eq!(
        engine.batch_liquidate_vaults(&ctx(LIQUIDATOR, T0), &[]),
        Err(MoneypError::EmptyBatch)
    );
    assert_eq!(
        engine.batch_liquidate_vaults(&ctx(LIQUIDATOR, T0), &[BOB, DENNIS]),
        Err(MoneypError::NothingToLiquidate)
    );

    let totals = engine
        .batch_liquidate_vaults(&ctx(LIQUIDATOR, T0), &[DENNIS, BOB, ALICE, CAROL])
        .unwrap();
    assert_eq!(totals.liquidated, vec![ALICE]);
    assert_invariants(&engine);
}

#[test]
fn test_liquidate_rejects_inactive_and_healthy_vaults() {
    let mut engine = engine_at_price(10_000 * ONE);
    open(&mut engine, ALICE, 2_000 * ONE, 10 * ONE);
    open(&mut engine, BOB, 2_000 * ONE, 10 * ONE);
    let root = engine.state_root();

    assert_eq!(
        engine.liquidate(&ctx(LIQUIDATOR, T0), CAROL),
        Err(MoneypError::VaultNotActive { borrower: CAROL })
    );
    assert_eq!(engine.liquidate(&ctx(LIQUIDATOR, T0), ALICE), Err(MoneypError::NothingToLiquidate));
    assert_eq!(engine.state_root(), root);
}

// ============ Recovery Mode ============

/// Three identical vaults at 130% once the price halves, so every ICR equals
/// the TCR. Alice and Bob move their BPD into the Stability Pool.
fn engine_in_recovery_mode() -> TestEngine {
    let mut engine = engine_at_price(10_000 * ONE);
    let collateral = collateral_for_icr(2_000 * ONE, 26 * ONE / 10, 10_000 * ONE);
    for owner in [ALICE, BOB, CAROL] {
        open(&mut engine, owner, 2_000 * ONE, collateral);
    }
    engine.provide_to_stability_pool(&ctx(ALICE, T0), 2_000 * ONE).unwrap();
    engine.provide_to_stability_pool(&ctx(BOB, T0), 2_000 * ONE).unwrap();
    set_price(&mut engine, 5_000 * ONE);
    engine
}

#[test]
fn test_capped_liquidation_at_tcr_boundary() {
    let mut engine = engine_in_recovery_mode();
    let price = 5_000 * ONE;
    let tcr = engine.tcr(price).unwrap();
    assert_eq!(tcr, 13 * ONE / 10);
    assert_eq!(engine.current_icr(&ALICE, price).unwrap(), tcr);

    let totals = engine.liquidate(&ctx(LIQUIDATOR, T0), ALICE).unwrap();
    let debt = composite_debt(2_000 * ONE);
    let collateral = collateral_for_icr(2_000 * ONE, 26 * ONE / 10, 10_000 * ONE);
    let capped = mul_div(debt, ratios::MCR, price).unwrap();
    assert_eq!(capped, 4_862 * ONE / 10_000);

    assert_eq!(totals.debt_to_offset, debt);
    assert_eq!(totals.debt_to_redistribute, 0);
    assert_eq!(totals.collateral_gas_compensation, capped / limits::PERCENT_DIVISOR);
    assert_eq!(totals.collateral_to_send_to_sp, capped - capped / limits::PERCENT_DIVISOR);
    assert_eq!(totals.collateral_surplus, collateral - capped);

    // The surplus waits for its owner
    assert_eq!(engine.surplus_of(ALICE), collateral - capped);
    assert_eq!(engine.claim_collateral(&ctx(ALICE, T0)).unwrap(), collateral - capped);
    assert_eq!(engine.surplus_of(ALICE), 0);
    assert_eq!(engine.state().pools.collateral_sent_to(ALICE), collateral - capped);
    assert_eq!(engine.claim_collateral(&ctx(ALICE, T0)), Err(MoneypError::NoSurplusToClaim { owner: ALICE }));
    assert_invariants(&engine);
}

#[test]
fn test_vault_above_tcr_is_immune_in_recovery_mode() {
    let mut engine = engine_in_recovery_mode();
    // A weaker fourth vault drags the TCR below Alice's ICR
    set_price(&mut engine, 10_000 * ONE);
    open(
        &mut engine,
        DENNIS,
        2_000 * ONE,
        collateral_for_icr(2_000 * ONE, 24 * ONE / 10, 10_000 * ONE),
    );
    set_price(&mut engine, 5_000 * ONE);

    let price = 5_000 * ONE;
    assert!(engine.current_icr(&ALICE, price).unwrap() > engine.tcr(price).unwrap());
    assert_eq!(engine.system_mode(price).unwrap(), SystemMode::Recovery);

    let root = engine.state_root();
    assert_eq!(engine.liquidate(&ctx(LIQUIDATOR, T0), ALICE), Err(MoneypError::NothingToLiquidate));
    assert_eq!(engine.state_root(), root);
}

#[test]
fn test_recovery_mode_redistributes_vaults_below_100_percent() {
    let mut engine = engine_at_price(10_000 * ONE);
    let p0 = 10_000 * ONE;
    open(&mut engine, ALICE, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 19 * ONE / 10, p0));
    open(&mut engine, BOB, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 26 * ONE / 10, p0));
    open(&mut engine, CAROL, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 26 * ONE / 10, p0));
    engine.provide_to_stability_pool(&ctx(CAROL, T0), 2_000 * ONE).unwrap();
    set_price(&mut engine, 5_000 * ONE);
    assert_eq!(engine.system_mode(5_000 * ONE).unwrap(), SystemMode::Recovery);

    // Alice sits at 95%: the pool is bypassed entirely
    let totals = engine.liquidate(&ctx(LIQUIDATOR, T0), ALICE).unwrap();
    assert_eq!(totals.debt_to_offset, 0);
    assert_eq!(totals.debt_to_redistribute, composite_debt(2_000 * ONE));
    assert_eq!(engine.stability_pool().total_deposits(), 2_000 * ONE);
    assert_eq!(engine.state().pools.debt(PoolKind::Default), composite_debt(2_000 * ONE));
    assert_invariants(&engine);
}

#[test]
fn test_recovery_mode_borrower_restrictions() {
    let mut engine = engine_in_recovery_mode();
    let price = 5_000 * ONE;

    assert_eq!(
        engine.withdraw_collateral(&ctx(CAROL, T0), ONE / 100, None, None),
        Err(MoneypError::RecoveryModeRestriction { operation: RecoveryModeOp::WithdrawCollateral })
    );
    assert_eq!(
        engine.close_vault(&ctx(CAROL, T0)),
        Err(MoneypError::RecoveryModeRestriction { operation: RecoveryModeOp::CloseVault })
    );

    // New vaults need CCR and pay no fee
    let below_ccr = mul_div(2_200 * ONE, 14 * ONE / 10, price).unwrap();
    assert!(matches!(
        engine.open_vault(&ctx(DENNIS, T0), ONE, 2_000 * ONE, below_ccr, None, None),
        Err(MoneypError::BelowMinCollateralRatio { required: ratios::CCR, .. })
    ));
    let at_two = mul_div(2_200 * ONE, 2 * ONE, price).unwrap();
    let fee = engine
        .open_vault(&ctx(DENNIS, T0), ONE, 2_000 * ONE, at_two, None, None)
        .unwrap();
    assert_eq!(fee, 0);
    assert_eq!(engine.vault(&DENNIS).unwrap().debt, 2_200 * ONE);

    // Topping up collateral is always allowed
    engine.add_collateral(&ctx(CAROL, T0), ONE, None, None).unwrap();
    assert_invariants(&engine);
}

// ============ Redemption ============

#[test]
fn test_partial_redemption_at_face_value() {
    let price = 200 * ONE;
    let mut engine = engine_at_price(price);
    open(&mut engine, ALICE, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 2 * ONE, price));
    open(&mut engine, BOB, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 3 * ONE, price));
    let alice_collateral = engine.vault(&ALICE).unwrap().collateral;
    let active_before = engine.state().pools.collateral(PoolKind::Active);
    let supply_before = engine.ledger().total_supply();

    let hints = engine.get_redemption_hints(120 * ONE, price, 0).unwrap();
    assert_eq!(hints.first_hint, Some(ALICE));
    assert_eq!(hints.truncated_amount, 120 * ONE);

    let request = RedemptionRequest {
        first_hint: hints.first_hint,
        partial_hint_nicr: hints.partial_nicr,
        ..RedemptionRequest::new(120 * ONE, ONE)
    };
    let outcome = engine.redeem_collateral(&ctx(BOB, AFTER_BOOTSTRAP), request).unwrap();

    let drawn = 6 * ONE / 10;
    let expected_base_rate = mul_div(drawn, price, 2 * composite_debt(2_000 * ONE)).unwrap() / fees::BETA;
    let expected_fee = mul_div(drawn, expected_base_rate, ONE).unwrap();
    assert_eq!(outcome.bpd_redeemed, 120 * ONE);
    assert_eq!(outcome.collateral_drawn, drawn);
    assert_eq!(engine.state().fees.base_rate, expected_base_rate);
    assert_eq!(outcome.collateral_fee, expected_fee);
    assert_eq!(outcome.collateral_sent, drawn - expected_fee);

    assert_eq!(engine.state().pools.collateral(PoolKind::Active), active_before - drawn);
    assert_eq!(engine.state().pools.collateral_sent_to(BOB), drawn - expected_fee);
    assert_eq!(engine.state().pools.collateral_sent_to(addresses::FEE_SINK), expected_fee);
    assert_eq!(engine.fee_sink().unallocated().0, expected_fee);
    assert_eq!(engine.ledger().balance_of(BOB), 1_880 * ONE);
    assert_eq!(engine.ledger().total_supply(), supply_before - 120 * ONE);

    let alice = engine.vault(&ALICE).unwrap();
    assert_eq!(alice.debt, composite_debt(2_000 * ONE) - 120 * ONE);
    assert_eq!(alice.collateral, alice_collateral - drawn);
    assert_eq!(engine.nominal_icr(&ALICE).unwrap(), hints.partial_nicr);
    assert_invariants(&engine);
}

/// Alice at 200%, Bob at 300%, Carol at 400% with 4000 BPD, price 200
fn engine_for_redemptions() -> TestEngine {
    let price = 200 * ONE;
    let mut engine = engine_at_price(price);
    open(&mut engine, ALICE, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 2 * ONE, price));
    open(&mut engine, BOB, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 3 * ONE, price));
    open(&mut engine, CAROL, 4_000 * ONE, collateral_for_icr(4_000 * ONE, 4 * ONE, price));
    engine
}

#[test]
fn test_full_redemption_closes_vault_and_leaves_surplus() {
    let mut engine = engine_for_redemptions();
    let alice_collateral = engine.vault(&ALICE).unwrap().collateral;
    let debt_before = engine.entire_system_debt();

    let outcome = engine
        .redeem_collateral(&ctx(CAROL, AFTER_BOOTSTRAP), RedemptionRequest::new(2_010 * ONE, ONE))
        .unwrap();
    let drawn = mul_div(2_010 * ONE, ONE, 200 * ONE).unwrap();
    assert_eq!(outcome.bpd_redeemed, 2_010 * ONE);
    assert_eq!(outcome.collateral_drawn, drawn);

    assert_eq!(engine.vault_status(&ALICE), VaultStatus::ClosedByRedemption);
    assert_eq!(engine.vault_owners_count(), 2);
    assert_eq!(engine.entire_system_debt(), debt_before - 2_010 * ONE - limits::GAS_COMPENSATION);
    assert_eq!(engine.ledger().balance_of(addresses::GAS_POOL), 2 * limits::GAS_COMPENSATION);

    // Alice keeps her BPD and claims the collateral that was not redeemed
    assert_eq!(engine.ledger().balance_of(ALICE), 2_000 * ONE);
    assert_eq!(engine.claim_collateral(&ctx(ALICE, AFTER_BOOTSTRAP)).unwrap(), alice_collateral - drawn);
    assert_invariants(&engine);
}

#[test]
fn test_stale_partial_hint_reduces_fill() {
    let mut engine = engine_for_redemptions();

    // The partial step into Bob is cancelled, only Alice is cleared
    let outcome = engine
        .redeem_collateral(&ctx(CAROL, AFTER_BOOTSTRAP), RedemptionRequest::new(2_100 * ONE, ONE))
        .unwrap();
    assert_eq!(outcome.bpd_redeemed, 2_010 * ONE);
    assert_eq!(engine.vault(&BOB).unwrap().debt, composite_debt(2_000 * ONE));
    assert_eq!(engine.ledger().balance_of(CAROL), 4_000 * ONE - 2_010 * ONE);

    // A cancelled first step redeems nothing at all
    assert_eq!(
        engine.redeem_collateral(&ctx(CAROL, AFTER_BOOTSTRAP), RedemptionRequest::new(100 * ONE, ONE)),
        Err(MoneypError::UnableToRedeem)
    );
    assert_invariants(&engine);
}

#[test]
fn test_redemption_skips_vaults_below_floor() {
    let mut engine = engine_at_price(200 * ONE);
    let p0 = 200 * ONE;
    open(&mut engine, ALICE, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 16 * ONE / 10, p0));
    open(&mut engine, BOB, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 4 * ONE, p0));
    open(&mut engine, CAROL, 2_000 * ONE, collateral_for_icr(2_000 * ONE, 4 * ONE, p0));

    // Alice drops to 88%, Bob and Carol to 220%
    let price = 110 * ONE;
    set_price(&mut engine, price);
    assert!(engine.current_icr(&ALICE, price).unwrap() < ONE);
    assert!(engine.tcr(price).unwrap() >= ratios::MCR);

    let hints = engine.get_redemption_hints(100 * ONE, price, 0).unwrap();
    assert_eq!(hints.first_hint, Some(BOB));
    assert!(engine.is_valid_first_redemption_hint(Some(BOB), price).unwrap());
    assert!(!engine.is_valid_first_redemption_hint(Some(ALICE), price).unwrap());

    let request = RedemptionRequest {
        first_hint: hints.first_hint,
        partial_hint_nicr: hints.partial_nicr,
        ..RedemptionRequest::new(100 * ONE, ONE)
    };
    engine.redeem_collateral(&ctx(CAROL, AFTER_BOOTSTRAP), request).unwrap();
    assert_eq!(engine.vault(&ALICE).unwrap().debt, composite_debt(2_000 * ONE));
    assert_eq!(engine.vault(&BOB).unwrap().debt, composite_debt(2_000 * ONE) - 100 * ONE);
    assert_invariants(&engine);
}

#[test]
fn test_redemption_stops_after_max_iterations() {
    let mut engine = engine_for_redemptions();
    let price = 200 * ONE;

    let hints = engine.get_redemption_hints(3_000 * ONE, price, 1).unwrap();
    assert_eq!(hints.first_hint, Some(ALICE));
    assert_eq!(hints.truncated_amount, 2_010 * ONE);

    // Enough BPD to reach into Bob, but only one vault may be visited
    let request = RedemptionRequest { max_iterations: 1, ..RedemptionRequest::new(3_000 * ONE, ONE) };
    let outcome = engine.redeem_collateral(&ctx(CAROL, AFTER_BOOTSTRAP), request).unwrap();
    assert_eq!(outcome.bpd_redeemed, hints.truncated_amount);
    assert_eq!(outcome.collateral_drawn, mul_div(2_010 * ONE, ONE, price).unwrap());

    assert_eq!(engine.vault_status(&ALICE), VaultStatus::ClosedByRedemption);
    assert_eq!(engine.vault(&BOB).unwrap().debt, composite_debt(2_000 * ONE));
    assert_eq!(engine.ledger().balance_of(CAROL), 4_000 * ONE - 2_010 * ONE);
    assert_invariants(&engine);
}

#[test]
fn test_redemption_event_reports_gross_collateral() {
    let mut engine = engine_for_redemptions();
    engine.take_events();

    let outcome = engine
        .redeem_collateral(&ctx(CAROL, AFTER_BOOTSTRAP), RedemptionRequest::new(2_010 * ONE, ONE))
        .unwrap();
    let events = engine.take_events();
    let event = events
        .iter()
        .find(|e| matches!(e, MoneypEvent::Redemption { .. }))
        .unwrap();
    match event {
        MoneypEvent::Redemption { attempted_bpd, actual_bpd, collateral_drawn, collateral_fee, .. } => {
            assert_eq!(*attempted_bpd, 2_010 * ONE);
            assert_eq!(*actual_bpd, outcome.bpd_redeemed);
            assert_eq!(*collateral_drawn, outcome.collateral_drawn);
            assert_eq!(*collateral_fee, outcome.collateral_fee);
            assert_eq!(*collateral_drawn - *collateral_fee, outcome.collateral_sent);
        }
        other => panic!("expected a redemption event, got {:?}", other),
    }
}

#[test]
fn test_redemption_blocked_below_mcr() {
    let mut engine = engine_at_price(200 * ONE);
    let collateral = collateral_for_icr(2_000 * ONE, 2 * ONE, 200 * ONE);
    open(&mut engine, ALICE, 2_000 * ONE, collateral);
    open(&mut engine, BOB, 2_000 * ONE, collateral);
    set_price(&mut engine, 100 * ONE);

    assert!(matches!(
        engine.redeem_collateral(&ctx(BOB, AFTER_BOOTSTRAP), RedemptionRequest::new(100 * ONE, ONE)),
        Err(MoneypError::TcrBelowMcr { .. })
    ));
}

// ============ Fees ============

#[test]
fn test_base_rate_decays_between_borrows() {
    let mut engine = engine_at_price(10_000 * ONE);
    open(&mut engine, ALICE, 2_000 * ONE, 10 * ONE);
    engine.state.fees = FeeDecayState { base_rate: 5 * ONE / 100, last_fee_operation_time: T0 };

    // Two minutes later
    let debt_before = engine.vault(&ALICE).unwrap().debt;
    engine.borrow(&ctx(ALICE, T0 + 120), ONE, 100 * ONE, None, None).unwrap();
    let after_first = engine.state().fees;
    let expected = mul_div(5 * ONE / 100, dec_pow(fees::MINUTE_DECAY_FACTOR, 2).unwrap(), ONE).unwrap();
    assert_eq!(after_first.base_rate, expected);
    assert!(after_first.base_rate < 5 * ONE / 100);
    assert_eq!(after_first.last_fee_operation_time, T0 + 120);
    let fee = mul_div(100 * ONE, after_first.base_rate, ONE).unwrap();
    assert_eq!(engine.vault(&ALICE).unwrap().debt, debt_before + 100 * ONE + fee);

    // Thirty seconds later: no whole minute has passed
    engine.borrow(&ctx(ALICE, T0 + 150), ONE, 100 * ONE, None, None).unwrap();
    let after_second = engine.state().fees;
    assert_eq!(after_second.base_rate, after_first.base_rate);
    assert_eq!(after_second.last_fee_operation_time, T0 + 120);

    // The clock was not advanced, so a minute has passed by now
    engine.borrow(&ctx(ALICE, T0 + 190), ONE, 100 * ONE, None, None).unwrap();
    let after_third = engine.state().fees;
    assert!(after_third.base_rate < after_second.base_rate);
    assert_eq!(after_third.last_fee_operation_time, T0 + 190);
    assert_invariants(&engine);
}

#[test]
fn test_borrowing_rate_capped() {
    let mut engine = engine_at_price(10_000 * ONE);
    open(&mut engine, ALICE, 2_000 * ONE, 10 * ONE);
    engine.state.fees = FeeDecayState { base_rate: ONE / 2, last_fee_operation_time: T0 };

    assert_eq!(engine.borrowing_rate_with_decay(T0).unwrap(), fees::MAX_BORROWING_FEE);
    assert_eq!(engine.redemption_rate_with_decay(T0).unwrap(), ONE / 2);
    assert!(matches!(
        engine.borrow(&ctx(ALICE, T0), fees::MAX_BORROWING_FEE - 1, 100 * ONE, None, None),
        Err(MoneypError::FeeExceedsMax { .. })
    ));
}

// ============ Events ============

#[test]
fn test_liquidation_event_stream() {
    let mut engine = engine_with_funded_pool();
    engine.take_events();

    engine.liquidate(&ctx(LIQUIDATOR, T0), DENNIS).unwrap();
    let log = engine.events();
    assert_eq!(log.filter_by_type(EventType::VaultLiquidated).len(), 1);
    assert_eq!(log.filter_by_type(EventType::SystemSnapshotsUpdated).len(), 1);
    assert!(log.filter_by_type(EventType::Redistribution).is_empty());

    let events = engine.take_events();
    match events.last() {
        Some(MoneypEvent::Liquidation { liquidated_debt, bpd_gas_compensation, .. }) => {
            assert_eq!(*liquidated_debt, composite_debt(2_000 * ONE));
            assert_eq!(*bpd_gas_compensation, limits::GAS_COMPENSATION);
        }
        other => panic!("expected a liquidation event, got {:?}", other),
    }
    assert!(engine.events().is_empty());
}

// ============ Atomicity ============

#[test]
fn test_failed_redemption_leaves_no_trace() {
    let mut engine = engine_for_redemptions();
    let root = engine.state_root();
    let events = engine.events().len();
    let supply = engine.ledger().total_supply();

    // Clearing Alice bumps the fee far above the floor the caller accepts
    let result = engine.redeem_collateral(
        &ctx(CAROL, AFTER_BOOTSTRAP),
        RedemptionRequest::new(2_010 * ONE, fees::REDEMPTION_FEE_FLOOR),
    );
    assert!(matches!(result, Err(MoneypError::FeeExceedsMax { .. })));

    assert_eq!(engine.state_root(), root);
    assert_eq!(engine.events().len(), events);
    assert_eq!(engine.ledger().total_supply(), supply);
    assert_eq!(engine.vault_status(&ALICE), VaultStatus::Active);
    assert_eq!(engine.ledger().balance_of(CAROL), 4_000 * ONE);
}

#[test]
fn test_failed_open_leaves_no_trace() {
    let mut engine = engine_at_price(10_000 * ONE);
    open(&mut engine, ALICE, 2_000 * ONE, 10 * ONE);
    let root = engine.state_root();
    let supply = engine.ledger().total_supply();

    assert!(engine
        .open_vault(&ctx(BOB, T0), ONE, 2_000 * ONE, ONE / 100, None, None)
        .is_err());
    assert_eq!(engine.state_root(), root);
    assert_eq!(engine.ledger().total_supply(), supply);
    assert_eq!(engine.vault_status(&BOB), VaultStatus::NonExistent);
}

// ============ Properties ============

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_liquidations_preserve_invariants(
        icrs in prop::collection::vec(150u128..400, 3..8),
        drop_percent in 40u128..95,
    ) {
        let p0 = 10_000 * ONE;
        let mut engine = engine_at_price(p0);
        for (i, icr) in icrs.iter().enumerate() {
            let owner = [0x20 + i as u8; 32];
            let collateral = collateral_for_icr(2_000 * ONE, icr * ONE / 100, p0);
            open(&mut engine, owner, 2_000 * ONE, collateral);
        }

        set_price(&mut engine, p0 * drop_percent / 100);
        match engine.liquidate_vaults(&ctx(LIQUIDATOR, T0), icrs.len() as u32) {
            Ok(totals) => prop_assert!(!totals.liquidated.is_empty()),
            Err(err) => prop_assert_eq!(err, MoneypError::NothingToLiquidate),
        }
        prop_assert!(engine.vault_owners_count() >= 1);
        assert_invariants(&engine);
    }
}

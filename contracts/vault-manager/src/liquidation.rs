//! Liquidation Engine
//!
//! A liquidated vault's debt is cancelled against the Stability Pool as far
//! as deposits allow; whatever the pool cannot absorb is redistributed to
//! all remaining vaults in proportion to their stakes. The liquidator earns
//! the vault's 200 BPD gas reserve plus 0.5% of its collateral.
//!
//! Eligibility depends on the mode at the start of the call:
//!
//! | Mode     | ICR                       | Outcome                          |
//! |----------|---------------------------|----------------------------------|
//! | Normal   | `< MCR`                   | offset, then redistribute        |
//! | Recovery | `<= 100%`                 | redistribute everything          |
//! | Recovery | `100% < ICR < MCR`        | as Normal Mode                   |
//! | Recovery | `MCR <= ICR <= TCR`, debt fits in the pool | capped at MCR, rest is surplus |
//! | Recovery | otherwise                 | skipped                          |
//!
//! Each vault is fully processed (offset, redistribution, surplus) before
//! the next one is examined, so later candidates see earlier effects.

use serde::{Deserialize, Serialize};

use moneyp_common::{
    constants::{addresses, limits, precision::ONE_HUNDRED_PERCENT, ratios},
    errors::{MoneypError, MoneypResult},
    events::MoneypEvent,
    interfaces::{FeeSink, PriceOracle, StabilityPoolOffset, StablecoinLedger},
    math::{compute_cr, mul_div, safe_add, safe_sub},
    pools::PoolKind,
    types::{Address, TxContext, VaultOperation, VaultStatus},
};

use crate::{VaultManager, WorldState, LOG_TARGET};

/// How one vault's debt and collateral were split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationValues {
    pub entire_debt: u128,
    pub entire_collateral: u128,
    pub collateral_gas_compensation: u128,
    pub bpd_gas_compensation: u128,
    pub debt_to_offset: u128,
    pub collateral_to_send_to_sp: u128,
    pub debt_to_redistribute: u128,
    pub collateral_to_redistribute: u128,
    pub collateral_surplus: u128,
}

impl LiquidationValues {
    /// Offset against the pool first, redistribute the remainder
    fn offset_and_redistribution(
        entire_debt: u128,
        entire_collateral: u128,
        sp_deposits: u128,
    ) -> MoneypResult<Self> {
        let collateral_gas_compensation = entire_collateral / limits::PERCENT_DIVISOR;
        let collateral_to_liquidate = entire_collateral - collateral_gas_compensation;

        let (debt_to_offset, collateral_to_send_to_sp) = if sp_deposits > 0 {
            let debt_to_offset = entire_debt.min(sp_deposits);
            (debt_to_offset, mul_div(collateral_to_liquidate, debt_to_offset, entire_debt)?)
        } else {
            (0, 0)
        };

        Ok(Self {
            entire_debt,
            entire_collateral,
            collateral_gas_compensation,
            bpd_gas_compensation: limits::GAS_COMPENSATION,
            debt_to_offset,
            collateral_to_send_to_sp,
            debt_to_redistribute: entire_debt - debt_to_offset,
            collateral_to_redistribute: collateral_to_liquidate - collateral_to_send_to_sp,
            collateral_surplus: 0,
        })
    }

    /// Nothing reaches the pool
    fn full_redistribution(entire_debt: u128, entire_collateral: u128) -> Self {
        let collateral_gas_compensation = entire_collateral / limits::PERCENT_DIVISOR;
        Self {
            entire_debt,
            entire_collateral,
            collateral_gas_compensation,
            bpd_gas_compensation: limits::GAS_COMPENSATION,
            debt_to_redistribute: entire_debt,
            collateral_to_redistribute: entire_collateral - collateral_gas_compensation,
            ..Self::default()
        }
    }

    /// Only `debt * MCR / price` collateral is liquidated; the rest is
    /// left to the owner as surplus
    fn capped(entire_debt: u128, entire_collateral: u128, price: u128) -> MoneypResult<Self> {
        let capped_collateral = mul_div(entire_debt, ratios::MCR, price)?.min(entire_collateral);
        let collateral_gas_compensation = capped_collateral / limits::PERCENT_DIVISOR;
        Ok(Self {
            entire_debt,
            entire_collateral,
            collateral_gas_compensation,
            bpd_gas_compensation: limits::GAS_COMPENSATION,
            debt_to_offset: entire_debt,
            collateral_to_send_to_sp: capped_collateral - collateral_gas_compensation,
            collateral_surplus: entire_collateral - capped_collateral,
            ..Self::default()
        })
    }
}

/// Aggregate over every vault liquidated in one call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationTotals {
    pub collateral_in_sequence: u128,
    pub debt_in_sequence: u128,
    pub collateral_gas_compensation: u128,
    pub bpd_gas_compensation: u128,
    pub debt_to_offset: u128,
    pub collateral_to_send_to_sp: u128,
    pub debt_to_redistribute: u128,
    pub collateral_to_redistribute: u128,
    pub collateral_surplus: u128,
    /// Liquidated vaults, in processing order
    pub liquidated: Vec<Address>,
}

impl LiquidationTotals {
    fn add(&mut self, borrower: Address, values: &LiquidationValues) -> MoneypResult<()> {
        self.collateral_in_sequence = safe_add(self.collateral_in_sequence, values.entire_collateral)?;
        self.debt_in_sequence = safe_add(self.debt_in_sequence, values.entire_debt)?;
        self.collateral_gas_compensation =
            safe_add(self.collateral_gas_compensation, values.collateral_gas_compensation)?;
        self.bpd_gas_compensation = safe_add(self.bpd_gas_compensation, values.bpd_gas_compensation)?;
        self.debt_to_offset = safe_add(self.debt_to_offset, values.debt_to_offset)?;
        self.collateral_to_send_to_sp = safe_add(self.collateral_to_send_to_sp, values.collateral_to_send_to_sp)?;
        self.debt_to_redistribute = safe_add(self.debt_to_redistribute, values.debt_to_redistribute)?;
        self.collateral_to_redistribute =
            safe_add(self.collateral_to_redistribute, values.collateral_to_redistribute)?;
        self.collateral_surplus = safe_add(self.collateral_surplus, values.collateral_surplus)?;
        self.liquidated.push(borrower);
        Ok(())
    }

    /// Collateral that went to the pool or to other vaults
    pub fn liquidated_collateral(&self) -> u128 {
        self.collateral_in_sequence
            .saturating_sub(self.collateral_gas_compensation)
            .saturating_sub(self.collateral_surplus)
    }
}

impl<O, T, S, F> VaultManager<O, T, S, F>
where
    O: PriceOracle,
    T: StablecoinLedger,
    S: StabilityPoolOffset,
    F: FeeSink,
{
    /// Liquidate one vault
    pub fn liquidate(&mut self, ctx: &TxContext, borrower: Address) -> MoneypResult<LiquidationTotals> {
        self.transact(|this| {
            this.require_active(&borrower)?;
            this.execute_batch_liquidation(ctx, &[borrower])
        })
    }

    /// Liquidate up to `n` vaults starting from the lowest ICR, stopping at
    /// the first one that is not eligible
    pub fn liquidate_vaults(&mut self, ctx: &TxContext, n: u32) -> MoneypResult<LiquidationTotals> {
        self.transact(|this| this.execute_sequence_liquidation(ctx, n))
    }

    /// Liquidate every eligible vault in `borrowers`, skipping the rest
    pub fn batch_liquidate_vaults(
        &mut self,
        ctx: &TxContext,
        borrowers: &[Address],
    ) -> MoneypResult<LiquidationTotals> {
        self.transact(|this| {
            if borrowers.is_empty() {
                return Err(MoneypError::EmptyBatch);
            }
            this.execute_batch_liquidation(ctx, borrowers)
        })
    }

    // ============ Candidate Selection ============

    fn execute_sequence_liquidation(&mut self, ctx: &TxContext, n: u32) -> MoneypResult<LiquidationTotals> {
        let price = self.fetch_price()?;
        let recovery_at_start = self.check_recovery_mode(price)?;
        let mut back_to_normal_mode = !recovery_at_start;
        let mut totals = LiquidationTotals::default();

        for _ in 0..n {
            // The head is never liquidated
            let Some(borrower) = self.state.sorted.last() else { break };
            if self.state.sorted.first() == Some(borrower) {
                break;
            }
            let icr = self.current_icr(&borrower, price)?;

            let values = if !back_to_normal_mode {
                if icr >= ratios::MCR && self.stability_pool.total_deposits() == 0 {
                    break;
                }
                match self.liquidate_recovery_mode(ctx, borrower, icr, price, &totals)? {
                    Some(values) => values,
                    None => break,
                }
            } else if icr < ratios::MCR {
                self.liquidate_normal_mode(ctx, borrower)?
            } else {
                break;
            };

            totals.add(borrower, &values)?;
            if !back_to_normal_mode {
                back_to_normal_mode = !self.in_recovery_mode_excluding(price, &totals)?;
            }
        }

        self.finish_liquidation(ctx, totals, recovery_at_start)
    }

    fn execute_batch_liquidation(
        &mut self,
        ctx: &TxContext,
        borrowers: &[Address],
    ) -> MoneypResult<LiquidationTotals> {
        let price = self.fetch_price()?;
        let recovery_at_start = self.check_recovery_mode(price)?;
        let mut back_to_normal_mode = !recovery_at_start;
        let mut totals = LiquidationTotals::default();

        for &borrower in borrowers {
            if !self.state.vaults.is_active(&borrower) {
                continue;
            }
            let icr = self.current_icr(&borrower, price)?;

            let values = if !back_to_normal_mode {
                if icr >= ratios::MCR && self.stability_pool.total_deposits() == 0 {
                    continue;
                }
                match self.liquidate_recovery_mode(ctx, borrower, icr, price, &totals)? {
                    Some(values) => values,
                    None => continue,
                }
            } else if icr < ratios::MCR && self.vault_owners_count() > 1 {
                self.liquidate_normal_mode(ctx, borrower)?
            } else {
                continue;
            };

            totals.add(borrower, &values)?;
            if !back_to_normal_mode {
                back_to_normal_mode = !self.in_recovery_mode_excluding(price, &totals)?;
            }
        }

        self.finish_liquidation(ctx, totals, recovery_at_start)
    }

    /// TCR as the liquidation sees it: gas compensation already earned by
    /// the liquidator no longer backs the system
    fn liquidation_tcr(&self, price: u128, totals: &LiquidationTotals) -> MoneypResult<u128> {
        let collateral = safe_sub(self.entire_system_collateral(), totals.collateral_gas_compensation)?;
        compute_cr(collateral, self.entire_system_debt(), price)
    }

    fn in_recovery_mode_excluding(&self, price: u128, totals: &LiquidationTotals) -> MoneypResult<bool> {
        Ok(self.liquidation_tcr(price, totals)? < ratios::CCR)
    }

    // ============ Single Vault ============

    fn liquidate_normal_mode(&mut self, ctx: &TxContext, borrower: Address) -> MoneypResult<LiquidationValues> {
        let (entire_debt, entire_collateral) = self.take_vault_for_liquidation(ctx, &borrower)?;
        let values = LiquidationValues::offset_and_redistribution(
            entire_debt,
            entire_collateral,
            self.stability_pool.total_deposits(),
        )?;
        self.settle_liquidation(ctx, borrower, &values, VaultOperation::LiquidateInNormalMode)?;
        Ok(values)
    }

    /// `None` when the vault is not liquidatable under Recovery Mode rules
    fn liquidate_recovery_mode(
        &mut self,
        ctx: &TxContext,
        borrower: Address,
        icr: u128,
        price: u128,
        totals: &LiquidationTotals,
    ) -> MoneypResult<Option<LiquidationValues>> {
        if self.vault_owners_count() <= 1 {
            return Ok(None);
        }

        let values = if icr <= ONE_HUNDRED_PERCENT {
            let (debt, collateral) = self.take_vault_for_liquidation(ctx, &borrower)?;
            LiquidationValues::full_redistribution(debt, collateral)
        } else if icr < ratios::MCR {
            let (debt, collateral) = self.take_vault_for_liquidation(ctx, &borrower)?;
            LiquidationValues::offset_and_redistribution(debt, collateral, self.stability_pool.total_deposits())?
        } else {
            // Capped liquidation: ICR must not exceed TCR and the pool must
            // absorb the whole debt
            let tcr = self.liquidation_tcr(price, totals)?;
            let entire = self.entire_debt_and_coll(&borrower)?;
            if icr > tcr || entire.debt > self.stability_pool.total_deposits() {
                return Ok(None);
            }
            let (debt, collateral) = self.take_vault_for_liquidation(ctx, &borrower)?;
            LiquidationValues::capped(debt, collateral, price)?
        };

        self.settle_liquidation(ctx, borrower, &values, VaultOperation::LiquidateInRecoveryMode)?;
        Ok(Some(values))
    }

    /// Apply pending rewards, remove the stake and return the vault's
    /// entire debt and collateral
    fn take_vault_for_liquidation(&mut self, ctx: &TxContext, borrower: &Address) -> MoneypResult<(u128, u128)> {
        self.apply_pending_rewards(ctx, borrower)?;
        self.state.vaults.remove_stake(borrower)?;
        let vault = self
            .state
            .vaults
            .vault(borrower)
            .ok_or(MoneypError::VaultNotActive { borrower: *borrower })?;
        Ok((vault.debt, vault.collateral))
    }

    /// Close the vault and move its debt and collateral where `values` says
    fn settle_liquidation(
        &mut self,
        ctx: &TxContext,
        borrower: Address,
        values: &LiquidationValues,
        operation: VaultOperation,
    ) -> MoneypResult<()> {
        let WorldState { vaults, sorted, .. } = &mut self.state;
        vaults.close(&borrower, VaultStatus::ClosedByLiquidation, sorted)?;

        // Offset against the Stability Pool
        if values.debt_to_offset > 0 {
            self.stability_pool.offset(values.debt_to_offset, values.collateral_to_send_to_sp, ctx.timestamp)?;
            self.state.pools.decrease_debt(PoolKind::Active, values.debt_to_offset)?;
            self.ledger.burn(addresses::VAULT_MANAGER, addresses::STABILITY_POOL, values.debt_to_offset)?;
            self.state
                .pools
                .send_collateral(PoolKind::Active, addresses::STABILITY_POOL, values.collateral_to_send_to_sp)?;
        }

        // Redistribute the rest
        if values.debt_to_redistribute > 0 {
            let WorldState { vaults, pools, .. } = &mut self.state;
            vaults.redistribute(values.debt_to_redistribute, values.collateral_to_redistribute, pools)?;
            self.events.emit(MoneypEvent::Redistribution {
                l_collateral: self.state.vaults.l_collateral(),
                l_debt: self.state.vaults.l_debt(),
                timestamp: ctx.timestamp,
            });
        }

        if values.collateral_surplus > 0 {
            self.state.pools.record_surplus(borrower, values.collateral_surplus)?;
            self.events.emit(MoneypEvent::CollateralSurplusRecorded {
                owner: borrower,
                amount: values.collateral_surplus,
                timestamp: ctx.timestamp,
            });
        }

        self.events.emit(MoneypEvent::VaultLiquidated {
            borrower,
            debt: values.entire_debt,
            collateral: values.entire_collateral,
            operation,
            timestamp: ctx.timestamp,
        });
        log::debug!(
            target: LOG_TARGET,
            "liquidated vault: debt {}, collateral {}, offset {}, redistributed {}",
            values.entire_debt,
            values.entire_collateral,
            values.debt_to_offset,
            values.debt_to_redistribute
        );
        Ok(())
    }

    // ============ Settlement ============

    /// Snapshots, the aggregate event and the liquidator's compensation
    fn finish_liquidation(
        &mut self,
        ctx: &TxContext,
        totals: LiquidationTotals,
        recovery_at_start: bool,
    ) -> MoneypResult<LiquidationTotals> {
        if totals.debt_in_sequence == 0 {
            return Err(MoneypError::NothingToLiquidate);
        }

        let WorldState { vaults, pools, .. } = &mut self.state;
        vaults.update_system_snapshots_exclude_coll_remainder(pools, totals.collateral_gas_compensation)?;
        self.events.emit(MoneypEvent::SystemSnapshotsUpdated {
            total_stakes_snapshot: self.state.vaults.total_stakes_snapshot(),
            total_collateral_snapshot: self.state.vaults.total_collateral_snapshot(),
            timestamp: ctx.timestamp,
        });

        self.events.emit(MoneypEvent::Liquidation {
            liquidated_debt: totals.debt_in_sequence,
            liquidated_collateral: totals.liquidated_collateral(),
            collateral_gas_compensation: totals.collateral_gas_compensation,
            bpd_gas_compensation: totals.bpd_gas_compensation,
            timestamp: ctx.timestamp,
        });

        self.ledger.transfer(addresses::GAS_POOL, ctx.caller, totals.bpd_gas_compensation)?;
        self.state
            .pools
            .send_collateral(PoolKind::Active, ctx.caller, totals.collateral_gas_compensation)?;

        log::debug!(
            target: LOG_TARGET,
            "liquidation finished ({} mode at start): {} vaults, debt {}",
            if recovery_at_start { "recovery" } else { "normal" },
            totals.liquidated.len(),
            totals.debt_in_sequence
        );
        Ok(totals)
    }
}

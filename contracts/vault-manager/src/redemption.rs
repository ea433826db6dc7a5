//! Redemption Engine
//!
//! Any BPD holder can swap BPD for RBTC at face value. The BPD is taken out
//! of the vaults with the lowest collateral ratio at or above the
//! redemption floor, starting at the tail of the sorted list:
//!
//! - a vault whose whole net debt is redeemed is closed and its remaining
//!   collateral becomes claimable surplus;
//! - a partially redeemed vault must keep `MIN_NET_DEBT` and land exactly on
//!   the caller's `partial_hint_nicr`, otherwise the partial step is
//!   cancelled and the redemption ends there.
//!
//! A redemption bumps the base rate by half the redeemed share of total
//! debt; the fee is taken from the drawn collateral.

use serde::{Deserialize, Serialize};

use moneyp_common::{
    constants::{addresses, fees, limits, precision::DECIMAL_PRECISION, ratios},
    errors::{MoneypError, MoneypResult},
    events::MoneypEvent,
    interfaces::{FeeSink, PriceOracle, StabilityPoolOffset, StablecoinLedger},
    math::{compute_nominal_cr, mul_div, safe_add, safe_sub},
    pools::PoolKind,
    types::{Address, TxContext, VaultOperation, VaultStatus},
};

use crate::{borrower_ops::require_user_accepts_fee, VaultManager, WorldState, LOG_TARGET};

/// Arguments of a redemption call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    /// BPD to redeem
    pub amount: u128,
    /// First vault to redeem from, as returned by the redemption hints
    pub first_hint: Option<Address>,
    pub upper_partial_hint: Option<Address>,
    pub lower_partial_hint: Option<Address>,
    /// Expected NICR of the last, partially redeemed vault
    pub partial_hint_nicr: u128,
    /// Vaults to visit at most, 0 for no limit
    pub max_iterations: u32,
    pub max_fee_percentage: u128,
}

impl RedemptionRequest {
    pub fn new(amount: u128, max_fee_percentage: u128) -> Self {
        Self { amount, max_fee_percentage, ..Self::default() }
    }
}

/// Result of a completed redemption
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionOutcome {
    /// BPD actually redeemed and burned
    pub bpd_redeemed: u128,
    /// Collateral taken out of vaults, fee included
    pub collateral_drawn: u128,
    pub collateral_fee: u128,
    /// `collateral_drawn - collateral_fee`, sent to the redeemer
    pub collateral_sent: u128,
}

/// Outcome of redeeming from one vault
struct SingleRedemption {
    bpd_lot: u128,
    collateral_lot: u128,
    cancelled_partial: bool,
}

impl<O, T, S, F> VaultManager<O, T, S, F>
where
    O: PriceOracle,
    T: StablecoinLedger,
    S: StabilityPoolOffset,
    F: FeeSink,
{
    pub fn redeem_collateral(&mut self, ctx: &TxContext, request: RedemptionRequest) -> MoneypResult<RedemptionOutcome> {
        self.transact(|this| this.execute_redemption(ctx, request))
    }

    /// True if `hint` is the first vault a redemption should touch
    pub fn is_valid_first_redemption_hint(&self, hint: Option<Address>, price: u128) -> MoneypResult<bool> {
        let floor = self.params.redemption_icr_floor;
        let Some(hint) = hint.filter(|h| self.state.sorted.contains(h)) else {
            return Ok(false);
        };
        if self.current_icr(&hint, price)? < floor {
            return Ok(false);
        }
        match self.state.sorted.next(&hint) {
            None => Ok(true),
            Some(lower) => Ok(self.current_icr(&lower, price)? < floor),
        }
    }

    /// Lowest vault at or above the redemption floor
    pub(crate) fn first_redeemable_vault(&self, price: u128) -> MoneypResult<Option<Address>> {
        let floor = self.params.redemption_icr_floor;
        let mut current = self.state.sorted.last();
        while let Some(borrower) = current {
            if self.current_icr(&borrower, price)? >= floor {
                break;
            }
            current = self.state.sorted.prev(&borrower);
        }
        Ok(current)
    }

    fn execute_redemption(&mut self, ctx: &TxContext, request: RedemptionRequest) -> MoneypResult<RedemptionOutcome> {
        let redeemer = ctx.caller;

        // 1. Preconditions
        let max_fee = request.max_fee_percentage;
        if max_fee < fees::REDEMPTION_FEE_FLOOR || max_fee > DECIMAL_PRECISION {
            return Err(MoneypError::InvalidMaxFee {
                max_fee,
                min: fees::REDEMPTION_FEE_FLOOR,
                max: DECIMAL_PRECISION,
            });
        }
        let unlock_time = self.state.deployment_time.saturating_add(self.params.bootstrap_period);
        if ctx.timestamp < unlock_time {
            return Err(MoneypError::RedemptionsBootstrapping { unlock_time });
        }
        let price = self.fetch_price()?;
        let tcr = self.tcr(price)?;
        if tcr < ratios::MCR {
            return Err(MoneypError::TcrBelowMcr { tcr });
        }
        if request.amount == 0 {
            return Err(MoneypError::ZeroAmount);
        }
        let available = self.ledger.balance_of(redeemer);
        if available < request.amount {
            return Err(MoneypError::InsufficientBalance { available, requested: request.amount });
        }

        let total_debt_at_start = self.entire_system_debt();

        // 2. Pick the starting vault
        let mut current = if self.is_valid_first_redemption_hint(request.first_hint, price)? {
            request.first_hint
        } else {
            self.first_redeemable_vault(price)?
        };

        // 3. Walk toward the head
        let mut remaining = request.amount;
        let mut bpd_redeemed = 0u128;
        let mut collateral_drawn = 0u128;
        let mut iterations_left = if request.max_iterations == 0 { u32::MAX } else { request.max_iterations };

        while let Some(borrower) = current {
            if remaining == 0 || iterations_left == 0 {
                break;
            }
            iterations_left -= 1;
            let next = self.state.sorted.prev(&borrower);

            self.apply_pending_rewards(ctx, &borrower)?;
            let single = self.redeem_from_vault(ctx, borrower, remaining, price, &request)?;
            if single.cancelled_partial {
                break;
            }

            bpd_redeemed = safe_add(bpd_redeemed, single.bpd_lot)?;
            collateral_drawn = safe_add(collateral_drawn, single.collateral_lot)?;
            remaining = safe_sub(remaining, single.bpd_lot)?;
            current = next;
        }

        if collateral_drawn == 0 {
            return Err(MoneypError::UnableToRedeem);
        }

        // 4. Base rate and fee
        let before = self.state.fees;
        self.state
            .fees
            .update_base_rate_from_redemption(collateral_drawn, price, total_debt_at_start, ctx.timestamp)?;
        self.emit_fee_state(ctx, before);

        let collateral_fee = self.state.fees.redemption_fee(collateral_drawn)?;
        require_user_accepts_fee(collateral_fee, collateral_drawn, max_fee)?;

        // 5. Pay out
        self.state.pools.send_collateral(PoolKind::Active, addresses::FEE_SINK, collateral_fee)?;
        self.fee_sink.receive_collateral_fee(collateral_fee)?;

        let collateral_sent = collateral_drawn - collateral_fee;
        self.events.emit(MoneypEvent::Redemption {
            redeemer,
            attempted_bpd: request.amount,
            actual_bpd: bpd_redeemed,
            collateral_drawn,
            collateral_fee,
            timestamp: ctx.timestamp,
        });

        self.ledger.burn(addresses::VAULT_MANAGER, redeemer, bpd_redeemed)?;
        self.state.pools.decrease_debt(PoolKind::Active, bpd_redeemed)?;
        self.state.pools.send_collateral(PoolKind::Active, redeemer, collateral_sent)?;

        log::debug!(
            target: LOG_TARGET,
            "redeemed {} of {} BPD for {} collateral (fee {})",
            bpd_redeemed,
            request.amount,
            collateral_drawn,
            collateral_fee
        );
        Ok(RedemptionOutcome { bpd_redeemed, collateral_drawn, collateral_fee, collateral_sent })
    }

    /// Redeem up to `max_bpd` from one vault, never touching its gas reserve
    fn redeem_from_vault(
        &mut self,
        ctx: &TxContext,
        borrower: Address,
        max_bpd: u128,
        price: u128,
        request: &RedemptionRequest,
    ) -> MoneypResult<SingleRedemption> {
        let vault = self
            .state
            .vaults
            .vault(&borrower)
            .cloned()
            .ok_or(MoneypError::VaultNotActive { borrower })?;

        let bpd_lot = max_bpd.min(vault.debt.saturating_sub(limits::GAS_COMPENSATION));
        let collateral_lot = mul_div(bpd_lot, DECIMAL_PRECISION, price)?;
        let new_debt = safe_sub(vault.debt, bpd_lot)?;
        let new_collateral = safe_sub(vault.collateral, collateral_lot)?;

        if new_debt == limits::GAS_COMPENSATION {
            // Full redemption: close and leave the rest as surplus
            let WorldState { vaults, sorted, .. } = &mut self.state;
            vaults.close(&borrower, VaultStatus::ClosedByRedemption, sorted)?;
            self.emit_vault_updated(ctx, &borrower, VaultOperation::RedeemCollateral);

            self.ledger.burn(addresses::VAULT_MANAGER, addresses::GAS_POOL, limits::GAS_COMPENSATION)?;
            self.state.pools.decrease_debt(PoolKind::Active, limits::GAS_COMPENSATION)?;
            self.state.pools.record_surplus(borrower, new_collateral)?;
            if new_collateral > 0 {
                self.events.emit(MoneypEvent::CollateralSurplusRecorded {
                    owner: borrower,
                    amount: new_collateral,
                    timestamp: ctx.timestamp,
                });
            }
        } else {
            let new_nicr = compute_nominal_cr(new_collateral, new_debt)?;
            let new_net_debt = new_debt.saturating_sub(limits::GAS_COMPENSATION);
            if new_nicr != request.partial_hint_nicr || new_net_debt < limits::MIN_NET_DEBT {
                log::trace!(target: LOG_TARGET, "partial redemption cancelled at NICR {}", new_nicr);
                return Ok(SingleRedemption { bpd_lot: 0, collateral_lot: 0, cancelled_partial: true });
            }

            self.state.sorted.reinsert(
                borrower,
                new_nicr,
                request.upper_partial_hint,
                request.lower_partial_hint,
            )?;
            self.state.vaults.set_debt_and_coll(&borrower, new_debt, new_collateral)?;
            self.state.vaults.update_stake_and_total(&borrower)?;
            self.emit_vault_updated(ctx, &borrower, VaultOperation::RedeemCollateral);
        }

        Ok(SingleRedemption { bpd_lot, collateral_lot, cancelled_partial: false })
    }
}

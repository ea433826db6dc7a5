//! Borrower Operations
//!
//! Opening, adjusting and closing vaults, and claiming surplus collateral.
//!
//! Rules depend on the mode at the start of the operation:
//! - Normal Mode: the resulting ICR must be at least MCR and the resulting
//!   TCR at least CCR. Debt increases pay the borrowing fee.
//! - Recovery Mode: no collateral withdrawal, debt increases need
//!   ICR >= CCR and must not lower the vault's ICR, no borrowing fee,
//!   vaults cannot be closed.

use serde::{Deserialize, Serialize};

use moneyp_common::{
    constants::{addresses, fees, limits, precision::DECIMAL_PRECISION, ratios},
    errors::{MoneypError, MoneypResult, RecoveryModeOp},
    events::MoneypEvent,
    interfaces::{FeeSink, PriceOracle, StabilityPoolOffset, StablecoinLedger},
    math::{compute_cr, compute_nominal_cr, mul_div, safe_add, safe_sub},
    pools::PoolKind,
    types::{Address, TxContext, VaultOperation, VaultStatus},
};

use crate::{VaultManager, LOG_TARGET};

/// A single-direction collateral change plus an optional debt change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAdjustment {
    /// RBTC added to the vault
    pub collateral_deposit: u128,
    /// RBTC taken out of the vault
    pub collateral_withdrawal: u128,
    /// BPD drawn (`is_debt_increase`) or repaid
    pub debt_change: u128,
    pub is_debt_increase: bool,
    /// Only checked for debt increases
    pub max_fee_percentage: u128,
    pub upper_hint: Option<Address>,
    pub lower_hint: Option<Address>,
}

impl<O, T, S, F> VaultManager<O, T, S, F>
where
    O: PriceOracle,
    T: StablecoinLedger,
    S: StabilityPoolOffset,
    F: FeeSink,
{
    /// Open a vault for the caller, depositing `collateral` and minting
    /// `bpd_amount`. Returns the borrowing fee charged.
    pub fn open_vault(
        &mut self,
        ctx: &TxContext,
        max_fee_percentage: u128,
        bpd_amount: u128,
        collateral: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> MoneypResult<u128> {
        self.transact(|this| {
            this.execute_open_vault(ctx, max_fee_percentage, bpd_amount, collateral, upper_hint, lower_hint)
        })
    }

    pub fn add_collateral(
        &mut self,
        ctx: &TxContext,
        amount: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> MoneypResult<()> {
        self.adjust_vault(
            ctx,
            VaultAdjustment { collateral_deposit: amount, upper_hint, lower_hint, ..Default::default() },
        )
    }

    pub fn withdraw_collateral(
        &mut self,
        ctx: &TxContext,
        amount: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> MoneypResult<()> {
        self.adjust_vault(
            ctx,
            VaultAdjustment { collateral_withdrawal: amount, upper_hint, lower_hint, ..Default::default() },
        )
    }

    /// Draw more BPD against the caller's vault
    pub fn borrow(
        &mut self,
        ctx: &TxContext,
        max_fee_percentage: u128,
        amount: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> MoneypResult<()> {
        self.adjust_vault(
            ctx,
            VaultAdjustment {
                debt_change: amount,
                is_debt_increase: true,
                max_fee_percentage,
                upper_hint,
                lower_hint,
                ..Default::default()
            },
        )
    }

    pub fn repay(
        &mut self,
        ctx: &TxContext,
        amount: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> MoneypResult<()> {
        self.adjust_vault(
            ctx,
            VaultAdjustment { debt_change: amount, upper_hint, lower_hint, ..Default::default() },
        )
    }

    pub fn adjust_vault(&mut self, ctx: &TxContext, adjustment: VaultAdjustment) -> MoneypResult<()> {
        self.transact(|this| this.execute_adjust_vault(ctx, adjustment))
    }

    /// Repay everything but the gas compensation and take the collateral back
    pub fn close_vault(&mut self, ctx: &TxContext) -> MoneypResult<()> {
        self.transact(|this| this.execute_close_vault(ctx))
    }

    /// Withdraw collateral left over from a capped liquidation or a full redemption
    pub fn claim_collateral(&mut self, ctx: &TxContext) -> MoneypResult<u128> {
        self.transact(|this| {
            let amount = this.state.pools.claim_surplus(ctx.caller)?;
            this.events.emit(MoneypEvent::CollateralClaimed {
                owner: ctx.caller,
                amount,
                timestamp: ctx.timestamp,
            });
            Ok(amount)
        })
    }

    // ============ Execution ============

    fn execute_open_vault(
        &mut self,
        ctx: &TxContext,
        max_fee_percentage: u128,
        bpd_amount: u128,
        collateral: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> MoneypResult<u128> {
        let borrower = ctx.caller;
        let price = self.fetch_price()?;
        let recovery_mode = self.check_recovery_mode(price)?;

        // 1. Fee bounds and vault must not exist yet
        require_valid_max_fee_percentage(max_fee_percentage, recovery_mode)?;
        if self.state.vaults.is_active(&borrower) {
            return Err(MoneypError::VaultAlreadyActive { borrower });
        }

        // 2. Borrowing fee, waived in Recovery Mode
        let fee = if recovery_mode {
            0
        } else {
            self.trigger_borrowing_fee(ctx, bpd_amount, max_fee_percentage)?
        };
        let net_debt = safe_add(bpd_amount, fee)?;
        require_at_least_min_net_debt(net_debt)?;

        // 3. Ratio checks for the new position
        let composite_debt = safe_add(net_debt, limits::GAS_COMPENSATION)?;
        let icr = compute_cr(collateral, composite_debt, price)?;
        let nicr = compute_nominal_cr(collateral, composite_debt)?;
        if recovery_mode {
            require_icr_at_least(icr, ratios::CCR)?;
        } else {
            require_icr_at_least(icr, ratios::MCR)?;
            let new_tcr = self.new_tcr_from_vault_change(collateral, true, composite_debt, true, price)?;
            require_new_tcr_above_ccr(new_tcr)?;
        }

        // 4. Record the vault
        self.state.vaults.open(borrower, collateral, composite_debt)?;
        self.state.sorted.insert(borrower, nicr, upper_hint, lower_hint)?;

        // 5. Move collateral in, mint BPD and the gas compensation reserve
        self.state.pools.deposit_collateral(collateral)?;
        self.state.pools.increase_debt(PoolKind::Active, composite_debt)?;
        self.ledger.mint(addresses::VAULT_MANAGER, borrower, bpd_amount)?;
        self.ledger.mint(addresses::VAULT_MANAGER, addresses::GAS_POOL, limits::GAS_COMPENSATION)?;

        self.emit_vault_updated(ctx, &borrower, VaultOperation::Open);
        if fee > 0 {
            self.events.emit(MoneypEvent::BorrowingFeePaid { borrower, fee, timestamp: ctx.timestamp });
        }
        log::debug!(target: LOG_TARGET, "vault opened: debt {}, collateral {}", composite_debt, collateral);
        Ok(fee)
    }

    fn execute_adjust_vault(&mut self, ctx: &TxContext, adj: VaultAdjustment) -> MoneypResult<()> {
        let borrower = ctx.caller;
        let price = self.fetch_price()?;
        let recovery_mode = self.check_recovery_mode(price)?;

        // 1. Shape of the request
        if adj.is_debt_increase {
            require_valid_max_fee_percentage(adj.max_fee_percentage, recovery_mode)?;
            if adj.debt_change == 0 {
                return Err(MoneypError::ZeroAmount);
            }
        }
        if adj.collateral_deposit != 0 && adj.collateral_withdrawal != 0 {
            return Err(MoneypError::SingularCollateralChange);
        }
        if adj.collateral_deposit == 0 && adj.collateral_withdrawal == 0 && adj.debt_change == 0 {
            return Err(MoneypError::ZeroAdjustment);
        }
        self.require_active(&borrower)?;

        // 2. Bring the vault up to date
        self.apply_pending_rewards(ctx, &borrower)?;

        let (collateral_change, is_collateral_increase) = if adj.collateral_deposit != 0 {
            (adj.collateral_deposit, true)
        } else {
            (adj.collateral_withdrawal, false)
        };

        // 3. Borrowing fee on debt increases outside Recovery Mode
        let mut fee = 0;
        if adj.is_debt_increase && !recovery_mode {
            fee = self.trigger_borrowing_fee(ctx, adj.debt_change, adj.max_fee_percentage)?;
        }
        let net_debt_change = safe_add(adj.debt_change, fee)?;

        let vault = self
            .state
            .vaults
            .vault(&borrower)
            .cloned()
            .ok_or(MoneypError::VaultNotActive { borrower })?;
        if adj.collateral_withdrawal > vault.collateral {
            return Err(MoneypError::CollateralWithdrawalExceedsCollateral {
                collateral: vault.collateral,
                requested: adj.collateral_withdrawal,
            });
        }

        let new_collateral = if is_collateral_increase {
            safe_add(vault.collateral, collateral_change)?
        } else {
            vault.collateral - collateral_change
        };
        let new_debt = if adj.is_debt_increase {
            safe_add(vault.debt, net_debt_change)?
        } else {
            vault.debt.saturating_sub(net_debt_change)
        };

        // 4. Mode-specific ratio rules
        let old_icr = compute_cr(vault.collateral, vault.debt, price)?;
        let new_icr = compute_cr(new_collateral, new_debt, price)?;
        if recovery_mode {
            if adj.collateral_withdrawal != 0 {
                return Err(MoneypError::RecoveryModeRestriction {
                    operation: RecoveryModeOp::WithdrawCollateral,
                });
            }
            if adj.is_debt_increase {
                require_icr_at_least(new_icr, ratios::CCR)?;
                if new_icr < old_icr {
                    return Err(MoneypError::RecoveryModeRestriction {
                        operation: RecoveryModeOp::DecreaseIcr,
                    });
                }
            }
        } else {
            require_icr_at_least(new_icr, ratios::MCR)?;
            let new_tcr = self.new_tcr_from_vault_change(
                collateral_change,
                is_collateral_increase,
                net_debt_change,
                adj.is_debt_increase,
                price,
            )?;
            require_new_tcr_above_ccr(new_tcr)?;
        }

        // 5. Repayment bounds
        if !adj.is_debt_increase && adj.debt_change > 0 {
            require_at_least_min_net_debt(vault.net_debt().saturating_sub(adj.debt_change))?;
            let repayable = vault.debt.saturating_sub(limits::GAS_COMPENSATION);
            if adj.debt_change > repayable {
                return Err(MoneypError::RepaymentExceedsDebt { repayable, requested: adj.debt_change });
            }
            let available = self.ledger.balance_of(borrower);
            if available < adj.debt_change {
                return Err(MoneypError::InsufficientBalance { available, requested: adj.debt_change });
            }
        }

        // 6. Update the vault, its stake and its list position
        self.state.vaults.set_debt_and_coll(&borrower, new_debt, new_collateral)?;
        self.state.vaults.update_stake_and_total(&borrower)?;
        let new_nicr = compute_nominal_cr(new_collateral, new_debt)?;
        self.state.sorted.reinsert(borrower, new_nicr, adj.upper_hint, adj.lower_hint)?;

        self.emit_vault_updated(ctx, &borrower, VaultOperation::Adjust);
        if fee > 0 {
            self.events.emit(MoneypEvent::BorrowingFeePaid { borrower, fee, timestamp: ctx.timestamp });
        }

        // 7. Move tokens and collateral
        if adj.is_debt_increase {
            self.state.pools.increase_debt(PoolKind::Active, net_debt_change)?;
            self.ledger.mint(addresses::VAULT_MANAGER, borrower, adj.debt_change)?;
        } else if adj.debt_change > 0 {
            self.state.pools.decrease_debt(PoolKind::Active, adj.debt_change)?;
            self.ledger.burn(addresses::VAULT_MANAGER, borrower, adj.debt_change)?;
        }
        if is_collateral_increase {
            self.state.pools.deposit_collateral(collateral_change)?;
        } else {
            self.state.pools.send_collateral(PoolKind::Active, borrower, collateral_change)?;
        }
        Ok(())
    }

    fn execute_close_vault(&mut self, ctx: &TxContext) -> MoneypResult<()> {
        let borrower = ctx.caller;
        self.require_active(&borrower)?;

        let price = self.fetch_price()?;
        if self.check_recovery_mode(price)? {
            return Err(MoneypError::RecoveryModeRestriction { operation: RecoveryModeOp::CloseVault });
        }

        self.apply_pending_rewards(ctx, &borrower)?;
        let vault = self
            .state
            .vaults
            .vault(&borrower)
            .cloned()
            .ok_or(MoneypError::VaultNotActive { borrower })?;

        // Everything but the gas reserve comes out of the borrower's balance
        let repayment = safe_sub(vault.debt, limits::GAS_COMPENSATION)?;
        let available = self.ledger.balance_of(borrower);
        if available < repayment {
            return Err(MoneypError::InsufficientBalance { available, requested: repayment });
        }

        let new_tcr = self.new_tcr_from_vault_change(vault.collateral, false, vault.debt, false, price)?;
        require_new_tcr_above_ccr(new_tcr)?;

        let crate::WorldState { vaults, sorted, .. } = &mut self.state;
        vaults.close(&borrower, VaultStatus::ClosedByOwner, sorted)?;
        self.emit_vault_updated(ctx, &borrower, VaultOperation::Close);

        self.ledger.burn(addresses::VAULT_MANAGER, borrower, repayment)?;
        self.ledger.burn(addresses::VAULT_MANAGER, addresses::GAS_POOL, limits::GAS_COMPENSATION)?;
        self.state.pools.decrease_debt(PoolKind::Active, vault.debt)?;
        self.state.pools.send_collateral(PoolKind::Active, borrower, vault.collateral)?;
        Ok(())
    }

    // ============ Fees ============

    /// Decay the base rate, charge the borrowing fee on `amount` and hand
    /// it to the fee sink
    fn trigger_borrowing_fee(
        &mut self,
        ctx: &TxContext,
        amount: u128,
        max_fee_percentage: u128,
    ) -> MoneypResult<u128> {
        let before = self.state.fees;
        self.state.fees.decay_base_rate_from_borrowing(ctx.timestamp)?;
        self.emit_fee_state(ctx, before);

        let fee = self.state.fees.borrowing_fee(amount)?;
        require_user_accepts_fee(fee, amount, max_fee_percentage)?;
        if fee > 0 {
            self.fee_sink.receive_bpd_fee(fee)?;
            self.ledger.mint(addresses::VAULT_MANAGER, addresses::FEE_SINK, fee)?;
        }
        Ok(fee)
    }

    /// TCR after applying a vault change to the system totals
    fn new_tcr_from_vault_change(
        &self,
        collateral_change: u128,
        is_collateral_increase: bool,
        debt_change: u128,
        is_debt_increase: bool,
        price: u128,
    ) -> MoneypResult<u128> {
        let collateral = self.entire_system_collateral();
        let debt = self.entire_system_debt();
        let collateral = if is_collateral_increase {
            safe_add(collateral, collateral_change)?
        } else {
            collateral.saturating_sub(collateral_change)
        };
        let debt = if is_debt_increase {
            safe_add(debt, debt_change)?
        } else {
            debt.saturating_sub(debt_change)
        };
        compute_cr(collateral, debt, price)
    }
}

// ============ Requirement Checks ============

fn require_valid_max_fee_percentage(max_fee: u128, recovery_mode: bool) -> MoneypResult<()> {
    let min = if recovery_mode { 0 } else { fees::BORROWING_FEE_FLOOR };
    if max_fee < min || max_fee > DECIMAL_PRECISION {
        return Err(MoneypError::InvalidMaxFee { max_fee, min, max: DECIMAL_PRECISION });
    }
    Ok(())
}

/// `fee / amount` must not exceed `max_fee_percentage`
pub(crate) fn require_user_accepts_fee(fee: u128, amount: u128, max_fee_percentage: u128) -> MoneypResult<()> {
    if amount == 0 {
        return Ok(());
    }
    let fee_percentage = mul_div(fee, DECIMAL_PRECISION, amount)?;
    if fee_percentage > max_fee_percentage {
        return Err(MoneypError::FeeExceedsMax { fee_percentage, max_fee: max_fee_percentage });
    }
    Ok(())
}

fn require_at_least_min_net_debt(net_debt: u128) -> MoneypResult<()> {
    if net_debt < limits::MIN_NET_DEBT {
        return Err(MoneypError::BelowMinNetDebt { net_debt, minimum: limits::MIN_NET_DEBT });
    }
    Ok(())
}

fn require_icr_at_least(icr: u128, required: u128) -> MoneypResult<()> {
    if icr < required {
        return Err(MoneypError::BelowMinCollateralRatio { icr, required });
    }
    Ok(())
}

fn require_new_tcr_above_ccr(new_tcr: u128) -> MoneypResult<()> {
    if new_tcr < ratios::CCR {
        return Err(MoneypError::TcrBelowCcr { new_tcr });
    }
    Ok(())
}

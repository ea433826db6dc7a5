//! Vault Manager - CDP Engine for Moneyp
//!
//! Borrowers lock RBTC in vaults and mint BPD against it. This crate owns
//! the whole system state and runs every state-changing operation:
//!
//! ## Core Operations
//!
//! - **Borrower operations**: open, adjust, close, claim surplus collateral
//! - **Liquidation**: single, sequential from the riskiest vault, batch;
//!   debt is offset against the Stability Pool first, then redistributed
//! - **Redemption**: swap BPD for RBTC at face value against the riskiest
//!   vaults, paying a decaying fee
//! - **Stability Pool routing**: deposits and withdrawals of BPD
//!
//! ## Transactions
//!
//! Every mutating operation runs inside [`VaultManager::transact`], which
//! checkpoints the world state and all collaborators. An operation either
//! commits completely or leaves everything exactly as it was, which
//! [`WorldState::state_root`] makes observable.
//!
//! Recovery Mode is never stored. It is derived from the current TCR each
//! time an operation needs it.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod borrower_ops;
pub mod hints;
pub mod liquidation;
pub mod redemption;
pub mod sorted_vaults;
pub mod vault_store;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

pub use borrower_ops::VaultAdjustment;
pub use hints::{ApproxHint, RedemptionHints};
pub use liquidation::{LiquidationTotals, LiquidationValues};
pub use redemption::{RedemptionOutcome, RedemptionRequest};
pub use sorted_vaults::SortedVaults;
pub use vault_store::VaultStore;

use moneyp_common::{
    constants::{addresses, ratios},
    errors::{MoneypError, MoneypResult},
    events::{EventLog, MoneypEvent},
    fee_decay::FeeDecayState,
    interfaces::{FeeSink, PriceOracle, StabilityPoolOffset, StablecoinLedger},
    math::{compute_cr, compute_nominal_cr},
    pools::PoolLedger,
    types::{
        Address, EntireDebtAndColl, ProtocolParams, SystemMode, TxContext, Vault, VaultOperation,
        VaultStatus,
    },
};

/// `log` target for diagnostics emitted by this crate
pub const LOG_TARGET: &str = "moneyp::vault_manager";

// ============ World State ============

/// Everything the engine owns, in one serializable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct WorldState {
    pub vaults: VaultStore,
    pub sorted: SortedVaults,
    pub fees: FeeDecayState,
    pub pools: PoolLedger,
    /// Start of the redemption bootstrap period
    pub deployment_time: u64,
}

impl WorldState {
    pub fn new(params: &ProtocolParams, deployment_time: u64) -> Self {
        Self {
            vaults: VaultStore::new(),
            sorted: SortedVaults::new(params.max_sorted_vaults),
            fees: FeeDecayState::new(deployment_time),
            pools: PoolLedger::new(),
            deployment_time,
        }
    }

    /// SHA-256 of the canonical borsh encoding
    pub fn state_root(&self) -> [u8; 32] {
        let bytes = borsh::to_vec(self).unwrap_or_default();
        let mut root = [0u8; 32];
        root.copy_from_slice(&Sha256::digest(&bytes));
        root
    }
}

// ============ Vault Manager ============

/// The engine: world state plus the collaborators it drives
#[derive(Debug, Clone)]
pub struct VaultManager<O, T, S, F> {
    state: WorldState,
    params: ProtocolParams,
    oracle: O,
    ledger: T,
    stability_pool: S,
    fee_sink: F,
    events: EventLog,
}

/// Everything `transact` restores when an operation fails
struct Checkpoint<O, T, S, F> {
    state: WorldState,
    oracle: O,
    ledger: T,
    stability_pool: S,
    fee_sink: F,
    events_len: usize,
}

impl<O, T, S, F> VaultManager<O, T, S, F>
where
    O: PriceOracle,
    T: StablecoinLedger,
    S: StabilityPoolOffset,
    F: FeeSink,
{
    pub fn new(
        params: ProtocolParams,
        oracle: O,
        ledger: T,
        stability_pool: S,
        fee_sink: F,
        deployment_time: u64,
    ) -> Self {
        Self {
            state: WorldState::new(&params, deployment_time),
            params,
            oracle,
            ledger,
            stability_pool,
            fee_sink,
            events: EventLog::new(),
        }
    }

    // ============ Accessors ============

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn state_root(&self) -> [u8; 32] {
        self.state.state_root()
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn ledger(&self) -> &T {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut T {
        &mut self.ledger
    }

    pub fn stability_pool(&self) -> &S {
        &self.stability_pool
    }

    pub fn fee_sink(&self) -> &F {
        &self.fee_sink
    }

    pub fn fee_sink_mut(&mut self) -> &mut F {
        &mut self.fee_sink
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Drain the event log
    pub fn take_events(&mut self) -> Vec<MoneypEvent> {
        std::mem::take(&mut self.events).into_events()
    }

    // ============ Transactions ============

    /// Run `op` atomically: on error the world state, the collaborators and
    /// the event log are restored to their values before the call.
    pub fn transact<R>(&mut self, op: impl FnOnce(&mut Self) -> MoneypResult<R>) -> MoneypResult<R> {
        let checkpoint = Checkpoint {
            state: self.state.clone(),
            oracle: self.oracle.clone(),
            ledger: self.ledger.clone(),
            stability_pool: self.stability_pool.clone(),
            fee_sink: self.fee_sink.clone(),
            events_len: self.events.len(),
        };

        let result = op(self);
        if let Err(err) = &result {
            log::debug!(target: LOG_TARGET, "rolled back: {} ({})", err, err.code());
            self.state = checkpoint.state;
            self.oracle = checkpoint.oracle;
            self.ledger = checkpoint.ledger;
            self.stability_pool = checkpoint.stability_pool;
            self.fee_sink = checkpoint.fee_sink;
            self.events.truncate(checkpoint.events_len);
        }
        result
    }

    // ============ Queries ============

    pub fn vault(&self, borrower: &Address) -> Option<&Vault> {
        self.state.vaults.vault(borrower)
    }

    pub fn vault_status(&self, borrower: &Address) -> VaultStatus {
        self.state.vaults.status(borrower)
    }

    pub fn entire_debt_and_coll(&self, borrower: &Address) -> MoneypResult<EntireDebtAndColl> {
        self.state.vaults.entire_debt_and_coll(borrower)
    }

    pub fn pending_collateral_reward(&self, borrower: &Address) -> MoneypResult<u128> {
        self.state.vaults.pending_collateral_reward(borrower)
    }

    pub fn pending_debt_reward(&self, borrower: &Address) -> MoneypResult<u128> {
        self.state.vaults.pending_debt_reward(borrower)
    }

    pub fn has_pending_rewards(&self, borrower: &Address) -> bool {
        self.state.vaults.has_pending_rewards(borrower)
    }

    /// NICR including pending rewards
    pub fn nominal_icr(&self, borrower: &Address) -> MoneypResult<u128> {
        let entire = self.entire_debt_and_coll(borrower)?;
        compute_nominal_cr(entire.collateral, entire.debt)
    }

    /// ICR at `price`, including pending rewards
    pub fn current_icr(&self, borrower: &Address, price: u128) -> MoneypResult<u128> {
        let entire = self.entire_debt_and_coll(borrower)?;
        compute_cr(entire.collateral, entire.debt, price)
    }

    pub fn entire_system_collateral(&self) -> u128 {
        self.state.pools.entire_system_collateral()
    }

    pub fn entire_system_debt(&self) -> u128 {
        self.state.pools.entire_system_debt()
    }

    pub fn tcr(&self, price: u128) -> MoneypResult<u128> {
        compute_cr(self.entire_system_collateral(), self.entire_system_debt(), price)
    }

    /// True while TCR is below CCR
    pub fn check_recovery_mode(&self, price: u128) -> MoneypResult<bool> {
        Ok(self.tcr(price)? < ratios::CCR)
    }

    pub fn system_mode(&self, price: u128) -> MoneypResult<SystemMode> {
        if self.check_recovery_mode(price)? {
            Ok(SystemMode::Recovery)
        } else {
            Ok(SystemMode::Normal)
        }
    }

    pub fn vault_owners_count(&self) -> usize {
        self.state.vaults.vault_owners_count()
    }

    pub fn vault_from_owners_array(&self, index: usize) -> Option<Address> {
        self.state.vaults.vault_from_owners_array(index)
    }

    pub fn surplus_of(&self, owner: Address) -> u128 {
        self.state.pools.surplus_of(owner)
    }

    pub fn borrowing_rate_with_decay(&self, now: u64) -> MoneypResult<u128> {
        self.state.fees.borrowing_rate_with_decay(now)
    }

    pub fn redemption_rate_with_decay(&self, now: u64) -> MoneypResult<u128> {
        self.state.fees.redemption_rate_with_decay(now)
    }

    // ============ Stability Pool Routing ============

    /// Move `amount` BPD from the depositor into the Stability Pool
    pub fn provide_to_stability_pool(&mut self, ctx: &TxContext, amount: u128) -> MoneypResult<u128> {
        self.transact(|this| {
            if amount == 0 {
                return Err(MoneypError::ZeroAmount);
            }
            this.ledger.transfer(ctx.caller, addresses::STABILITY_POOL, amount)?;
            let collateral_gain = this.stability_pool.provide(ctx.caller, amount, ctx.timestamp)?;
            this.events.emit(MoneypEvent::StabilityDeposit {
                depositor: ctx.caller,
                amount,
                new_deposit: this.stability_pool.compounded_deposit(ctx.caller),
                timestamp: ctx.timestamp,
            });
            Ok(collateral_gain)
        })
    }

    /// Withdraw up to `amount` of the caller's compounded deposit.
    ///
    /// A non-zero withdrawal is refused while the riskiest vault is below
    /// MCR, so depositors cannot dodge a pending liquidation.
    pub fn withdraw_from_stability_pool(&mut self, ctx: &TxContext, amount: u128) -> MoneypResult<(u128, u128)> {
        self.transact(|this| {
            if amount > 0 {
                let price = this.fetch_price()?;
                if let Some(lowest) = this.state.sorted.last() {
                    let icr = this.current_icr(&lowest, price)?;
                    if icr < ratios::MCR {
                        return Err(MoneypError::BelowMinCollateralRatio { icr, required: ratios::MCR });
                    }
                }
            }

            let (withdrawn, collateral_gain) =
                this.stability_pool.withdraw(ctx.caller, amount, ctx.timestamp)?;
            this.ledger.transfer(addresses::STABILITY_POOL, ctx.caller, withdrawn)?;
            this.events.emit(MoneypEvent::StabilityWithdrawal {
                depositor: ctx.caller,
                amount: withdrawn,
                collateral_gain,
                timestamp: ctx.timestamp,
            });
            Ok((withdrawn, collateral_gain))
        })
    }

    // ============ Internal Helpers ============

    fn fetch_price(&mut self) -> MoneypResult<u128> {
        let price = self.oracle.fetch_price()?;
        if price == 0 {
            return Err(MoneypError::InvalidPrice { price });
        }
        Ok(price)
    }

    fn require_active(&self, borrower: &Address) -> MoneypResult<()> {
        if !self.state.vaults.is_active(borrower) {
            return Err(MoneypError::VaultNotActive { borrower: *borrower });
        }
        Ok(())
    }

    /// Fold pending rewards into `borrower`'s vault, emitting an update
    fn apply_pending_rewards(&mut self, ctx: &TxContext, borrower: &Address) -> MoneypResult<()> {
        let WorldState { vaults, pools, .. } = &mut self.state;
        if vaults.apply_pending_rewards(borrower, pools)? {
            self.emit_vault_updated(ctx, borrower, VaultOperation::ApplyPendingRewards);
        }
        Ok(())
    }

    fn emit_vault_updated(&mut self, ctx: &TxContext, borrower: &Address, operation: VaultOperation) {
        let vault = self.state.vaults.vault(borrower).cloned().unwrap_or_default();
        self.events.emit(MoneypEvent::VaultUpdated {
            borrower: *borrower,
            debt: vault.debt,
            collateral: vault.collateral,
            stake: vault.stake,
            operation,
            timestamp: ctx.timestamp,
        });
    }

    /// Emit fee state changes against the state before the operation
    fn emit_fee_state(&mut self, ctx: &TxContext, before: FeeDecayState) {
        let after = self.state.fees;
        self.events.emit(MoneypEvent::BaseRateUpdated {
            base_rate: after.base_rate,
            timestamp: ctx.timestamp,
        });
        if after.last_fee_operation_time != before.last_fee_operation_time {
            self.events.emit(MoneypEvent::LastFeeOpTimeUpdated {
                last_fee_operation_time: after.last_fee_operation_time,
                timestamp: ctx.timestamp,
            });
        }
    }
}

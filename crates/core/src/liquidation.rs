//! Liquidation waterfall.
//!
//! A liquidation repays `debt_amount` of the user's debt and seizes collateral
//! worth the repaid value plus the liquidation bonus:
//!
//! 1. **Primary**: the requested collateral, up to the full amount owed.
//! 2. **Secondary**: whatever is still owed (principal first, then bonus) comes
//!    from the user's other collateral in registry order, split in proportion
//!    to each token's USD value.
//! 3. **Protocol**: if the bonus still falls short, a market liquidator is
//!    refused with an escalation error; the protocol path (owner or
//!    automation) proceeds, swapping seized principal into the debt token and
//!    the bonus into the funding token.
//!
//! Ledger effects happen before any token movement and the whole liquidation
//! is rejected unless it strictly improves the user's health factor.

use alloy::primitives::{Address, U256};
use loanfi_api::SwapParams;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, info, instrument, warn};

use crate::error::LendingError;
use crate::events::ProtocolEvent;
use crate::ledger::Account;
use crate::pricing::Pricing;
use crate::protocol::Protocol;
use crate::u256_math::{apply_basis_points, is_liquidatable_wad, min, mul_div, wad_to_f64};

/// Who is liquidating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidatorRole {
    /// Market participant repaying the debt from their own balance
    Market(Address),
    /// The protocol itself, settling through the swap router
    Protocol,
}

impl LiquidatorRole {
    /// Liquidator address (None for the protocol).
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Market(liquidator) => Some(*liquidator),
            Self::Protocol => None,
        }
    }
}

/// Waterfall tier a seizure was sourced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeizureTier {
    Primary,
    Secondary,
}

/// Collateral taken from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seizure {
    pub token: Address,
    /// Total amount seized
    pub amount: U256,
    /// Part covering the repaid debt
    pub principal_amount: U256,
    /// Part paying the bonus
    pub bonus_amount: U256,
    /// USD value of `amount` at the price used for the liquidation
    pub usd_value: U256,
    pub tier: SeizureTier,
}

pub type Seizures = SmallVec<[Seizure; 4]>;

/// Outcome of the waterfall for a candidate liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationPlan {
    pub user: Address,
    pub collateral: Address,
    pub debt_token: Address,
    pub debt_amount: U256,
    pub debt_usd: U256,
    pub bonus_needed_usd: U256,
    /// Bonus the waterfall assigned to collateral, before token rounding
    pub bonus_allocated_usd: U256,
    /// USD value of the seized principal parts
    pub principal_sourced_usd: U256,
    /// USD value of the seized bonus parts
    pub bonus_sourced_usd: U256,
    pub health_factor_before: U256,
    pub seizures: Seizures,
}

impl LiquidationPlan {
    /// Whether tiers 1 and 2 cover the full bonus.
    pub fn is_bonus_covered(&self) -> bool {
        self.bonus_allocated_usd >= self.bonus_needed_usd
    }

    pub fn bonus_shortfall_usd(&self) -> U256 {
        self.bonus_needed_usd.saturating_sub(self.bonus_allocated_usd)
    }

    /// Total seized amount of `token`.
    pub fn seized(&self, token: Address) -> U256 {
        self.seizures
            .iter()
            .filter(|s| s.token == token)
            .fold(U256::ZERO, |total, s| total.saturating_add(s.amount))
    }
}

/// Result of an executed liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationOutcome {
    pub plan: LiquidationPlan,
    pub health_factor_after: U256,
    /// Debt token received by custody (repayment or swap output)
    pub debt_token_received: U256,
    /// Funding token delivered as protocol fee
    pub fee_delivered: U256,
}

impl Protocol {
    /// Liquidate `user` as a market participant.
    #[instrument(skip(self), fields(liquidator = %liquidator, user = %user))]
    pub fn liquidate(
        &self,
        liquidator: Address,
        user: Address,
        collateral: Address,
        debt_token: Address,
        debt_amount: U256,
    ) -> Result<LiquidationOutcome, LendingError> {
        self.execute_liquidation(
            LiquidatorRole::Market(liquidator),
            user,
            collateral,
            debt_token,
            debt_amount,
        )
    }

    /// Liquidate `user` on behalf of the protocol. Owner or automation only.
    #[instrument(skip(self), fields(caller = %caller, user = %user))]
    pub fn protocol_liquidate(
        &self,
        caller: Address,
        user: Address,
        collateral: Address,
        debt_token: Address,
        debt_amount: U256,
    ) -> Result<LiquidationOutcome, LendingError> {
        self.ensure_owner_or_automation(caller)?;
        self.execute_liquidation(LiquidatorRole::Protocol, user, collateral, debt_token, debt_amount)
    }

    /// Dry run of the waterfall; no state changes.
    ///
    /// Applies the liquidator-independent part of the eligibility gate.
    pub fn liquidation_plan(
        &self,
        user: Address,
        collateral: Address,
        debt_token: Address,
        debt_amount: U256,
    ) -> Result<LiquidationPlan, LendingError> {
        let hf_before =
            self.check_eligibility(LiquidatorRole::Protocol, user, collateral, debt_token, debt_amount)?;
        let pricing = self.pricing();
        self.plan_waterfall(
            &pricing,
            &self.account(user),
            user,
            collateral,
            debt_token,
            debt_amount,
            hf_before,
        )
    }

    pub(crate) fn execute_liquidation(
        &self,
        role: LiquidatorRole,
        user: Address,
        collateral: Address,
        debt_token: Address,
        debt_amount: U256,
    ) -> Result<LiquidationOutcome, LendingError> {
        let _guard = self.enter_liquidation()?;

        self.atomically(|| {
            let hf_before = self.check_eligibility(role, user, collateral, debt_token, debt_amount)?;
            let pricing = self.pricing();
            let plan = self.plan_waterfall(
                &pricing,
                &self.account(user),
                user,
                collateral,
                debt_token,
                debt_amount,
                hf_before,
            )?;

            if matches!(role, LiquidatorRole::Market(_)) && !plan.is_bonus_covered() {
                warn!(
                    user = %user,
                    bonus_needed_usd = %plan.bonus_needed_usd,
                    bonus_available_usd = %plan.bonus_allocated_usd,
                    "Bonus not coverable by collateral, protocol liquidation required"
                );
                return Err(LendingError::OnlyProtocolCanLiquidateInsufficientBonus {
                    bonus_needed_usd: plan.bonus_needed_usd,
                    bonus_available_usd: plan.bonus_allocated_usd,
                });
            }

            // Effects
            self.with_ledger(|ledger| {
                ledger.reduce_debt(user, debt_token, debt_amount)?;
                for seizure in &plan.seizures {
                    ledger.debit_collateral(user, seizure.token, seizure.amount)?;
                }
                Ok::<_, LendingError>(())
            })?;

            let hf_after = self.health_factor(user)?;
            if hf_after <= hf_before {
                debug!(
                    user = %user,
                    before = wad_to_f64(hf_before),
                    after = wad_to_f64(hf_after),
                    "Liquidation would not improve health factor"
                );
                return Err(LendingError::HealthFactorNotImproved {
                    before: hf_before,
                    after: hf_after,
                });
            }

            for seizure in &plan.seizures {
                self.emit(ProtocolEvent::CollateralSeized {
                    user,
                    token: seizure.token,
                    amount: seizure.amount,
                    usd_value: seizure.usd_value,
                    tier: seizure.tier,
                });
            }
            self.emit(ProtocolEvent::Liquidated {
                user,
                liquidator: role.address(),
                collateral,
                debt_token,
                debt_amount,
                bonus_usd: plan.bonus_sourced_usd,
                health_factor_before: hf_before,
                health_factor_after: hf_after,
            });

            // Interactions
            let (debt_token_received, fee_delivered) = match role {
                LiquidatorRole::Market(liquidator) => self.settle_market(liquidator, &plan)?,
                LiquidatorRole::Protocol => self.settle_protocol(&pricing, &plan)?,
            };

            let registry = &self.config().registry;
            info!(
                user = %user,
                liquidator = ?role.address(),
                collateral = registry.symbol(collateral).unwrap_or("?"),
                debt_token = registry.symbol(debt_token).unwrap_or("?"),
                debt_amount = %debt_amount,
                seizures = plan.seizures.len(),
                hf_before = wad_to_f64(hf_before),
                hf_after = wad_to_f64(hf_after),
                "Liquidation executed"
            );

            Ok(LiquidationOutcome {
                plan,
                health_factor_after: hf_after,
                debt_token_received,
                fee_delivered,
            })
        })
    }

    /// Eligibility gate; returns the health factor before liquidation.
    fn check_eligibility(
        &self,
        role: LiquidatorRole,
        user: Address,
        collateral: Address,
        debt_token: Address,
        debt_amount: U256,
    ) -> Result<U256, LendingError> {
        if debt_amount.is_zero() {
            return Err(LendingError::NeedsMoreThanZero);
        }
        let registry = &self.config().registry;
        registry.ensure_allowed(collateral)?;
        registry.ensure_allowed(debt_token)?;
        if user.is_zero() {
            return Err(LendingError::ZeroAddressNotAllowed);
        }
        if role.address() == Some(user) {
            return Err(LendingError::CantLiquidateSelf);
        }

        let borrowed = self.borrowed_amount_of(user, debt_token);
        if borrowed.is_zero() {
            return Err(LendingError::UserHasNotBorrowedToken(debt_token));
        }

        let hf = self.health_factor(user)?;
        if !is_liquidatable_wad(hf, self.risk_parameters().min_health_factor()) {
            return Err(LendingError::HealthFactorIsHealthy(hf));
        }

        if debt_amount > borrowed {
            return Err(LendingError::DebtAmountPaidExceedsBorrowedAmount {
                amount: debt_amount,
                borrowed,
            });
        }

        if let LiquidatorRole::Market(liquidator) = role {
            let balance = self.tokens().balance_of(debt_token, liquidator);
            if balance < debt_amount {
                return Err(LendingError::InsufficientBalanceToLiquidate {
                    balance,
                    needed: debt_amount,
                });
            }
        }

        Ok(hf)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_waterfall(
        &self,
        pricing: &Pricing<'_>,
        account: &Account,
        user: Address,
        collateral: Address,
        debt_token: Address,
        debt_amount: U256,
        health_factor_before: U256,
    ) -> Result<LiquidationPlan, LendingError> {
        let risk = self.risk_parameters();
        let debt_usd = pricing.usd_value(debt_token, debt_amount)?;
        let bonus_needed_usd = mul_div(debt_usd, risk.liquidation_bonus(), risk.liquidation_precision())
            .ok_or(LendingError::ArithmeticOverflow("liquidation bonus"))?;
        let owed_usd = debt_usd
            .checked_add(bonus_needed_usd)
            .ok_or(LendingError::ArithmeticOverflow("liquidation bonus"))?;

        let mut seizures = Seizures::new();

        // Tier 1
        let primary_balance = account.collateral_of(collateral);
        let primary_usd = pricing.usd_value(collateral, primary_balance)?;
        let primary_take = min(primary_usd, owed_usd);
        let primary_principal = min(primary_take, debt_usd);
        let primary_bonus = primary_take - primary_principal;
        if !primary_take.is_zero() {
            let amount = seize_amount(pricing, collateral, primary_balance, primary_usd, primary_take)?;
            seizures.push(split_seizure(
                pricing,
                collateral,
                amount,
                primary_take,
                primary_principal,
                SeizureTier::Primary,
            )?);
        }

        // Tier 2
        let principal_short = debt_usd - primary_principal;
        let shortfall = owed_usd - primary_take;
        let mut secondary_take = U256::ZERO;
        if !shortfall.is_zero() {
            let mut candidates: SmallVec<[(Address, U256, U256); 8]> = SmallVec::new();
            for token in self.config().registry.tokens() {
                if token == collateral {
                    continue;
                }
                let balance = account.collateral_of(token);
                if balance.is_zero() {
                    continue;
                }
                let usd = pricing.usd_value(token, balance)?;
                if !usd.is_zero() {
                    candidates.push((token, balance, usd));
                }
            }

            let available: Vec<U256> = candidates.iter().map(|(_, _, usd)| *usd).collect();
            let takes = proportional_takes(&available, shortfall)?;
            secondary_take = checked_sum(&takes)?;
            let secondary_principal = min(principal_short, secondary_take);

            for ((token, balance, usd), take) in candidates.iter().zip(takes) {
                if take.is_zero() {
                    continue;
                }
                let amount = seize_amount(pricing, *token, *balance, *usd, take)?;
                let principal_usd = mul_div(secondary_principal, take, secondary_take)
                    .ok_or(LendingError::ArithmeticOverflow("seizure split"))?;
                seizures.push(split_seizure(
                    pricing,
                    *token,
                    amount,
                    take,
                    principal_usd,
                    SeizureTier::Secondary,
                )?);
            }
        }

        let secondary_principal = min(principal_short, secondary_take);
        let mut principal_sourced_usd = U256::ZERO;
        let mut bonus_sourced_usd = U256::ZERO;
        for seizure in &seizures {
            principal_sourced_usd = principal_sourced_usd
                .checked_add(pricing.usd_value(seizure.token, seizure.principal_amount)?)
                .ok_or(LendingError::ArithmeticOverflow("seized value"))?;
            bonus_sourced_usd = bonus_sourced_usd
                .checked_add(pricing.usd_value(seizure.token, seizure.bonus_amount)?)
                .ok_or(LendingError::ArithmeticOverflow("seized value"))?;
        }

        let plan = LiquidationPlan {
            user,
            collateral,
            debt_token,
            debt_amount,
            debt_usd,
            bonus_needed_usd,
            bonus_allocated_usd: primary_bonus + (secondary_take - secondary_principal),
            principal_sourced_usd,
            bonus_sourced_usd,
            health_factor_before,
            seizures,
        };

        debug!(
            user = %user,
            debt_usd = %plan.debt_usd,
            bonus_needed_usd = %plan.bonus_needed_usd,
            bonus_allocated_usd = %plan.bonus_allocated_usd,
            bonus_sourced_usd = %plan.bonus_sourced_usd,
            seizures = plan.seizures.len(),
            "Waterfall planned"
        );
        Ok(plan)
    }

    /// Pull the repayment from the liquidator, then hand over the collateral.
    fn settle_market(&self, liquidator: Address, plan: &LiquidationPlan) -> Result<(U256, U256), LendingError> {
        let custody = self.custody();
        self.tokens()
            .transfer_from(plan.debt_token, custody, liquidator, custody, plan.debt_amount)?;
        for seizure in &plan.seizures {
            self.tokens()
                .transfer(seizure.token, custody, liquidator, seizure.amount)?;
        }
        Ok((plan.debt_amount, U256::ZERO))
    }

    /// Swap principal into the debt token (kept in custody) and deliver the
    /// bonus in the funding token.
    fn settle_protocol(&self, pricing: &Pricing<'_>, plan: &LiquidationPlan) -> Result<(U256, U256), LendingError> {
        let custody = self.custody();
        let mut debt_token_received = U256::ZERO;

        for seizure in &plan.seizures {
            if seizure.principal_amount.is_zero() {
                continue;
            }
            if seizure.token == plan.debt_token {
                debt_token_received = debt_token_received
                    .checked_add(seizure.principal_amount)
                    .ok_or(LendingError::ArithmeticOverflow("swap output"))?;
                continue;
            }
            let amount_out = self.swap_from_custody(
                pricing,
                seizure.token,
                plan.debt_token,
                seizure.principal_amount,
                custody,
            )?;
            debt_token_received = debt_token_received
                .checked_add(amount_out)
                .ok_or(LendingError::ArithmeticOverflow("swap output"))?;
            self.emit(ProtocolEvent::PrincipalSwapped {
                token_in: seizure.token,
                token_out: plan.debt_token,
                amount_in: seizure.principal_amount,
                amount_out,
            });
        }

        let Some(funding_token) = self.config().funding_token else {
            debug!(bonus_usd = %plan.bonus_sourced_usd, "No funding token, protocol fee kept in custody");
            return Ok((debt_token_received, U256::ZERO));
        };

        let recipient = self.automation().unwrap_or(self.owner());
        let mut fee_delivered = U256::ZERO;
        for seizure in &plan.seizures {
            if seizure.bonus_amount.is_zero() {
                continue;
            }
            let amount_out = if seizure.token == funding_token {
                self.tokens()
                    .transfer(funding_token, custody, recipient, seizure.bonus_amount)?;
                seizure.bonus_amount
            } else {
                self.swap_from_custody(
                    pricing,
                    seizure.token,
                    funding_token,
                    seizure.bonus_amount,
                    recipient,
                )?
            };
            fee_delivered = fee_delivered
                .checked_add(amount_out)
                .ok_or(LendingError::ArithmeticOverflow("swap output"))?;
            self.emit(ProtocolEvent::ProtocolFeeSwapped {
                token_in: seizure.token,
                token_out: funding_token,
                amount_in: seizure.bonus_amount,
                amount_out,
                recipient,
            });
        }

        Ok((debt_token_received, fee_delivered))
    }

    /// Exact-input swap out of custody with an oracle-derived minimum.
    fn swap_from_custody(
        &self,
        pricing: &Pricing<'_>,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        recipient: Address,
    ) -> Result<U256, LendingError> {
        let fair_out = pricing.token_amount_from_usd(token_out, pricing.usd_value(token_in, amount_in)?)?;
        let min_amount_out = apply_basis_points(fair_out, self.config().engine.liquidation.swap_slippage_bps)
            .ok_or(LendingError::ArithmeticOverflow("minimum swap output"))?;

        let custody = self.custody();
        let router = self.router();
        self.tokens().approve(token_in, custody, router.address(), amount_in);

        let params = SwapParams::new(token_in, token_out, amount_in, min_amount_out)
            .with_payer(custody)
            .with_recipient(recipient);
        let amount_out = router.swap_exact_input(&params)?;

        debug!(
            adapter = router.adapter_id(),
            token_in = %token_in,
            token_out = %token_out,
            amount_in = %amount_in,
            amount_out = %amount_out,
            min_amount_out = %min_amount_out,
            "Swapped seized collateral"
        );
        Ok(amount_out)
    }
}

/// Token amount for `take_usd` out of a balance worth `available_usd`.
///
/// Taking the whole value seizes the whole balance so no dust is left behind.
fn seize_amount(
    pricing: &Pricing<'_>,
    token: Address,
    balance: U256,
    available_usd: U256,
    take_usd: U256,
) -> Result<U256, LendingError> {
    if take_usd >= available_usd {
        return Ok(balance);
    }
    Ok(min(balance, pricing.token_amount_from_usd(token, take_usd)?))
}

/// Split a seizure worth `take_usd` into principal and bonus parts and value
/// the amount actually taken.
fn split_seizure(
    pricing: &Pricing<'_>,
    token: Address,
    amount: U256,
    take_usd: U256,
    principal_usd: U256,
    tier: SeizureTier,
) -> Result<Seizure, LendingError> {
    let principal_amount =
        mul_div(amount, principal_usd, take_usd).ok_or(LendingError::ArithmeticOverflow("seizure split"))?;
    Ok(Seizure {
        token,
        amount,
        principal_amount,
        bonus_amount: amount - principal_amount,
        usd_value: pricing.usd_value(token, amount)?,
        tier,
    })
}

fn checked_sum(values: &[U256]) -> Result<U256, LendingError> {
    values.iter().try_fold(U256::ZERO, |total, v| {
        total
            .checked_add(*v)
            .ok_or(LendingError::ArithmeticOverflow("collateral total"))
    })
}

/// Split `needed` across sources in proportion to their `available` values.
///
/// Everything is taken when the sources do not cover `needed`. Otherwise each
/// source gets its floored share and the rounding remainder goes to the first
/// sources with headroom.
fn proportional_takes(available: &[U256], needed: U256) -> Result<Vec<U256>, LendingError> {
    let total = checked_sum(available)?;
    if total <= needed {
        return Ok(available.to_vec());
    }

    let mut takes = available
        .iter()
        .map(|a| mul_div(needed, *a, total).ok_or(LendingError::ArithmeticOverflow("proportional share")))
        .collect::<Result<Vec<U256>, _>>()?;
    // shares sum to at most `needed`
    let assigned = checked_sum(&takes)?;
    let mut residual = needed - assigned;
    for (take, avail) in takes.iter_mut().zip(available) {
        if residual.is_zero() {
            break;
        }
        let extra = min(residual, *avail - *take);
        *take += extra;
        residual -= extra;
    }
    Ok(takes)
}

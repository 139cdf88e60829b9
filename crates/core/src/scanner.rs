//! Insufficient-bonus scanner and the automation upkeep interface.
//!
//! The scanner flags positions whose collateral cannot pay the full
//! liquidation bonus, i.e. the ones a market liquidator will refuse. The
//! automation trigger batches them with [`Protocol::check_upkeep`] and
//! liquidates them through the protocol path with [`Protocol::perform_upkeep`].

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolValue;
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument, warn};

use crate::error::LendingError;
use crate::health::AccountInformation;
use crate::protocol::Protocol;
use crate::u256_math::{is_liquidatable_wad, mul_div, wad_to_f64};

sol! {
    /// Position queued for protocol liquidation (upkeep payload entry).
    #[derive(Debug, PartialEq, Eq)]
    struct UpkeepPosition {
        address user;
        address debtToken;
        address collateral;
        uint256 debtAmount;
    }
}

/// Flagged positions of one user as parallel vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsufficientBonusPositions {
    pub debt_tokens: Vec<Address>,
    pub collaterals: Vec<Address>,
    pub debt_amounts: Vec<U256>,
}

impl InsufficientBonusPositions {
    pub fn len(&self) -> usize {
        self.debt_tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.debt_tokens.is_empty()
    }

    /// (debt token, collateral, debt amount) triples.
    pub fn iter(&self) -> impl Iterator<Item = (Address, Address, U256)> + '_ {
        self.debt_tokens
            .iter()
            .zip(&self.collaterals)
            .zip(&self.debt_amounts)
            .map(|((debt_token, collateral), amount)| (*debt_token, *collateral, *amount))
    }

    fn push(&mut self, debt_token: Address, collateral: Address, debt_amount: U256) {
        self.debt_tokens.push(debt_token);
        self.collaterals.push(collateral);
        self.debt_amounts.push(debt_amount);
    }
}

/// Position targeted by an upkeep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpkeepTarget {
    pub user: Address,
    pub debt_token: Address,
    pub collateral: Address,
    pub debt_amount: U256,
}

impl From<&UpkeepPosition> for UpkeepTarget {
    fn from(position: &UpkeepPosition) -> Self {
        Self {
            user: position.user,
            debt_token: position.debtToken,
            collateral: position.collateral,
            debt_amount: position.debtAmount,
        }
    }
}

/// Successfully liquidated upkeep target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidatedUpkeep {
    #[serde(flatten)]
    pub target: UpkeepTarget,
    pub health_factor_after: U256,
    pub fee_delivered: U256,
}

/// Upkeep target whose liquidation was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpkeep {
    #[serde(flatten)]
    pub target: UpkeepTarget,
    #[serde(serialize_with = "serialize_display")]
    pub error: LendingError,
}

fn serialize_display<S: Serializer>(error: &LendingError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Per-position outcome of [`Protocol::perform_upkeep`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpkeepReport {
    pub succeeded: Vec<LiquidatedUpkeep>,
    pub failed: Vec<FailedUpkeep>,
}

impl UpkeepReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether every position was liquidated.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Protocol {
    /// Positions of `user` that only the protocol can liquidate. Owner or automation only.
    ///
    /// For each debt token (registry order) the first collateral whose value
    /// cannot cover the debt plus the full bonus is flagged. Nothing is flagged
    /// while the user is healthy.
    pub fn insufficient_bonus_positions(
        &self,
        caller: Address,
        user: Address,
    ) -> Result<InsufficientBonusPositions, LendingError> {
        self.ensure_owner_or_automation(caller)?;
        self.scan_insufficient_bonus(user)
    }

    fn ensure_scannable(&self) -> Result<(), LendingError> {
        let tokens = self.config().registry.len();
        let cap = self.config().engine.automation.max_scan_tokens;
        if tokens > cap {
            return Err(LendingError::RegistryTooLargeToScan { tokens, cap });
        }
        Ok(())
    }

    fn scan_insufficient_bonus(&self, user: Address) -> Result<InsufficientBonusPositions, LendingError> {
        self.ensure_scannable()?;

        let mut found = InsufficientBonusPositions::default();
        let account = self.account(user);
        if !account.has_debt() {
            return Ok(found);
        }

        let pricing = self.pricing();
        let info = AccountInformation::of(&account, &pricing)?;
        let hf = self.calculate_health_factor(info.total_borrowed_usd, info.total_collateral_usd)?;
        let risk = self.risk_parameters();
        if !is_liquidatable_wad(hf, risk.min_health_factor()) {
            return Ok(found);
        }

        let registry = &self.config().registry;
        for debt_token in registry.tokens() {
            let debt = account.debt_of(debt_token);
            if debt.is_zero() {
                continue;
            }
            let debt_usd = pricing.usd_value(debt_token, debt)?;
            let bonus_needed = mul_div(debt_usd, risk.liquidation_bonus(), risk.liquidation_precision())
                .ok_or(LendingError::ArithmeticOverflow("liquidation bonus"))?;

            for collateral in registry.tokens() {
                let balance = account.collateral_of(collateral);
                if balance.is_zero() {
                    continue;
                }
                let bonus_available = pricing.usd_value(collateral, balance)?.saturating_sub(debt_usd);
                if bonus_available < bonus_needed {
                    found.push(debt_token, collateral, debt);
                    break;
                }
            }
        }

        if !found.is_empty() {
            debug!(
                user = %user,
                health_factor = wad_to_f64(hf),
                flagged = found.len(),
                "Insufficient-bonus positions found"
            );
        }
        Ok(found)
    }

    /// Whether any position needs protocol liquidation, with the encoded batch.
    ///
    /// Scans every known user; no state is modified.
    #[instrument(skip(self))]
    pub fn check_upkeep(&self) -> (bool, Bytes) {
        if let Err(err) = self.ensure_scannable() {
            warn!(error = %err, "Upkeep scan skipped");
            return (false, Bytes::new());
        }

        let batch = self.config().engine.automation.max_upkeep_batch;
        let mut positions: Vec<UpkeepPosition> = Vec::new();
        'users: for user in self.users() {
            let found = match self.scan_insufficient_bonus(user) {
                Ok(found) => found,
                Err(err) => {
                    warn!(user = %user, error = %err, "Failed to scan user");
                    continue;
                }
            };
            for (debt_token, collateral, debt_amount) in found.iter() {
                if positions.len() >= batch {
                    break 'users;
                }
                positions.push(UpkeepPosition {
                    user,
                    debtToken: debt_token,
                    collateral,
                    debtAmount: debt_amount,
                });
            }
        }

        if positions.is_empty() {
            return (false, Bytes::new());
        }
        debug!(positions = positions.len(), "Upkeep needed");
        (true, Bytes::from(positions.abi_encode()))
    }

    /// Liquidate every position in `data` through the protocol path.
    ///
    /// Each position is liquidated atomically on its own; a failure is recorded
    /// in the report and the remaining positions still run.
    #[instrument(skip(self, data), fields(caller = %caller, bytes = data.len()))]
    pub fn perform_upkeep(&self, caller: Address, data: &[u8]) -> Result<UpkeepReport, LendingError> {
        self.ensure_owner_or_automation(caller)?;
        let positions = <Vec<UpkeepPosition>>::abi_decode(data, true)
            .map_err(|e| LendingError::InvalidUpkeepData(e.to_string()))?;

        let mut report = UpkeepReport::default();
        for position in &positions {
            let target = UpkeepTarget::from(position);
            match self.protocol_liquidate(
                caller,
                target.user,
                target.collateral,
                target.debt_token,
                target.debt_amount,
            ) {
                Ok(outcome) => report.succeeded.push(LiquidatedUpkeep {
                    target,
                    health_factor_after: outcome.health_factor_after,
                    fee_delivered: outcome.fee_delivered,
                }),
                Err(error) => {
                    let registry = &self.config().registry;
                    warn!(
                        user = %target.user,
                        debt_token = registry.symbol(target.debt_token).unwrap_or("?"),
                        collateral = registry.symbol(target.collateral).unwrap_or("?"),
                        error = %error,
                        "Upkeep liquidation failed"
                    );
                    report.failed.push(FailedUpkeep { target, error });
                }
            }
        }

        info!(
            attempted = report.attempted(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Upkeep performed"
        );
        Ok(report)
    }
}

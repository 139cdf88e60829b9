//! Health factor calculation.

use alloy::primitives::{Address, U256};
use serde::Serialize;

use crate::error::LendingError;
use crate::ledger::Account;
use crate::pricing::Pricing;
use crate::protocol::Protocol;
use crate::u256_math::{self, wad_to_f64};

/// USD totals of an account (18 decimals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountInformation {
    pub total_borrowed_usd: U256,
    pub total_collateral_usd: U256,
}

impl AccountInformation {
    /// Value an account at current prices.
    pub(crate) fn of(account: &Account, pricing: &Pricing<'_>) -> Result<Self, LendingError> {
        Ok(Self {
            total_borrowed_usd: pricing.total_usd(|token| account.debt_of(token))?,
            total_collateral_usd: pricing.total_usd(|token| account.collateral_of(token))?,
        })
    }
}

impl Protocol {
    /// Health factor for the given USD totals (`U256::MAX` when nothing is borrowed).
    pub fn calculate_health_factor(
        &self,
        total_borrowed_usd: U256,
        total_collateral_usd: U256,
    ) -> Result<U256, LendingError> {
        let risk = self.risk_parameters();
        u256_math::calculate_hf_wad(
            total_collateral_usd,
            total_borrowed_usd,
            risk.liquidation_threshold(),
            risk.liquidation_precision(),
        )
        .ok_or(LendingError::ArithmeticOverflow("health factor"))
    }

    /// Borrowed and collateral USD totals of `user`.
    pub fn account_information(&self, user: Address) -> Result<AccountInformation, LendingError> {
        AccountInformation::of(&self.account(user), &self.pricing())
    }

    pub fn account_collateral_value(&self, user: Address) -> Result<U256, LendingError> {
        Ok(self.account_information(user)?.total_collateral_usd)
    }

    pub fn account_borrowed_value(&self, user: Address) -> Result<U256, LendingError> {
        Ok(self.account_information(user)?.total_borrowed_usd)
    }

    /// Current health factor of `user`.
    pub fn health_factor(&self, user: Address) -> Result<U256, LendingError> {
        let info = self.account_information(user)?;
        self.calculate_health_factor(info.total_borrowed_usd, info.total_collateral_usd)
    }

    /// Whether `user` is below the minimum health factor.
    pub fn is_liquidatable(&self, user: Address) -> Result<bool, LendingError> {
        Ok(u256_math::is_liquidatable_wad(
            self.health_factor(user)?,
            self.risk_parameters().min_health_factor(),
        ))
    }

    /// Fail with `BreaksHealthFactor` if `user` is below the minimum.
    pub(crate) fn revert_if_health_factor_is_broken(&self, user: Address) -> Result<(), LendingError> {
        let hf = self.health_factor(user)?;
        if u256_math::is_liquidatable_wad(hf, self.risk_parameters().min_health_factor()) {
            tracing::debug!(user = %user, health_factor = wad_to_f64(hf), "Health factor broken");
            return Err(LendingError::BreaksHealthFactor(hf));
        }
        Ok(())
    }
}

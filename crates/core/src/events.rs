//! Protocol event log entries.

use alloy::primitives::{Address, U256};
use serde::Serialize;

use crate::liquidation::SeizureTier;

/// Event appended by a successful operation. Rolled-back operations leave no events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProtocolEvent {
    CollateralDeposited {
        user: Address,
        token: Address,
        amount: U256,
    },
    Borrowed {
        user: Address,
        token: Address,
        amount: U256,
    },
    Repaid {
        payer: Address,
        on_behalf_of: Address,
        token: Address,
        amount: U256,
    },
    CollateralWithdrawn {
        user: Address,
        token: Address,
        amount: U256,
    },
    CollateralSeized {
        user: Address,
        token: Address,
        amount: U256,
        usd_value: U256,
        tier: SeizureTier,
    },
    /// `liquidator` is None on the protocol path
    Liquidated {
        user: Address,
        liquidator: Option<Address>,
        collateral: Address,
        debt_token: Address,
        debt_amount: U256,
        bonus_usd: U256,
        health_factor_before: U256,
        health_factor_after: U256,
    },
    /// Seized principal converted to the debt token
    PrincipalSwapped {
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out: U256,
    },
    /// Protocol fee delivered in the funding token
    ProtocolFeeSwapped {
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out: U256,
        recipient: Address,
    },
    AutomationUpdated {
        previous: Option<Address>,
        automation: Address,
    },
}

impl ProtocolEvent {
    /// Short event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CollateralDeposited { .. } => "collateral_deposited",
            Self::Borrowed { .. } => "borrowed",
            Self::Repaid { .. } => "repaid",
            Self::CollateralWithdrawn { .. } => "collateral_withdrawn",
            Self::CollateralSeized { .. } => "collateral_seized",
            Self::Liquidated { .. } => "liquidated",
            Self::PrincipalSwapped { .. } => "principal_swapped",
            Self::ProtocolFeeSwapped { .. } => "protocol_fee_swapped",
            Self::AutomationUpdated { .. } => "automation_updated",
        }
    }
}

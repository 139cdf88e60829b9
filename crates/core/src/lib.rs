//! Lending risk engine core.
//!
//! This crate provides the collateralized lending protocol:
//! - Token registry with price feeds, in registry order
//! - Account ledger (collateral, debt, protocol totals)
//! - Health factor accounting over live oracle prices
//! - Deposit, borrow, repay and withdraw with solvency checks
//! - Tiered liquidation waterfall with protocol escalation
//! - Insufficient-bonus scanner and automation upkeep
//!
//! Token transfers, price feeds and swaps are consumed through the
//! `loanfi-chain` and `loanfi-api` seams.

mod assets;
pub mod config;
mod error;
mod events;
mod health;
mod ledger;
mod lending;
mod liquidation;
mod pricing;
mod protocol;
mod scanner;
pub mod u256_math;

#[cfg(test)]
pub(crate) mod test_utils;

pub use assets::{RegisteredToken, TokenRegistry};
pub use config::{
    load_deployment, load_deployment_from_env, EngineConfig, ProtocolConfig, ResolvedDeployment,
    ResolvedSimulation, RiskParameters,
};
pub use error::{ErrorKind, LendingError};
pub use events::ProtocolEvent;
pub use health::AccountInformation;
pub use ledger::{Account, AccountLedger};
pub use liquidation::{
    LiquidationOutcome, LiquidationPlan, LiquidatorRole, Seizure, SeizureTier, Seizures,
};
pub use pricing::unix_now;
pub use protocol::Protocol;
pub use scanner::{
    FailedUpkeep, InsufficientBonusPositions, LiquidatedUpkeep, UpkeepPosition, UpkeepReport,
    UpkeepTarget,
};

//! Error taxonomy for lending and liquidation operations.
//!
//! Every variant aborts the operation that raised it; the protocol rolls back
//! all ledger and token movements before surfacing the error.

use alloy::primitives::{Address, U256};
use loanfi_api::SwapError;
use loanfi_chain::{OracleError, TransferError};
use thiserror::Error;

/// Coarse classification of a [`LendingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller mistake; retrying with corrected input can succeed
    Validation,
    /// Operation would violate the solvency invariant
    Solvency,
    /// Caller lacks the required role
    Authorization,
    /// Position needs the protocol liquidation path
    Escalation,
    /// Oracle, token or swap collaborator failed
    External,
    /// Invalid initialization parameters
    Configuration,
}

/// Errors raised by the risk engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LendingError {
    #[error("amount must be greater than zero")]
    NeedsMoreThanZero,

    #[error("token {0} is not allowed")]
    TokenNotAllowed(Address),

    #[error("zero address not allowed")]
    ZeroAddressNotAllowed,

    #[error("not enough available collateral: requested {requested}, available {available}")]
    NotEnoughAvailableCollateral { requested: U256, available: U256 },

    #[error("operation breaks health factor: {0}")]
    BreaksHealthFactor(U256),

    #[error("no debt in token to pay")]
    NotEnoughTokensToPayDebt,

    #[error("repayment {amount} exceeds debt {debt}")]
    OverpaidDebt { amount: U256, debt: U256 },

    #[error("user has no collateral deposited in that token")]
    UserHasNoCollateralDeposited,

    #[error("user does not have that many tokens: requested {requested}, balance {balance}")]
    UserDoesNotHaveThatManyTokens { requested: U256, balance: U256 },

    #[error("cannot liquidate self")]
    CantLiquidateSelf,

    #[error("user has not borrowed token {0}")]
    UserHasNotBorrowedToken(Address),

    #[error("health factor {0} is healthy")]
    HealthFactorIsHealthy(U256),

    #[error("debt amount {amount} exceeds borrowed amount {borrowed}")]
    DebtAmountPaidExceedsBorrowedAmount { amount: U256, borrowed: U256 },

    #[error("insufficient balance to liquidate: have {balance}, need {needed}")]
    InsufficientBalanceToLiquidate { balance: U256, needed: U256 },

    #[error("only protocol can liquidate: bonus available {bonus_available_usd} < needed {bonus_needed_usd}")]
    OnlyProtocolCanLiquidateInsufficientBonus {
        bonus_needed_usd: U256,
        bonus_available_usd: U256,
    },

    #[error("health factor not improved: before {before}, after {after}")]
    HealthFactorNotImproved { before: U256, after: U256 },

    #[error("caller {0} is not the owner")]
    OnlyOwner(Address),

    #[error("caller {0} is neither the owner nor the automation")]
    OnlyProtocolOwnerOrAutomation(Address),

    #[error("reentrant liquidation call")]
    ReentrantCall,

    #[error("registry of {tokens} tokens exceeds scan cap {cap}")]
    RegistryTooLargeToScan { tokens: usize, cap: usize },

    #[error("invalid upkeep data: {0}")]
    InvalidUpkeepData(String),

    #[error("token and price feed lists differ in length: {tokens} tokens, {feeds} feeds")]
    TokenAddressesAndPriceFeedAddressesMustBeSameLength { tokens: usize, feeds: usize },

    #[error("token {0} registered twice")]
    DuplicateToken(Address),

    #[error("arithmetic overflow computing {0}")]
    ArithmeticOverflow(&'static str),

    #[error(transparent)]
    TransferFailed(#[from] TransferError),

    #[error(transparent)]
    SwapFailed(#[from] SwapError),

    #[error(transparent)]
    InvalidPrice(#[from] OracleError),
}

impl LendingError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        use LendingError::*;
        match self {
            NeedsMoreThanZero
            | TokenNotAllowed(_)
            | ZeroAddressNotAllowed
            | NotEnoughAvailableCollateral { .. }
            | NotEnoughTokensToPayDebt
            | OverpaidDebt { .. }
            | UserHasNoCollateralDeposited
            | UserDoesNotHaveThatManyTokens { .. }
            | CantLiquidateSelf
            | UserHasNotBorrowedToken(_)
            | DebtAmountPaidExceedsBorrowedAmount { .. }
            | InsufficientBalanceToLiquidate { .. }
            | ReentrantCall
            | RegistryTooLargeToScan { .. }
            | InvalidUpkeepData(_) => ErrorKind::Validation,
            BreaksHealthFactor(_) | HealthFactorIsHealthy(_) | HealthFactorNotImproved { .. } => {
                ErrorKind::Solvency
            }
            OnlyOwner(_) | OnlyProtocolOwnerOrAutomation(_) => ErrorKind::Authorization,
            OnlyProtocolCanLiquidateInsufficientBonus { .. } => ErrorKind::Escalation,
            TransferFailed(_) | SwapFailed(_) | InvalidPrice(_) | ArithmeticOverflow(_) => {
                ErrorKind::External
            }
            TokenAddressesAndPriceFeedAddressesMustBeSameLength { .. } | DuplicateToken(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// Whether the position should be retried through the protocol liquidation path.
    pub fn is_escalation(&self) -> bool {
        self.kind() == ErrorKind::Escalation
    }
}

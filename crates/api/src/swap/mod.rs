//! Swap adapter abstraction for protocol-forced liquidation.
//!
//! The core treats swapping as a black box: an exact-input swap with a caller
//! supplied minimum output. The minimum is always derived from oracle values by
//! the caller, never from pool quotes.
//!
//! # Example
//!
//! ```rust,ignore
//! use loanfi_api::swap::{SwapAdapter, SwapParams};
//!
//! let params = SwapParams::new(weth, link, amount_in, min_out)
//!     .with_payer(custody)
//!     .with_recipient(automation);
//! let amount_out = router.swap_exact_input(&params)?;
//! ```

mod oracle_router;

pub use oracle_router::OracleSwapRouter;

use alloy::primitives::{Address, U256};
use loanfi_chain::{OracleError, TransferError};
use std::fmt::Debug;
use thiserror::Error;

/// Parameters for an exact-input swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    /// Input token address
    pub token_in: Address,
    /// Output token address
    pub token_out: Address,
    /// Exact input amount
    pub amount_in: U256,
    /// Minimum acceptable output
    pub min_amount_out: U256,
    /// Account the input is pulled from (must have approved the adapter)
    pub payer: Address,
    /// Account receiving the output (defaults to payer)
    pub recipient: Option<Address>,
}

impl SwapParams {
    /// Create new swap parameters.
    pub fn new(token_in: Address, token_out: Address, amount_in: U256, min_amount_out: U256) -> Self {
        Self {
            token_in,
            token_out,
            amount_in,
            min_amount_out,
            payer: Address::ZERO,
            recipient: None,
        }
    }

    /// Set the paying account.
    pub fn with_payer(mut self, payer: Address) -> Self {
        self.payer = payer;
        self
    }

    /// Set recipient address.
    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Account receiving the output.
    pub fn recipient(&self) -> Address {
        self.recipient.unwrap_or(self.payer)
    }
}

/// Swap failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    /// Output below the caller's minimum.
    #[error("slippage exceeded: got {amount_out}, minimum {min_amount_out}")]
    SlippageExceeded { amount_out: U256, min_amount_out: U256 },

    /// Token pair not supported by the adapter.
    #[error("unsupported pair {token_in} -> {token_out}")]
    UnsupportedPair { token_in: Address, token_out: Address },

    /// Zero input.
    #[error("zero input amount")]
    ZeroInput,

    /// Quote does not fit in 256 bits.
    #[error("swap quote overflow for input {amount_in}")]
    QuoteOverflow { amount_in: U256 },

    /// Pricing the swap failed.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Moving tokens failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Trait for exact-input swap providers.
pub trait SwapAdapter: Send + Sync + Debug {
    /// Adapter identifier (for logging).
    fn adapter_id(&self) -> &str;

    /// Address the payer must approve before swapping.
    fn address(&self) -> Address;

    /// Swap exactly `amount_in` of `token_in` for at least `min_amount_out` of `token_out`.
    ///
    /// Returns the output amount delivered to the recipient.
    fn swap_exact_input(&self, params: &SwapParams) -> Result<U256, SwapError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_params_builder() {
        let params = SwapParams::new(
            Address::ZERO,
            Address::repeat_byte(1),
            U256::from(1000),
            U256::from(980),
        )
        .with_payer(Address::repeat_byte(2));

        assert_eq!(params.recipient(), Address::repeat_byte(2));

        let params = params.with_recipient(Address::repeat_byte(3));
        assert_eq!(params.recipient(), Address::repeat_byte(3));
    }
}

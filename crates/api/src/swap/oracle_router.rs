//! Oracle-priced swap router.
//!
//! Fills swaps at the oracle exchange rate minus a flat fee, out of reserves
//! the router holds in the shared token ledger. Used by the simulation binary
//! and tests in place of a DEX.

use super::{SwapAdapter, SwapError, SwapParams};
use alloy::primitives::{Address, U256};
use loanfi_chain::{PriceOracle, TokenLedger};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Basis points denominator (10000 = 100%)
const BPS_DENOMINATOR: u64 = 10_000;

/// Swap router pricing every pair through the oracle.
#[derive(Debug)]
pub struct OracleSwapRouter {
    /// Router account holding reserves
    address: Address,
    /// Token ledger the reserves live in
    tokens: Arc<dyn TokenLedger>,
    /// Price source
    oracle: Arc<dyn PriceOracle>,
    /// Token -> price feed
    feeds: HashMap<Address, Address>,
    /// Fee charged on output (basis points)
    fee_bps: u16,
}

impl OracleSwapRouter {
    /// Create a router at `address` with a 0.3% fee.
    pub fn new(
        address: Address,
        tokens: Arc<dyn TokenLedger>,
        oracle: Arc<dyn PriceOracle>,
        feeds: HashMap<Address, Address>,
    ) -> Self {
        Self {
            address,
            tokens,
            oracle,
            feeds,
            fee_bps: 30,
        }
    }

    /// Set the fee charged on output.
    pub fn with_fee_bps(mut self, fee_bps: u16) -> Self {
        self.fee_bps = fee_bps;
        self
    }

    /// Output the router would deliver for `amount_in`, after fee.
    pub fn quote(&self, token_in: Address, token_out: Address, amount_in: U256) -> Result<U256, SwapError> {
        let (feed_in, feed_out) = match (self.feeds.get(&token_in), self.feeds.get(&token_out)) {
            (Some(feed_in), Some(feed_out)) => (*feed_in, *feed_out),
            _ => return Err(SwapError::UnsupportedPair { token_in, token_out }),
        };

        let usd = self.oracle.latest_price(feed_in)?.usd_value(amount_in)?;
        let gross = self.oracle.latest_price(feed_out)?.token_amount_from_usd(usd)?;
        let fee_factor = U256::from(BPS_DENOMINATOR.saturating_sub(self.fee_bps as u64));
        gross
            .checked_mul(fee_factor)
            .map(|net| net / U256::from(BPS_DENOMINATOR))
            .ok_or(SwapError::QuoteOverflow { amount_in })
    }
}

impl SwapAdapter for OracleSwapRouter {
    fn adapter_id(&self) -> &str {
        "oracle-router"
    }

    fn address(&self) -> Address {
        self.address
    }

    fn swap_exact_input(&self, params: &SwapParams) -> Result<U256, SwapError> {
        if params.amount_in.is_zero() {
            return Err(SwapError::ZeroInput);
        }

        let amount_out = self.quote(params.token_in, params.token_out, params.amount_in)?;
        if amount_out < params.min_amount_out {
            return Err(SwapError::SlippageExceeded {
                amount_out,
                min_amount_out: params.min_amount_out,
            });
        }

        self.tokens.transfer_from(
            params.token_in,
            self.address,
            params.payer,
            self.address,
            params.amount_in,
        )?;
        self.tokens
            .transfer(params.token_out, self.address, params.recipient(), amount_out)?;

        debug!(
            token_in = %params.token_in,
            token_out = %params.token_out,
            amount_in = %params.amount_in,
            amount_out = %amount_out,
            recipient = %params.recipient(),
            "Swap filled"
        );

        Ok(amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loanfi_chain::{InMemoryTokenLedger, OracleError, StaticPriceFeeds, TransferError};

    const WAD: u128 = 1_000_000_000_000_000_000;
    const WETH: Address = Address::repeat_byte(0x01);
    const LINK: Address = Address::repeat_byte(0x02);
    const WETH_FEED: Address = Address::repeat_byte(0xF1);
    const LINK_FEED: Address = Address::repeat_byte(0xF2);
    const ROUTER: Address = Address::repeat_byte(0x5A);
    const PAYER: Address = Address::repeat_byte(0xC0);

    fn setup(fee_bps: u16) -> (Arc<InMemoryTokenLedger>, OracleSwapRouter) {
        let tokens = Arc::new(InMemoryTokenLedger::new());
        let feeds = Arc::new(StaticPriceFeeds::new());
        feeds.set_price(WETH_FEED, 2000_0000_0000);
        feeds.set_price(LINK_FEED, 10_0000_0000);

        tokens.mint(LINK, ROUTER, U256::from(1_000_000u128 * WAD));
        tokens.mint(WETH, PAYER, U256::from(10 * WAD));
        tokens.approve(WETH, PAYER, ROUTER, U256::MAX);

        let router = OracleSwapRouter::new(
            ROUTER,
            tokens.clone(),
            feeds,
            HashMap::from([(WETH, WETH_FEED), (LINK, LINK_FEED)]),
        )
        .with_fee_bps(fee_bps);
        (tokens, router)
    }

    #[test]
    fn test_swap_at_oracle_rate() {
        let (tokens, router) = setup(0);
        let params = SwapParams::new(WETH, LINK, U256::from(WAD), U256::from(200 * WAD))
            .with_payer(PAYER);

        let out = router.swap_exact_input(&params).unwrap();
        assert_eq!(out, U256::from(200 * WAD));
        assert_eq!(tokens.balance_of(LINK, PAYER), U256::from(200 * WAD));
        assert_eq!(tokens.balance_of(WETH, ROUTER), U256::from(WAD));
    }

    #[test]
    fn test_fee_and_slippage_guard() {
        let (_, router) = setup(300); // 3% fee
        let params = SwapParams::new(WETH, LINK, U256::from(WAD), U256::from(196 * WAD))
            .with_payer(PAYER);

        let err = router.swap_exact_input(&params).unwrap_err();
        assert_eq!(
            err,
            SwapError::SlippageExceeded {
                amount_out: U256::from(194 * WAD),
                min_amount_out: U256::from(196 * WAD),
            }
        );
    }

    #[test]
    fn test_oversized_quote_fails() {
        let (_, router) = setup(0);
        assert!(matches!(
            router.quote(WETH, LINK, U256::MAX),
            Err(SwapError::Oracle(OracleError::ValuationOverflow { .. }))
        ));
    }

    #[test]
    fn test_missing_allowance_fails() {
        let (tokens, router) = setup(0);
        tokens.approve(WETH, PAYER, ROUTER, U256::ZERO);
        let params = SwapParams::new(WETH, LINK, U256::from(WAD), U256::ZERO).with_payer(PAYER);

        assert!(matches!(
            router.swap_exact_input(&params),
            Err(SwapError::Transfer(TransferError::InsufficientAllowance { .. }))
        ));
    }

    #[test]
    fn test_unsupported_pair() {
        let (_, router) = setup(0);
        let params = SwapParams::new(WETH, Address::repeat_byte(0x99), U256::from(1u64), U256::ZERO);
        assert!(matches!(
            router.swap_exact_input(&params),
            Err(SwapError::UnsupportedPair { .. })
        ));
    }
}

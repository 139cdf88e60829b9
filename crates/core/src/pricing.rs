//! Oracle-backed valuation of registered tokens.
//!
//! A [`Pricing`] view is taken once per operation: it pins the clock used for
//! the staleness check so every price read inside one operation is judged
//! against the same instant.

use alloy::primitives::{Address, U256};
use loanfi_chain::{OracleError, PriceData, PriceOracle};

use crate::assets::TokenRegistry;
use crate::error::LendingError;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Valuation context for one operation.
#[derive(Clone, Copy)]
pub struct Pricing<'a> {
    registry: &'a TokenRegistry,
    oracle: &'a dyn PriceOracle,
    max_age_secs: Option<u64>,
    now: u64,
}

impl<'a> Pricing<'a> {
    pub fn new(
        registry: &'a TokenRegistry,
        oracle: &'a dyn PriceOracle,
        max_age_secs: Option<u64>,
        now: u64,
    ) -> Self {
        Self {
            registry,
            oracle,
            max_age_secs,
            now,
        }
    }

    /// Validated latest price of a registered token.
    pub fn price(&self, token: Address) -> Result<PriceData, LendingError> {
        let feed = self.registry.price_feed(token)?;
        let data = self.oracle.latest_price(feed)?;
        if let Some(max_age) = self.max_age_secs {
            data.ensure_fresh(max_age, self.now)?;
        }
        data.positive_price()?;
        Ok(data)
    }

    /// USD value (18 decimals) of `amount` of `token`.
    ///
    /// Zero amounts are worth zero without consulting the feed.
    pub fn usd_value(&self, token: Address, amount: U256) -> Result<U256, LendingError> {
        if amount.is_zero() {
            self.registry.ensure_allowed(token)?;
            return Ok(U256::ZERO);
        }
        checked(self.price(token)?.usd_value(amount))
    }

    /// Amount of `token` worth `usd` (18 decimals), floored.
    pub fn token_amount_from_usd(&self, token: Address, usd: U256) -> Result<U256, LendingError> {
        checked(self.price(token)?.token_amount_from_usd(usd))
    }

    /// Sum of USD values over every registered token.
    pub fn total_usd<F>(&self, amount_of: F) -> Result<U256, LendingError>
    where
        F: Fn(Address) -> U256,
    {
        self.registry.tokens().try_fold(U256::ZERO, |total, token| {
            total
                .checked_add(self.usd_value(token, amount_of(token))?)
                .ok_or(LendingError::ArithmeticOverflow("account value"))
        })
    }
}

fn checked(valuation: Result<U256, OracleError>) -> Result<U256, LendingError> {
    valuation.map_err(|e| match e {
        OracleError::ValuationOverflow { .. } => LendingError::ArithmeticOverflow("usd valuation"),
        other => other.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::u256_math::wad;
    use loanfi_chain::{OracleError, StaticPriceFeeds};

    const WETH: Address = Address::repeat_byte(0x01);
    const WETH_FEED: Address = Address::repeat_byte(0xF1);

    fn setup() -> (TokenRegistry, StaticPriceFeeds) {
        let registry = TokenRegistry::new(&[WETH], &[WETH_FEED]).unwrap();
        let feeds = StaticPriceFeeds::new();
        feeds.set_price_at(WETH_FEED, 2000_0000_0000, 1_000);
        (registry, feeds)
    }

    #[test]
    fn test_usd_value() {
        let (registry, feeds) = setup();
        let pricing = Pricing::new(&registry, &feeds, None, 1_000);
        assert_eq!(pricing.usd_value(WETH, wad(5)).unwrap(), wad(10_000));
        assert_eq!(pricing.token_amount_from_usd(WETH, wad(2000)).unwrap(), wad(1));
        assert_eq!(pricing.total_usd(|_| wad(1)).unwrap(), wad(2000));
    }

    #[test]
    fn test_overflowing_valuation_fails() {
        let (registry, feeds) = setup();
        let pricing = Pricing::new(&registry, &feeds, None, 1_000);
        let huge = U256::MAX / U256::from(2000u64) * U256::from(2u64);
        assert_eq!(
            pricing.usd_value(WETH, huge),
            Err(LendingError::ArithmeticOverflow("usd valuation"))
        );
        assert_eq!(
            pricing.total_usd(|_| huge),
            Err(LendingError::ArithmeticOverflow("usd valuation"))
        );
        assert_eq!(
            pricing.token_amount_from_usd(WETH, U256::MAX),
            Err(LendingError::ArithmeticOverflow("usd valuation"))
        );
    }

    #[test]
    fn test_stale_price_rejected() {
        let (registry, feeds) = setup();
        let pricing = Pricing::new(&registry, &feeds, Some(60), 1_061);
        assert!(matches!(
            pricing.usd_value(WETH, wad(1)),
            Err(LendingError::InvalidPrice(OracleError::StalePrice { age_secs: 61, .. }))
        ));
        // zero amounts never consult the feed
        assert_eq!(pricing.usd_value(WETH, U256::ZERO).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_negative_price_rejected() {
        let (registry, feeds) = setup();
        feeds.set_price_at(WETH_FEED, -1, 1_000);
        let pricing = Pricing::new(&registry, &feeds, None, 1_000);
        assert!(matches!(
            pricing.usd_value(WETH, wad(1)),
            Err(LendingError::InvalidPrice(OracleError::InvalidPrice { .. }))
        ));
    }

    #[test]
    fn test_unregistered_token() {
        let (registry, feeds) = setup();
        let pricing = Pricing::new(&registry, &feeds, None, 1_000);
        let other = Address::repeat_byte(0x09);
        assert_eq!(
            pricing.usd_value(other, U256::ZERO),
            Err(LendingError::TokenNotAllowed(other))
        );
    }
}

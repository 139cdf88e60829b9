//! Oracle type definitions.

use alloy::primitives::{Address, I256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard Chainlink aggregator decimals.
pub const DEFAULT_FEED_DECIMALS: u8 = 8;

/// Internal fixed-point scale (18 decimals).
const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Errors surfaced by a price feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Feed is not known to the oracle.
    #[error("unknown price feed {0}")]
    UnknownFeed(Address),

    /// Feed reported a zero or negative answer.
    #[error("invalid price {answer} from feed {feed}")]
    InvalidPrice { feed: Address, answer: I256 },

    /// Feed answer is older than the accepted age.
    #[error("stale price from feed {feed}: {age_secs}s old, max {max_age_secs}s")]
    StalePrice {
        feed: Address,
        age_secs: u64,
        max_age_secs: u64,
    },

    /// Valuation does not fit in 256 bits.
    #[error("valuation overflow on feed {feed} for amount {amount}")]
    ValuationOverflow { feed: Address, amount: U256 },
}

/// Latest answer of a price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// Feed the answer came from
    pub feed: Address,
    /// Signed answer (in feed decimals)
    pub answer: I256,
    /// Answer decimals
    pub decimals: u8,
    /// Unix timestamp of the last update
    pub updated_at: u64,
}

impl PriceData {
    /// Create new price data.
    pub fn new(feed: Address, answer: I256, decimals: u8, updated_at: u64) -> Self {
        Self {
            feed,
            answer,
            decimals,
            updated_at,
        }
    }

    /// Build price data from a plain integer answer.
    pub fn from_i128(feed: Address, answer: i128, decimals: u8, updated_at: u64) -> Self {
        let magnitude = I256::from_raw(U256::from(answer.unsigned_abs()));
        let answer = if answer < 0 { -magnitude } else { magnitude };
        Self::new(feed, answer, decimals, updated_at)
    }

    /// Get the answer as an unsigned price, rejecting zero and negative values.
    pub fn positive_price(&self) -> Result<U256, OracleError> {
        if !self.answer.is_positive() {
            return Err(OracleError::InvalidPrice {
                feed: self.feed,
                answer: self.answer,
            });
        }
        Ok(self.answer.into_raw())
    }

    /// Get age in seconds.
    pub fn age_secs(&self, current_time: u64) -> u64 {
        current_time.saturating_sub(self.updated_at)
    }

    /// Check if price is stale.
    pub fn is_stale(&self, threshold_secs: u64, current_time: u64) -> bool {
        self.age_secs(current_time) > threshold_secs
    }

    /// Fail with [`OracleError::StalePrice`] if the answer is older than `max_age_secs`.
    pub fn ensure_fresh(&self, max_age_secs: u64, current_time: u64) -> Result<(), OracleError> {
        if self.is_stale(max_age_secs, current_time) {
            return Err(OracleError::StalePrice {
                feed: self.feed,
                age_secs: self.age_secs(current_time),
                max_age_secs,
            });
        }
        Ok(())
    }

    /// Normalize price to 18 decimals.
    ///
    /// For 8-decimal feeds this multiplies by 1e10 (the additional feed precision).
    pub fn normalize_to_18(&self) -> Result<U256, OracleError> {
        let price = self.positive_price()?;
        let normalized = if self.decimals <= 18 {
            price
                .checked_mul(U256::from(10u64).pow(U256::from(18 - self.decimals)))
                .ok_or(OracleError::ValuationOverflow {
                    feed: self.feed,
                    amount: price,
                })?
        } else {
            price / U256::from(10u64).pow(U256::from(self.decimals - 18))
        };
        if normalized.is_zero() {
            return Err(OracleError::InvalidPrice {
                feed: self.feed,
                answer: self.answer,
            });
        }
        Ok(normalized)
    }

    /// USD value (18 decimals) of an 18-decimal token amount.
    ///
    /// `amount * price * 10^(18 - decimals) / 1e18`, floored. Fails with
    /// [`OracleError::ValuationOverflow`] instead of wrapping.
    pub fn usd_value(&self, amount: U256) -> Result<U256, OracleError> {
        let price = self.normalize_to_18()?;
        amount
            .checked_mul(price)
            .map(|product| product / WAD)
            .ok_or(OracleError::ValuationOverflow {
                feed: self.feed,
                amount,
            })
    }

    /// Token amount (18 decimals) worth `usd` (18 decimals), floored.
    pub fn token_amount_from_usd(&self, usd: U256) -> Result<U256, OracleError> {
        let price = self.normalize_to_18()?;
        usd.checked_mul(WAD)
            .map(|scaled| scaled / price)
            .ok_or(OracleError::ValuationOverflow {
                feed: self.feed,
                amount: usd,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_price(answer: i128) -> PriceData {
        PriceData::from_i128(Address::repeat_byte(0xEE), answer, 8, 1_700_000_000)
    }

    #[test]
    fn test_usd_value_eight_decimal_feed() {
        // 5 ETH at $2000
        let price = eth_price(2000_0000_0000);
        let amount = U256::from(5u64) * WAD;
        assert_eq!(price.usd_value(amount).unwrap(), U256::from(10_000u64) * WAD);
    }

    #[test]
    fn test_token_amount_from_usd() {
        // $100 of ETH at $2000 = 0.05 ETH
        let price = eth_price(2000_0000_0000);
        let usd = U256::from(100u64) * WAD;
        assert_eq!(
            price.token_amount_from_usd(usd).unwrap(),
            U256::from(50_000_000_000_000_000u64)
        );
    }

    #[test]
    fn test_rejects_non_positive_answers() {
        assert!(matches!(
            eth_price(0).positive_price(),
            Err(OracleError::InvalidPrice { .. })
        ));
        assert!(matches!(
            eth_price(-1).usd_value(WAD),
            Err(OracleError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_staleness() {
        let price = eth_price(2000_0000_0000);
        assert!(!price.is_stale(3600, 1_700_003_600));
        assert!(price.is_stale(3600, 1_700_003_601));
        assert!(matches!(
            price.ensure_fresh(60, 1_700_000_061),
            Err(OracleError::StalePrice { age_secs: 61, .. })
        ));
    }

    #[test]
    fn test_valuation_overflow_is_an_error() {
        let price = eth_price(2000_0000_0000);
        let huge = U256::MAX / U256::from(2000u64) * U256::from(2u64);
        assert_eq!(
            price.usd_value(huge),
            Err(OracleError::ValuationOverflow {
                feed: price.feed,
                amount: huge,
            })
        );
        assert!(matches!(
            price.token_amount_from_usd(U256::MAX),
            Err(OracleError::ValuationOverflow { .. })
        ));
        // largest amount whose product still fits
        let fits = U256::MAX / (U256::from(2000u64) * WAD);
        assert!(price.usd_value(fits).is_ok());
    }

    #[test]
    fn test_normalize_high_decimal_feed() {
        let price = PriceData::from_i128(Address::ZERO, 2 * 10i128.pow(20), 20, 0);
        assert_eq!(price.normalize_to_18().unwrap(), U256::from(2u64) * WAD);
    }
}

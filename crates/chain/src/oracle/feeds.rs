//! In-memory price feeds.

use super::{OracleError, PriceData, PriceOracle, DEFAULT_FEED_DECIMALS};
use alloy::primitives::Address;
use dashmap::DashMap;
use tracing::debug;

/// Price feed store keyed by feed address.
///
/// Stands in for on-chain aggregators: answers are pushed with
/// [`StaticPriceFeeds::set_price`] and read back through [`PriceOracle`].
#[derive(Debug)]
pub struct StaticPriceFeeds {
    /// Latest answer by feed
    answers: DashMap<Address, PriceData>,
    /// Decimals applied by `set_price`
    decimals: u8,
}

impl Default for StaticPriceFeeds {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticPriceFeeds {
    /// Create an empty store reporting 8-decimal answers.
    pub fn new() -> Self {
        Self {
            answers: DashMap::new(),
            decimals: DEFAULT_FEED_DECIMALS,
        }
    }

    /// Set feed decimals used by subsequent `set_price` calls.
    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    /// Publish a new answer stamped with the current time.
    pub fn set_price(&self, feed: Address, answer: i128) {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.set_price_at(feed, answer, now);
    }

    /// Publish a new answer with an explicit update timestamp.
    pub fn set_price_at(&self, feed: Address, answer: i128, updated_at: u64) {
        debug!(feed = %feed, answer, updated_at, "Price feed updated");
        self.answers
            .insert(feed, PriceData::from_i128(feed, answer, self.decimals, updated_at));
    }

    /// Number of feeds with an answer.
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    /// Whether no feed has an answer yet.
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

impl PriceOracle for StaticPriceFeeds {
    fn latest_price(&self, feed: Address) -> Result<PriceData, OracleError> {
        self.answers
            .get(&feed)
            .map(|entry| *entry)
            .ok_or(OracleError::UnknownFeed(feed))
    }
}

//! Price oracle seam.
//!
//! The core treats the oracle as a trusted external price source. This module
//! defines the [`PriceOracle`] contract it consumes and an in-memory feed store
//! ([`StaticPriceFeeds`]) used by the simulation binary and tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use loanfi_chain::oracle::{PriceOracle, StaticPriceFeeds};
//!
//! let feeds = StaticPriceFeeds::new();
//! feeds.set_price(weth_feed, 2000_0000_0000); // $2000, 8 decimals
//!
//! let price = feeds.latest_price(weth_feed)?;
//! let usd = price.usd_value(amount)?;
//! ```

mod feeds;
mod types;

pub use feeds::StaticPriceFeeds;
pub use types::{OracleError, PriceData, DEFAULT_FEED_DECIMALS};

use alloy::primitives::Address;
use std::fmt::Debug;

/// Core trait for price feed reads.
///
/// Implementations return the latest round as reported by the feed. Validity
/// (positive answer) and freshness are enforced by the caller through
/// [`PriceData::positive_price`] and [`PriceData::ensure_fresh`].
pub trait PriceOracle: Send + Sync + Debug {
    /// Latest answer for `feed`: `(price, decimals, timestamp)`.
    fn latest_price(&self, feed: Address) -> Result<PriceData, OracleError>;
}

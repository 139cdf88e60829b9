//! Token registry.
//!
//! Ordered, immutable set of allowed tokens, each mapped 1:1 to its price
//! feed. Registry order drives every scan in the engine (health factor sums,
//! secondary-collateral sourcing, insufficient-bonus scan).

use alloy::primitives::Address;
use std::collections::HashMap;

use crate::error::LendingError;

/// Registered token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredToken {
    /// Asset symbol (e.g., "WETH")
    pub symbol: String,
    /// Token contract address
    pub token: Address,
    /// Price feed address
    pub price_feed: Address,
}

impl RegisteredToken {
    pub fn new(symbol: impl Into<String>, token: Address, price_feed: Address) -> Self {
        Self {
            symbol: symbol.into(),
            token,
            price_feed,
        }
    }
}

/// Immutable token registry, set once at initialization.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    /// Tokens in registration order
    entries: Vec<RegisteredToken>,
    /// Token -> position in `entries`
    index: HashMap<Address, usize>,
}

impl TokenRegistry {
    /// Build from parallel token and price feed lists.
    pub fn new(tokens: &[Address], price_feeds: &[Address]) -> Result<Self, LendingError> {
        if tokens.len() != price_feeds.len() {
            return Err(
                LendingError::TokenAddressesAndPriceFeedAddressesMustBeSameLength {
                    tokens: tokens.len(),
                    feeds: price_feeds.len(),
                },
            );
        }
        let entries = tokens
            .iter()
            .zip(price_feeds)
            .map(|(token, feed)| RegisteredToken::new(token.to_string(), *token, *feed))
            .collect();
        Self::from_entries(entries)
    }

    /// Build from named entries, preserving their order.
    pub fn from_entries(entries: Vec<RegisteredToken>) -> Result<Self, LendingError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.token.is_zero() || entry.price_feed.is_zero() {
                return Err(LendingError::ZeroAddressNotAllowed);
            }
            if index.insert(entry.token, i).is_some() {
                return Err(LendingError::DuplicateToken(entry.token));
            }
        }
        Ok(Self { entries, index })
    }

    /// Tokens in registry order.
    pub fn tokens(&self) -> impl Iterator<Item = Address> + '_ {
        self.entries.iter().map(|e| e.token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, token: &Address) -> bool {
        self.index.contains_key(token)
    }

    /// Fail with `TokenNotAllowed` for unregistered tokens.
    pub fn ensure_allowed(&self, token: Address) -> Result<(), LendingError> {
        if self.contains(&token) {
            Ok(())
        } else {
            Err(LendingError::TokenNotAllowed(token))
        }
    }

    /// Price feed of a registered token.
    pub fn price_feed(&self, token: Address) -> Result<Address, LendingError> {
        self.index
            .get(&token)
            .map(|&i| self.entries[i].price_feed)
            .ok_or(LendingError::TokenNotAllowed(token))
    }

    /// Symbol of a registered token.
    pub fn symbol(&self, token: Address) -> Option<&str> {
        self.index.get(&token).map(|&i| self.entries[i].symbol.as_str())
    }

    /// Token registered under `symbol` (case-insensitive).
    pub fn by_symbol(&self, symbol: &str) -> Option<Address> {
        self.entries
            .iter()
            .find(|e| e.symbol.eq_ignore_ascii_case(symbol))
            .map(|e| e.token)
    }

    /// Token -> price feed map.
    pub fn feeds_by_token(&self) -> HashMap<Address, Address> {
        self.entries.iter().map(|e| (e.token, e.price_feed)).collect()
    }
}

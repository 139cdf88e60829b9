//! Asset configuration loading from TOML files.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::assets::{RegisteredToken, TokenRegistry};

/// Asset configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Assets in registry order
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
}

/// Individual asset configuration (TOML-loadable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Asset symbol (e.g., "WETH", "DAI")
    pub symbol: String,
    /// Token address (hex string, `${VAR}` allowed)
    pub token: String,
    /// Price feed address (hex string, `${VAR}` allowed)
    pub price_feed: String,
}

impl AssetConfig {
    /// Parse token address.
    pub fn token_address(&self) -> anyhow::Result<Address> {
        self.token
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid token address '{}' for {}: {}", self.token, self.symbol, e))
    }

    /// Parse price feed address.
    pub fn price_feed_address(&self) -> anyhow::Result<Address> {
        self.price_feed.parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid price feed address '{}' for {}: {}",
                self.price_feed,
                self.symbol,
                e
            )
        })
    }
}

impl AssetsConfig {
    /// Load assets config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: AssetsConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Build the token registry, preserving file order.
    pub fn registry(&self) -> anyhow::Result<TokenRegistry> {
        let entries = self
            .assets
            .iter()
            .map(|asset| {
                Ok(RegisteredToken::new(
                    asset.symbol.clone(),
                    asset.token_address()?,
                    asset.price_feed_address()?,
                ))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(TokenRegistry::from_entries(entries)?)
    }
}

//! Deployment configuration that ties together identities, engine parameters,
//! assets and the optional local simulation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{AssetConfig, EngineConfig};

/// Full deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Deployment metadata
    pub deployment: DeploymentDetails,
    /// Inline engine parameters (takes precedence over `engine_file`)
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    /// Inline assets in registry order (takes precedence over `assets_file`)
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    /// Local simulation seed
    #[serde(default)]
    pub simulation: Option<SimulationConfig>,
}

/// Deployment details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDetails {
    /// Deployment name (e.g., "local")
    pub name: String,
    /// Owner address
    pub owner: String,
    /// Custody address
    pub custody: String,
    /// Automation address
    #[serde(default)]
    pub automation: Option<String>,
    /// Symbol of the fee delivery token
    #[serde(default)]
    pub funding_token: Option<String>,
    /// Engine config file, relative to the deployment file
    #[serde(default)]
    pub engine_file: Option<String>,
    /// Assets config file, relative to the deployment file
    #[serde(default)]
    pub assets_file: Option<String>,
}

/// Seed state for the in-memory simulation run by the binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Swap router address
    pub router: String,
    /// Router fee in basis points
    #[serde(default = "default_router_fee")]
    pub router_fee_bps: u16,
    /// Whole units of every registered token minted to the router
    #[serde(default = "default_router_reserve")]
    pub router_reserve_units: u64,
    /// Initial feed answers by symbol (8 decimals)
    #[serde(default)]
    pub prices: BTreeMap<String, i64>,
    /// Seeded accounts
    #[serde(default)]
    pub accounts: Vec<SimulatedAccount>,
    /// Scheduled feed updates
    #[serde(default)]
    pub price_moves: Vec<PriceMove>,
}

fn default_router_fee() -> u16 {
    30
}

fn default_router_reserve() -> u64 {
    1_000_000
}

/// Seeded account; amounts are whole token units by symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatedAccount {
    pub address: String,
    #[serde(default)]
    pub mint: BTreeMap<String, u64>,
    #[serde(default)]
    pub deposit: BTreeMap<String, u64>,
    #[serde(default)]
    pub borrow: BTreeMap<String, u64>,
}

/// Feed update applied before keeper tick `tick`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceMove {
    pub tick: u64,
    pub symbol: String,
    /// New answer (8 decimals)
    pub price: i64,
}

impl DeploymentConfig {
    /// Load deployment config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: DeploymentConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

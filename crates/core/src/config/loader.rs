//! Deployment loader that resolves a deployment file into ready-to-use values.
//!
//! Addresses may reference environment variables as `${VAR}`; symbols in the
//! simulation section are resolved against the asset registry.

use super::{AssetsConfig, DeploymentConfig, EngineConfig, ProtocolConfig, SimulationConfig};
use crate::assets::TokenRegistry;
use crate::u256_math::wad;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Default deployment file when `LOANFI_DEPLOYMENT` is unset.
pub const DEFAULT_DEPLOYMENT_PATH: &str = "config/deployments/local.toml";

/// Fully resolved deployment configuration.
#[derive(Debug, Clone)]
pub struct ResolvedDeployment {
    /// Deployment name
    pub name: String,
    /// Protocol initialization parameters
    pub protocol: ProtocolConfig,
    /// Automation address to register after initialization
    pub automation: Option<Address>,
    /// Resolved simulation seed
    pub simulation: Option<ResolvedSimulation>,
}

/// Simulation seed with symbols resolved to addresses and units to WAD.
#[derive(Debug, Clone)]
pub struct ResolvedSimulation {
    pub router: Address,
    pub router_fee_bps: u16,
    /// Reserve minted to the router for every registered token
    pub router_reserve: U256,
    /// Initial answers
    pub prices: Vec<FeedAnswer>,
    pub accounts: Vec<ResolvedAccount>,
    /// Feed updates, ordered by tick
    pub price_moves: Vec<ScheduledAnswer>,
}

/// Feed answer for a registered token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedAnswer {
    pub symbol: String,
    pub token: Address,
    pub feed: Address,
    /// 8-decimal answer
    pub answer: i128,
}

/// Feed answer applied before a keeper tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAnswer {
    pub tick: u64,
    pub answer: FeedAnswer,
}

/// Seeded account with WAD amounts.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAccount {
    pub address: Address,
    pub mint: Vec<(Address, U256)>,
    pub deposit: Vec<(Address, U256)>,
    pub borrow: Vec<(Address, U256)>,
}

/// Load a deployment file.
pub fn load_deployment(path: impl AsRef<Path>) -> Result<ResolvedDeployment> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading deployment configuration");

    let config = DeploymentConfig::from_file(path)
        .with_context(|| format!("Failed to load deployment from {:?}", path))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve(config, base_dir)
}

/// Load the deployment named by `LOANFI_DEPLOYMENT`, or the local default.
pub fn load_deployment_from_env() -> Result<ResolvedDeployment> {
    let path = std::env::var("LOANFI_DEPLOYMENT").unwrap_or_else(|_| DEFAULT_DEPLOYMENT_PATH.to_string());
    load_deployment(path)
}

/// Resolve a parsed deployment; relative file references are joined to `base_dir`.
pub fn resolve(config: DeploymentConfig, base_dir: &Path) -> Result<ResolvedDeployment> {
    let details = &config.deployment;

    let engine = match (&config.engine, &details.engine_file) {
        (Some(engine), _) => engine.clone(),
        (None, Some(file)) => {
            let engine_path = base_dir.join(expand_env(file)?);
            EngineConfig::from_file(&engine_path)
                .with_context(|| format!("Failed to load engine config from {:?}", engine_path))?
        }
        (None, None) => EngineConfig::from_env(),
    };
    engine.risk.validate()?;

    let mut assets = if !config.assets.is_empty() {
        AssetsConfig {
            assets: config.assets.clone(),
        }
    } else if let Some(file) = &details.assets_file {
        let assets_path = base_dir.join(expand_env(file)?);
        AssetsConfig::from_file(&assets_path)
            .with_context(|| format!("Failed to load assets from {:?}", assets_path))?
    } else {
        anyhow::bail!("Deployment '{}' declares no assets", details.name);
    };
    for asset in &mut assets.assets {
        asset.token = expand_env(&asset.token)?;
        asset.price_feed = expand_env(&asset.price_feed)?;
    }
    let registry = assets.registry()?;

    let owner = parse_address(&details.owner, "owner")?;
    let custody = parse_address(&details.custody, "custody")?;
    let automation = details
        .automation
        .as_deref()
        .map(|s| parse_address(s, "automation"))
        .transpose()?;
    let funding_token = details
        .funding_token
        .as_deref()
        .map(|symbol| resolve_symbol(&registry, symbol))
        .transpose()?;

    let simulation = config
        .simulation
        .as_ref()
        .map(|sim| resolve_simulation(sim, &registry))
        .transpose()?;

    let protocol = ProtocolConfig {
        owner,
        custody,
        registry,
        engine,
        funding_token,
    };
    protocol.validate()?;

    info!(
        deployment = %details.name,
        assets = protocol.registry.len(),
        owner = %owner,
        custody = %custody,
        automation = ?automation,
        funding_token = ?funding_token,
        "Deployment resolved"
    );

    Ok(ResolvedDeployment {
        name: details.name.clone(),
        protocol,
        automation,
        simulation,
    })
}

fn resolve_simulation(sim: &SimulationConfig, registry: &TokenRegistry) -> Result<ResolvedSimulation> {
    let feed_answer = |symbol: &str, answer: i64| -> Result<FeedAnswer> {
        let token = resolve_symbol(registry, symbol)?;
        Ok(FeedAnswer {
            symbol: symbol.to_string(),
            token,
            feed: registry.price_feed(token)?,
            answer: answer as i128,
        })
    };

    let prices = sim
        .prices
        .iter()
        .map(|(symbol, answer)| feed_answer(symbol, *answer))
        .collect::<Result<Vec<_>>>()?;

    let units = |amounts: &BTreeMap<String, u64>| -> Result<Vec<(Address, U256)>> {
        amounts
            .iter()
            .map(|(symbol, units)| Ok((resolve_symbol(registry, symbol)?, wad(*units))))
            .collect()
    };

    let accounts = sim
        .accounts
        .iter()
        .map(|account| {
            Ok(ResolvedAccount {
                address: parse_address(&account.address, "simulation account")?,
                mint: units(&account.mint)?,
                deposit: units(&account.deposit)?,
                borrow: units(&account.borrow)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut price_moves = sim
        .price_moves
        .iter()
        .map(|m| {
            Ok(ScheduledAnswer {
                tick: m.tick,
                answer: feed_answer(&m.symbol, m.price)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    price_moves.sort_by_key(|m| m.tick);

    Ok(ResolvedSimulation {
        router: parse_address(&sim.router, "router")?,
        router_fee_bps: sim.router_fee_bps,
        router_reserve: wad(sim.router_reserve_units),
        prices,
        accounts,
        price_moves,
    })
}

fn resolve_symbol(registry: &TokenRegistry, symbol: &str) -> Result<Address> {
    registry
        .by_symbol(symbol)
        .ok_or_else(|| anyhow::anyhow!("Unknown asset symbol: {}", symbol))
}

fn parse_address(s: &str, what: &str) -> Result<Address> {
    let expanded = expand_env(s)?;
    expanded
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid {} address '{}': {}", what, expanded, e))
}

/// Expand ${VAR_NAME} patterns with environment variable values.
///
/// Unset variables are left in place.
pub fn expand_env(s: &str) -> Result<String> {
    let mut result = s.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")?;

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYMENT: &str = r#"
        [deployment]
        name = "unit"
        owner = "0x00000000000000000000000000000000000000aa"
        custody = "0x00000000000000000000000000000000000000cc"
        automation = "${LOADER_TEST_AUTOMATION}"
        funding_token = "dai"

        [engine]
        profile = "testing"

        [[assets]]
        symbol = "WETH"
        token = "0x1111111111111111111111111111111111111111"
        price_feed = "0x2222222222222222222222222222222222222222"

        [[assets]]
        symbol = "DAI"
        token = "0x3333333333333333333333333333333333333333"
        price_feed = "0x4444444444444444444444444444444444444444"

        [simulation]
        router = "0x00000000000000000000000000000000000000dd"

        [simulation.prices]
        WETH = 200000000000

        [[simulation.accounts]]
        address = "0x00000000000000000000000000000000000000a1"
        deposit = { WETH = 2 }
        borrow = { DAI = 100 }

        [[simulation.price_moves]]
        tick = 3
        symbol = "WETH"
        price = 100000000000

        [[simulation.price_moves]]
        tick = 1
        symbol = "WETH"
        price = 150000000000
    "#;

    #[test]
    fn test_expand_env() {
        // Use unique var name to avoid conflicts with parallel tests
        std::env::set_var("LOADER_EXPAND_TEST_VAR", "test_value");
        assert_eq!(expand_env("${LOADER_EXPAND_TEST_VAR}").unwrap(), "test_value");
        assert_eq!(
            expand_env("prefix_${LOADER_EXPAND_TEST_VAR}_suffix").unwrap(),
            "prefix_test_value_suffix"
        );
        assert_eq!(expand_env("no_vars").unwrap(), "no_vars");
        assert_eq!(expand_env("${LOADER_UNSET_VAR}").unwrap(), "${LOADER_UNSET_VAR}");
        std::env::remove_var("LOADER_EXPAND_TEST_VAR");
    }

    #[test]
    fn test_resolve_deployment() {
        std::env::set_var(
            "LOADER_TEST_AUTOMATION",
            "0x00000000000000000000000000000000000000ee",
        );
        let config: DeploymentConfig = toml::from_str(DEPLOYMENT).unwrap();
        let resolved = resolve(config, Path::new(".")).unwrap();
        std::env::remove_var("LOADER_TEST_AUTOMATION");

        let dai = Address::repeat_byte(0x33);
        let weth = Address::repeat_byte(0x11);
        assert_eq!(resolved.name, "unit");
        assert_eq!(resolved.automation, Some(Address::with_last_byte(0xee)));
        assert_eq!(resolved.protocol.funding_token, Some(dai));
        assert_eq!(resolved.protocol.engine.profile, "testing");

        let sim = resolved.simulation.unwrap();
        assert_eq!(sim.prices[0].feed, Address::repeat_byte(0x22));
        assert_eq!(sim.accounts[0].deposit, vec![(weth, wad(2))]);
        assert_eq!(sim.accounts[0].borrow, vec![(dai, wad(100))]);
        assert_eq!(
            sim.price_moves.iter().map(|m| m.tick).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_unknown_symbol_fails() {
        let broken = DEPLOYMENT
            .replace("automation = \"${LOADER_TEST_AUTOMATION}\"", "")
            .replace("funding_token = \"dai\"", "funding_token = \"USDC\"");
        let config: DeploymentConfig = toml::from_str(&broken).unwrap();
        let err = resolve(config, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("USDC"));
    }
}

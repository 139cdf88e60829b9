//! Engine configuration with profile support.
//!
//! Provides the risk constants and operational limits of the engine with
//! support for different profiles (testing, production).

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure containing all engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Solvency constants
    #[serde(default)]
    pub risk: RiskParameters,

    /// Price feed acceptance
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Liquidation settlement parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    /// Scanner and keeper limits
    #[serde(default)]
    pub automation: AutomationConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Protocol-wide solvency constants, immutable after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Share of collateral value counted towards solvency (of `liquidation_precision`)
    #[serde(default = "default_liquidation_threshold")]
    pub liquidation_threshold: u64,

    /// Denominator of threshold and bonus
    #[serde(default = "default_liquidation_precision")]
    pub liquidation_precision: u64,

    /// Liquidation bonus (of `liquidation_precision`)
    #[serde(default = "default_liquidation_bonus")]
    pub liquidation_bonus: u64,

    /// Minimum health factor, WAD scaled (1e18 = 1.0)
    #[serde(default = "default_min_health_factor")]
    pub min_health_factor_wad: u64,
}

fn default_liquidation_threshold() -> u64 {
    50
}
fn default_liquidation_precision() -> u64 {
    100
}
fn default_liquidation_bonus() -> u64 {
    10
}
fn default_min_health_factor() -> u64 {
    1_000_000_000_000_000_000
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            liquidation_threshold: default_liquidation_threshold(),
            liquidation_precision: default_liquidation_precision(),
            liquidation_bonus: default_liquidation_bonus(),
            min_health_factor_wad: default_min_health_factor(),
        }
    }
}

impl RiskParameters {
    pub fn liquidation_threshold(&self) -> U256 {
        U256::from(self.liquidation_threshold)
    }
    pub fn liquidation_precision(&self) -> U256 {
        U256::from(self.liquidation_precision)
    }
    pub fn liquidation_bonus(&self) -> U256 {
        U256::from(self.liquidation_bonus)
    }
    pub fn min_health_factor(&self) -> U256 {
        U256::from(self.min_health_factor_wad)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.liquidation_precision > 0,
            "liquidation_precision must be positive"
        );
        anyhow::ensure!(
            self.liquidation_threshold > 0 && self.liquidation_threshold <= self.liquidation_precision,
            "liquidation_threshold must be in (0, {}]",
            self.liquidation_precision
        );
        anyhow::ensure!(
            self.liquidation_bonus <= self.liquidation_precision,
            "liquidation_bonus must not exceed {}",
            self.liquidation_precision
        );
        anyhow::ensure!(self.min_health_factor_wad > 0, "min_health_factor_wad must be positive");
        Ok(())
    }
}

/// Price feed acceptance rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Maximum answer age in seconds (None disables the check)
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: Option<u64>,
}

fn default_max_price_age() -> Option<u64> {
    Some(3 * 60 * 60)
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_price_age_secs: default_max_price_age(),
        }
    }
}

/// Liquidation settlement parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Swap tolerance below oracle fair value (basis points)
    #[serde(default = "default_swap_slippage")]
    pub swap_slippage_bps: u16,
}

fn default_swap_slippage() -> u16 {
    200
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            swap_slippage_bps: default_swap_slippage(),
        }
    }
}

/// Scanner and keeper limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Largest registry the insufficient-bonus scan accepts
    #[serde(default = "default_max_scan_tokens")]
    pub max_scan_tokens: usize,

    /// Positions encoded per upkeep
    #[serde(default = "default_max_upkeep_batch")]
    pub max_upkeep_batch: usize,

    /// Keeper check interval (seconds)
    #[serde(default = "default_keeper_interval")]
    pub keeper_interval_secs: u64,

    /// Keeper iterations before the binary exits (0 = run forever)
    #[serde(default)]
    pub keeper_ticks: u64,
}

fn default_max_scan_tokens() -> usize {
    50
}
fn default_max_upkeep_batch() -> usize {
    10
}
fn default_keeper_interval() -> u64 {
    12
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_scan_tokens: default_max_scan_tokens(),
            max_upkeep_batch: default_max_upkeep_batch(),
            keeper_interval_secs: default_keeper_interval(),
            keeper_ticks: 0,
        }
    }
}

impl AutomationConfig {
    pub fn keeper_interval(&self) -> Duration {
        Duration::from_secs(self.keeper_interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            risk: RiskParameters::default(),
            oracle: OracleConfig::default(),
            liquidation: LiquidationConfig::default(),
            automation: AutomationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.risk.validate()?;
        Ok(config)
    }

    /// Testing profile: no staleness check, fast keeper, bounded run.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            oracle: OracleConfig {
                max_price_age_secs: None,
            },
            automation: AutomationConfig {
                max_upkeep_batch: 50,
                keeper_interval_secs: 1,
                keeper_ticks: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Production profile: one-hour staleness, tighter swap tolerance.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            oracle: OracleConfig {
                max_price_age_secs: Some(60 * 60),
            },
            liquidation: LiquidationConfig {
                swap_slippage_bps: 100,
            },
            automation: AutomationConfig {
                max_upkeep_batch: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Get profile from environment variable LOANFI_PROFILE, or default.
    /// Supported values: testing, production
    pub fn from_env() -> Self {
        let profile = std::env::var("LOANFI_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            threshold = self.risk.liquidation_threshold,
            precision = self.risk.liquidation_precision,
            bonus = self.risk.liquidation_bonus,
            min_hf_wad = self.risk.min_health_factor_wad,
            "Risk parameters"
        );
        tracing::info!(
            max_price_age_secs = ?self.oracle.max_price_age_secs,
            swap_slippage_bps = self.liquidation.swap_slippage_bps,
            "Oracle and settlement parameters"
        );
        tracing::info!(
            max_scan_tokens = self.automation.max_scan_tokens,
            max_upkeep_batch = self.automation.max_upkeep_batch,
            keeper_interval_secs = self.automation.keeper_interval_secs,
            "Automation limits"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.risk.liquidation_threshold, 50);
        assert_eq!(config.risk.liquidation_bonus, 10);
        assert_eq!(config.risk.min_health_factor(), U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(config.liquidation.swap_slippage_bps, 200);
        assert_eq!(config.automation.max_scan_tokens, 50);
        assert!(config.risk.validate().is_ok());
    }

    #[test]
    fn test_profiles() {
        assert_eq!(EngineConfig::testing().oracle.max_price_age_secs, None);
        assert_eq!(EngineConfig::production().profile, "production");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            profile = "custom"
            [risk]
            liquidation_bonus = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.risk.liquidation_bonus, 5);
        assert_eq!(config.risk.liquidation_threshold, 50);
        assert_eq!(config.automation.max_upkeep_batch, 10);
    }

    #[test]
    fn test_rejects_threshold_above_precision() {
        let risk = RiskParameters {
            liquidation_threshold: 150,
            ..Default::default()
        };
        assert!(risk.validate().is_err());
    }

    #[test]
    fn test_serialization() {
        let config = EngineConfig::production();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"production\""));

        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}

//! Configuration system for the lending engine.
//!
//! This module provides:
//! - Engine configuration (profiles, risk constants, automation limits)
//! - Asset configuration (tokens and price feeds, in registry order)
//! - Protocol configuration (identities, registry, funding token)
//! - Deployment configuration and loader (ties everything together)

mod asset_config;
mod deployment;
mod engine;
mod loader;
mod protocol;

pub use engine::{AutomationConfig, EngineConfig, LiquidationConfig, OracleConfig, RiskParameters};

pub use asset_config::{AssetConfig, AssetsConfig};

pub use protocol::ProtocolConfig;

pub use deployment::{
    DeploymentConfig, DeploymentDetails, PriceMove, SimulatedAccount, SimulationConfig,
};

pub use loader::{
    expand_env, load_deployment, load_deployment_from_env, resolve, FeedAnswer, ResolvedAccount,
    ResolvedDeployment, ResolvedSimulation, ScheduledAnswer, DEFAULT_DEPLOYMENT_PATH,
};

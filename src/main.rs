//! loanfi keeper
//!
//! Runs the lending engine over in-memory collaborators seeded from a
//! deployment file and drives the automation trigger.
//! Features:
//! - Scripted price moves applied per keeper tick
//! - `check_upkeep` / `perform_upkeep` on every tick
//! - Protocol events printed as JSON lines

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use loanfi_api::OracleSwapRouter;
use loanfi_chain::{InMemoryTokenLedger, StaticPriceFeeds, TokenLedger};
use loanfi_core::{
    load_deployment_from_env, u256_math::wad_to_f64, Protocol, ResolvedDeployment,
    ResolvedSimulation,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Print startup banner
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,loanfi_core=debug")),
        )
        .init();

    // LOANFI_DEPLOYMENT selects the deployment file, LOANFI_PROFILE the engine profile
    let deployment = load_deployment_from_env()?;
    deployment.protocol.engine.log_config();

    let simulation = deployment
        .simulation
        .clone()
        .with_context(|| format!("Deployment '{}' has no [simulation] section", deployment.name))?;

    info!(deployment = %deployment.name, "Starting loanfi keeper");

    let components = initialize_components(&deployment, &simulation)?;
    seed_accounts(&components, &simulation)?;

    let keeper = deployment.automation.unwrap_or(deployment.protocol.owner);
    run_keeper(&components, &simulation, keeper).await?;

    Ok(())
}

/// Protocol and the collaborators the simulation drives directly.
struct Components {
    protocol: Protocol,
    feeds: Arc<StaticPriceFeeds>,
    tokens: Arc<InMemoryTokenLedger>,
}

fn initialize_components(
    deployment: &ResolvedDeployment,
    simulation: &ResolvedSimulation,
) -> Result<Components> {
    info!("Initializing components...");

    // Price feeds
    let feeds = Arc::new(StaticPriceFeeds::new());
    for price in &simulation.prices {
        feeds.set_price(price.feed, price.answer);
    }
    info!(feeds = feeds.len(), "Price feeds initialized");

    // Token ledger with router reserves
    let tokens = Arc::new(InMemoryTokenLedger::new());
    let registry = &deployment.protocol.registry;
    for token in registry.tokens() {
        tokens.mint(token, simulation.router, simulation.router_reserve);
    }

    // Swap router
    let router = Arc::new(
        OracleSwapRouter::new(
            simulation.router,
            tokens.clone(),
            feeds.clone(),
            registry.feeds_by_token(),
        )
        .with_fee_bps(simulation.router_fee_bps),
    );
    info!(
        router = %simulation.router,
        fee_bps = simulation.router_fee_bps,
        "Swap router initialized"
    );

    let protocol = Protocol::new(deployment.protocol.clone(), feeds.clone(), tokens.clone(), router)?;
    if let Some(automation) = deployment.automation {
        protocol.set_automation(deployment.protocol.owner, automation)?;
    }

    info!("All components initialized");

    Ok(Components {
        protocol,
        feeds,
        tokens,
    })
}

/// Mint, deposit and borrow for every seeded account, in file order.
fn seed_accounts(components: &Components, simulation: &ResolvedSimulation) -> Result<()> {
    let Components {
        protocol, tokens, ..
    } = components;

    for account in &simulation.accounts {
        let user = account.address;
        for (token, amount) in &account.mint {
            tokens.mint(*token, user, *amount);
        }
        for (token, amount) in &account.deposit {
            tokens.approve(*token, user, protocol.custody(), U256::MAX);
            protocol
                .deposit(user, *token, *amount)
                .with_context(|| format!("Seed deposit failed for {}", user))?;
        }
        for (token, amount) in &account.borrow {
            protocol
                .borrow(user, *token, *amount)
                .with_context(|| format!("Seed borrow failed for {}", user))?;
        }

        info!(
            user = %user,
            health_factor = wad_to_f64(protocol.health_factor(user)?),
            "Account seeded"
        );
    }

    Ok(())
}

async fn run_keeper(components: &Components, simulation: &ResolvedSimulation, keeper: Address) -> Result<()> {
    let protocol = &components.protocol;
    let automation = &protocol.config().engine.automation;
    let mut interval = tokio::time::interval(automation.keeper_interval());
    let mut events_printed = 0;
    let mut tick: u64 = 0;

    info!(
        keeper = %keeper,
        interval_secs = automation.keeper_interval_secs,
        ticks = automation.keeper_ticks,
        "Starting keeper loop..."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
        tick += 1;

        for scheduled in simulation.price_moves.iter().filter(|m| m.tick == tick) {
            components
                .feeds
                .set_price(scheduled.answer.feed, scheduled.answer.answer);
            info!(
                tick,
                symbol = %scheduled.answer.symbol,
                answer = scheduled.answer.answer,
                "Price moved"
            );
        }

        for user in protocol.users() {
            match protocol.health_factor(user) {
                Ok(hf) => debug!(tick, user = %user, health_factor = wad_to_f64(hf), "Position"),
                Err(e) => warn!(tick, user = %user, error = %e, "Failed to value position"),
            }
        }

        let (needed, data) = protocol.check_upkeep();
        if needed {
            debug!(tick, payload = %hex::encode(&data), "Upkeep payload");
            match protocol.perform_upkeep(keeper, &data) {
                Ok(report) => info!(tick, report = %serde_json::to_string(&report)?, "Upkeep report"),
                Err(e) => warn!(tick, error = %e, "Upkeep rejected"),
            }
        } else {
            debug!(tick, "No upkeep needed");
        }

        let events = protocol.events();
        for event in &events[events_printed..] {
            println!("{}", serde_json::to_string(event)?);
        }
        events_printed = events.len();

        if automation.keeper_ticks > 0 && tick >= automation.keeper_ticks {
            break;
        }
    }

    info!(
        ticks = tick,
        events = events_printed,
        custody = %protocol.custody(),
        "Keeper stopped"
    );
    Ok(())
}

/// Print startup banner.
fn print_banner() {
    println!(r#"
    ┬  ┌─┐┌─┐┌┐┌┌─┐┬
    │  │ │├─┤│││├┤ │
    ┴─┘└─┘┴ ┴┘└┘└  ┴
    Lending Keeper v0.1.0
    "#);
}

//! Shared fixture: a protocol over in-memory collaborators.
//!
//! Registry order is WETH, WBTC, LINK, DAI at $2000, $30000, $10 and $1.

use alloy::primitives::{Address, U256};
use loanfi_api::OracleSwapRouter;
use loanfi_chain::{InMemoryTokenLedger, StaticPriceFeeds, TokenLedger};
use std::sync::Arc;

use crate::assets::{RegisteredToken, TokenRegistry};
use crate::config::{EngineConfig, ProtocolConfig};
use crate::protocol::Protocol;

pub use crate::u256_math::wad;

pub const OWNER: Address = Address::repeat_byte(0xAA);
pub const CUSTODY: Address = Address::repeat_byte(0xCC);
pub const AUTOMATION: Address = Address::repeat_byte(0xAE);
pub const ROUTER: Address = Address::repeat_byte(0x5A);
pub const ALICE: Address = Address::repeat_byte(0xA1);
pub const BOB: Address = Address::repeat_byte(0xB0);
pub const LIQUIDATOR: Address = Address::repeat_byte(0x1D);
/// Liquidity provider
pub const LP: Address = Address::repeat_byte(0x1F);

pub const WETH: Address = Address::repeat_byte(0x01);
pub const WBTC: Address = Address::repeat_byte(0x02);
pub const LINK: Address = Address::repeat_byte(0x03);
pub const DAI: Address = Address::repeat_byte(0x04);

pub const WETH_FEED: Address = Address::repeat_byte(0xF1);
pub const WBTC_FEED: Address = Address::repeat_byte(0xF2);
pub const LINK_FEED: Address = Address::repeat_byte(0xF3);
pub const DAI_FEED: Address = Address::repeat_byte(0xF4);

/// 8-decimal feed answer for a whole-dollar price.
pub fn feed_answer(usd: u64) -> i128 {
    usd as i128 * 100_000_000
}

pub fn registry() -> TokenRegistry {
    TokenRegistry::from_entries(vec![
        RegisteredToken::new("WETH", WETH, WETH_FEED),
        RegisteredToken::new("WBTC", WBTC, WBTC_FEED),
        RegisteredToken::new("LINK", LINK, LINK_FEED),
        RegisteredToken::new("DAI", DAI, DAI_FEED),
    ])
    .unwrap()
}

/// Protocol configuration with DAI as funding token.
pub fn protocol_config() -> ProtocolConfig {
    ProtocolConfig::new(OWNER, CUSTODY, registry())
        .with_engine(EngineConfig::testing())
        .with_funding_token(DAI)
}

pub fn price_feeds() -> Arc<StaticPriceFeeds> {
    let feeds = Arc::new(StaticPriceFeeds::new());
    for (feed, usd) in [
        (WETH_FEED, 2000),
        (WBTC_FEED, 30_000),
        (LINK_FEED, 10),
        (DAI_FEED, 1),
    ] {
        feeds.set_price(feed, feed_answer(usd));
    }
    feeds
}

/// Router at [`ROUTER`] holding a million units of every registered token.
pub fn router(
    tokens: Arc<InMemoryTokenLedger>,
    feeds: Arc<StaticPriceFeeds>,
    fee_bps: u16,
) -> Arc<OracleSwapRouter> {
    for token in [WETH, WBTC, LINK, DAI] {
        tokens.mint(token, ROUTER, wad(1_000_000));
    }
    Arc::new(OracleSwapRouter::new(ROUTER, tokens, feeds, registry().feeds_by_token()).with_fee_bps(fee_bps))
}

pub struct Fixture {
    pub protocol: Protocol,
    pub feeds: Arc<StaticPriceFeeds>,
    pub tokens: Arc<InMemoryTokenLedger>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(protocol_config(), 30)
    }

    pub fn with_router_fee(fee_bps: u16) -> Self {
        Self::build(protocol_config(), fee_bps)
    }

    pub fn with_engine(engine: EngineConfig) -> Self {
        Self::build(protocol_config().with_engine(engine), 30)
    }

    pub fn build(config: ProtocolConfig, router_fee_bps: u16) -> Self {
        let feeds = price_feeds();
        let tokens = Arc::new(InMemoryTokenLedger::new());
        let router = router(tokens.clone(), feeds.clone(), router_fee_bps);
        let protocol = Protocol::new(config, feeds.clone(), tokens.clone(), router).unwrap();
        Self {
            protocol,
            feeds,
            tokens,
        }
    }

    /// Let custody pull any amount of `token` from `owner`.
    pub fn approve_custody(&self, token: Address, owner: Address) {
        self.tokens.approve(token, owner, CUSTODY, U256::MAX);
    }

    /// Mint, approve and deposit.
    pub fn deposit(&self, user: Address, token: Address, amount: U256) {
        self.tokens.mint(token, user, amount);
        self.approve_custody(token, user);
        self.protocol.deposit(user, token, amount).unwrap();
    }

    /// Deposit from the liquidity provider so the token can be borrowed.
    pub fn seed_liquidity(&self, token: Address, amount: U256) {
        self.deposit(LP, token, amount);
    }

    pub fn set_price(&self, token: Address, usd: u64) {
        let feed = self.protocol.price_feed_of(token).unwrap();
        self.feeds.set_price(feed, feed_answer(usd));
    }
}

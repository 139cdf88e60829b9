//! The lending protocol: owns the account ledger and the collaborator handles.
//!
//! Operations are split across modules by concern (`lending`, `liquidation`,
//! `scanner`), each adding an `impl Protocol` block. Every public mutating
//! operation runs inside [`Protocol::atomically`], so a failure anywhere
//! restores the ledger, the event log and the token host state.
//!
//! The ledger lock is never held across a collaborator call: a token hook
//! calling back into the protocol observes the already-mutated ledger.

use alloy::primitives::{Address, U256};
use loanfi_api::SwapAdapter;
use loanfi_chain::{PriceOracle, TokenLedger};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ProtocolConfig, RiskParameters};
use crate::error::LendingError;
use crate::events::ProtocolEvent;
use crate::ledger::{Account, AccountLedger};
use crate::pricing::{unix_now, Pricing};

/// Mutable protocol state.
#[derive(Debug, Default)]
struct ProtocolState {
    ledger: AccountLedger,
    events: Vec<ProtocolEvent>,
    automation: Option<Address>,
}

/// Lending protocol instance.
#[derive(Debug)]
pub struct Protocol {
    config: ProtocolConfig,
    state: Mutex<ProtocolState>,
    oracle: Arc<dyn PriceOracle>,
    tokens: Arc<dyn TokenLedger>,
    router: Arc<dyn SwapAdapter>,
    /// Liquidation in progress
    liquidating: AtomicBool,
}

/// Clears the liquidation flag on drop.
pub(crate) struct LiquidationGuard<'a>(&'a AtomicBool);

impl Drop for LiquidationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Protocol {
    /// Create a protocol over the given collaborators.
    pub fn new(
        config: ProtocolConfig,
        oracle: Arc<dyn PriceOracle>,
        tokens: Arc<dyn TokenLedger>,
        router: Arc<dyn SwapAdapter>,
    ) -> Result<Self, LendingError> {
        config.validate()?;
        info!(
            owner = %config.owner,
            custody = %config.custody,
            tokens = config.registry.len(),
            router = router.adapter_id(),
            funding_token = ?config.funding_token,
            "Protocol initialized"
        );
        Ok(Self {
            config,
            state: Mutex::new(ProtocolState::default()),
            oracle,
            tokens,
            router,
            liquidating: AtomicBool::new(false),
        })
    }

    // ---------------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------------

    /// Register (or replace) the automation address. Owner only.
    pub fn set_automation(&self, caller: Address, automation: Address) -> Result<(), LendingError> {
        if caller != self.config.owner {
            return Err(LendingError::OnlyOwner(caller));
        }
        if automation.is_zero() {
            return Err(LendingError::ZeroAddressNotAllowed);
        }
        let previous = {
            let mut state = self.state.lock();
            state.automation.replace(automation)
        };
        info!(automation = %automation, previous = ?previous, "Automation updated");
        self.emit(ProtocolEvent::AutomationUpdated {
            previous,
            automation,
        });
        Ok(())
    }

    /// Fail unless `caller` is the owner or the automation.
    pub(crate) fn ensure_owner_or_automation(&self, caller: Address) -> Result<(), LendingError> {
        if caller == self.config.owner || Some(caller) == self.automation() {
            Ok(())
        } else {
            Err(LendingError::OnlyProtocolOwnerOrAutomation(caller))
        }
    }

    // ---------------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------------

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn owner(&self) -> Address {
        self.config.owner
    }

    pub fn custody(&self) -> Address {
        self.config.custody
    }

    pub fn automation(&self) -> Option<Address> {
        self.state.lock().automation
    }

    pub fn risk_parameters(&self) -> &RiskParameters {
        &self.config.engine.risk
    }

    /// Registered tokens in registry order.
    pub fn allowed_tokens(&self) -> Vec<Address> {
        self.config.registry.tokens().collect()
    }

    pub fn price_feed_of(&self, token: Address) -> Result<Address, LendingError> {
        self.config.registry.price_feed(token)
    }

    pub fn collateral_balance_of(&self, user: Address, token: Address) -> U256 {
        self.state.lock().ledger.collateral(user, token)
    }

    pub fn borrowed_amount_of(&self, user: Address, token: Address) -> U256 {
        self.state.lock().ledger.debt(user, token)
    }

    pub fn total_deposited(&self, token: Address) -> U256 {
        self.state.lock().ledger.total_deposited(token)
    }

    pub fn total_borrowed(&self, token: Address) -> U256 {
        self.state.lock().ledger.total_borrowed(token)
    }

    /// Deposited minus borrowed.
    pub fn available_to_borrow(&self, token: Address) -> U256 {
        let state = self.state.lock();
        state
            .ledger
            .total_deposited(token)
            .saturating_sub(state.ledger.total_borrowed(token))
    }

    /// Copy of a user's balances.
    pub fn account(&self, user: Address) -> Account {
        self.state.lock().ledger.account(user)
    }

    /// Users that ever held a position.
    pub fn users(&self) -> Vec<Address> {
        self.state.lock().ledger.users().to_vec()
    }

    /// Events emitted so far.
    pub fn events(&self) -> Vec<ProtocolEvent> {
        self.state.lock().events.clone()
    }

    /// USD value of `amount` of `token`.
    pub fn usd_value(&self, token: Address, amount: U256) -> Result<U256, LendingError> {
        self.pricing().usd_value(token, amount)
    }

    /// Amount of `token` worth `usd`.
    pub fn token_amount_from_usd(&self, token: Address, usd: U256) -> Result<U256, LendingError> {
        self.pricing().token_amount_from_usd(token, usd)
    }

    // ---------------------------------------------------------------------
    // Internals shared by the operation modules
    // ---------------------------------------------------------------------

    pub(crate) fn pricing(&self) -> Pricing<'_> {
        Pricing::new(
            &self.config.registry,
            self.oracle.as_ref(),
            self.config.engine.oracle.max_price_age_secs,
            unix_now(),
        )
    }

    pub(crate) fn tokens(&self) -> &dyn TokenLedger {
        self.tokens.as_ref()
    }

    pub(crate) fn router(&self) -> &dyn SwapAdapter {
        self.router.as_ref()
    }

    /// Run `f` against the ledger under the state lock.
    pub(crate) fn with_ledger<T>(&self, f: impl FnOnce(&mut AccountLedger) -> T) -> T {
        f(&mut self.state.lock().ledger)
    }

    pub(crate) fn emit(&self, event: ProtocolEvent) {
        debug!(event = event.name(), "Event emitted");
        self.state.lock().events.push(event);
    }

    /// Mark a liquidation in progress, failing if one already is.
    pub(crate) fn enter_liquidation(&self) -> Result<LiquidationGuard<'_>, LendingError> {
        self.liquidating
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| LendingError::ReentrantCall)?;
        Ok(LiquidationGuard(&self.liquidating))
    }

    /// Run `f` all-or-nothing.
    ///
    /// On error the ledger, the event log and the token host state are restored
    /// to their values at entry. Calls nest.
    pub fn atomically<T>(
        &self,
        f: impl FnOnce() -> Result<T, LendingError>,
    ) -> Result<T, LendingError> {
        let (ledger, events_len) = {
            let state = self.state.lock();
            (state.ledger.clone(), state.events.len())
        };
        let snapshot = self.tokens.snapshot();

        match f() {
            Ok(value) => {
                self.tokens.release(snapshot);
                Ok(value)
            }
            Err(err) => {
                self.tokens.revert_to(snapshot);
                let mut state = self.state.lock();
                state.ledger = ledger;
                state.events.truncate(events_len);
                debug!(error = %err, "Operation rolled back");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_set_automation_owner_only() {
        let fx = Fixture::new();
        assert_eq!(
            fx.protocol.set_automation(ALICE, AUTOMATION),
            Err(LendingError::OnlyOwner(ALICE))
        );
        assert_eq!(fx.protocol.automation(), None);

        fx.protocol.set_automation(OWNER, AUTOMATION).unwrap();
        fx.protocol.set_automation(OWNER, BOB).unwrap();
        assert_eq!(fx.protocol.automation(), Some(BOB));
        assert!(matches!(
            fx.protocol.events().last(),
            Some(ProtocolEvent::AutomationUpdated { previous: Some(AUTOMATION), .. })
        ));
    }

    #[test]
    fn test_atomically_restores_everything() {
        let fx = Fixture::new();
        fx.tokens.mint(WETH, ALICE, wad(1));

        let result: Result<(), LendingError> = fx.protocol.atomically(|| {
            fx.protocol.with_ledger(|l| l.credit_collateral(ALICE, WETH, wad(1)))?;
            fx.protocol.emit(ProtocolEvent::CollateralDeposited {
                user: ALICE,
                token: WETH,
                amount: wad(1),
            });
            fx.tokens.transfer(WETH, ALICE, CUSTODY, wad(1))?;
            Err(LendingError::NeedsMoreThanZero)
        });

        assert_eq!(result, Err(LendingError::NeedsMoreThanZero));
        assert_eq!(fx.protocol.collateral_balance_of(ALICE, WETH), U256::ZERO);
        assert!(fx.protocol.events().is_empty());
        assert_eq!(fx.tokens.balance_of(WETH, ALICE), wad(1));
        assert_eq!(fx.tokens.open_snapshots(), 0);
    }

    #[test]
    fn test_liquidation_guard_rejects_nesting() {
        let fx = Fixture::new();
        let guard = fx.protocol.enter_liquidation().unwrap();
        assert!(matches!(
            fx.protocol.enter_liquidation(),
            Err(LendingError::ReentrantCall)
        ));
        drop(guard);
        assert!(fx.protocol.enter_liquidation().is_ok());
    }

    #[test]
    fn test_views() {
        let fx = Fixture::new();
        assert_eq!(fx.protocol.allowed_tokens(), vec![WETH, WBTC, LINK, DAI]);
        assert_eq!(fx.protocol.price_feed_of(LINK).unwrap(), LINK_FEED);
        assert_eq!(fx.protocol.owner(), OWNER);
        assert_eq!(fx.protocol.risk_parameters().liquidation_bonus, 10);
        assert_eq!(fx.protocol.usd_value(WETH, wad(1)).unwrap(), wad(2000));
    }
}

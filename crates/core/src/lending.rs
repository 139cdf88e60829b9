//! Deposit, borrow, repay and withdraw.
//!
//! Each operation validates, mutates the ledger, re-checks solvency where the
//! position can get worse, and only then moves tokens.

use alloy::primitives::{Address, U256};
use tracing::info;

use crate::error::LendingError;
use crate::events::ProtocolEvent;
use crate::protocol::Protocol;

impl Protocol {
    /// Deposit `amount` of `token` as collateral, pulled from `user`.
    pub fn deposit(&self, user: Address, token: Address, amount: U256) -> Result<(), LendingError> {
        self.atomically(|| self.deposit_collateral(user, token, amount))
    }

    /// Borrow `amount` of `token` against the user's collateral.
    pub fn borrow(&self, user: Address, token: Address, amount: U256) -> Result<(), LendingError> {
        self.atomically(|| self.borrow_token(user, token, amount))
    }

    /// Repay `amount` of `on_behalf_of`'s debt in `token`, paid by `payer`.
    pub fn repay(
        &self,
        payer: Address,
        token: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<(), LendingError> {
        self.atomically(|| self.repay_debt(payer, token, amount, on_behalf_of))
    }

    /// Withdraw `amount` of `token` collateral back to `user`.
    pub fn withdraw(&self, user: Address, token: Address, amount: U256) -> Result<(), LendingError> {
        self.atomically(|| self.withdraw_collateral(user, token, amount))
    }

    /// Deposit collateral and borrow against it in one step.
    pub fn deposit_and_borrow(
        &self,
        user: Address,
        collateral: Address,
        collateral_amount: U256,
        borrow_token: Address,
        borrow_amount: U256,
    ) -> Result<(), LendingError> {
        self.atomically(|| {
            self.deposit_collateral(user, collateral, collateral_amount)?;
            self.borrow_token(user, borrow_token, borrow_amount)
        })
    }

    /// Repay own debt and withdraw collateral in one step.
    pub fn repay_and_withdraw(
        &self,
        user: Address,
        debt_token: Address,
        repay_amount: U256,
        collateral: Address,
        withdraw_amount: U256,
    ) -> Result<(), LendingError> {
        self.atomically(|| {
            self.repay_debt(user, debt_token, repay_amount, user)?;
            self.withdraw_collateral(user, collateral, withdraw_amount)
        })
    }

    fn deposit_collateral(&self, user: Address, token: Address, amount: U256) -> Result<(), LendingError> {
        if amount.is_zero() {
            return Err(LendingError::NeedsMoreThanZero);
        }
        self.config().registry.ensure_allowed(token)?;
        if user.is_zero() {
            return Err(LendingError::ZeroAddressNotAllowed);
        }

        self.with_ledger(|ledger| ledger.credit_collateral(user, token, amount))?;
        self.emit(ProtocolEvent::CollateralDeposited { user, token, amount });
        info!(user = %user, token = %token, amount = %amount, "Collateral deposited");

        let custody = self.custody();
        self.tokens().transfer_from(token, custody, user, custody, amount)?;
        Ok(())
    }

    fn borrow_token(&self, user: Address, token: Address, amount: U256) -> Result<(), LendingError> {
        if amount.is_zero() {
            return Err(LendingError::NeedsMoreThanZero);
        }
        self.config().registry.ensure_allowed(token)?;
        if user.is_zero() {
            return Err(LendingError::ZeroAddressNotAllowed);
        }

        let available = self.available_to_borrow(token);
        if amount > available {
            return Err(LendingError::NotEnoughAvailableCollateral {
                requested: amount,
                available,
            });
        }

        self.with_ledger(|ledger| ledger.add_debt(user, token, amount))?;
        self.revert_if_health_factor_is_broken(user)?;
        self.emit(ProtocolEvent::Borrowed { user, token, amount });
        info!(user = %user, token = %token, amount = %amount, "Borrowed");

        self.tokens().transfer(token, self.custody(), user, amount)?;
        Ok(())
    }

    fn repay_debt(
        &self,
        payer: Address,
        token: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<(), LendingError> {
        if amount.is_zero() {
            return Err(LendingError::NeedsMoreThanZero);
        }
        self.config().registry.ensure_allowed(token)?;
        if on_behalf_of.is_zero() {
            return Err(LendingError::ZeroAddressNotAllowed);
        }

        let debt = self.borrowed_amount_of(on_behalf_of, token);
        if debt.is_zero() {
            return Err(LendingError::NotEnoughTokensToPayDebt);
        }
        if amount > debt {
            return Err(LendingError::OverpaidDebt { amount, debt });
        }

        self.with_ledger(|ledger| ledger.reduce_debt(on_behalf_of, token, amount))?;
        self.emit(ProtocolEvent::Repaid {
            payer,
            on_behalf_of,
            token,
            amount,
        });
        info!(
            payer = %payer,
            on_behalf_of = %on_behalf_of,
            token = %token,
            amount = %amount,
            "Debt repaid"
        );

        let custody = self.custody();
        self.tokens().transfer_from(token, custody, payer, custody, amount)?;
        Ok(())
    }

    fn withdraw_collateral(&self, user: Address, token: Address, amount: U256) -> Result<(), LendingError> {
        if user.is_zero() {
            return Err(LendingError::ZeroAddressNotAllowed);
        }
        self.config().registry.ensure_allowed(token)?;
        if amount.is_zero() {
            return Err(LendingError::NeedsMoreThanZero);
        }

        let balance = self.collateral_balance_of(user, token);
        if balance.is_zero() {
            return Err(LendingError::UserHasNoCollateralDeposited);
        }
        if amount > balance {
            return Err(LendingError::UserDoesNotHaveThatManyTokens {
                requested: amount,
                balance,
            });
        }

        self.with_ledger(|ledger| ledger.debit_collateral(user, token, amount))?;
        self.revert_if_health_factor_is_broken(user)?;
        self.emit(ProtocolEvent::CollateralWithdrawn { user, token, amount });
        info!(user = %user, token = %token, amount = %amount, "Collateral withdrawn");

        self.tokens().transfer(token, self.custody(), user, amount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{ErrorKind, LendingError};
    use crate::events::ProtocolEvent;
    use crate::test_utils::*;
    use alloy::primitives::{Address, U256};
    use loanfi_chain::{TokenLedger, TransferError};

    #[test]
    fn test_deposit_moves_tokens_to_custody() {
        let fx = Fixture::new();
        fx.deposit(ALICE, WETH, wad(5));

        assert_eq!(fx.protocol.collateral_balance_of(ALICE, WETH), wad(5));
        assert_eq!(fx.protocol.total_deposited(WETH), wad(5));
        assert_eq!(fx.tokens.balance_of(WETH, CUSTODY), wad(5));
        assert_eq!(fx.tokens.balance_of(WETH, ALICE), U256::ZERO);
        assert!(matches!(
            fx.protocol.events().last(),
            Some(ProtocolEvent::CollateralDeposited { .. })
        ));
    }

    #[test]
    fn test_deposit_validation() {
        let fx = Fixture::new();
        let unknown = Address::repeat_byte(0x77);
        assert_eq!(
            fx.protocol.deposit(ALICE, WETH, U256::ZERO),
            Err(LendingError::NeedsMoreThanZero)
        );
        assert_eq!(
            fx.protocol.deposit(ALICE, unknown, wad(1)),
            Err(LendingError::TokenNotAllowed(unknown))
        );
    }

    #[test]
    fn test_failed_transfer_rolls_back_deposit() {
        let fx = Fixture::new();
        fx.tokens.mint(WETH, ALICE, wad(1));
        fx.approve_custody(WETH, ALICE);
        fx.tokens.freeze(WETH);

        assert_eq!(
            fx.protocol.deposit(ALICE, WETH, wad(1)),
            Err(LendingError::TransferFailed(TransferError::Rejected(WETH)))
        );
        assert_eq!(fx.protocol.collateral_balance_of(ALICE, WETH), U256::ZERO);
        assert_eq!(fx.protocol.total_deposited(WETH), U256::ZERO);
        assert!(fx.protocol.events().is_empty());
    }

    #[test]
    fn test_borrow_breaking_health_factor_reverts() {
        let fx = Fixture::new();
        fx.deposit(ALICE, WETH, wad(5));
        fx.seed_liquidity(LINK, wad(2000));

        // $10,000 of LINK against $10,000 of WETH at 50% threshold
        assert_eq!(
            fx.protocol.borrow(ALICE, LINK, wad(1000)),
            Err(LendingError::BreaksHealthFactor(U256::from(500_000_000_000_000_000u64)))
        );
        assert_eq!(fx.protocol.borrowed_amount_of(ALICE, LINK), U256::ZERO);
        assert_eq!(fx.protocol.total_borrowed(LINK), U256::ZERO);
        assert_eq!(fx.tokens.balance_of(LINK, ALICE), U256::ZERO);
    }

    #[test]
    fn test_borrow_against_unvaluable_collateral_reverts() {
        let fx = Fixture::new();
        // too much WETH to value in 256 bits at $2000
        let huge = U256::MAX / U256::from(2000u64) * U256::from(2u64);
        fx.deposit(ALICE, WETH, huge);
        fx.seed_liquidity(LINK, wad(1000));
        let events_before = fx.protocol.events().len();

        let err = fx.protocol.borrow(ALICE, LINK, wad(100)).unwrap_err();
        assert_eq!(err, LendingError::ArithmeticOverflow("usd valuation"));
        assert_eq!(err.kind(), ErrorKind::External);
        assert_eq!(fx.protocol.borrowed_amount_of(ALICE, LINK), U256::ZERO);
        assert_eq!(fx.protocol.total_borrowed(LINK), U256::ZERO);
        assert_eq!(fx.tokens.balance_of(LINK, ALICE), U256::ZERO);
        assert_eq!(fx.protocol.events().len(), events_before);
        assert_eq!(fx.protocol.collateral_balance_of(ALICE, WETH), huge);
    }

    #[test]
    fn test_borrow_limited_by_liquidity() {
        let fx = Fixture::new();
        fx.deposit(ALICE, WETH, wad(5));
        fx.seed_liquidity(LINK, wad(10));

        assert_eq!(
            fx.protocol.borrow(ALICE, LINK, wad(11)),
            Err(LendingError::NotEnoughAvailableCollateral {
                requested: wad(11),
                available: wad(10),
            })
        );
        fx.protocol.borrow(ALICE, LINK, wad(10)).unwrap();
        assert_eq!(fx.protocol.available_to_borrow(LINK), U256::ZERO);
        assert_eq!(fx.tokens.balance_of(LINK, ALICE), wad(10));
    }

    #[test]
    fn test_repay_to_zero_then_nothing_to_pay() {
        let fx = Fixture::new();
        fx.deposit(ALICE, WETH, wad(5));
        fx.seed_liquidity(LINK, wad(100));
        fx.protocol.borrow(ALICE, LINK, wad(10)).unwrap();
        fx.approve_custody(LINK, ALICE);

        assert_eq!(
            fx.protocol.repay(ALICE, LINK, wad(11), ALICE),
            Err(LendingError::OverpaidDebt {
                amount: wad(11),
                debt: wad(10),
            })
        );

        fx.protocol.repay(ALICE, LINK, wad(10), ALICE).unwrap();
        assert_eq!(fx.protocol.borrowed_amount_of(ALICE, LINK), U256::ZERO);
        assert_eq!(fx.protocol.health_factor(ALICE).unwrap(), U256::MAX);
        assert_eq!(
            fx.protocol.repay(ALICE, LINK, wad(1), ALICE),
            Err(LendingError::NotEnoughTokensToPayDebt)
        );
    }

    #[test]
    fn test_third_party_repay() {
        let fx = Fixture::new();
        fx.deposit(ALICE, WETH, wad(5));
        fx.seed_liquidity(LINK, wad(100));
        fx.protocol.borrow(ALICE, LINK, wad(10)).unwrap();

        fx.tokens.mint(LINK, BOB, wad(4));
        fx.approve_custody(LINK, BOB);
        fx.protocol.repay(BOB, LINK, wad(4), ALICE).unwrap();

        assert_eq!(fx.protocol.borrowed_amount_of(ALICE, LINK), wad(6));
        assert_eq!(fx.tokens.balance_of(LINK, BOB), U256::ZERO);
        assert_eq!(
            fx.protocol.repay(BOB, LINK, wad(1), Address::ZERO),
            Err(LendingError::ZeroAddressNotAllowed)
        );
    }

    #[test]
    fn test_deposit_withdraw_round_trip() {
        let fx = Fixture::new();
        fx.deposit(ALICE, WETH, wad(3));
        fx.tokens.mint(WETH, ALICE, wad(2));
        fx.protocol.deposit(ALICE, WETH, wad(2)).unwrap();
        fx.protocol.withdraw(ALICE, WETH, wad(2)).unwrap();

        assert_eq!(fx.protocol.collateral_balance_of(ALICE, WETH), wad(3));
        assert_eq!(fx.tokens.balance_of(WETH, ALICE), wad(2));
        assert_eq!(fx.tokens.balance_of(WETH, CUSTODY), wad(3));
    }

    #[test]
    fn test_withdraw_validation() {
        let fx = Fixture::new();
        assert_eq!(
            fx.protocol.withdraw(ALICE, WETH, wad(1)),
            Err(LendingError::UserHasNoCollateralDeposited)
        );

        fx.deposit(ALICE, WETH, wad(1));
        assert_eq!(
            fx.protocol.withdraw(ALICE, WETH, wad(2)),
            Err(LendingError::UserDoesNotHaveThatManyTokens {
                requested: wad(2),
                balance: wad(1),
            })
        );
        assert_eq!(
            fx.protocol.withdraw(Address::ZERO, WETH, wad(1)),
            Err(LendingError::ZeroAddressNotAllowed)
        );
    }

    #[test]
    fn test_withdraw_breaking_health_factor_reverts() {
        let fx = Fixture::new();
        fx.deposit(ALICE, WETH, wad(1));
        fx.seed_liquidity(DAI, wad(1000));
        fx.protocol.borrow(ALICE, DAI, wad(500)).unwrap();

        assert!(matches!(
            fx.protocol.withdraw(ALICE, WETH, wad(6) / U256::from(10u64)),
            Err(LendingError::BreaksHealthFactor(_))
        ));
        assert_eq!(fx.protocol.collateral_balance_of(ALICE, WETH), wad(1));
        assert_eq!(fx.tokens.balance_of(WETH, ALICE), U256::ZERO);
    }

    #[test]
    fn test_solvency_after_every_success() {
        let fx = Fixture::new();
        fx.seed_liquidity(LINK, wad(1000));
        fx.tokens.mint(WETH, ALICE, wad(2));
        fx.approve_custody(WETH, ALICE);
        fx.approve_custody(LINK, ALICE);

        fx.protocol
            .deposit_and_borrow(ALICE, WETH, wad(2), LINK, wad(150))
            .unwrap();
        let min = fx.protocol.risk_parameters().min_health_factor();
        assert!(fx.protocol.health_factor(ALICE).unwrap() >= min);

        fx.protocol
            .repay_and_withdraw(ALICE, LINK, wad(50), WETH, wad(1))
            .unwrap();
        assert!(fx.protocol.health_factor(ALICE).unwrap() >= min);
        assert_eq!(fx.protocol.borrowed_amount_of(ALICE, LINK), wad(100));
        assert_eq!(fx.protocol.collateral_balance_of(ALICE, WETH), wad(1));
    }

    #[test]
    fn test_deposit_and_borrow_is_atomic() {
        let fx = Fixture::new();
        fx.seed_liquidity(LINK, wad(1000));
        fx.tokens.mint(WETH, ALICE, wad(1));
        fx.approve_custody(WETH, ALICE);

        // $2000 collateral supports at most $1000 of debt
        assert!(matches!(
            fx.protocol.deposit_and_borrow(ALICE, WETH, wad(1), LINK, wad(101)),
            Err(LendingError::BreaksHealthFactor(_))
        ));
        assert_eq!(fx.protocol.collateral_balance_of(ALICE, WETH), U256::ZERO);
        assert_eq!(fx.tokens.balance_of(WETH, ALICE), wad(1));
    }
}

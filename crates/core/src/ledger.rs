//! Per-user collateral and debt bookkeeping.
//!
//! The ledger only records amounts; solvency and token movements are the
//! caller's concern. Protocol-wide totals always equal the sum over users.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::LendingError;

/// Balances of one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Deposited collateral by token
    pub collateral: HashMap<Address, U256>,
    /// Outstanding debt by token
    pub debt: HashMap<Address, U256>,
}

impl Account {
    pub fn collateral_of(&self, token: Address) -> U256 {
        self.collateral.get(&token).copied().unwrap_or(U256::ZERO)
    }

    pub fn debt_of(&self, token: Address) -> U256 {
        self.debt.get(&token).copied().unwrap_or(U256::ZERO)
    }

    pub fn has_debt(&self) -> bool {
        self.debt.values().any(|d| !d.is_zero())
    }
}

/// Ledger of all users.
#[derive(Debug, Clone, Default)]
pub struct AccountLedger {
    accounts: HashMap<Address, Account>,
    /// Users in first-seen order
    users: Vec<Address>,
    total_deposited: HashMap<Address, U256>,
    total_borrowed: HashMap<Address, U256>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account of `user` (empty if never seen).
    pub fn account(&self, user: Address) -> Account {
        self.accounts.get(&user).cloned().unwrap_or_default()
    }

    pub fn collateral(&self, user: Address, token: Address) -> U256 {
        self.accounts
            .get(&user)
            .map(|a| a.collateral_of(token))
            .unwrap_or(U256::ZERO)
    }

    pub fn debt(&self, user: Address, token: Address) -> U256 {
        self.accounts
            .get(&user)
            .map(|a| a.debt_of(token))
            .unwrap_or(U256::ZERO)
    }

    pub fn total_deposited(&self, token: Address) -> U256 {
        self.total_deposited.get(&token).copied().unwrap_or(U256::ZERO)
    }

    pub fn total_borrowed(&self, token: Address) -> U256 {
        self.total_borrowed.get(&token).copied().unwrap_or(U256::ZERO)
    }

    /// Users that ever held a position, in first-seen order.
    pub fn users(&self) -> &[Address] {
        &self.users
    }

    fn account_mut(&mut self, user: Address) -> &mut Account {
        if !self.accounts.contains_key(&user) {
            self.users.push(user);
        }
        self.accounts.entry(user).or_default()
    }

    pub fn credit_collateral(
        &mut self,
        user: Address,
        token: Address,
        amount: U256,
    ) -> Result<(), LendingError> {
        let overflow = LendingError::ArithmeticOverflow("collateral balance");
        let balance = self.collateral(user, token).checked_add(amount).ok_or(overflow.clone())?;
        let total = self.total_deposited(token).checked_add(amount).ok_or(overflow)?;
        self.account_mut(user).collateral.insert(token, balance);
        self.total_deposited.insert(token, total);
        Ok(())
    }

    pub fn debit_collateral(
        &mut self,
        user: Address,
        token: Address,
        amount: U256,
    ) -> Result<(), LendingError> {
        let available = self.collateral(user, token);
        if amount > available {
            return Err(LendingError::NotEnoughAvailableCollateral {
                requested: amount,
                available,
            });
        }
        self.account_mut(user).collateral.insert(token, available - amount);
        let total = self.total_deposited(token);
        self.total_deposited.insert(token, total.saturating_sub(amount));
        Ok(())
    }

    pub fn add_debt(&mut self, user: Address, token: Address, amount: U256) -> Result<(), LendingError> {
        let overflow = LendingError::ArithmeticOverflow("debt balance");
        let debt = self.debt(user, token).checked_add(amount).ok_or(overflow.clone())?;
        let total = self.total_borrowed(token).checked_add(amount).ok_or(overflow)?;
        self.account_mut(user).debt.insert(token, debt);
        self.total_borrowed.insert(token, total);
        Ok(())
    }

    pub fn reduce_debt(
        &mut self,
        user: Address,
        token: Address,
        amount: U256,
    ) -> Result<(), LendingError> {
        let debt = self.debt(user, token);
        if amount > debt {
            return Err(LendingError::OverpaidDebt { amount, debt });
        }
        self.account_mut(user).debt.insert(token, debt - amount);
        let total = self.total_borrowed(token);
        self.total_borrowed.insert(token, total.saturating_sub(amount));
        Ok(())
    }
}

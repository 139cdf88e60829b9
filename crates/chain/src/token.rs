//! Token transfer seam.
//!
//! [`TokenLedger`] is the ERC-20 surface the core consumes: balances,
//! allowances, `transfer` and `transfer_from`. It also exposes the host's
//! journaling so a failed operation can discard every token movement it made,
//! the way a reverted transaction does on-chain.

use alloy::primitives::{Address, U256};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

/// Identifier of a journal snapshot.
pub type SnapshotId = u64;

/// Reasons a transfer did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Sender balance too low.
    #[error("insufficient balance of {token} for {owner}: have {balance}, need {needed}")]
    InsufficientBalance {
        token: Address,
        owner: Address,
        balance: U256,
        needed: U256,
    },

    /// Spender allowance too low.
    #[error("insufficient allowance of {token} from {owner} to {spender}: have {allowance}, need {needed}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        allowance: U256,
        needed: U256,
    },

    /// Token contract returned `false`.
    #[error("token {0} rejected the transfer")]
    Rejected(Address),
}

/// ERC-20 style token ledger with host journaling.
pub trait TokenLedger: Send + Sync + Debug {
    /// Balance of `owner` in `token`.
    fn balance_of(&self, token: Address, owner: Address) -> U256;

    /// Remaining allowance `owner` granted to `spender`.
    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256;

    /// Set the allowance `owner` grants to `spender`.
    fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256);

    /// Move `amount` from `from` (the caller) to `to`.
    fn transfer(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TransferError>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance.
    fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TransferError>;

    /// Open a journal snapshot.
    fn snapshot(&self) -> SnapshotId;

    /// Restore the state captured by `id`, discarding it and every later snapshot.
    fn revert_to(&self, id: SnapshotId);

    /// Keep current state and drop snapshot `id` (and every later snapshot).
    fn release(&self, id: SnapshotId);
}

/// Token state.
#[derive(Debug, Clone, Default)]
struct Balances {
    /// (token, owner) -> balance
    balances: HashMap<(Address, Address), U256>,
    /// (token, owner, spender) -> allowance
    allowances: HashMap<(Address, Address, Address), U256>,
    /// Tokens whose transfers return `false`
    frozen: HashSet<Address>,
}

impl Balances {
    fn balance(&self, token: Address, owner: Address) -> U256 {
        self.balances
            .get(&(token, owner))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn move_tokens(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TransferError> {
        if self.frozen.contains(&token) {
            return Err(TransferError::Rejected(token));
        }
        let balance = self.balance(token, from);
        if balance < amount {
            return Err(TransferError::InsufficientBalance {
                token,
                owner: from,
                balance,
                needed: amount,
            });
        }
        self.balances.insert((token, from), balance - amount);
        *self.balances.entry((token, to)).or_insert(U256::ZERO) += amount;
        Ok(())
    }
}

/// In-memory token ledger covering every token in the simulation.
#[derive(Debug, Default)]
pub struct InMemoryTokenLedger {
    state: RwLock<Balances>,
    journal: Mutex<Journal>,
}

#[derive(Debug, Default)]
struct Journal {
    next_id: SnapshotId,
    snapshots: Vec<(SnapshotId, Balances)>,
}

impl InMemoryTokenLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `token` to `to` out of thin air.
    pub fn mint(&self, token: Address, to: Address, amount: U256) {
        debug!(token = %token, to = %to, amount = %amount, "Minting tokens");
        *self.state.write().balances.entry((token, to)).or_insert(U256::ZERO) += amount;
    }

    /// Make every transfer of `token` fail until [`Self::unfreeze`].
    pub fn freeze(&self, token: Address) {
        self.state.write().frozen.insert(token);
    }

    /// Re-enable transfers of `token`.
    pub fn unfreeze(&self, token: Address) {
        self.state.write().frozen.remove(&token);
    }

    /// Number of open snapshots.
    pub fn open_snapshots(&self) -> usize {
        self.journal.lock().snapshots.len()
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn balance_of(&self, token: Address, owner: Address) -> U256 {
        self.state.read().balance(token, owner)
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.state
            .read()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.state
            .write()
            .allowances
            .insert((token, owner, spender), amount);
    }

    fn transfer(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TransferError> {
        self.state.write().move_tokens(token, from, to, amount)
    }

    fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TransferError> {
        let mut state = self.state.write();
        let key = (token, from, spender);
        let allowance = state.allowances.get(&key).copied().unwrap_or(U256::ZERO);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                token,
                owner: from,
                spender,
                allowance,
                needed: amount,
            });
        }
        state.move_tokens(token, from, to, amount)?;
        // Infinite approvals are not decremented, as with most ERC-20s
        if allowance != U256::MAX {
            state.allowances.insert(key, allowance - amount);
        }
        Ok(())
    }

    fn snapshot(&self) -> SnapshotId {
        let mut journal = self.journal.lock();
        let id = journal.next_id;
        journal.next_id += 1;
        let state = self.state.read().clone();
        journal.snapshots.push((id, state));
        id
    }

    fn revert_to(&self, id: SnapshotId) {
        let mut journal = self.journal.lock();
        if let Some(pos) = journal.snapshots.iter().position(|(sid, _)| *sid == id) {
            let (_, state) = journal.snapshots.swap_remove(pos);
            journal.snapshots.truncate(pos);
            *self.state.write() = state;
        }
    }

    fn release(&self, id: SnapshotId) {
        let mut journal = self.journal.lock();
        if let Some(pos) = journal.snapshots.iter().position(|(sid, _)| *sid == id) {
            journal.snapshots.truncate(pos);
        }
    }
}

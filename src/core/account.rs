//! Ledger account state: address → balance in minor units.
//!
//! The same map backs contract storage, so `SLOAD`/`SSTORE` keys and account
//! addresses share one namespace.

use crate::core::config::OverdraftPolicy;
use crate::types::amount::Amount;
use crate::virtual_machine::state::State;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("account {address} holds {balance} minor units, cannot send {amount}")]
    InsufficientFunds {
        address: String,
        balance: i64,
        amount: Amount,
    },
    #[error("balance of {address} would overflow")]
    Overflow { address: String },
}

/// Balances keyed by address. Missing addresses hold zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AccountState {
    balances: BTreeMap<String, i64>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a state with initial balances; repeated addresses accumulate.
    pub fn with_allocations<'a>(
        allocations: impl IntoIterator<Item = &'a (String, i64)>,
    ) -> Result<Self, AccountError> {
        let mut state = Self::new();
        for (address, minor) in allocations {
            state.credit(address, *minor)?;
        }
        Ok(state)
    }

    pub fn balance(&self, address: &str) -> i64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.balances.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Copy of the whole map, for inspection.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.balances.clone()
    }

    fn credit(&mut self, address: &str, minor: i64) -> Result<(), AccountError> {
        let next = self
            .balance(address)
            .checked_add(minor)
            .ok_or_else(|| AccountError::Overflow {
                address: address.to_string(),
            })?;
        self.balances.insert(address.to_string(), next);
        Ok(())
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// Either both sides change or neither does. Under
    /// [`OverdraftPolicy::Reject`] the sender must hold at least `amount`.
    pub fn transfer(
        &mut self,
        from: &str,
        to: &str,
        amount: Amount,
        policy: OverdraftPolicy,
    ) -> Result<(), AccountError> {
        let minor = amount.minor();
        let from_balance = self.balance(from);
        if policy == OverdraftPolicy::Reject && from_balance < minor {
            return Err(AccountError::InsufficientFunds {
                address: from.to_string(),
                balance: from_balance,
                amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let overflow = |address: &str| AccountError::Overflow {
            address: address.to_string(),
        };
        let next_from = from_balance
            .checked_sub(minor)
            .ok_or_else(|| overflow(from))?;
        let next_to = self
            .balance(to)
            .checked_add(minor)
            .ok_or_else(|| overflow(to))?;
        self.balances.insert(from.to_string(), next_from);
        self.balances.insert(to.to_string(), next_to);
        Ok(())
    }
}

impl State for AccountState {
    fn get(&self, key: &str) -> Option<i64> {
        self.balances.get(key).copied()
    }

    fn set(&mut self, key: &str, value: i64) {
        self.balances.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(entries: &[(&str, i64)]) -> AccountState {
        let alloc: Vec<(String, i64)> = entries.iter().map(|(a, b)| (a.to_string(), *b)).collect();
        AccountState::with_allocations(&alloc).unwrap()
    }

    #[test]
    fn missing_accounts_hold_zero() {
        let state = AccountState::new();
        assert_eq!(state.balance("nobody"), 0);
        assert!(state.is_empty());
    }

    #[test]
    fn allocations_accumulate() {
        let state = funded(&[("a", 5), ("a", 7), ("b", 1)]);
        assert_eq!(state.balance("a"), 12);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn transfer_moves_funds() {
        let mut state = funded(&[("alice", 1500)]);
        state
            .transfer("alice", "bob", Amount::from_minor(1000), OverdraftPolicy::Reject)
            .unwrap();
        assert_eq!(state.balance("alice"), 500);
        assert_eq!(state.balance("bob"), 1000);
    }

    #[test]
    fn reject_policy_blocks_overdraft_without_side_effects() {
        let mut state = funded(&[("alice", 10)]);
        let before = state.clone();
        let err = state
            .transfer("alice", "bob", Amount::from_minor(11), OverdraftPolicy::Reject)
            .unwrap_err();
        assert_eq!(
            err,
            AccountError::InsufficientFunds {
                address: "alice".into(),
                balance: 10,
                amount: Amount::from_minor(11)
            }
        );
        assert_eq!(state, before);
    }

    #[test]
    fn allow_policy_goes_negative() {
        let mut state = AccountState::new();
        state
            .transfer("alice", "bob", Amount::from_minor(1000), OverdraftPolicy::Allow)
            .unwrap();
        assert_eq!(state.balance("alice"), -1000);
        assert_eq!(state.balance("bob"), 1000);
    }

    #[test]
    fn self_transfer_is_a_no_op() {
        let mut state = funded(&[("alice", 10)]);
        state
            .transfer("alice", "alice", Amount::from_minor(10), OverdraftPolicy::Reject)
            .unwrap();
        assert_eq!(state.balance("alice"), 10);
    }

    #[test]
    fn overflow_is_reported() {
        let mut state = funded(&[("alice", 10), ("bob", i64::MAX)]);
        assert!(matches!(
            state.transfer("alice", "bob", Amount::from_minor(1), OverdraftPolicy::Reject),
            Err(AccountError::Overflow { .. })
        ));
        assert_eq!(state.balance("alice"), 10);
    }

    #[test]
    fn doubles_as_vm_storage() {
        let mut state = AccountState::new();
        state.set("counter", 3);
        assert_eq!(state.get("counter"), Some(3));
        assert_eq!(state.balance("counter"), 3);
    }
}

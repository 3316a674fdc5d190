//! Hierarchical named-account balance store.
//!
//! Accounts are `:`-delimited path strings (e.g. `Income:Cash:Loot`) mapped to
//! signed copper balances. There is no fixed schema: any component may post
//! into a new account path at any time, and readers pick out the well-known
//! paths they care about.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A schema-free account tree keyed by `:`-delimited path strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    accounts: BTreeMap<String, i64>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to the named account, creating it at zero if absent.
    ///
    /// Each post is an independent, unconditional mutation; there are no
    /// transactional semantics.
    pub fn post(&mut self, account: &str, delta: i64) {
        *self.accounts.entry(account.to_string()).or_insert(0) += delta;
    }

    /// Returns the balance of the named account, or 0 if it does not exist.
    #[must_use]
    pub fn balance(&self, account: &str) -> i64 {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    /// Sums the named account and every account beneath it in the path tree.
    ///
    /// `subtree_total("Income")` covers `Income`, `Income:Cash`,
    /// `Income:Cash:Loot`, and so on, but not `IncomeOther`.
    #[must_use]
    pub fn subtree_total(&self, prefix: &str) -> i64 {
        self.accounts
            .iter()
            .filter(|(path, _)| {
                path.as_str() == prefix
                    || (path.starts_with(prefix)
                        && path[prefix.len()..].starts_with(':'))
            })
            .map(|(_, balance)| balance)
            .sum()
    }

    /// Sums every balance from `other` into this ledger, account by account.
    pub fn merge(&mut self, other: &Self) {
        for (account, balance) in &other.accounts {
            *self.accounts.entry(account.clone()).or_insert(0) += balance;
        }
    }

    /// Iterates over `(account, balance)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.accounts.iter().map(|(path, balance)| (path.as_str(), *balance))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

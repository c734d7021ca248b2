//! In-memory account catalog with lazy, rate-aware role resolution.
//!
//! The catalog is fed twice: once from the on-disk cache (stale but
//! instant) and once from a fresh enumeration. Role sets are attached
//! lazily because `ListAccountRoles` is aggressively rate-limited
//! upstream; enumeration is strictly sequential, and suppressed entirely
//! for very large fleets.

use crate::models::{Account, AccountSummary, RoleLoadState};

/// Above this many accounts the automatic role sweep is suppressed; roles
/// load only when an account is opened.
pub const MAX_ACCOUNTS_FOR_ROLE_LOADING: usize = 100;

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    accounts: Vec<Account>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from cached accounts. The list is re-sorted; cached files
    /// written by older versions may predate the sorted-write guarantee.
    pub fn from_cached(mut accounts: Vec<Account>) -> Self {
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        Self { accounts }
    }

    /// Accounts in display order (sorted by name).
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn get(&self, account_id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.account_id == account_id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// Reconcile a fresh enumeration against the current catalog. Role
    /// sets and load state survive for accounts whose ID matches; new
    /// accounts start unloaded; accounts absent from the fresh list are
    /// dropped. The result is sorted by name.
    pub fn merge_fresh(&mut self, fresh: Vec<AccountSummary>) {
        let mut merged = Vec::with_capacity(fresh.len());

        for summary in fresh {
            let account = match self
                .accounts
                .iter()
                .find(|a| a.account_id == summary.account_id)
            {
                Some(existing) => Account {
                    name: summary.name,
                    account_id: summary.account_id,
                    roles: existing.roles.clone(),
                    roles_state: existing.roles_state,
                    region: existing.region.clone(),
                },
                None => Account::new(summary.name, summary.account_id),
            };
            merged.push(account);
        }

        merged.sort_by(|a, b| a.name.cmp(&b.name));
        self.accounts = merged;
    }

    /// Record the outcome of a role enumeration for one account. Failure
    /// marks the account loaded so it is not retried within the session.
    pub fn apply_role_load(&mut self, account_id: &str, roles: Result<Vec<String>, ()>) {
        let Some(account) = self
            .accounts
            .iter_mut()
            .find(|a| a.account_id == account_id)
        else {
            return;
        };

        match roles {
            Ok(mut roles) => {
                roles.sort();
                account.roles = roles;
                account.roles_state = RoleLoadState::Loaded;
            }
            Err(()) => {
                account.roles = Vec::new();
                account.roles_state = RoleLoadState::Failed;
            }
        }
    }

    pub fn set_account_region(&mut self, account_name: &str, region: Option<String>) {
        if let Some(account) = self.accounts.iter_mut().find(|a| a.name == account_name) {
            account.region = region;
        }
    }

    /// Whether the automatic sequential sweep runs for a fleet this size.
    pub fn auto_load_enabled(&self) -> bool {
        self.accounts.len() <= MAX_ACCOUNTS_FOR_ROLE_LOADING
    }

    /// Next account the sequential sweep should load: first in display
    /// order whose roles were never enumerated.
    pub fn next_unloaded(&self) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|a| a.roles_state == RoleLoadState::NotLoaded)
    }
}

//! Account cache: a JSON array with one record per profile start URL.
//!
//! The cache exists so the account list renders immediately on re-entry
//! while a fresh enumeration runs. It is best-effort: corrupt JSON reads
//! as empty rather than failing the session.

use super::{write_atomic, Store};
use crate::error::Result;
use crate::models::Account;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAccounts {
    profile_name: String,
    start_url: String,
    accounts: Vec<Account>,
    last_updated: DateTime<Utc>,
}

impl Store {
    /// Cached accounts for `start_url` with their last-updated instant,
    /// or `None` when nothing usable is cached.
    pub fn load_cached_accounts(
        &self,
        start_url: &str,
    ) -> Result<Option<(Vec<Account>, DateTime<Utc>)>> {
        let Some(all) = self.read_account_cache()? else {
            return Ok(None);
        };

        Ok(all
            .into_iter()
            .find(|cache| cache.start_url == start_url)
            .map(|cache| (cache.accounts, cache.last_updated)))
    }

    /// Upsert the cache entry for `start_url`. Accounts are persisted
    /// sorted by name so successive writes diff cleanly.
    pub fn save_cached_accounts(
        &self,
        profile_name: &str,
        start_url: &str,
        accounts: &[Account],
    ) -> Result<()> {
        let mut sorted = accounts.to_vec();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut all = self.read_account_cache()?.unwrap_or_default();
        if let Some(existing) = all.iter_mut().find(|cache| cache.start_url == start_url) {
            existing.accounts = sorted;
            existing.last_updated = Utc::now();
        } else {
            all.push(CachedAccounts {
                profile_name: profile_name.to_string(),
                start_url: start_url.to_string(),
                accounts: sorted,
                last_updated: Utc::now(),
            });
        }

        write_atomic(self.accounts_path(), &serde_json::to_string(&all)?)?;
        Ok(())
    }

    fn read_account_cache(&self) -> Result<Option<Vec<CachedAccounts>>> {
        let data = match fs::read_to_string(self.accounts_path()) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // A corrupt cache is discarded, not fatal.
        match serde_json::from_str(&data) {
            Ok(all) => Ok(Some(all)),
            Err(e) => {
                tracing::warn!("discarding unreadable account cache: {e}");
                Ok(None)
            }
        }
    }
}

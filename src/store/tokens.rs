//! Token cache: one section per start URL, `access_token` plus an RFC 3339
//! `expires_at`.

use super::{read_ini, Store};
use crate::error::{Result, SeshError};
use crate::models::CachedToken;
use chrono::{DateTime, Utc};

impl Store {
    /// Load the token minted for `start_url`, or `None` if absent or past
    /// its expiry.
    pub fn load_token(&self, start_url: &str) -> Result<Option<CachedToken>> {
        let doc = read_ini(self.tokens_path())?;
        let Some(section) = doc.section(start_url) else {
            return Ok(None);
        };

        let token = section.get("access_token").unwrap_or_default();
        let expires_at_str = section.get("expires_at").unwrap_or_default();
        if token.is_empty() || expires_at_str.is_empty() {
            return Ok(None);
        }

        let expires_at = DateTime::parse_from_rfc3339(expires_at_str)
            .map_err(|e| SeshError::CacheError(format!("failed to parse token expiration: {e}")))?
            .with_timezone(&Utc);

        let cached = CachedToken {
            access_token: token.to_string(),
            expires_at,
            start_url: start_url.to_string(),
        };
        if cached.is_expired() {
            return Ok(None);
        }

        Ok(Some(cached))
    }

    /// Upsert the token section for `start_url`. Calling with an empty
    /// token and a past expiry clears the entry: the section is deleted
    /// rather than kept around with a blank value.
    pub fn save_token(
        &self,
        start_url: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut doc = read_ini(self.tokens_path())?;

        if token.is_empty() && expires_at <= Utc::now() {
            doc.remove_section(start_url);
        } else {
            let section = doc.ensure_section(start_url);
            section.set("access_token", token);
            section.set("expires_at", &expires_at.to_rfc3339());
        }

        self.save_ini(self.tokens_path(), &doc)
    }
}

//! AWS credentials file writer.
//!
//! The credentials file is shared with the AWS CLI and whatever else the
//! user keeps in it, so writes replace exactly one profile section and
//! leave every other line untouched.

use super::{write_atomic, Store};
use crate::error::Result;
use crate::models::RoleCredentials;
use std::fs;

impl Store {
    /// Write or replace the `[profile_name]` section of the credentials
    /// file with the given role credentials and region.
    pub fn write_credentials(
        &self,
        creds: &RoleCredentials,
        region: &str,
        profile_name: &str,
    ) -> Result<()> {
        let content = match fs::read_to_string(self.credentials_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut entries: Vec<(&str, &str)> = vec![
            ("aws_access_key_id", creds.access_key_id.as_str()),
            ("aws_secret_access_key", creds.secret_access_key.as_str()),
        ];
        if !creds.session_token.is_empty() {
            entries.push(("aws_session_token", creds.session_token.as_str()));
        }
        entries.push(("region", region));

        let updated = super::ini::replace_section(&content, profile_name, &entries);
        write_atomic(self.credentials_path(), &updated)?;
        Ok(())
    }
}

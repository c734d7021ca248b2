use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker rendered in place of a role list when enumeration failed.
pub const ROLE_LOAD_ERROR_MARKER: &str = "Error loading roles";

/// A named AWS IAM Identity Center instance.
///
/// Profile names are unique across the store and serve as identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SsoProfile {
    pub name: String,
    pub start_url: String,
    pub sso_region: String,
    pub default_region: String,
}

/// Whether an account's roles have been enumerated yet.
///
/// `Failed` counts as loaded for retry-inhibition purposes: a failed
/// enumeration is not retried within the session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleLoadState {
    #[default]
    NotLoaded,
    Loaded,
    Failed,
}

/// An AWS account visible through an SSO profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub account_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub roles_state: RoleLoadState,
    /// Account-specific region override; `None` means use the profile default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Account {
    pub fn new(name: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_id: account_id.into(),
            roles: Vec::new(),
            roles_state: RoleLoadState::NotLoaded,
            region: None,
        }
    }

    /// True once roles were enumerated, successfully or not.
    pub fn roles_loaded(&self) -> bool {
        !matches!(self.roles_state, RoleLoadState::NotLoaded)
    }

    /// Role names for display, substituting the error marker after a
    /// failed enumeration.
    pub fn display_roles(&self) -> Vec<String> {
        match self.roles_state {
            RoleLoadState::Failed => vec![ROLE_LOAD_ERROR_MARKER.to_string()],
            _ => self.roles.clone(),
        }
    }
}

/// An account as returned by the list-accounts enumeration, before any
/// role information is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub name: String,
    pub account_id: String,
}

/// A cached SSO access token, keyed by the start URL it was minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub start_url: String,
}

impl CachedToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Transient device-authorization handshake state. Never persisted.
#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    pub client_id: String,
    pub client_secret: String,
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    /// Server-suggested polling interval in seconds.
    pub interval_secs: u64,
    pub expires_at: DateTime<Utc>,
    pub start_url: String,
}

/// Short-lived credentials for an assumed role.
#[derive(Debug, Clone)]
pub struct RoleCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

/// Nonce attached to every outbound asynchronous operation. Events carrying
/// a stale request ID are dropped by the session controller; this is the
/// entire cancellation mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(profile_name: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Self(format!("{profile_name}-{nanos}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

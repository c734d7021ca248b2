//! Tagged events flowing from asynchronous work back into the session
//! controller.
//!
//! Every variant carries the [`RequestId`] the work was started with. The
//! controller compares it against the current ID and silently drops
//! mismatches; that comparison is the entire cancellation mechanism.

use crate::error::SeshError;
use crate::models::{AccountSummary, RequestId};
use chrono::{DateTime, Utc};

#[derive(Debug)]
pub enum Event {
    /// The device-authorization handshake is underway; the user must visit
    /// the verification URI and enter the code.
    DeviceAuthStarted {
        request_id: RequestId,
        verification_uri: String,
        verification_uri_complete: String,
        user_code: String,
        expires_at: DateTime<Utc>,
    },
    /// One token poll came back still-pending.
    AuthPollTick {
        request_id: RequestId,
        remaining_secs: i64,
    },
    AuthSucceeded {
        request_id: RequestId,
        access_token: String,
    },
    AuthFailed {
        request_id: RequestId,
        error: SeshError,
    },
    FetchAccountsSucceeded {
        request_id: RequestId,
        accounts: Vec<AccountSummary>,
    },
    FetchAccountsFailed {
        request_id: RequestId,
        error: SeshError,
    },
    /// One account's role enumeration finished, successfully or not.
    RoleLoadCompleted {
        request_id: RequestId,
        account_id: String,
        roles: Result<Vec<String>, SeshError>,
    },
    CredentialsWritten {
        request_id: RequestId,
    },
    CredentialsFailed {
        request_id: RequestId,
        error: SeshError,
    },
}

impl Event {
    pub fn request_id(&self) -> &RequestId {
        match self {
            Event::DeviceAuthStarted { request_id, .. }
            | Event::AuthPollTick { request_id, .. }
            | Event::AuthSucceeded { request_id, .. }
            | Event::AuthFailed { request_id, .. }
            | Event::FetchAccountsSucceeded { request_id, .. }
            | Event::FetchAccountsFailed { request_id, .. }
            | Event::RoleLoadCompleted { request_id, .. }
            | Event::CredentialsWritten { request_id }
            | Event::CredentialsFailed { request_id, .. } => request_id,
        }
    }
}

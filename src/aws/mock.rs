//! Scriptable in-memory implementation of [`SsoApi`] for tests.
//!
//! Behavior is configured up front with builder methods; calls are
//! recorded so tests can assert on invocation counts, ordering, and
//! pacing.

use super::{SsoApi, SsoApiFactory};
use crate::error::{Result, SeshError};
use crate::models::{AccountSummary, DeviceAuthorization, RoleCredentials};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Factory that hands out one shared mock regardless of region.
pub struct MockFactory(pub Arc<MockSsoApi>);

#[async_trait]
impl SsoApiFactory for MockFactory {
    async fn client_for(&self, _sso_region: &str) -> Result<Arc<dyn SsoApi>> {
        Ok(self.0.clone())
    }
}

/// One scripted answer from the token endpoint. An exhausted script keeps
/// answering `Pending`.
#[derive(Debug, Clone)]
pub enum TokenStep {
    Pending,
    SlowDown,
    Expired,
    Ok(String),
    Fail(String),
}

pub struct MockSsoApi {
    user_code: String,
    verification_uri: String,
    interval_secs: u64,
    device_expires_in_secs: i64,
    token_script: Mutex<VecDeque<TokenStep>>,
    accounts: Mutex<Vec<AccountSummary>>,
    accounts_by_token: Mutex<HashMap<String, Vec<AccountSummary>>>,
    roles: Mutex<HashMap<String, Vec<String>>>,
    failing_roles: Mutex<HashSet<String>>,
    credentials: Mutex<RoleCredentials>,

    register_calls: AtomicUsize,
    device_auth_calls: AtomicUsize,
    create_token_calls: AtomicUsize,
    list_accounts_calls: AtomicUsize,
    token_call_instants: Mutex<Vec<Instant>>,
    role_calls: Mutex<Vec<String>>,
    credential_calls: Mutex<Vec<(String, String)>>,
    roles_in_flight: AtomicUsize,
    max_roles_in_flight: AtomicUsize,
}

impl MockSsoApi {
    pub fn new() -> Self {
        Self {
            user_code: "ABCD-1234".to_string(),
            verification_uri: "https://device.sso.eu-north-1.amazonaws.com/".to_string(),
            interval_secs: 5,
            device_expires_in_secs: 600,
            token_script: Mutex::new(VecDeque::new()),
            accounts: Mutex::new(Vec::new()),
            accounts_by_token: Mutex::new(HashMap::new()),
            roles: Mutex::new(HashMap::new()),
            failing_roles: Mutex::new(HashSet::new()),
            credentials: Mutex::new(RoleCredentials {
                access_key_id: "AKIAMOCK".to_string(),
                secret_access_key: "ws3cretMock".to_string(),
                session_token: "IQoMockToken".to_string(),
                expiration: Utc::now() + Duration::hours(1),
            }),
            register_calls: AtomicUsize::new(0),
            device_auth_calls: AtomicUsize::new(0),
            create_token_calls: AtomicUsize::new(0),
            list_accounts_calls: AtomicUsize::new(0),
            token_call_instants: Mutex::new(Vec::new()),
            role_calls: Mutex::new(Vec::new()),
            credential_calls: Mutex::new(Vec::new()),
            roles_in_flight: AtomicUsize::new(0),
            max_roles_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_token_script(self, steps: Vec<TokenStep>) -> Self {
        *self.token_script.lock().unwrap() = steps.into();
        self
    }

    pub fn with_device_expires_in(mut self, secs: i64) -> Self {
        self.device_expires_in_secs = secs;
        self
    }

    pub fn with_accounts(self, accounts: Vec<AccountSummary>) -> Self {
        *self.accounts.lock().unwrap() = accounts;
        self
    }

    /// Accounts returned only for a specific access token; lets one mock
    /// serve two profiles distinguishably.
    pub fn with_accounts_for_token(self, token: &str, accounts: Vec<AccountSummary>) -> Self {
        self.accounts_by_token
            .lock()
            .unwrap()
            .insert(token.to_string(), accounts);
        self
    }

    pub fn with_roles(self, account_id: &str, roles: Vec<&str>) -> Self {
        self.roles.lock().unwrap().insert(
            account_id.to_string(),
            roles.into_iter().map(str::to_string).collect(),
        );
        self
    }

    pub fn with_failing_roles(self, account_id: &str) -> Self {
        self.failing_roles
            .lock()
            .unwrap()
            .insert(account_id.to_string());
        self
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn create_token_calls(&self) -> usize {
        self.create_token_calls.load(Ordering::SeqCst)
    }

    pub fn list_accounts_calls(&self) -> usize {
        self.list_accounts_calls.load(Ordering::SeqCst)
    }

    pub fn token_call_instants(&self) -> Vec<Instant> {
        self.token_call_instants.lock().unwrap().clone()
    }

    /// Account IDs passed to `list_account_roles`, in call order.
    pub fn role_calls(&self) -> Vec<String> {
        self.role_calls.lock().unwrap().clone()
    }

    /// `(account_id, role_name)` pairs passed to `get_role_credentials`.
    pub fn credential_calls(&self) -> Vec<(String, String)> {
        self.credential_calls.lock().unwrap().clone()
    }

    /// High-water mark of concurrent `list_account_roles` calls.
    pub fn max_roles_in_flight(&self) -> usize {
        self.max_roles_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockSsoApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SsoApi for MockSsoApi {
    async fn register_client(&self) -> Result<(String, String)> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(("client-id-1".to_string(), "client-secret-1".to_string()))
    }

    async fn start_device_authorization(
        &self,
        client_id: &str,
        client_secret: &str,
        start_url: &str,
    ) -> Result<DeviceAuthorization> {
        self.device_auth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceAuthorization {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            device_code: "device-code-1".to_string(),
            user_code: self.user_code.clone(),
            verification_uri: self.verification_uri.clone(),
            verification_uri_complete: format!(
                "{}?user_code={}",
                self.verification_uri, self.user_code
            ),
            interval_secs: self.interval_secs,
            expires_at: Utc::now() + Duration::seconds(self.device_expires_in_secs),
            start_url: start_url.to_string(),
        })
    }

    async fn create_token(&self, _auth: &DeviceAuthorization) -> Result<String> {
        self.create_token_calls.fetch_add(1, Ordering::SeqCst);
        self.token_call_instants.lock().unwrap().push(Instant::now());

        let step = self
            .token_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TokenStep::Pending);

        match step {
            TokenStep::Pending => Err(SeshError::AuthorizationPending),
            TokenStep::SlowDown => Err(SeshError::SlowDown),
            TokenStep::Expired => Err(SeshError::AuthorizationExpired),
            TokenStep::Ok(token) => Ok(token),
            TokenStep::Fail(message) => Err(SeshError::AwsSdk(message)),
        }
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<AccountSummary>> {
        self.list_accounts_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(accounts) = self.accounts_by_token.lock().unwrap().get(access_token) {
            return Ok(accounts.clone());
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn list_account_roles(
        &self,
        _access_token: &str,
        account_id: &str,
    ) -> Result<Vec<String>> {
        let in_flight = self.roles_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_roles_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        self.role_calls.lock().unwrap().push(account_id.to_string());

        // Yield so overlapping callers would actually be observed.
        tokio::task::yield_now().await;

        self.roles_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_roles.lock().unwrap().contains(account_id) {
            return Err(SeshError::AwsSdk(format!(
                "throttled listing roles for {account_id}"
            )));
        }

        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_role_credentials(
        &self,
        _access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials> {
        self.credential_calls
            .lock()
            .unwrap()
            .push((account_id.to_string(), role_name.to_string()));
        Ok(self.credentials.lock().unwrap().clone())
    }
}

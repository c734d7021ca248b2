//! Top-level session state machine.
//!
//! The controller owns the live model: profiles, the account catalog, the
//! access token, and the current request ID. User intents come in as
//! method calls; asynchronous work reports back through the event channel,
//! and every state mutation happens in the single turn that dequeues an
//! event. Events whose request ID is stale are dropped without effect.

mod events;

pub use events::Event;

use crate::auth::AuthOrchestrator;
use crate::aws::{SsoApi, SsoApiFactory};
use crate::catalog::Catalog;
use crate::error::{Result, SeshError};
use crate::models::{Account, RequestId, SsoProfile};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SelectProfile,
    SelectAccount,
    SelectRole,
    SessionActive,
    AddProfile,
    EditProfile,
    DeleteConfirm,
    SetAccountRegion,
}

/// Verification details shown while the device flow waits on the user.
#[derive(Debug, Clone)]
pub struct DeviceAuthPrompt {
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub user_code: String,
}

/// The profile/account/role triple that credentials were written for.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub profile_name: String,
    pub account_name: String,
    pub account_id: String,
    pub role_name: String,
    pub region: String,
    pub credential_profile: String,
}

pub struct SessionController {
    store: Store,
    factory: Arc<dyn SsoApiFactory>,
    events_tx: UnboundedSender<Event>,
    launch_browser: bool,

    state: SessionState,
    profiles: Vec<SsoProfile>,
    selected_profile: Option<SsoProfile>,
    client: Option<Arc<dyn SsoApi>>,
    access_token: Option<String>,
    catalog: Catalog,
    selected_account_id: Option<String>,
    current_request_id: Option<RequestId>,

    device_prompt: Option<DeviceAuthPrompt>,
    using_cached_accounts: bool,
    accounts_last_updated: Option<DateTime<Utc>>,
    loading_text: Option<String>,
    error_message: Option<String>,
    active_session: Option<ActiveSession>,
    sweeping: bool,

    /// CLI `--region`: takes precedence over every stored region.
    region_override: Option<String>,
    /// CLI `--profile`: credential profile name to write under.
    credential_profile_override: Option<String>,
}

impl SessionController {
    pub fn new(
        store: Store,
        factory: Arc<dyn SsoApiFactory>,
        launch_browser: bool,
    ) -> (Self, UnboundedReceiver<Event>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = Self {
            store,
            factory,
            events_tx,
            launch_browser,
            state: SessionState::SelectProfile,
            profiles: Vec::new(),
            selected_profile: None,
            client: None,
            access_token: None,
            catalog: Catalog::new(),
            selected_account_id: None,
            current_request_id: None,
            device_prompt: None,
            using_cached_accounts: false,
            accounts_last_updated: None,
            loading_text: None,
            error_message: None,
            active_session: None,
            sweeping: false,
            region_override: None,
            credential_profile_override: None,
        };
        (controller, events_rx)
    }

    // ------------------------------------------------------------------
    // Accessors for the shell.
    // ------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn profiles(&self) -> &[SsoProfile] {
        &self.profiles
    }

    pub fn selected_profile(&self) -> Option<&SsoProfile> {
        self.selected_profile.as_ref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selected_account(&self) -> Option<&Account> {
        self.selected_account_id
            .as_deref()
            .and_then(|id| self.catalog.get(id))
    }

    pub fn device_prompt(&self) -> Option<&DeviceAuthPrompt> {
        self.device_prompt.as_ref()
    }

    pub fn using_cached_accounts(&self) -> bool {
        self.using_cached_accounts
    }

    pub fn accounts_last_updated(&self) -> Option<DateTime<Utc>> {
        self.accounts_last_updated
    }

    pub fn loading_text(&self) -> Option<&str> {
        self.loading_text.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    pub fn active_session(&self) -> Option<&ActiveSession> {
        self.active_session.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn set_region_override(&mut self, region: Option<String>) {
        self.region_override = region;
    }

    pub fn set_credential_profile_override(&mut self, profile: Option<String>) {
        self.credential_profile_override = profile;
    }

    /// Effective region for an account: CLI override, else the account's
    /// stored override, else the profile default.
    pub fn effective_region(&self, account: &Account) -> String {
        if let Some(region) = &self.region_override {
            return region.clone();
        }
        if let Some(region) = &account.region {
            if !region.is_empty() {
                return region.clone();
            }
        }
        self.selected_profile
            .as_ref()
            .map(|p| p.default_region.clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Profile management.
    // ------------------------------------------------------------------

    /// Load profiles from disk. A failure degrades to an empty list with
    /// an error banner rather than aborting the session.
    pub fn load_profiles(&mut self) {
        match self.store.load_profiles() {
            Ok(mut profiles) => {
                profiles.sort_by(|a, b| a.name.cmp(&b.name));
                self.profiles = profiles;
            }
            Err(e) => {
                tracing::warn!("failed to load SSO profiles: {e}");
                self.profiles = Vec::new();
                self.error_message = Some(format!("Failed to load SSO profiles: {e}"));
            }
        }
    }

    pub fn begin_add_profile(&mut self) {
        self.state = SessionState::AddProfile;
    }

    pub fn begin_edit_profile(&mut self) {
        self.state = SessionState::EditProfile;
    }

    pub fn begin_delete_profile(&mut self) {
        self.state = SessionState::DeleteConfirm;
    }

    pub fn begin_set_account_region(&mut self) {
        self.state = SessionState::SetAccountRegion;
    }

    pub fn add_profile(&mut self, profile: SsoProfile) -> Result<()> {
        if self.profiles.iter().any(|p| p.name == profile.name) {
            return Err(SeshError::ConfigError(format!(
                "an SSO profile named '{}' already exists",
                profile.name
            )));
        }
        self.profiles.push(profile);
        self.profiles.sort_by(|a, b| a.name.cmp(&b.name));
        self.store.save_profiles(&self.profiles)?;
        self.state = SessionState::SelectProfile;
        Ok(())
    }

    pub fn update_profile(&mut self, original_name: &str, profile: SsoProfile) -> Result<()> {
        if self
            .profiles
            .iter()
            .any(|p| p.name == profile.name && p.name != original_name)
        {
            return Err(SeshError::ConfigError(format!(
                "an SSO profile named '{}' already exists",
                profile.name
            )));
        }
        let Some(existing) = self.profiles.iter_mut().find(|p| p.name == original_name) else {
            return Err(SeshError::ProfileNotFound(original_name.to_string()));
        };
        *existing = profile;
        self.profiles.sort_by(|a, b| a.name.cmp(&b.name));
        self.store.save_profiles(&self.profiles)?;
        self.state = SessionState::SelectProfile;
        Ok(())
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<()> {
        self.profiles.retain(|p| p.name != name);
        self.store.save_profiles(&self.profiles)?;
        self.state = SessionState::SelectProfile;
        Ok(())
    }

    // ------------------------------------------------------------------
    // The async pipeline: profile -> accounts -> roles -> credentials.
    // ------------------------------------------------------------------

    /// Select a profile: render cached accounts immediately if any, then
    /// kick off authentication and a fresh account listing.
    pub async fn select_profile(&mut self, name: &str) -> Result<()> {
        let profile = self
            .profiles
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| SeshError::ProfileNotFound(name.to_string()))?;

        let request_id = RequestId::new(&profile.name);
        self.current_request_id = Some(request_id.clone());

        let switching = self
            .selected_profile
            .as_ref()
            .map(|p| p.name != profile.name)
            .unwrap_or(true);
        if switching {
            self.catalog = Catalog::new();
            self.using_cached_accounts = false;
            self.accounts_last_updated = None;
        }

        self.selected_profile = Some(profile.clone());
        self.selected_account_id = None;
        self.active_session = None;
        self.error_message = None;
        self.device_prompt = None;
        self.sweeping = false;

        match self.store.load_cached_accounts(&profile.start_url) {
            Ok(Some((accounts, last_updated))) if !accounts.is_empty() => {
                self.catalog = Catalog::from_cached(accounts);
                self.apply_region_preferences();
                self.using_cached_accounts = true;
                self.accounts_last_updated = Some(last_updated);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to load cached accounts: {e}"),
        }

        self.state = SessionState::SelectAccount;
        self.loading_text = Some("Starting SSO login...".to_string());

        {
            let store = self.store.clone();
            let name = profile.name.clone();
            tokio::spawn(async move {
                if let Err(e) = store.set_last_sso_profile(&name) {
                    tracing::warn!("failed to save last selected SSO profile: {e}");
                }
            });
        }

        let client = match self.factory.client_for(&profile.sso_region).await {
            Ok(client) => client,
            Err(e) => {
                self.error_message = Some(format!("Failed to initialize AWS client: {e}"));
                self.state = SessionState::SelectProfile;
                self.current_request_id = None;
                return Ok(());
            }
        };
        self.client = Some(client.clone());

        let orchestrator = AuthOrchestrator::new(
            client,
            self.store.clone(),
            self.events_tx.clone(),
            self.launch_browser,
        );
        orchestrator.begin_login(profile.start_url.clone(), request_id);

        Ok(())
    }

    /// Select an account by name. Supersedes any outstanding work; issues
    /// a one-shot role load when the account's roles are not yet known.
    pub fn select_account(&mut self, account_name: &str) -> Result<()> {
        let account = self
            .catalog
            .get_by_name(account_name)
            .cloned()
            .ok_or_else(|| SeshError::AccountNotFound(account_name.to_string()))?;

        let profile_name = self
            .selected_profile
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default();

        let request_id = RequestId::new(&profile_name);
        self.current_request_id = Some(request_id);
        self.sweeping = false;
        self.selected_account_id = Some(account.account_id.clone());
        self.state = SessionState::SelectRole;

        {
            let store = self.store.clone();
            let profile_name = profile_name.clone();
            let account_name = account.name.clone();
            tokio::spawn(async move {
                if let Err(e) = store.set_last_account(&profile_name, &account_name) {
                    tracing::warn!("failed to save last selected account: {e}");
                }
            });
        }

        if account.roles_loaded() {
            self.loading_text = None;
        } else {
            self.loading_text = Some(format!("Loading roles for {}...", account.name));
            self.spawn_role_load(account.account_id);
        }

        Ok(())
    }

    /// Confirm a role: resolve the effective region and credential profile
    /// name, fetch credentials, and write them to the credentials file.
    pub fn confirm_role(&mut self, role_name: &str) -> Result<()> {
        let account = self
            .selected_account()
            .cloned()
            .ok_or(SeshError::NoSessionFound)?;
        let profile = self
            .selected_profile
            .clone()
            .ok_or(SeshError::NoSessionFound)?;
        let client = self.client.clone().ok_or(SeshError::NoSessionFound)?;
        let token = self
            .access_token
            .clone()
            .ok_or(SeshError::NoSessionFound)?;
        let request_id = self
            .current_request_id
            .clone()
            .ok_or(SeshError::NoSessionFound)?;

        let region = self.effective_region(&account);

        let credential_profile = match &self.credential_profile_override {
            Some(name) if !name.is_empty() => name.clone(),
            _ => {
                let saved = self
                    .store
                    .credential_profile_name(&profile.name, &account.name, role_name)
                    .unwrap_or_default();
                if saved.is_empty() {
                    "default".to_string()
                } else {
                    saved
                }
            }
        };

        self.active_session = Some(ActiveSession {
            profile_name: profile.name.clone(),
            account_name: account.name.clone(),
            account_id: account.account_id.clone(),
            role_name: role_name.to_string(),
            region: region.clone(),
            credential_profile: credential_profile.clone(),
        });
        self.loading_text = Some("Fetching role credentials...".to_string());

        {
            let store = self.store.clone();
            let profile_name = profile.name.clone();
            let account_name = account.name.clone();
            let role = role_name.to_string();
            let custom = self.credential_profile_override.clone();
            tokio::spawn(async move {
                if let Err(e) = store.set_last_role(&profile_name, &account_name, &role) {
                    tracing::warn!("failed to save last selected role: {e}");
                }
                if let Some(custom) = custom.filter(|c| !c.is_empty()) {
                    if let Err(e) = store.set_credential_profile_name(
                        &profile_name,
                        &account_name,
                        &role,
                        &custom,
                    ) {
                        tracing::warn!("failed to save credential profile name: {e}");
                    }
                }
            });
        }

        let store = self.store.clone();
        let tx = self.events_tx.clone();
        let account_id = account.account_id.clone();
        let role = role_name.to_string();
        tokio::spawn(async move {
            let event = match client.get_role_credentials(&token, &account_id, &role).await {
                Ok(creds) => match store.write_credentials(&creds, &region, &credential_profile) {
                    Ok(()) => Event::CredentialsWritten { request_id },
                    Err(error) => Event::CredentialsFailed { request_id, error },
                },
                Err(error) => Event::CredentialsFailed { request_id, error },
            };
            let _ = tx.send(event);
        });

        Ok(())
    }

    /// Back out of the current state, invalidating outstanding work where
    /// the state owns any.
    pub fn escape(&mut self) {
        match self.state {
            SessionState::SelectAccount => {
                self.current_request_id = None;
                self.sweeping = false;
                self.loading_text = None;
                self.device_prompt = None;
                self.error_message = None;
                self.state = SessionState::SelectProfile;
            }
            SessionState::SelectRole => {
                self.loading_text = None;
                self.state = SessionState::SelectAccount;
            }
            SessionState::SessionActive => {
                self.state = SessionState::SelectAccount;
            }
            SessionState::AddProfile
            | SessionState::EditProfile
            | SessionState::DeleteConfirm => {
                self.state = SessionState::SelectProfile;
            }
            SessionState::SetAccountRegion => {
                self.state = SessionState::SelectAccount;
            }
            SessionState::SelectProfile => {}
        }
    }

    /// Persist a region override for an account (empty clears it) and
    /// return to account selection.
    pub fn set_account_region_value(&mut self, account_name: &str, region: &str) -> Result<()> {
        let profile_name = self
            .selected_profile
            .as_ref()
            .map(|p| p.name.clone())
            .ok_or(SeshError::NoSessionFound)?;

        self.store
            .set_account_region(&profile_name, account_name, region)?;
        let region = if region.is_empty() {
            None
        } else {
            Some(region.to_string())
        };
        self.catalog.set_account_region(account_name, region);
        self.state = SessionState::SelectAccount;
        Ok(())
    }

    /// Clear the cached token when the user quits from account selection
    /// without having opened an account, so a half-done login does not
    /// linger on disk.
    pub fn clear_token_on_abandon(&self) {
        if self.selected_account_id.is_some() {
            return;
        }
        if let Some(profile) = &self.selected_profile {
            if let Err(e) = self.store.save_token(&profile.start_url, "", Utc::now()) {
                tracing::warn!("failed to clear token cache: {e}");
            }
        }
    }

    // ------------------------------------------------------------------
    // Event application.
    // ------------------------------------------------------------------

    pub fn handle_event(&mut self, event: Event) {
        // Stale request ID: the work was superseded. Drop silently.
        if self.current_request_id.as_ref() != Some(event.request_id()) {
            return;
        }

        match event {
            Event::DeviceAuthStarted {
                verification_uri,
                verification_uri_complete,
                user_code,
                ..
            } => {
                self.device_prompt = Some(DeviceAuthPrompt {
                    verification_uri,
                    verification_uri_complete,
                    user_code,
                });
                self.loading_text = Some("Waiting for browser authentication...".to_string());
            }

            Event::AuthPollTick { remaining_secs, .. } => {
                self.loading_text = Some(format!(
                    "Waiting for authentication... ({remaining_secs}s remaining)"
                ));
            }

            Event::AuthSucceeded { access_token, .. } => {
                self.access_token = Some(access_token);
                self.device_prompt = None;
                self.error_message = None;
                self.loading_text = Some("Fetching accounts...".to_string());
                self.spawn_fetch_accounts();
            }

            Event::AuthFailed { error, .. } => {
                self.error_message = Some(error.to_string());
                self.device_prompt = None;
                self.loading_text = None;
                self.current_request_id = None;
                self.state = SessionState::SelectProfile;
            }

            Event::FetchAccountsSucceeded { accounts, .. } => {
                self.catalog.merge_fresh(accounts);
                self.apply_region_preferences();
                self.using_cached_accounts = false;
                self.accounts_last_updated = Some(Utc::now());
                self.loading_text = None;
                self.spawn_save_accounts();

                if self.catalog.auto_load_enabled() {
                    self.issue_next_role_load();
                }
            }

            Event::FetchAccountsFailed { error, .. } => {
                self.error_message = Some(error.to_string());
                self.loading_text = None;
                self.current_request_id = None;
                self.state = SessionState::SelectProfile;
            }

            Event::RoleLoadCompleted {
                account_id, roles, ..
            } => {
                match roles {
                    Ok(roles) => self.catalog.apply_role_load(&account_id, Ok(roles)),
                    Err(error) => {
                        tracing::warn!("failed to load roles for account {account_id}: {error}");
                        self.catalog.apply_role_load(&account_id, Err(()));
                    }
                }
                self.spawn_save_accounts();

                if self.selected_account_id.as_deref() == Some(account_id.as_str()) {
                    self.loading_text = None;
                }
                if self.sweeping {
                    self.issue_next_role_load();
                }
            }

            Event::CredentialsWritten { .. } => {
                self.loading_text = None;
                self.state = SessionState::SessionActive;
            }

            Event::CredentialsFailed { error, .. } => {
                self.error_message = Some(format!("Failed to get role credentials: {error}"));
                self.active_session = None;
                self.loading_text = None;
                self.state = SessionState::SelectAccount;
            }
        }
    }

    // ------------------------------------------------------------------
    // Task spawning.
    // ------------------------------------------------------------------

    fn spawn_fetch_accounts(&self) {
        let (Some(client), Some(token), Some(request_id)) = (
            self.client.clone(),
            self.access_token.clone(),
            self.current_request_id.clone(),
        ) else {
            return;
        };
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let event = match client.list_accounts(&token).await {
                Ok(accounts) => Event::FetchAccountsSucceeded {
                    request_id,
                    accounts,
                },
                Err(error) => Event::FetchAccountsFailed { request_id, error },
            };
            let _ = tx.send(event);
        });
    }

    /// Advance the sequential role sweep: at most one enumeration is in
    /// flight, and the next is issued only after the previous completion
    /// has been applied.
    fn issue_next_role_load(&mut self) {
        let next = self
            .catalog
            .next_unloaded()
            .map(|account| account.account_id.clone());
        match next {
            Some(account_id) => {
                self.sweeping = true;
                self.spawn_role_load(account_id);
            }
            None => self.sweeping = false,
        }
    }

    fn spawn_role_load(&self, account_id: String) {
        let (Some(client), Some(token), Some(request_id)) = (
            self.client.clone(),
            self.access_token.clone(),
            self.current_request_id.clone(),
        ) else {
            return;
        };
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let roles = client.list_account_roles(&token, &account_id).await;
            let _ = tx.send(Event::RoleLoadCompleted {
                request_id,
                account_id,
                roles,
            });
        });
    }

    fn spawn_save_accounts(&self) {
        let Some(profile) = self.selected_profile.clone() else {
            return;
        };
        let store = self.store.clone();
        let accounts = self.catalog.accounts().to_vec();

        tokio::spawn(async move {
            if let Err(e) =
                store.save_cached_accounts(&profile.name, &profile.start_url, &accounts)
            {
                tracing::warn!("failed to save accounts to cache: {e}");
            }
        });
    }

    fn apply_region_preferences(&mut self) {
        let Some(profile_name) = self.selected_profile.as_ref().map(|p| p.name.clone()) else {
            return;
        };

        let names: Vec<String> = self
            .catalog
            .accounts()
            .iter()
            .map(|a| a.name.clone())
            .collect();
        for name in names {
            if let Ok(region) = self.store.account_region(&profile_name, &name) {
                if !region.is_empty() {
                    self.catalog.set_account_region(&name, Some(region));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::mock::{MockFactory, MockSsoApi};
    use crate::models::{AccountSummary, RoleLoadState, ROLE_LOAD_ERROR_MARKER};
    use chrono::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    const START_URL: &str = "https://acme.awsapps.com/start";

    fn profile(name: &str) -> SsoProfile {
        SsoProfile {
            name: name.to_string(),
            start_url: format!("https://{name}.awsapps.com/start"),
            sso_region: "eu-north-1".to_string(),
            default_region: "eu-north-1".to_string(),
        }
    }

    fn summary(name: &str, id: &str) -> AccountSummary {
        AccountSummary {
            name: name.to_string(),
            account_id: id.to_string(),
        }
    }

    fn controller_with(
        mock: MockSsoApi,
        profiles: &[SsoProfile],
    ) -> (
        Arc<MockSsoApi>,
        Store,
        SessionController,
        UnboundedReceiver<Event>,
        TempDir,
    ) {
        let dir = TempDir::new().unwrap();
        let store = Store::at_dir(dir.path());
        store.save_profiles(profiles).unwrap();

        let mock = Arc::new(mock);
        let (mut controller, rx) =
            SessionController::new(store.clone(), Arc::new(MockFactory(mock.clone())), false);
        controller.load_profiles();
        (mock, store, controller, rx, dir)
    }

    /// Feed events into the controller until `pred` holds or the pipeline
    /// goes quiet.
    async fn pump_until(
        controller: &mut SessionController,
        rx: &mut UnboundedReceiver<Event>,
        pred: impl Fn(&SessionController) -> bool,
    ) {
        for _ in 0..500 {
            if pred(controller) {
                return;
            }
            match tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv()).await {
                Ok(Some(event)) => controller.handle_event(event),
                _ => break,
            }
        }
        assert!(pred(controller), "pipeline went quiet before condition held");
    }

    /// Drain anything still queued without blocking.
    fn drain(controller: &mut SessionController, rx: &mut UnboundedReceiver<Event>) {
        while let Ok(event) = rx.try_recv() {
            controller.handle_event(event);
        }
    }

    fn cache_token(store: &Store, start_url: &str, token: &str) {
        store
            .save_token(start_url, token, Utc::now() + Duration::hours(1))
            .unwrap();
    }

    #[tokio::test]
    async fn large_fleet_suppresses_automatic_role_loading() {
        let accounts: Vec<AccountSummary> = (0..150)
            .map(|i| summary(&format!("acct-{i:03}"), &format!("{:012}", i + 1)))
            .collect();
        let mock = MockSsoApi::new()
            .with_accounts(accounts)
            .with_roles("000000000001", vec!["Admin", "ReadOnly"]);
        let (mock, store, mut controller, mut rx, _dir) = controller_with(mock, &[profile("acme")]);
        cache_token(&store, START_URL, "tok");

        controller.select_profile("acme").await.unwrap();
        pump_until(&mut controller, &mut rx, |c| c.catalog().len() == 150).await;

        // No sweep was started for a fleet this size.
        assert!(mock.role_calls().is_empty());

        // Opening one account triggers exactly one enumeration, for it alone.
        controller.select_account("acct-000").unwrap();
        pump_until(&mut controller, &mut rx, |c| {
            c.catalog().get("000000000001").unwrap().roles_loaded()
        })
        .await;

        assert_eq!(mock.role_calls(), vec!["000000000001"]);
        let account = controller.catalog().get("000000000001").unwrap();
        assert_eq!(account.roles, vec!["Admin", "ReadOnly"]);
        assert!(controller
            .catalog()
            .accounts()
            .iter()
            .filter(|a| a.account_id != "000000000001")
            .all(|a| !a.roles_loaded()));
    }

    #[tokio::test]
    async fn sequential_sweep_is_ordered_and_survives_one_failure() {
        let mock = MockSsoApi::new()
            .with_accounts(vec![
                summary("A", "111111111111"),
                summary("B", "222222222222"),
                summary("C", "333333333333"),
                summary("D", "444444444444"),
            ])
            .with_roles("111111111111", vec!["Admin"])
            .with_roles("333333333333", vec!["Admin"])
            .with_roles("444444444444", vec!["Admin"])
            .with_failing_roles("222222222222");
        let (mock, store, mut controller, mut rx, _dir) = controller_with(mock, &[profile("acme")]);
        cache_token(&store, START_URL, "tok");

        controller.select_profile("acme").await.unwrap();
        pump_until(&mut controller, &mut rx, |c| {
            c.catalog().len() == 4 && c.catalog().accounts().iter().all(|a| a.roles_loaded())
        })
        .await;

        assert_eq!(
            mock.role_calls(),
            vec![
                "111111111111",
                "222222222222",
                "333333333333",
                "444444444444"
            ]
        );
        assert_eq!(mock.max_roles_in_flight(), 1);

        let b = controller.catalog().get("222222222222").unwrap();
        assert_eq!(b.roles_state, RoleLoadState::Failed);
        assert_eq!(b.display_roles(), vec![ROLE_LOAD_ERROR_MARKER]);
        assert_eq!(
            controller.catalog().get("333333333333").unwrap().roles,
            vec!["Admin"]
        );
        assert_eq!(
            controller.catalog().get("444444444444").unwrap().roles,
            vec!["Admin"]
        );
    }

    #[tokio::test]
    async fn role_confirmation_writes_credentials_and_preferences() {
        let mock = MockSsoApi::new()
            .with_accounts(vec![summary("dev", "123456789012")])
            .with_roles("123456789012", vec!["Developer", "ReadOnly"]);
        let (mock, store, mut controller, mut rx, dir) = controller_with(mock, &[profile("acme")]);
        cache_token(&store, START_URL, "tok");
        store.set_account_region("acme", "dev", "eu-west-1").unwrap();

        controller.select_profile("acme").await.unwrap();
        pump_until(&mut controller, &mut rx, |c| {
            c.catalog().get("123456789012").map(|a| a.roles_loaded()) == Some(true)
        })
        .await;

        controller.select_account("dev").unwrap();
        controller.confirm_role("Developer").unwrap();
        pump_until(&mut controller, &mut rx, |c| {
            c.state() == SessionState::SessionActive
        })
        .await;

        assert_eq!(
            mock.credential_calls(),
            vec![("123456789012".to_string(), "Developer".to_string())]
        );

        let credentials = std::fs::read_to_string(dir.path().join("credentials")).unwrap();
        assert!(credentials.contains("[default]"));
        assert!(credentials.contains("aws_access_key_id = AKIAMOCK"));
        assert!(credentials.contains("aws_secret_access_key = ws3cretMock"));
        assert!(credentials.contains("aws_session_token = IQoMockToken"));
        // Account override beats the profile default region.
        assert!(credentials.contains("region = eu-west-1"));

        let session = controller.active_session().unwrap();
        assert_eq!(session.region, "eu-west-1");
        assert_eq!(session.credential_profile, "default");

        // Preference writes are backgrounded; give them a turn to land.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(store.last_sso_profile().unwrap(), "acme");
        assert_eq!(store.last_account("acme").unwrap(), "dev");
        assert_eq!(store.last_role("acme", "dev").unwrap(), "Developer");
    }

    #[tokio::test]
    async fn custom_credential_profile_override_is_used_and_remembered() {
        let mock = MockSsoApi::new()
            .with_accounts(vec![summary("dev", "123456789012")])
            .with_roles("123456789012", vec!["Developer"]);
        let (_mock, store, mut controller, mut rx, dir) = controller_with(mock, &[profile("acme")]);
        cache_token(&store, START_URL, "tok");

        controller.set_credential_profile_override(Some("acme-dev".to_string()));
        controller.select_profile("acme").await.unwrap();
        pump_until(&mut controller, &mut rx, |c| {
            c.catalog().get("123456789012").map(|a| a.roles_loaded()) == Some(true)
        })
        .await;

        controller.select_account("dev").unwrap();
        controller.confirm_role("Developer").unwrap();
        pump_until(&mut controller, &mut rx, |c| {
            c.state() == SessionState::SessionActive
        })
        .await;

        let credentials = std::fs::read_to_string(dir.path().join("credentials")).unwrap();
        assert!(credentials.contains("[acme-dev]"));
        assert!(!credentials.contains("[default]"));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(
            store
                .credential_profile_name("acme", "dev", "Developer")
                .unwrap(),
            "acme-dev"
        );
    }

    #[tokio::test]
    async fn stale_request_ids_are_dropped_after_profile_switch() {
        let mock = MockSsoApi::new()
            .with_accounts_for_token("tok-p1", vec![summary("p1-acct", "111111111111")])
            .with_accounts_for_token("tok-p2", vec![summary("p2-acct", "222222222222")]);
        let (_mock, store, mut controller, mut rx, _dir) =
            controller_with(mock, &[profile("p1"), profile("p2")]);
        cache_token(&store, "https://p1.awsapps.com/start", "tok-p1");
        cache_token(&store, "https://p2.awsapps.com/start", "tok-p2");

        // Enter p1 and accept its auth, so its account fetch is in flight.
        controller.select_profile("p1").await.unwrap();
        pump_until(&mut controller, &mut rx, |c| c.access_token().is_some()).await;

        // Escape and pick p2 before p1's fetch lands.
        controller.escape();
        assert_eq!(controller.state(), SessionState::SelectProfile);
        controller.select_profile("p2").await.unwrap();

        pump_until(&mut controller, &mut rx, |c| {
            c.catalog().get("222222222222").is_some()
        })
        .await;
        drain(&mut controller, &mut rx);

        // p1's late completion changed nothing.
        assert!(controller.catalog().get("111111111111").is_none());
        assert_eq!(controller.catalog().len(), 1);
        assert!(store
            .load_cached_accounts("https://p1.awsapps.com/start")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn auth_failure_returns_to_profile_selection() {
        let mock = MockSsoApi::new().with_token_script(vec![
            crate::aws::mock::TokenStep::Expired,
        ]);
        let (_mock, _store, mut controller, mut rx, _dir) =
            controller_with(mock, &[profile("acme")]);

        controller.select_profile("acme").await.unwrap();
        pump_until(&mut controller, &mut rx, |c| {
            c.state() == SessionState::SelectProfile
        })
        .await;

        assert!(controller.error_message().is_some());
        assert!(controller.access_token().is_none());
    }

    #[tokio::test]
    async fn cached_accounts_render_before_fresh_fetch_completes() {
        let mock = MockSsoApi::new().with_accounts(vec![
            summary("fresh", "111111111111"),
            summary("stale", "222222222222"),
        ]);
        let (_mock, store, mut controller, mut rx, _dir) = controller_with(mock, &[profile("acme")]);
        cache_token(&store, START_URL, "tok");
        store
            .save_cached_accounts(
                "acme",
                START_URL,
                &[
                    Account::new("stale", "222222222222"),
                    Account::new("gone", "999999999999"),
                ],
            )
            .unwrap();

        controller.select_profile("acme").await.unwrap();

        // Cached accounts are visible immediately, flagged as cached.
        assert!(controller.using_cached_accounts());
        assert_eq!(controller.catalog().len(), 2);
        assert!(controller.catalog().get("999999999999").is_some());

        pump_until(&mut controller, &mut rx, |c| !c.using_cached_accounts()).await;

        // The fresh listing replaced the cache: "gone" vanished.
        assert!(controller.catalog().get("999999999999").is_none());
        assert!(controller.catalog().get("111111111111").is_some());
    }

    #[tokio::test]
    async fn add_profile_rejects_duplicate_names() {
        let (_mock, _store, mut controller, _rx, _dir) =
            controller_with(MockSsoApi::new(), &[profile("acme")]);

        let result = controller.add_profile(profile("acme"));
        assert!(matches!(result, Err(SeshError::ConfigError(_))));

        controller.add_profile(profile("beta")).unwrap();
        assert_eq!(controller.profiles().len(), 2);
    }

    #[tokio::test]
    async fn delete_profile_persists() {
        let (_mock, store, mut controller, _rx, _dir) =
            controller_with(MockSsoApi::new(), &[profile("acme"), profile("beta")]);

        controller.delete_profile("acme").unwrap();
        assert_eq!(controller.profiles().len(), 1);
        assert!(!store
            .load_profiles()
            .unwrap()
            .iter()
            .any(|p| p.name == "acme"));
    }

    #[tokio::test]
    async fn credentials_failure_returns_to_account_selection() {
        // The fetch succeeds; the write fails because the credentials path
        // is a directory.
        let mock = MockSsoApi::new()
            .with_accounts(vec![summary("dev", "123456789012")])
            .with_roles("123456789012", vec!["Developer"]);
        let (_mock, store, mut controller, mut rx, dir) = controller_with(mock, &[profile("acme")]);
        cache_token(&store, START_URL, "tok");
        std::fs::create_dir(dir.path().join("credentials")).unwrap();

        controller.select_profile("acme").await.unwrap();
        pump_until(&mut controller, &mut rx, |c| {
            c.catalog().get("123456789012").map(|a| a.roles_loaded()) == Some(true)
        })
        .await;

        controller.select_account("dev").unwrap();
        controller.confirm_role("Developer").unwrap();
        pump_until(&mut controller, &mut rx, |c| {
            c.state() == SessionState::SelectAccount
        })
        .await;

        assert!(controller.error_message().is_some());
        assert!(controller.active_session().is_none());
    }
}

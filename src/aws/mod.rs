//! Typed facade over the AWS SSO and SSO-OIDC endpoints.
//!
//! [`SsoApi`] is the seam the rest of the crate talks through; [`SdkClient`]
//! is the production implementation, bound to an SSO region at
//! construction. Pagination is walked exhaustively inside the client so
//! callers always see complete listings.

#[cfg(test)]
pub mod mock;

use crate::error::{Result, SeshError};
use crate::models::{AccountSummary, DeviceAuthorization, RoleCredentials};
use async_trait::async_trait;
use aws_sdk_sso::Client as SsoClient;
use aws_sdk_ssooidc::Client as SsoOidcClient;
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

const CLIENT_NAME: &str = "sesh";
const CLIENT_TYPE: &str = "public";
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Remote operations the identity broker needs. Mock implementations back
/// every end-to-end test.
#[async_trait]
pub trait SsoApi: Send + Sync {
    /// Register a public OIDC client, returning `(client_id, client_secret)`.
    async fn register_client(&self) -> Result<(String, String)>;

    async fn start_device_authorization(
        &self,
        client_id: &str,
        client_secret: &str,
        start_url: &str,
    ) -> Result<DeviceAuthorization>;

    /// Exchange the device code for an access token. Pending and pacing
    /// conditions surface as the typed errors `AuthorizationPending`,
    /// `SlowDown`, and `AuthorizationExpired`.
    async fn create_token(&self, auth: &DeviceAuthorization) -> Result<String>;

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<AccountSummary>>;

    async fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<String>>;

    async fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials>;
}

/// Builds an [`SsoApi`] client bound to an SSO region. The indirection
/// exists so the session controller can be driven against mocks.
#[async_trait]
pub trait SsoApiFactory: Send + Sync {
    async fn client_for(&self, sso_region: &str) -> Result<Arc<dyn SsoApi>>;
}

/// Production factory: one [`SdkClient`] per requested region.
pub struct SdkClientFactory;

#[async_trait]
impl SsoApiFactory for SdkClientFactory {
    async fn client_for(&self, sso_region: &str) -> Result<Arc<dyn SsoApi>> {
        Ok(Arc::new(SdkClient::new(sso_region).await?))
    }
}

/// Identity Center portal dashboard URL for a start URL.
pub fn dashboard_url(start_url: &str) -> String {
    let portal = start_url.trim_end_matches("/start");
    format!("{portal}/start/#/?tab=accounts")
}

/// Console deep link for an account/role through the Identity Center portal.
pub fn console_url(start_url: &str, account_id: &str, role_name: &str) -> String {
    let portal = start_url.trim_end_matches("/start");
    format!("{portal}/start/#/console?account_id={account_id}&role_name={role_name}")
}

/// Production client wrapping the SSO and SSO-OIDC SDK clients for one
/// region. The region here routes API calls; it is independent of the
/// region stamped onto issued credentials.
pub struct SdkClient {
    sso: SsoClient,
    oidc: SsoOidcClient,
}

impl SdkClient {
    pub async fn new(region: &str) -> Result<Self> {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Ok(Self {
            sso: SsoClient::new(&config),
            oidc: SsoOidcClient::new(&config),
        })
    }
}

#[async_trait]
impl SsoApi for SdkClient {
    async fn register_client(&self) -> Result<(String, String)> {
        tracing::debug!("registering client with SSO-OIDC");

        let response = self
            .oidc
            .register_client()
            .client_name(CLIENT_NAME)
            .client_type(CLIENT_TYPE)
            .send()
            .await
            .map_err(|e| SeshError::AwsSdk(format!("failed to register client: {e}")))?;

        let client_id = response
            .client_id()
            .ok_or_else(|| SeshError::AwsSdk("no client_id in response".to_string()))?
            .to_string();
        let client_secret = response
            .client_secret()
            .ok_or_else(|| SeshError::AwsSdk("no client_secret in response".to_string()))?
            .to_string();

        Ok((client_id, client_secret))
    }

    async fn start_device_authorization(
        &self,
        client_id: &str,
        client_secret: &str,
        start_url: &str,
    ) -> Result<DeviceAuthorization> {
        tracing::debug!("starting device authorization for {start_url}");

        let response = self
            .oidc
            .start_device_authorization()
            .client_id(client_id)
            .client_secret(client_secret)
            .start_url(start_url)
            .send()
            .await
            .map_err(|e| SeshError::AwsSdk(format!("failed to start device authorization: {e}")))?;

        let device_code = response
            .device_code()
            .ok_or_else(|| SeshError::AwsSdk("no device_code in response".to_string()))?
            .to_string();
        let user_code = response
            .user_code()
            .ok_or_else(|| SeshError::AwsSdk("no user_code in response".to_string()))?
            .to_string();
        let verification_uri = response
            .verification_uri()
            .ok_or_else(|| SeshError::AwsSdk("no verification_uri in response".to_string()))?
            .to_string();
        let verification_uri_complete = response
            .verification_uri_complete()
            .unwrap_or(&verification_uri)
            .to_string();

        let interval_secs = if response.interval() > 0 {
            response.interval() as u64
        } else {
            DEFAULT_POLL_INTERVAL_SECS
        };

        Ok(DeviceAuthorization {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            device_code,
            user_code,
            verification_uri,
            verification_uri_complete,
            interval_secs,
            expires_at: Utc::now() + Duration::seconds(response.expires_in() as i64),
            start_url: start_url.to_string(),
        })
    }

    async fn create_token(&self, auth: &DeviceAuthorization) -> Result<String> {
        let result = self
            .oidc
            .create_token()
            .client_id(&auth.client_id)
            .client_secret(&auth.client_secret)
            .grant_type(DEVICE_GRANT_TYPE)
            .device_code(&auth.device_code)
            .send()
            .await;

        match result {
            Ok(response) => response
                .access_token()
                .map(str::to_string)
                .ok_or_else(|| SeshError::AwsSdk("no access_token in response".to_string())),
            Err(err) => {
                use aws_sdk_ssooidc::error::ProvideErrorMetadata;

                match err.code() {
                    Some("AuthorizationPendingException") => Err(SeshError::AuthorizationPending),
                    Some("SlowDownException") => Err(SeshError::SlowDown),
                    Some("ExpiredTokenException") => Err(SeshError::AuthorizationExpired),
                    Some(code) => Err(SeshError::AwsSdk(format!(
                        "token creation failed with '{code}': {}",
                        err.message().unwrap_or("unknown error")
                    ))),
                    None => Err(SeshError::AwsSdk(format!("token creation failed: {err}"))),
                }
            }
        }
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<AccountSummary>> {
        let mut accounts = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self.sso.list_accounts().access_token(access_token);
            if let Some(token) = next_token {
                request = request.next_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SeshError::AwsSdk(format!("failed to list accounts: {e}")))?;

            for account in response.account_list() {
                accounts.push(AccountSummary {
                    name: account.account_name().unwrap_or_default().to_string(),
                    account_id: account.account_id().unwrap_or_default().to_string(),
                });
            }

            next_token = response.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        Ok(accounts)
    }

    async fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<String>> {
        let mut roles = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self
                .sso
                .list_account_roles()
                .access_token(access_token)
                .account_id(account_id);
            if let Some(token) = next_token {
                request = request.next_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SeshError::AwsSdk(format!("failed to list account roles: {e}")))?;

            for role in response.role_list() {
                if let Some(role_name) = role.role_name() {
                    roles.push(role_name.to_string());
                }
            }

            next_token = response.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        Ok(roles)
    }

    async fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials> {
        let response = self
            .sso
            .get_role_credentials()
            .access_token(access_token)
            .account_id(account_id)
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| SeshError::AwsSdk(format!("failed to get role credentials: {e}")))?;

        let creds = response
            .role_credentials()
            .ok_or_else(|| SeshError::AwsSdk("no role_credentials in response".to_string()))?;

        let expiration = Utc
            .timestamp_millis_opt(creds.expiration())
            .single()
            .ok_or_else(|| SeshError::AwsSdk("invalid expiration timestamp".to_string()))?;

        Ok(RoleCredentials {
            access_key_id: creds
                .access_key_id()
                .ok_or_else(|| SeshError::AwsSdk("no access_key_id in credentials".to_string()))?
                .to_string(),
            secret_access_key: creds
                .secret_access_key()
                .ok_or_else(|| {
                    SeshError::AwsSdk("no secret_access_key in credentials".to_string())
                })?
                .to_string(),
            session_token: creds
                .session_token()
                .ok_or_else(|| SeshError::AwsSdk("no session_token in credentials".to_string()))?
                .to_string(),
            expiration,
        })
    }
}

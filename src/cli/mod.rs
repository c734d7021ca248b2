//! Command-line surface.
//!
//! Zero positional arguments launch the TUI (or, with `-b`, reopen the
//! console for the most recent session). Two or three positionals run a
//! non-interactive "direct session" that authenticates, resolves a role,
//! and writes credentials or opens the console.

use crate::aws::{self, SdkClient, SsoApi};
use crate::auth::AuthOrchestrator;
use crate::browser;
use crate::error::{Result, SeshError};
use crate::models::{RequestId, RoleCredentials, SsoProfile};
use crate::session::Event;
use crate::store::Store;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;

const FALLBACK_ROLE: &str = "AdministratorAccess";

pub const USAGE: &str = "Usage: sesh [options] [SSO_NAME ACCOUNT_NAME [ROLE_NAME]]\n\
Options:\n\
  -v, --version          Print version information\n\
  -b, --browser          Open the AWS console in the browser\n\
  -r, --region REGION    Override the AWS region for the session\n\
  -e, --eval             Print shell export lines for eval\n\
  -p, --profile PROFILE  Credential profile name to write under";

#[derive(Parser, Debug)]
#[command(name = "sesh")]
#[command(about = "Terminal session manager for AWS IAM Identity Center", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Print version information
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Open the AWS console in the browser instead of writing credentials
    #[arg(short = 'b', long = "browser")]
    pub browser: bool,

    /// Override the AWS region stamped onto issued credentials
    #[arg(short = 'r', long = "region")]
    pub region: Option<String>,

    /// Print shell export lines so a wrapper can `eval "$(sesh -e ...)"`
    #[arg(short = 'e', long = "eval")]
    pub eval: bool,

    /// Credential profile name to write under (default: "default")
    #[arg(short = 'p', long = "profile")]
    pub profile: Option<String>,

    /// SSO_NAME ACCOUNT_NAME [ROLE_NAME]
    #[arg(value_name = "ARGS")]
    pub args: Vec<String>,
}

pub async fn execute(cli: Cli) -> Result<()> {
    if cli.version {
        println!("sesh {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match cli.args.len() {
        0 => {
            if cli.browser {
                open_last_session_console().await
            } else {
                crate::ui::run(cli.region, cli.profile).await
            }
        }
        2 | 3 => {
            let sso_name = cli.args[0].clone();
            let account_name = cli.args[1].clone();
            let role_arg = cli.args.get(2).cloned();
            direct_session(DirectSessionArgs {
                sso_name,
                account_name,
                role_arg,
                browser: cli.browser,
                region: cli.region,
                eval: cli.eval,
                credential_profile: cli.profile,
            })
            .await
        }
        n => {
            let problem = if n < 2 {
                "too few arguments"
            } else {
                "too many arguments"
            };
            Err(SeshError::ConfigError(format!("{problem}\n\n{USAGE}")))
        }
    }
}

struct DirectSessionArgs {
    sso_name: String,
    account_name: String,
    role_arg: Option<String>,
    browser: bool,
    region: Option<String>,
    eval: bool,
    credential_profile: Option<String>,
}

/// Pick the role for a direct session: explicit argument, then the saved
/// last-used role, then the first available, then the conventional admin
/// fallback.
fn resolve_role(
    role_arg: Option<&str>,
    last_used: &str,
    available: &[String],
    account_name: &str,
) -> Result<String> {
    if let Some(role) = role_arg {
        if !available.is_empty() && !available.iter().any(|r| r == role) {
            return Err(SeshError::RoleNotFound(
                role.to_string(),
                account_name.to_string(),
            ));
        }
        return Ok(role.to_string());
    }

    if !last_used.is_empty() && available.iter().any(|r| r == last_used) {
        return Ok(last_used.to_string());
    }

    if let Some(first) = available.first() {
        return Ok(first.clone());
    }

    // Role listing failed or came back empty; an explicitly saved role is
    // still worth trying before the blanket fallback.
    if !last_used.is_empty() {
        return Ok(last_used.to_string());
    }

    Ok(FALLBACK_ROLE.to_string())
}

/// Shell lines for `eval "$(sesh -e ...)"`.
fn eval_exports(profile_name: &str, region: &str, creds: &RoleCredentials) -> String {
    format!(
        "export AWS_PROFILE={profile_name}\n\
         export AWS_REGION={region}\n\
         export AWS_ACCESS_KEY_ID={}\n\
         export AWS_SECRET_ACCESS_KEY={}\n\
         export AWS_SESSION_TOKEN={}\n\
         export AWS_SESSION_EXPIRATION={}\n",
        creds.access_key_id,
        creds.secret_access_key,
        creds.session_token,
        creds.expiration.to_rfc3339(),
    )
}

fn find_profile(store: &Store, name: &str) -> Result<SsoProfile> {
    store
        .load_profiles()?
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| SeshError::ProfileNotFound(name.to_string()))
}

/// Authenticate against a profile, reusing the device-flow orchestrator
/// with its events rendered to the terminal. Returns the access token.
async fn authenticate(
    client: Arc<dyn SsoApi>,
    store: &Store,
    profile: &SsoProfile,
) -> Result<String> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = AuthOrchestrator::new(client, store.clone(), tx, true);
    orchestrator.begin_login(profile.start_url.clone(), RequestId::new(&profile.name));

    while let Some(event) = rx.recv().await {
        match event {
            Event::DeviceAuthStarted {
                verification_uri,
                verification_uri_complete,
                user_code,
                ..
            } => {
                eprintln!("Your browser should open automatically for SSO login.");
                eprintln!("If it doesn't, authenticate manually:");
                eprintln!();
                eprintln!("  1. Visit: {verification_uri}");
                eprintln!("  2. Enter code: {user_code}");
                eprintln!();
                eprintln!("Or open directly: {verification_uri_complete}");
                eprintln!();
                eprintln!("Waiting for authorization...");
            }
            Event::AuthPollTick { .. } => {}
            Event::AuthSucceeded { access_token, .. } => return Ok(access_token),
            Event::AuthFailed { error, .. } => return Err(error),
            _ => {}
        }
    }

    Err(SeshError::NoSessionFound)
}

async fn direct_session(args: DirectSessionArgs) -> Result<()> {
    let store = Store::new()?;
    let profile = find_profile(&store, &args.sso_name)?;

    let client: Arc<dyn SsoApi> = Arc::new(SdkClient::new(&profile.sso_region).await?);
    let access_token = authenticate(client.clone(), &store, &profile).await?;

    let accounts = client.list_accounts(&access_token).await?;
    let account = accounts
        .into_iter()
        .find(|a| a.name == args.account_name)
        .ok_or_else(|| SeshError::AccountNotFound(args.account_name.clone()))?;

    let roles = match client
        .list_account_roles(&access_token, &account.account_id)
        .await
    {
        Ok(roles) => roles,
        Err(e) if args.role_arg.is_some() => {
            tracing::warn!("failed to list roles, proceeding with the specified role: {e}");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let last_used = store.last_role(&profile.name, &account.name).unwrap_or_default();
    let role_name = resolve_role(args.role_arg.as_deref(), &last_used, &roles, &account.name)?;

    let region = match &args.region {
        Some(region) if !region.is_empty() => region.clone(),
        _ => {
            let saved = store
                .account_region(&profile.name, &account.name)
                .unwrap_or_default();
            if saved.is_empty() {
                profile.default_region.clone()
            } else {
                saved
            }
        }
    };

    if args.browser {
        let url = aws::console_url(&profile.start_url, &account.account_id, &role_name);
        eprintln!(
            "Opening AWS Console for {} / {} / {role_name}",
            profile.name, account.name
        );
        if let Err(e) = browser::open(&url) {
            eprintln!("Warning: failed to open browser automatically: {e}");
            eprintln!("URL: {url}");
        }
    } else {
        let creds = client
            .get_role_credentials(&access_token, &account.account_id, &role_name)
            .await?;

        let credential_profile = match &args.credential_profile {
            Some(name) if !name.is_empty() => name.clone(),
            _ => {
                let saved = store
                    .credential_profile_name(&profile.name, &account.name, &role_name)
                    .unwrap_or_default();
                if saved.is_empty() {
                    "default".to_string()
                } else {
                    saved
                }
            }
        };

        store.write_credentials(&creds, &region, &credential_profile)?;

        if args.eval {
            print!("{}", eval_exports(&credential_profile, &region, &creds));
            eprintln!("Session ready for {} / {} / {role_name}", profile.name, account.name);
        } else {
            println!();
            println!("  SSO Profile: {}", profile.name);
            println!("  Account:     {} ({})", account.name, account.account_id);
            println!("  Role:        {role_name}");
            println!("  Region:      {region}");
            println!();
        }

        if let Some(custom) = args.credential_profile.as_deref().filter(|c| !c.is_empty()) {
            if let Err(e) =
                store.set_credential_profile_name(&profile.name, &account.name, &role_name, custom)
            {
                tracing::warn!("failed to save credential profile name: {e}");
            }
        }
    }

    if let Err(e) = store.set_last_sso_profile(&profile.name) {
        tracing::warn!("failed to save last selected SSO profile: {e}");
    }
    if let Err(e) = store.set_last_account(&profile.name, &account.name) {
        tracing::warn!("failed to save last selected account: {e}");
    }
    if let Err(e) = store.set_last_role(&profile.name, &account.name, &role_name) {
        tracing::warn!("failed to save last selected role: {e}");
    }

    Ok(())
}

/// `sesh -b` with no positionals: reopen the console for the most recent
/// profile/account/role using the cached token.
async fn open_last_session_console() -> Result<()> {
    let store = Store::new()?;

    let last_profile = store.last_sso_profile()?;
    if last_profile.is_empty() {
        return Err(SeshError::ConfigError(
            "could not determine the last used SSO profile; \
             run 'sesh' interactively or 'sesh <SSO_NAME> <ACCOUNT_NAME>' first"
                .to_string(),
        ));
    }

    let profile = find_profile(&store, &last_profile)?;

    let token = store
        .load_token(&profile.start_url)?
        .ok_or(SeshError::NoSessionFound)?;

    let last_account = store.last_account(&profile.name)?;
    if last_account.is_empty() {
        return Err(SeshError::ConfigError(format!(
            "could not determine the last used account for profile '{}'",
            profile.name
        )));
    }

    let mut role_name = store.last_role(&profile.name, &last_account)?;
    if role_name.is_empty() {
        tracing::warn!(
            "last used role not found for {}/{last_account}, falling back to {FALLBACK_ROLE}",
            profile.name
        );
        role_name = FALLBACK_ROLE.to_string();
    }

    // The console URL needs the account ID, which only the listing has.
    let client: Arc<dyn SsoApi> = Arc::new(SdkClient::new(&profile.sso_region).await?);
    let accounts = client.list_accounts(&token.access_token).await?;
    let account = accounts
        .into_iter()
        .find(|a| a.name == last_account)
        .ok_or_else(|| SeshError::AccountNotFound(last_account.clone()))?;

    let url = aws::console_url(&profile.start_url, &account.account_id, &role_name);
    eprintln!(
        "Opening AWS Console for {} / {last_account} / {role_name}",
        profile.name
    );
    if let Err(e) = browser::open(&url) {
        eprintln!("Warning: failed to open browser automatically: {e}");
        eprintln!("URL: {url}");
    }

    Ok(())
}

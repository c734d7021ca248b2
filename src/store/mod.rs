//! On-disk persistence for profiles, tokens, cached accounts, preferences,
//! and AWS credentials.
//!
//! All four sesh files live next to the AWS config file so a user's SSO
//! state stays in one place. Every write mutates an in-memory copy and then
//! replaces the whole file atomically; readers never observe a partial
//! update.

mod accounts;
mod credentials;
pub mod ini;
mod tokens;

use crate::error::{Result, SeshError};
use crate::models::SsoProfile;
use ini::IniFile;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const PROFILES_FILE: &str = "sesh";
const TOKENS_FILE: &str = "sesh-tokens";
const ACCOUNTS_FILE: &str = "sesh-accounts";
const METADATA_SECTION: &str = "metadata";

/// File mode for everything holding credential material (Unix only).
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Mode for created parent directories (Unix only).
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// AWS config file path, respecting `AWS_CONFIG_FILE`.
pub fn aws_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("AWS_CONFIG_FILE") {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".aws").join("config"))
        .ok_or_else(|| SeshError::ConfigError("could not determine home directory".to_string()))
}

/// AWS credentials file path, respecting `AWS_SHARED_CREDENTIALS_FILE`.
pub fn aws_credentials_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".aws").join("credentials"))
        .ok_or_else(|| SeshError::ConfigError("could not determine home directory".to_string()))
}

/// Handle on the persistence tier. Cheap to clone paths; every operation
/// re-reads the backing file so concurrent invocations see each other's
/// writes.
#[derive(Debug, Clone)]
pub struct Store {
    profiles_path: PathBuf,
    tokens_path: PathBuf,
    accounts_path: PathBuf,
    aws_config_path: PathBuf,
    credentials_path: PathBuf,
}

impl Store {
    /// Resolve paths from the environment: sesh files live alongside the
    /// AWS config file.
    pub fn new() -> Result<Self> {
        let aws_config = aws_config_path()?;
        let aws_dir = aws_config
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| SeshError::ConfigError("AWS config path has no parent".to_string()))?;

        Ok(Self {
            profiles_path: aws_dir.join(PROFILES_FILE),
            tokens_path: aws_dir.join(TOKENS_FILE),
            accounts_path: aws_dir.join(ACCOUNTS_FILE),
            aws_config_path: aws_config,
            credentials_path: aws_credentials_path()?,
        })
    }

    /// Store rooted at an explicit directory. Used by tests and anything
    /// else that must not touch the real `~/.aws`.
    pub fn at_dir(dir: &Path) -> Self {
        Self {
            profiles_path: dir.join(PROFILES_FILE),
            tokens_path: dir.join(TOKENS_FILE),
            accounts_path: dir.join(ACCOUNTS_FILE),
            aws_config_path: dir.join("config"),
            credentials_path: dir.join("credentials"),
        }
    }

    pub(crate) fn tokens_path(&self) -> &Path {
        &self.tokens_path
    }

    pub(crate) fn accounts_path(&self) -> &Path {
        &self.accounts_path
    }

    pub(crate) fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    /// Union of SSO profiles from the AWS config file and the sesh profile
    /// store. Sesh entries win on name collision. Missing files read as
    /// empty.
    pub fn load_profiles(&self) -> Result<Vec<SsoProfile>> {
        let mut profiles: Vec<SsoProfile> = Vec::new();

        for profile in self.load_aws_config_profiles()? {
            profiles.push(profile);
        }

        let doc = read_ini(&self.profiles_path)?;
        for section in doc.sections() {
            if section.name == METADATA_SECTION {
                continue;
            }
            let Some(start_url) = section.get("start_url") else {
                continue;
            };
            if start_url.is_empty() {
                continue;
            }
            let sso_region = section.get("sso_region").unwrap_or_default().to_string();
            let default_region = section
                .get("default_region")
                .filter(|r| !r.is_empty())
                .unwrap_or(&sso_region)
                .to_string();

            let profile = SsoProfile {
                name: section.name.clone(),
                start_url: start_url.to_string(),
                sso_region,
                default_region,
            };

            if let Some(existing) = profiles.iter_mut().find(|p| p.name == profile.name) {
                *existing = profile;
            } else {
                profiles.push(profile);
            }
        }

        Ok(profiles)
    }

    /// SSO-flavored profiles declared in the AWS config file itself
    /// (sections carrying `sso_start_url`).
    fn load_aws_config_profiles(&self) -> Result<Vec<SsoProfile>> {
        let doc = read_ini(&self.aws_config_path)?;
        let mut profiles = Vec::new();

        for section in doc.sections() {
            let name = section
                .name
                .strip_prefix("profile ")
                .unwrap_or(&section.name)
                .to_string();

            let Some(start_url) = section.get("sso_start_url") else {
                continue;
            };
            if start_url.is_empty() {
                continue;
            }

            let sso_region = section.get("sso_region").unwrap_or_default().to_string();
            let default_region = section
                .get("region")
                .filter(|r| !r.is_empty())
                .unwrap_or(&sso_region)
                .to_string();

            profiles.push(SsoProfile {
                name,
                start_url: start_url.to_string(),
                sso_region,
                default_region,
            });
        }

        Ok(profiles)
    }

    /// Rewrite the sesh profile store. The `metadata` section and any
    /// preference keys of still-present profiles survive the rewrite.
    pub fn save_profiles(&self, profiles: &[SsoProfile]) -> Result<()> {
        let old = read_ini(&self.profiles_path)?;
        let mut doc = IniFile::default();

        for profile in profiles {
            let section = doc.ensure_section(&profile.name);
            section.set("start_url", &profile.start_url);
            section.set("sso_region", &profile.sso_region);
            section.set("default_region", &profile.default_region);

            // Carry over preference keys saved under this profile.
            if let Some(old_section) = old.section(&profile.name) {
                for (key, value) in old_section.entries() {
                    if !matches!(key, "start_url" | "sso_region" | "default_region") {
                        section.set(key, value);
                    }
                }
            }
        }

        if let Some(metadata) = old.section(METADATA_SECTION) {
            let section = doc.ensure_section(METADATA_SECTION);
            for (key, value) in metadata.entries() {
                section.set(key, value);
            }
        }

        self.save_ini(&self.profiles_path, &doc)
    }

    // ------------------------------------------------------------------
    // Preferences. Empty string means "unset" on read; setters create the
    // enclosing section on demand.
    // ------------------------------------------------------------------

    pub fn last_sso_profile(&self) -> Result<String> {
        let doc = read_ini(&self.profiles_path)?;
        Ok(doc
            .get(METADATA_SECTION, "last_sso_profile")
            .unwrap_or_default()
            .to_string())
    }

    pub fn set_last_sso_profile(&self, profile_name: &str) -> Result<()> {
        self.update_profiles_doc(|doc| {
            doc.set(METADATA_SECTION, "last_sso_profile", profile_name);
        })
    }

    pub fn last_account(&self, profile_name: &str) -> Result<String> {
        let doc = read_ini(&self.profiles_path)?;
        Ok(doc
            .get(profile_name, "last_account")
            .unwrap_or_default()
            .to_string())
    }

    pub fn set_last_account(&self, profile_name: &str, account_name: &str) -> Result<()> {
        self.update_profiles_doc(|doc| {
            doc.set(profile_name, "last_account", account_name);
        })
    }

    pub fn last_role(&self, profile_name: &str, account_name: &str) -> Result<String> {
        let doc = read_ini(&self.profiles_path)?;
        Ok(doc
            .get(profile_name, &format!("last_role_{account_name}"))
            .unwrap_or_default()
            .to_string())
    }

    pub fn set_last_role(
        &self,
        profile_name: &str,
        account_name: &str,
        role_name: &str,
    ) -> Result<()> {
        self.update_profiles_doc(|doc| {
            doc.set(profile_name, &format!("last_role_{account_name}"), role_name);
        })
    }

    pub fn account_region(&self, profile_name: &str, account_name: &str) -> Result<String> {
        let doc = read_ini(&self.profiles_path)?;
        Ok(doc
            .get(profile_name, &format!("region_{account_name}"))
            .unwrap_or_default()
            .to_string())
    }

    pub fn set_account_region(
        &self,
        profile_name: &str,
        account_name: &str,
        region: &str,
    ) -> Result<()> {
        self.update_profiles_doc(|doc| {
            doc.set(profile_name, &format!("region_{account_name}"), region);
        })
    }

    pub fn credential_profile_name(
        &self,
        profile_name: &str,
        account_name: &str,
        role_name: &str,
    ) -> Result<String> {
        let doc = read_ini(&self.profiles_path)?;
        Ok(doc
            .get(
                profile_name,
                &format!("profile_name_{account_name}_{role_name}"),
            )
            .unwrap_or_default()
            .to_string())
    }

    pub fn set_credential_profile_name(
        &self,
        profile_name: &str,
        account_name: &str,
        role_name: &str,
        credential_profile: &str,
    ) -> Result<()> {
        self.update_profiles_doc(|doc| {
            doc.set(
                profile_name,
                &format!("profile_name_{account_name}_{role_name}"),
                credential_profile,
            );
        })
    }

    fn update_profiles_doc(&self, mutate: impl FnOnce(&mut IniFile)) -> Result<()> {
        let mut doc = read_ini(&self.profiles_path)?;
        mutate(&mut doc);
        self.save_ini(&self.profiles_path, &doc)
    }

    pub(crate) fn save_ini(&self, path: &Path, doc: &IniFile) -> Result<()> {
        write_atomic(path, &doc.render())?;
        Ok(())
    }
}

pub(crate) fn read_ini(path: &Path) -> Result<IniFile> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(IniFile::parse(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IniFile::default()),
        Err(e) => Err(e.into()),
    }
}

/// Write `content` to `path` via a temp sibling and rename. The file is
/// created 0600 and missing parent directories 0700 before any bytes land.
pub(crate) fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(parent, fs::Permissions::from_mode(DIR_MODE))?;
            }
        }
    }

    let temp_path = path.with_extension("tmp");

    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }
        let mut file = options.open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

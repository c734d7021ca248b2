use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeshError {
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Authorization pending - user must complete device flow")]
    AuthorizationPending,

    #[error("Polling too fast - server requested slow down")]
    SlowDown,

    #[error("Device code expired - user took too long to complete device flow")]
    AuthorizationExpired,

    #[error("Authentication timed out")]
    AuthenticationTimedOut,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SSO profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("Account '{0}' not found")]
    AccountNotFound(String),

    #[error("Role '{0}' not found for account '{1}'")]
    RoleNotFound(String, String),

    #[error("No active session found")]
    NoSessionFound,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),
}

pub type Result<T> = std::result::Result<T, SeshError>;

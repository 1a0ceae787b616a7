use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Lowest UID treated as a regular (human) account
pub const FIRST_REGULAR_UID: u32 = 1000;

/// Shells that mark an account as unable to log in
pub const NOLOGIN_SHELLS: &[&str] = &["/usr/sbin/nologin", "/sbin/nologin", "/bin/false", "/usr/bin/false"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemUser {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gecos: Option<String>,
    pub home: String,
    pub shell: String,
    pub locked: bool,
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserOptions {
    pub shell: Option<String>,
    pub home: Option<String>,
}

#[async_trait]
pub trait UserAccounts: Send + Sync {
    /// Regular accounts (UID >= 1000, excluding `nobody`)
    async fn list(&self) -> Result<Vec<SystemUser>>;

    async fn set_locked(&self, username: &str, locked: bool) -> Result<()>;

    /// Delete the account together with its home directory
    async fn delete(&self, username: &str) -> Result<()>;

    async fn create(&self, username: &str, options: &NewUserOptions) -> Result<()>;

    /// Set a new password; it travels on the tool's stdin, never in argv
    async fn change_password(&self, username: &str, password: &str) -> Result<()>;
}

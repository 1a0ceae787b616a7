use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::ActionOutcome;
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageStatus {
    Installed,
    ConfigFiles,
    HalfInstalled,
    NotInstalled,
}

impl PackageStatus {
    /// Map a dpkg `${Status}` string onto the four states we report.
    pub fn from_dpkg(status: &str) -> Self {
        if status.contains("install ok installed") {
            Self::Installed
        } else if status.contains("deinstall ok config-files") {
            Self::ConfigFiles
        } else if status.contains("half-installed") {
            Self::HalfInstalled
        } else {
            Self::NotInstalled
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UbuntuPackage {
    pub name: String,
    pub version: String,
    pub status: PackageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSearchResult {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AptAction {
    Install,
    Remove,
    Purge,
    Update,
    Upgrade,
}

impl AptAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Purge => "purge",
            Self::Update => "update",
            Self::Upgrade => "upgrade",
        }
    }

    /// Whether the action operates on a single named package
    pub fn takes_package(&self) -> bool {
        matches!(self, Self::Install | Self::Remove | Self::Purge)
    }
}

impl fmt::Display for AptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AptAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(Self::Install),
            "remove" => Ok(Self::Remove),
            "purge" => Ok(Self::Purge),
            "update" => Ok(Self::Update),
            "upgrade" => Ok(Self::Upgrade),
            other => Err(ValidationError::UnknownName {
                kind: "apt action",
                value: other.to_string(),
            }),
        }
    }
}

#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn list_installed(&self, limit: usize) -> Result<Vec<UbuntuPackage>>;

    /// Search the package cache; a blank term returns nothing
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<PackageSearchResult>>;

    /// The package's `apt-cache show` record, verbatim
    async fn info(&self, name: &str) -> Result<String>;

    async fn execute(&self, action: AptAction, package: Option<&str>) -> Result<ActionOutcome>;
}

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::ActionOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Addresses in CIDR form, e.g. `192.168.1.10/24`
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallStatus {
    pub enabled: bool,
    /// Output of the status command as printed by the tool
    pub raw_status: String,
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
}

/// A static route to install; at least one of `gateway` or `interface` is usually given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub destination: String,
    pub gateway: Option<String>,
    pub interface: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOverview {
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<String>,
    pub forwarding_enabled: bool,
    pub interfaces: Vec<NetworkInterface>,
    pub firewall: FirewallStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "rule", rename_all = "lowercase")]
pub enum FirewallAction {
    Enable,
    Disable,
    /// Rule text handed to the firewall tool as a single argument
    Allow(String),
    Deny(String),
    /// Numbered rule as shown by `ufw status numbered`
    Delete(String),
    Reload,
}

impl FirewallAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Allow(_) => "allow",
            Self::Deny(_) => "deny",
            Self::Delete(_) => "delete",
            Self::Reload => "reload",
        }
    }
}

#[async_trait]
pub trait NetworkManager: Send + Sync {
    async fn overview(&self) -> Result<NetworkOverview>;

    async fn routes(&self) -> Result<Vec<Route>>;

    async fn firewall_status(&self) -> Result<FirewallStatus>;

    async fn firewall(&self, action: FirewallAction) -> Result<ActionOutcome>;

    /// Bring an interface administratively up or down
    async fn set_link(&self, interface: &str, up: bool) -> Result<ActionOutcome>;

    /// Add an address (`10.0.0.5/24`) to an interface
    async fn add_address(&self, interface: &str, cidr: &str) -> Result<ActionOutcome>;

    async fn delete_address(&self, interface: &str, cidr: &str) -> Result<ActionOutcome>;

    async fn add_route(&self, route: &RouteSpec) -> Result<ActionOutcome>;

    async fn delete_route(&self, destination: &str) -> Result<ActionOutcome>;
}

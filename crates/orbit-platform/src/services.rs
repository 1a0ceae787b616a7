use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::ActionOutcome;
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UbuntuService {
    /// Full unit name, e.g. `nginx.service`
    pub unit: String,
    /// Unit name without the `.service` suffix
    pub name: String,
    pub description: String,
    pub load: String,
    pub active: String,
    pub sub: String,
}

impl UbuntuService {
    pub fn new(unit: &str, load: &str, active: &str, sub: &str, description: &str) -> Self {
        Self {
            unit: unit.to_string(),
            name: unit.trim_end_matches(".service").to_string(),
            description: description.to_string(),
            load: load.to_string(),
            active: active.to_string(),
            sub: sub.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Reload,
    Enable,
    Disable,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "reload" => Ok(Self::Reload),
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            other => Err(ValidationError::UnknownName {
                kind: "service action",
                value: other.to_string(),
            }),
        }
    }
}

#[async_trait]
pub trait ServiceController: Send + Sync {
    /// All service units, in any state
    async fn list(&self) -> Result<Vec<UbuntuService>>;

    async fn act(&self, unit: &str, action: ServiceAction) -> Result<ActionOutcome>;

    /// Human-readable status report for one unit
    async fn status(&self, unit: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        let svc = UbuntuService::new("ssh.service", "loaded", "active", "running", "OpenBSD Secure Shell server");
        assert_eq!(svc.name, "ssh");
        assert_eq!(svc.unit, "ssh.service");
    }

    #[test]
    fn test_action_roundtrip_names() {
        for action in ["start", "stop", "restart", "reload", "enable", "disable"] {
            assert_eq!(action.parse::<ServiceAction>().unwrap().as_str(), action);
        }
        assert!("mask".parse::<ServiceAction>().is_err());
    }
}

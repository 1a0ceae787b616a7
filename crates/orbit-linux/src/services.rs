//! systemd service management: list units and start/stop/enable them.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use orbit_platform::command::{argv, ActionOutcome, CommandError, CommandRunner, RunOptions};
use orbit_platform::services::{ServiceAction, ServiceController, UbuntuService};
use orbit_platform::validate;

const LIST_UNITS: [&str; 5] = ["list-units", "--type=service", "--all", "--no-pager", "--no-legend"];

/// systemctl exits 3 from `status` when the unit is simply not running
const STATUS_NOT_RUNNING: i32 = 3;

pub struct SystemdServiceController {
    runner: Arc<dyn CommandRunner>,
}

/// One record of `systemctl list-units --output=json`
#[derive(Debug, Deserialize)]
struct ListedUnit {
    unit: String,
    #[serde(default)]
    load: String,
    #[serde(default)]
    active: String,
    #[serde(default)]
    sub: String,
    #[serde(default)]
    description: String,
}

/// Either form of the unit listing, reduced to the same typed result.
enum UnitListing {
    Structured(Vec<UbuntuService>),
    /// The host's systemctl cannot produce JSON; use the plain table instead.
    LegacyOnly,
}

impl SystemdServiceController {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn list_structured(&self) -> Result<UnitListing> {
        let mut args = argv(LIST_UNITS);
        args.push("--output=json".to_string());

        match self.runner.run("systemctl", &args, RunOptions::default()).await {
            Ok(out) => match serde_json::from_str::<Vec<ListedUnit>>(&out.stdout) {
                Ok(units) => Ok(UnitListing::Structured(
                    units
                        .into_iter()
                        .filter(|u| u.unit.ends_with(".service"))
                        .map(|u| UbuntuService::new(&u.unit, &u.load, &u.active, &u.sub, &u.description))
                        .collect(),
                )),
                Err(e) => {
                    warn!("systemctl JSON listing unreadable ({}), using plain listing", e);
                    Ok(UnitListing::LegacyOnly)
                }
            },
            Err(e) if rejects_json_output(&e) => {
                info!("systemctl has no JSON output, using plain listing");
                Ok(UnitListing::LegacyOnly)
            }
            Err(e) => Err(e).context("systemctl list-units failed"),
        }
    }

    async fn list_plain(&self) -> Result<Vec<UbuntuService>> {
        let out = self
            .runner
            .run("systemctl", &argv(LIST_UNITS), RunOptions::default())
            .await
            .context("systemctl list-units failed")?;
        Ok(parse_plain_units(&out.stdout))
    }
}

#[async_trait]
impl ServiceController for SystemdServiceController {
    async fn list(&self) -> Result<Vec<UbuntuService>> {
        match self.list_structured().await? {
            UnitListing::Structured(services) => Ok(services),
            UnitListing::LegacyOnly => self.list_plain().await,
        }
    }

    async fn act(&self, unit: &str, action: ServiceAction) -> Result<ActionOutcome> {
        validate::service_unit(unit)?;

        info!("systemctl {} {}", action, unit);
        let out = self
            .runner
            .run("systemctl", &argv([action.as_str(), unit]), RunOptions::elevated())
            .await
            .with_context(|| format!("systemctl {} {} failed", action, unit))?;

        Ok(ActionOutcome::from_output(
            &out,
            format!("systemctl {} {} completed", action, unit),
        ))
    }

    async fn status(&self, unit: &str) -> Result<String> {
        validate::service_unit(unit)?;

        match self
            .runner
            .run("systemctl", &argv(["status", unit, "--no-pager"]), RunOptions::default())
            .await
        {
            Ok(out) => Ok(out.stdout),
            Err(CommandError::Exit { code: Some(STATUS_NOT_RUNNING), stdout, .. }) => Ok(stdout),
            Err(e) => Err(e).with_context(|| format!("systemctl status {} failed", unit)),
        }
    }
}

/// Older systemctl builds reject `--output=json` as an invalid argument.
fn rejects_json_output(err: &CommandError) -> bool {
    let text = format!("{} {}", err, err.stderr()).to_lowercase();
    matches!(err, CommandError::Exit { .. })
        && (text.contains("invalid argument") || text.contains("unknown output"))
}

/// Parse whitespace-separated `UNIT LOAD ACTIVE SUB DESCRIPTION...` rows.
fn parse_plain_units(stdout: &str) -> Vec<UbuntuService> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            // Failed units are prefixed with a bullet marker in some versions
            let line = line.trim_start_matches(['●', '*']).trim_start();
            let mut parts = line.split_whitespace();
            let unit = parts.next()?;
            let load = parts.next().unwrap_or("");
            let active = parts.next().unwrap_or("");
            let sub = parts.next().unwrap_or("");
            let description = parts.collect::<Vec<_>>().join(" ");
            validate::is_service_unit(unit)
                .then(|| UbuntuService::new(unit, load, active, sub, &description))
        })
        .collect()
}

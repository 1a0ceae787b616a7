//! apt/dpkg package management.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use orbit_platform::command::{argv, ActionOutcome, CommandRunner, RunOptions};
use orbit_platform::error::ValidationError;
use orbit_platform::packages::{AptAction, PackageManager, PackageSearchResult, PackageStatus, UbuntuPackage};
use orbit_platform::validate;

const DPKG_FORMAT: &str = "-f=${Package}\\t${Version}\\t${Status}\\t${Priority}\\n";

pub struct AptPackageManager {
    runner: Arc<dyn CommandRunner>,
    /// apt-get runs (downloads, dpkg triggers) get a longer leash than queries
    apt_timeout: Duration,
}

impl AptPackageManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            apt_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_apt_timeout(mut self, timeout: Duration) -> Self {
        self.apt_timeout = timeout;
        self
    }
}

#[async_trait]
impl PackageManager for AptPackageManager {
    async fn list_installed(&self, limit: usize) -> Result<Vec<UbuntuPackage>> {
        let out = self
            .runner
            .run("dpkg-query", &argv(["-W", DPKG_FORMAT]), RunOptions::default())
            .await
            .context("dpkg-query failed")?;

        Ok(parse_dpkg_query(&out.stdout).into_iter().take(limit).collect())
    }

    async fn search(&self, term: &str, limit: usize) -> Result<Vec<PackageSearchResult>> {
        let query = term.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        // `--` keeps a term such as "-n" from being read as an option
        let out = self
            .runner
            .run("apt-cache", &argv(["search", "--", query]), RunOptions::default())
            .await
            .context("apt-cache search failed")?;

        Ok(parse_search(&out.stdout).into_iter().take(limit).collect())
    }

    async fn info(&self, name: &str) -> Result<String> {
        validate::package_name(name)?;
        let out = self
            .runner
            .run("apt-cache", &argv(["show", "--", name]), RunOptions::default())
            .await
            .with_context(|| format!("apt-cache show {} failed", name))?;
        Ok(out.stdout)
    }

    async fn execute(&self, action: AptAction, package: Option<&str>) -> Result<ActionOutcome> {
        let args = apt_args(action, package)?;

        info!("apt-get {}{}", action, package.map(|p| format!(" {}", p)).unwrap_or_default());

        let out = self
            .runner
            .run(
                "apt-get",
                &args,
                RunOptions::elevated().with_timeout(self.apt_timeout),
            )
            .await
            .with_context(|| format!("apt-get {} failed", action))?;

        Ok(ActionOutcome::from_output(
            &out,
            format!("apt-get {} completed", action),
        ))
    }
}

/// Validated argument vector for an apt-get action.
fn apt_args(action: AptAction, package: Option<&str>) -> Result<Vec<String>, ValidationError> {
    if !action.takes_package() {
        return Ok(match action {
            AptAction::Upgrade => argv(["upgrade", "-y"]),
            _ => argv([action.as_str()]),
        });
    }

    let name = package
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ValidationError::MissingPackage(action.to_string()))?;
    validate::package_name(name)?;
    Ok(argv([action.as_str(), "-y", "--", name]))
}

fn parse_dpkg_query(stdout: &str) -> Vec<UbuntuPackage> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let version = fields.next().unwrap_or("").to_string();
            let status = PackageStatus::from_dpkg(fields.next().unwrap_or(""));
            let priority = fields
                .next()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from);
            Some(UbuntuPackage {
                name: name.to_string(),
                version,
                status,
                priority,
                description: None,
            })
        })
        .collect()
}

fn parse_search(stdout: &str) -> Vec<PackageSearchResult> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| match line.split_once(" - ") {
            Some((name, description)) => PackageSearchResult {
                name: name.trim().to_string(),
                description: description.trim().to_string(),
            },
            None => PackageSearchResult {
                name: line.trim().to_string(),
                description: String::new(),
            },
        })
        .collect()
}

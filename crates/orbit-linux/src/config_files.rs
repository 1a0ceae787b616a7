//! A fixed registry of editable host configuration files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use orbit_platform::command::{argv, CommandRunner, RunOptions};
use orbit_platform::config_files::{ConfigStore, ManagedConfigFile};
use orbit_platform::error::ValidationError;

#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub id: String,
    pub path: PathBuf,
    pub label: String,
    pub description: String,
    pub reload_hint: Option<String>,
}

impl ConfigEntry {
    fn new(id: &str, path: &str, label: &str, description: &str, reload_hint: &str) -> Self {
        Self {
            id: id.to_string(),
            path: PathBuf::from(path),
            label: label.to_string(),
            description: description.to_string(),
            reload_hint: Some(reload_hint.to_string()),
        }
    }
}

pub fn default_entries() -> Vec<ConfigEntry> {
    vec![
        ConfigEntry::new(
            "nginx-default",
            "/etc/nginx/sites-available/default",
            "Nginx Default Site",
            "Main server block served by Nginx on Ubuntu installations.",
            "sudo systemctl reload nginx",
        ),
        ConfigEntry::new(
            "sshd-config",
            "/etc/ssh/sshd_config",
            "OpenSSH Server",
            "Configuration for the OpenSSH daemon.",
            "sudo systemctl reload sshd",
        ),
        ConfigEntry::new(
            "ufw-before-rules",
            "/etc/ufw/before.rules",
            "UFW IPv4 Rules",
            "Early firewall rules applied by UFW for IPv4 traffic.",
            "sudo ufw reload",
        ),
    ]
}

pub struct ManagedConfigs {
    runner: Arc<dyn CommandRunner>,
    entries: Vec<ConfigEntry>,
}

impl ManagedConfigs {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            entries: default_entries(),
        }
    }

    pub fn with_entries(mut self, entries: Vec<ConfigEntry>) -> Self {
        self.entries = entries;
        self
    }

    fn entry(&self, id: &str) -> Result<&ConfigEntry, ValidationError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| ValidationError::UnknownConfig(id.to_string()))
    }
}

#[async_trait]
impl ConfigStore for ManagedConfigs {
    async fn list(&self) -> Result<Vec<ManagedConfigFile>> {
        let mut files = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let exists = tokio::fs::try_exists(&entry.path).await.unwrap_or(false);
            files.push(ManagedConfigFile {
                id: entry.id.clone(),
                path: entry.path.display().to_string(),
                label: entry.label.clone(),
                description: entry.description.clone(),
                reload_hint: entry.reload_hint.clone(),
                exists,
            });
        }
        Ok(files)
    }

    async fn read(&self, id: &str) -> Result<String> {
        let entry = self.entry(id)?;
        tokio::fs::read_to_string(&entry.path)
            .await
            .with_context(|| format!("failed to read {}", entry.path.display()))
    }

    async fn write(&self, id: &str, content: &str) -> Result<()> {
        let entry = self.entry(id)?;
        let path = entry.path.display().to_string();

        if let Some(parent) = entry.path.parent().filter(|p| *p != Path::new("")) {
            let parent = parent.display().to_string();
            self.runner
                .run("mkdir", &argv(["-p", parent.as_str()]), RunOptions::elevated())
                .await
                .with_context(|| format!("failed to create {}", parent))?;
        }

        info!("writing {} ({} bytes)", path, content.len());
        // Content goes through stdin, never through the argument vector
        self.runner
            .run(
                "tee",
                &argv([path.as_str()]),
                RunOptions::elevated().with_stdin(content.as_bytes()),
            )
            .await
            .with_context(|| format!("failed to write {}", path))?;
        Ok(())
    }
}

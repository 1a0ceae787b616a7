use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitConfig {
    /// Wall-clock limit for ordinary host commands, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Cap on captured stdout/stderr per stream
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Limit for apt-get install/remove/update/upgrade runs
    #[serde(default = "default_apt_timeout")]
    pub apt_timeout_secs: u64,

    #[serde(default = "default_journal_timeout")]
    pub journal_timeout_secs: u64,

    /// procfs mount point
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    #[serde(default = "default_package_list_limit")]
    pub package_list_limit: usize,

    #[serde(default = "default_package_search_limit")]
    pub package_search_limit: usize,

    /// Journal lines requested when the caller does not say
    #[serde(default = "default_journal_lines")]
    pub journal_lines: u32,

    /// Seconds between samples in watch mode
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_command_timeout() -> u64 {
    30
}
fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_apt_timeout() -> u64 {
    60
}
fn default_journal_timeout() -> u64 {
    20
}
fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}
fn default_package_list_limit() -> usize {
    200
}
fn default_package_search_limit() -> usize {
    50
}
fn default_journal_lines() -> u32 {
    200
}
fn default_watch_interval() -> u64 {
    5
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            max_output_bytes: default_max_output_bytes(),
            apt_timeout_secs: default_apt_timeout(),
            journal_timeout_secs: default_journal_timeout(),
            proc_root: default_proc_root(),
            package_list_limit: default_package_list_limit(),
            package_search_limit: default_package_search_limit(),
            journal_lines: default_journal_lines(),
            watch_interval_secs: default_watch_interval(),
        }
    }
}

impl OrbitConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "orbit", "orbit") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("orbit-config.json")
        }
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn apt_timeout(&self) -> Duration {
        Duration::from_secs(self.apt_timeout_secs)
    }

    pub fn journal_timeout(&self) -> Duration {
        Duration::from_secs(self.journal_timeout_secs)
    }

    /// Never zero; a zero interval would spin
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }
}

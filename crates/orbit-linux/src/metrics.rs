use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use orbit_platform::command::{argv, CommandRunner, RunOptions};
use orbit_platform::system_info::{
    CpuSample, DiskRate, DiskSample, NetworkRate, NetworkSample, SystemMetrics, SystemSummary, Usage,
};

use crate::sampler::SamplerStore;

const UNKNOWN: &str = "Unknown";
const BYTES_PER_SECTOR: u64 = 512;

/// Builds [`SystemSummary`] values from procfs and a couple of small utilities.
pub struct LinuxSystemMetrics {
    runner: Arc<dyn CommandRunner>,
    sampler: Arc<SamplerStore>,
    proc_root: PathBuf,
    os_release: PathBuf,
}

impl LinuxSystemMetrics {
    pub fn new(runner: Arc<dyn CommandRunner>, sampler: Arc<SamplerStore>) -> Self {
        Self {
            runner,
            sampler,
            proc_root: PathBuf::from("/proc"),
            os_release: PathBuf::from("/etc/os-release"),
        }
    }

    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    pub fn with_os_release(mut self, path: impl Into<PathBuf>) -> Self {
        self.os_release = path.into();
        self
    }

    pub fn sampler(&self) -> &Arc<SamplerStore> {
        &self.sampler
    }

    async fn read_proc(&self, name: &str) -> Result<String> {
        let path = self.proc_root.join(name);
        read_file(&path).await
    }

    async fn read_uptime(&self) -> Result<f64> {
        let content = self.read_proc("uptime").await?;
        parse_uptime(&content).context("malformed uptime file")
    }

    async fn read_os_name(&self) -> String {
        match read_file(&self.os_release).await {
            Ok(content) => parse_os_release(&content).unwrap_or_else(|| UNKNOWN.to_string()),
            Err(e) => {
                debug!("os-release unavailable: {:#}", e);
                UNKNOWN.to_string()
            }
        }
    }

    async fn read_kernel(&self) -> String {
        self.read_proc("sys/kernel/osrelease")
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    async fn read_cpu_usage(&self) -> f64 {
        let content = match self.read_proc("stat").await {
            Ok(c) => c,
            Err(e) => {
                warn!("cpu counters unavailable: {:#}", e);
                return 0.0;
            }
        };
        match parse_cpu_ticks(&content) {
            Some((idle, total)) => {
                self.sampler
                    .cpu_usage(CpuSample {
                        idle,
                        total,
                        taken_at: Instant::now(),
                    })
                    .await
            }
            None => {
                warn!("no aggregate cpu line in stat");
                0.0
            }
        }
    }

    async fn read_memory(&self) -> (Usage, Usage) {
        let content = match self.read_proc("meminfo").await {
            Ok(c) => c,
            Err(e) => {
                warn!("meminfo unavailable: {:#}", e);
                return (Usage::default(), Usage::default());
            }
        };
        (memory_usage(&content), swap_usage(&content))
    }

    async fn read_disk_usage(&self) -> Usage {
        match self
            .runner
            .run("df", &argv(["-Pk", "/"]), RunOptions::default())
            .await
        {
            Ok(out) => parse_df(&out.stdout).unwrap_or_default(),
            Err(e) => {
                warn!("df failed: {}", e);
                Usage::default()
            }
        }
    }

    async fn read_network_rate(&self) -> NetworkRate {
        match self.read_proc("net/dev").await {
            Ok(content) => {
                let (rx_bytes, tx_bytes) = parse_net_dev(&content);
                self.sampler
                    .network_rate(NetworkSample {
                        rx_bytes,
                        tx_bytes,
                        taken_at: Instant::now(),
                    })
                    .await
            }
            Err(e) => {
                warn!("network counters unavailable: {:#}", e);
                NetworkRate::default()
            }
        }
    }

    async fn read_disk_rate(&self) -> DiskRate {
        match self.read_proc("diskstats").await {
            Ok(content) => {
                let (read, written) = parse_diskstats(&content);
                self.sampler
                    .disk_rate(DiskSample {
                        read_bytes: read * BYTES_PER_SECTOR,
                        write_bytes: written * BYTES_PER_SECTOR,
                        taken_at: Instant::now(),
                    })
                    .await
            }
            Err(e) => {
                warn!("disk counters unavailable: {:#}", e);
                DiskRate::default()
            }
        }
    }

    async fn read_process_count(&self) -> usize {
        match self
            .runner
            .run("ps", &argv(["-e", "--no-headers"]), RunOptions::default())
            .await
        {
            Ok(out) => out.stdout.lines().filter(|l| !l.trim().is_empty()).count(),
            Err(e) => {
                warn!("ps failed: {}", e);
                0
            }
        }
    }

    async fn read_load_average(&self) -> [f64; 3] {
        self.read_proc("loadavg")
            .await
            .ok()
            .and_then(|c| parse_loadavg(&c))
            .unwrap_or([0.0; 3])
    }
}

#[async_trait]
impl SystemMetrics for LinuxSystemMetrics {
    async fn snapshot(&self) -> Result<SystemSummary> {
        let hostname = hostname::get()
            .context("failed to read hostname")?
            .to_string_lossy()
            .to_string();

        // Independent reads; each counter is sampled on its own.
        let (uptime, os, kernel, cpu_percent, (memory, swap), disk, network, disk_io, process_count, load_average) = tokio::join!(
            self.read_uptime(),
            self.read_os_name(),
            self.read_kernel(),
            self.read_cpu_usage(),
            self.read_memory(),
            self.read_disk_usage(),
            self.read_network_rate(),
            self.read_disk_rate(),
            self.read_process_count(),
            self.read_load_average(),
        );

        Ok(SystemSummary {
            hostname,
            os,
            kernel,
            architecture: std::env::consts::ARCH.to_string(),
            uptime_seconds: uptime?,
            cpu_percent,
            memory,
            swap,
            disk,
            network,
            disk_io,
            process_count,
            load_average,
        })
    }
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

fn parse_uptime(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

fn parse_os_release(content: &str) -> Option<String> {
    content
        .lines()
        .find(|l| l.starts_with("PRETTY_NAME="))
        .map(|l| l.trim_start_matches("PRETTY_NAME=").trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
}

/// `(idle + iowait, total)` ticks from the aggregate `cpu ` line of /proc/stat
fn parse_cpu_ticks(content: &str) -> Option<(u64, u64)> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let parts: Vec<u64> = line
        .split_whitespace()
        .skip(1) // skip "cpu"
        .filter_map(|s| s.parse().ok())
        .collect();

    if parts.len() < 4 {
        return None;
    }

    let idle = parts[3] + parts.get(4).copied().unwrap_or(0);
    let total = parts.iter().sum();
    Some((idle, total))
}

/// Value of a `Key:   1234 kB` line, in bytes
fn meminfo_bytes(content: &str, key: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        if parts.next()?.strip_suffix(':')? != key {
            return None;
        }
        parts.next()?.parse::<u64>().ok().map(|kb| kb * 1024)
    })
}

fn memory_usage(content: &str) -> Usage {
    let total = meminfo_bytes(content, "MemTotal").unwrap_or(0);
    // Kernels before 3.14 have no MemAvailable
    let available = meminfo_bytes(content, "MemAvailable").unwrap_or_else(|| {
        ["MemFree", "Buffers", "Cached"]
            .iter()
            .filter_map(|k| meminfo_bytes(content, k))
            .sum()
    });
    Usage::new(total, total.saturating_sub(available))
}

fn swap_usage(content: &str) -> Usage {
    let total = meminfo_bytes(content, "SwapTotal").unwrap_or(0);
    let free = meminfo_bytes(content, "SwapFree").unwrap_or(0);
    Usage::new(total, total.saturating_sub(free))
}

/// Root filesystem totals from `df -Pk /`; sizes are reported in KiB.
fn parse_df(stdout: &str) -> Option<Usage> {
    let line = stdout.trim().lines().last()?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    let total: u64 = fields.get(1)?.parse().ok()?;
    let used: u64 = fields.get(2)?.parse().ok()?;
    Some(Usage::new(total * 1024, used * 1024))
}

/// Summed (rx, tx) bytes over every interface except loopback
fn parse_net_dev(content: &str) -> (u64, u64) {
    let mut rx = 0u64;
    let mut tx = 0u64;

    for line in content.lines().skip(2) {
        let Some((iface, data)) = line.split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }
        let fields: Vec<&str> = data.split_whitespace().collect();
        rx += fields.first().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        tx += fields.get(8).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    }

    (rx, tx)
}

/// Summed (read, written) sectors over whole block devices
fn parse_diskstats(content: &str) -> (u64, u64) {
    let mut read = 0u64;
    let mut written = 0u64;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 || !is_block_device(parts[2]) {
            continue;
        }
        read += parts[5].parse::<u64>().unwrap_or(0);
        written += parts[9].parse::<u64>().unwrap_or(0);
    }

    (read, written)
}

/// Skips loop/ram/device-mapper devices and anything ending in a digit (partitions).
fn is_block_device(name: &str) -> bool {
    if name.is_empty() || name.starts_with("loop") || name.starts_with("ram") || name.starts_with("dm-") {
        return false;
    }
    !name.ends_with(|c: char| c.is_ascii_digit())
}

fn parse_loadavg(content: &str) -> Option<[f64; 3]> {
    let mut it = content.split_whitespace().map(|v| v.parse::<f64>());
    Some([it.next()?.ok()?, it.next()?.ok()?, it.next()?.ok()?])
}

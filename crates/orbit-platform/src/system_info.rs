use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Aggregate CPU tick counters from one reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    /// idle + iowait ticks
    pub idle: u64,
    /// Sum of every tick field
    pub total: u64,
    pub taken_at: Instant,
}

/// Cumulative byte counters summed over all non-loopback interfaces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkSample {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub taken_at: Instant,
}

/// Cumulative byte counters summed over whole block devices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskSample {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub taken_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkRate {
    pub rx_bps: f64,
    pub tx_bps: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskRate {
    pub read_bps: f64,
    pub write_bps: f64,
}

/// Total/used pair in bytes with the derived percentage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub percent: f64,
}

impl Usage {
    pub fn new(total_bytes: u64, used_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        };
        Self {
            total_bytes,
            used_bytes,
            percent,
        }
    }
}

/// One point-in-time view of host health.
///
/// Each field comes from its own read; the values are not an atomic
/// snapshot across counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub architecture: String,
    pub uptime_seconds: f64,
    pub cpu_percent: f64,
    pub memory: Usage,
    pub swap: Usage,
    pub disk: Usage,
    pub network: NetworkRate,
    pub disk_io: DiskRate,
    pub process_count: usize,
    pub load_average: [f64; 3],
}

#[async_trait]
pub trait SystemMetrics: Send + Sync {
    /// Build a fresh summary, updating the stored rate samples
    async fn snapshot(&self) -> Result<SystemSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_percent() {
        let u = Usage::new(2048, 512);
        assert_eq!(u.percent, 25.0);
        assert_eq!(Usage::new(0, 0).percent, 0.0);
    }
}

//! Last-seen counter samples, used to turn cumulative kernel counters into rates.

use std::time::Instant;

use tokio::sync::Mutex;

use orbit_platform::system_info::{CpuSample, DiskRate, DiskSample, NetworkRate, NetworkSample};

/// Holds at most one previous sample per counter kind. Each kind has its own
/// lock so a read-compare-replace is never interleaved with another caller's.
#[derive(Default)]
pub struct SamplerStore {
    cpu: Mutex<Option<CpuSample>>,
    network: Mutex<Option<NetworkSample>>,
    disk: Mutex<Option<DiskSample>>,
}

impl SamplerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// CPU busy percentage since the previous sample; 0 on the first call.
    pub async fn cpu_usage(&self, sample: CpuSample) -> f64 {
        let mut slot = self.cpu.lock().await;
        let usage = slot.map(|prev| cpu_percent(&prev, &sample)).unwrap_or(0.0);
        *slot = Some(sample);
        usage
    }

    pub async fn network_rate(&self, sample: NetworkSample) -> NetworkRate {
        let mut slot = self.network.lock().await;
        let rate = match *slot {
            Some(prev) => match elapsed_secs(prev.taken_at, sample.taken_at) {
                Some(secs) => NetworkRate {
                    rx_bps: per_second(prev.rx_bytes, sample.rx_bytes, secs),
                    tx_bps: per_second(prev.tx_bytes, sample.tx_bytes, secs),
                },
                None => NetworkRate::default(),
            },
            None => NetworkRate::default(),
        };
        *slot = Some(sample);
        rate
    }

    pub async fn disk_rate(&self, sample: DiskSample) -> DiskRate {
        let mut slot = self.disk.lock().await;
        let rate = match *slot {
            Some(prev) => match elapsed_secs(prev.taken_at, sample.taken_at) {
                Some(secs) => DiskRate {
                    read_bps: per_second(prev.read_bytes, sample.read_bytes, secs),
                    write_bps: per_second(prev.write_bytes, sample.write_bytes, secs),
                },
                None => DiskRate::default(),
            },
            None => DiskRate::default(),
        };
        *slot = Some(sample);
        rate
    }

    /// Forget every stored sample; the next call of each kind reports 0 again.
    pub async fn reset(&self) {
        *self.cpu.lock().await = None;
        *self.network.lock().await = None;
        *self.disk.lock().await = None;
    }
}

fn cpu_percent(prev: &CpuSample, cur: &CpuSample) -> f64 {
    let total = cur.total.saturating_sub(prev.total);
    if total == 0 {
        return 0.0;
    }
    let idle = cur.idle.saturating_sub(prev.idle).min(total);
    (1.0 - idle as f64 / total as f64) * 100.0
}

/// `None` when the clock did not move forward between samples.
fn elapsed_secs(prev: Instant, cur: Instant) -> Option<f64> {
    let secs = cur.checked_duration_since(prev)?.as_secs_f64();
    (secs > 0.0).then_some(secs)
}

fn per_second(prev: u64, cur: u64, secs: f64) -> f64 {
    ((cur as f64 - prev as f64) / secs).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cpu(idle: u64, total: u64, at: Instant) -> CpuSample {
        CpuSample {
            idle,
            total,
            taken_at: at,
        }
    }

    #[tokio::test]
    async fn test_first_cpu_sample_is_zero() {
        let store = SamplerStore::new();
        let t0 = Instant::now();
        assert_eq!(store.cpu_usage(cpu(800, 1000, t0)).await, 0.0);
        // 100 more ticks, 25 of them idle
        let usage = store.cpu_usage(cpu(825, 1100, t0 + Duration::from_secs(1))).await;
        assert!((usage - 75.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unchanged_counters_give_zero() {
        let store = SamplerStore::new();
        let t0 = Instant::now();
        store.cpu_usage(cpu(10, 20, t0)).await;
        assert_eq!(store.cpu_usage(cpu(10, 20, t0 + Duration::from_secs(1))).await, 0.0);

        let net = |rx, at| NetworkSample {
            rx_bytes: rx,
            tx_bytes: rx,
            taken_at: at,
        };
        store.network_rate(net(500, t0)).await;
        let rate = store.network_rate(net(500, t0 + Duration::from_secs(3))).await;
        assert_eq!(rate, NetworkRate::default());
    }

    #[tokio::test]
    async fn test_network_rate_is_delta_over_time() {
        let store = SamplerStore::new();
        let t0 = Instant::now();
        let first = store
            .network_rate(NetworkSample {
                rx_bytes: 1_000,
                tx_bytes: 2_000,
                taken_at: t0,
            })
            .await;
        assert_eq!(first, NetworkRate::default());

        let rate = store
            .network_rate(NetworkSample {
                rx_bytes: 1_000 + 40_000,
                tx_bytes: 2_000 + 10_000,
                taken_at: t0 + Duration::from_secs(4),
            })
            .await;
        assert!((rate.rx_bps - 10_000.0).abs() < 1e-6);
        assert!((rate.tx_bps - 2_500.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_disk_rate_from_sectors() {
        let store = SamplerStore::new();
        let t0 = Instant::now();
        store
            .disk_rate(DiskSample {
                read_bytes: 0,
                write_bytes: 0,
                taken_at: t0,
            })
            .await;
        // 1000 sectors of 512 bytes over 2 seconds
        let rate = store
            .disk_rate(DiskSample {
                read_bytes: 1000 * 512,
                write_bytes: 0,
                taken_at: t0 + Duration::from_secs(2),
            })
            .await;
        assert!((rate.read_bps - 256_000.0).abs() < 1e-6);
        assert_eq!(rate.write_bps, 0.0);
    }

    #[tokio::test]
    async fn test_counter_reset_clamps_to_zero() {
        let store = SamplerStore::new();
        let t0 = Instant::now();
        store
            .disk_rate(DiskSample {
                read_bytes: 10_000,
                write_bytes: 10_000,
                taken_at: t0,
            })
            .await;
        let rate = store
            .disk_rate(DiskSample {
                read_bytes: 100,
                write_bytes: 20_000,
                taken_at: t0 + Duration::from_secs(1),
            })
            .await;
        assert_eq!(rate.read_bps, 0.0);
        assert!((rate.write_bps - 10_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_non_positive_elapsed_still_updates_store() {
        let store = SamplerStore::new();
        let t0 = Instant::now();
        let sample = |rx, at| NetworkSample {
            rx_bytes: rx,
            tx_bytes: 0,
            taken_at: at,
        };
        store.network_rate(sample(0, t0 + Duration::from_secs(5))).await;
        // Clock went backwards: no rate, but the new sample replaces the old one
        let rate = store.network_rate(sample(1_000, t0)).await;
        assert_eq!(rate, NetworkRate::default());

        let rate = store.network_rate(sample(3_000, t0 + Duration::from_secs(1))).await;
        assert!((rate.rx_bps - 2_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_reset_forgets_samples() {
        let store = SamplerStore::new();
        let t0 = Instant::now();
        store.cpu_usage(cpu(0, 100, t0)).await;
        store.reset().await;
        assert_eq!(store.cpu_usage(cpu(0, 200, t0 + Duration::from_secs(1))).await, 0.0);
    }
}

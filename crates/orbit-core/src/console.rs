use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use orbit_platform::config_files::ConfigStore;
use orbit_platform::logs::{JournalEntry, JournalQuery, LogReader, Priority};
use orbit_platform::network::NetworkManager;
use orbit_platform::packages::{PackageManager, PackageSearchResult, UbuntuPackage};
use orbit_platform::services::ServiceController;
use orbit_platform::system_info::{SystemMetrics, SystemSummary};
use orbit_platform::users::UserAccounts;

use crate::config::OrbitConfig;

/// Every host adapter, wired to one command runner and one sampler store so
/// rate metrics carry over between snapshots.
pub struct Console {
    config: OrbitConfig,
    pub metrics: Arc<dyn SystemMetrics>,
    pub packages: Arc<dyn PackageManager>,
    pub services: Arc<dyn ServiceController>,
    pub network: Arc<dyn NetworkManager>,
    pub users: Arc<dyn UserAccounts>,
    pub logs: Arc<dyn LogReader>,
    pub configs: Arc<dyn ConfigStore>,
}

impl Console {
    #[cfg(target_os = "linux")]
    pub fn for_host(config: OrbitConfig) -> Result<Self> {
        use orbit_linux::config_files::ManagedConfigs;
        use orbit_linux::logs::JournalctlReader;
        use orbit_linux::metrics::LinuxSystemMetrics;
        use orbit_linux::network::IpNetworkManager;
        use orbit_linux::packages::AptPackageManager;
        use orbit_linux::runner::HostCommandRunner;
        use orbit_linux::sampler::SamplerStore;
        use orbit_linux::services::SystemdServiceController;
        use orbit_linux::users::PasswdUserAccounts;
        use orbit_platform::command::CommandRunner;

        let runner: Arc<dyn CommandRunner> = Arc::new(
            HostCommandRunner::new().with_limits(config.command_timeout(), config.max_output_bytes),
        );
        let sampler = Arc::new(SamplerStore::new());

        Ok(Self {
            metrics: Arc::new(
                LinuxSystemMetrics::new(runner.clone(), sampler).with_proc_root(&config.proc_root),
            ),
            packages: Arc::new(
                AptPackageManager::new(runner.clone()).with_apt_timeout(config.apt_timeout()),
            ),
            services: Arc::new(SystemdServiceController::new(runner.clone())),
            network: Arc::new(
                IpNetworkManager::new(runner.clone()).with_proc_root(&config.proc_root),
            ),
            users: Arc::new(PasswdUserAccounts::new(runner.clone())),
            logs: Arc::new(
                JournalctlReader::new(runner.clone()).with_timeout(config.journal_timeout()),
            ),
            configs: Arc::new(ManagedConfigs::new(runner)),
            config,
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn for_host(_config: OrbitConfig) -> Result<Self> {
        anyhow::bail!("host management is only supported on Linux")
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn SystemMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &OrbitConfig {
        &self.config
    }

    pub async fn summary(&self) -> Result<SystemSummary> {
        self.metrics.snapshot().await
    }

    pub async fn installed_packages(&self, limit: Option<usize>) -> Result<Vec<UbuntuPackage>> {
        self.packages
            .list_installed(limit.unwrap_or(self.config.package_list_limit))
            .await
    }

    pub async fn search_packages(
        &self,
        term: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PackageSearchResult>> {
        self.packages
            .search(term, limit.unwrap_or(self.config.package_search_limit))
            .await
    }

    pub async fn journal(
        &self,
        unit: Option<String>,
        lines: Option<u32>,
        priority: Option<Priority>,
        since: Option<String>,
    ) -> Result<Vec<JournalEntry>> {
        let query = JournalQuery {
            unit,
            lines: lines.unwrap_or(self.config.journal_lines),
            priority,
            since,
        };
        self.logs.query(&query).await
    }

    /// Snapshot every `interval` until `count` samples were taken (forever
    /// when `None`) or Ctrl-C. A failed snapshot is logged and skipped.
    pub async fn watch<F>(&self, interval: Duration, count: Option<u64>, mut on_sample: F) -> Result<()>
    where
        F: FnMut(&SystemSummary) -> Result<()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut taken = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, stopping watch");
                    return Ok(());
                }
            }

            match self.metrics.snapshot().await {
                Ok(summary) => on_sample(&summary)?,
                Err(e) => error!("snapshot failed: {:#}", e),
            }

            taken += 1;
            if count.is_some_and(|n| taken >= n) {
                return Ok(());
            }
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orbit_platform::system_info::{DiskRate, NetworkRate, Usage};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails every other call, otherwise reports the call number as cpu %
    struct FlakyMetrics {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SystemMetrics for FlakyMetrics {
        async fn snapshot(&self) -> Result<SystemSummary> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n % 2 == 0 {
                anyhow::bail!("stat unreadable");
            }
            Ok(SystemSummary {
                hostname: "test".into(),
                os: "Ubuntu".into(),
                kernel: "6.8.0".into(),
                architecture: "x86_64".into(),
                uptime_seconds: 1.0,
                cpu_percent: n as f64,
                memory: Usage::default(),
                swap: Usage::default(),
                disk: Usage::default(),
                network: NetworkRate::default(),
                disk_io: DiskRate::default(),
                process_count: 1,
                load_average: [0.0; 3],
            })
        }
    }

    #[test]
    fn test_for_host_uses_config() {
        let config = OrbitConfig {
            package_list_limit: 7,
            ..OrbitConfig::default()
        };
        let console = Console::for_host(config).unwrap();
        assert_eq!(console.config().package_list_limit, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_skips_failed_snapshots() {
        let metrics = Arc::new(FlakyMetrics {
            calls: AtomicU32::new(0),
        });
        let console = Console::for_host(OrbitConfig::default())
            .unwrap()
            .with_metrics(metrics.clone());

        let mut seen = Vec::new();
        console
            .watch(Duration::from_secs(5), Some(4), |s| {
                seen.push(s.cpu_percent);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(metrics.calls.load(Ordering::SeqCst), 4);
        assert_eq!(seen, vec![1.0, 3.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_on_callback_error() {
        let console = Console::for_host(OrbitConfig::default())
            .unwrap()
            .with_metrics(Arc::new(FlakyMetrics {
                calls: AtomicU32::new(0),
            }));
        let err = console
            .watch(Duration::from_secs(1), None, |_| Err(anyhow::anyhow!("stdout closed")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "stdout closed");
    }
}

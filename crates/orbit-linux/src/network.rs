//! Interfaces, routes and the ufw firewall.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use orbit_platform::command::{argv, ActionOutcome, CommandRunner, RunOptions};
use orbit_platform::error::ValidationError;
use orbit_platform::network::{
    FirewallAction, FirewallStatus, NetworkInterface, NetworkManager, NetworkOverview, Route,
    RouteSpec,
};
use orbit_platform::validate;

static NUMBERED_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*\d+\]\s+(.+)$").expect("static regex"));

pub struct IpNetworkManager {
    runner: Arc<dyn CommandRunner>,
    proc_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct IpLink {
    ifname: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    operstate: Option<String>,
    #[serde(default)]
    mtu: Option<u32>,
    #[serde(default)]
    addr_info: Vec<IpAddr>,
}

#[derive(Debug, Deserialize)]
struct IpAddr {
    family: String,
    local: String,
    prefixlen: u8,
}

#[derive(Debug, Deserialize)]
struct UfwStatus {
    status: String,
    #[serde(default)]
    rules: Vec<UfwRule>,
}

#[derive(Debug, Deserialize)]
struct UfwRule {
    to: String,
    action: String,
    #[serde(default)]
    comment: Option<String>,
}

impl IpNetworkManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            proc_root: PathBuf::from("/proc"),
        }
    }

    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    async fn interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let out = self
            .runner
            .run("ip", &argv(["-j", "address"]), RunOptions::default())
            .await
            .context("ip address failed")?;
        Ok(parse_interfaces(&out.stdout))
    }

    async fn default_gateway(&self) -> Option<String> {
        match self
            .runner
            .run("ip", &argv(["route", "show", "default"]), RunOptions::default())
            .await
        {
            Ok(out) => parse_default_gateway(&out.stdout),
            Err(e) => {
                debug!("default route unavailable: {}", e);
                None
            }
        }
    }

    async fn forwarding_enabled(&self) -> bool {
        let path = self.proc_root.join("sys/net/ipv4/ip_forward");
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => content.trim() == "1",
            Err(e) => {
                debug!("{} unreadable: {}", path.display(), e);
                false
            }
        }
    }

    async fn ufw(&self, args: Vec<String>, what: &str) -> Result<ActionOutcome> {
        info!("ufw {}", args.join(" "));
        let out = self
            .runner
            .run("ufw", &args, RunOptions::elevated())
            .await
            .with_context(|| format!("ufw {} failed", what))?;
        Ok(ActionOutcome::from_output(&out, format!("ufw {} completed", what)))
    }

    async fn ip_admin(&self, args: Vec<String>, done: String) -> Result<ActionOutcome> {
        let line = format!("ip {}", args.join(" "));
        info!("{}", line);
        let out = self
            .runner
            .run("ip", &args, RunOptions::elevated())
            .await
            .with_context(|| format!("{} failed", line))?;
        Ok(ActionOutcome::from_output(&out, done))
    }

    async fn change_address(&self, verb: &str, interface: &str, cidr: &str) -> Result<ActionOutcome> {
        validate::interface_name(interface)?;
        validate::ip_network(cidr)?;
        let done = match verb {
            "add" => format!("{} added to {}", cidr, interface),
            _ => format!("{} removed from {}", cidr, interface),
        };
        self.ip_admin(argv(["addr", verb, cidr, "dev", interface]), done)
            .await
    }
}

#[async_trait]
impl NetworkManager for IpNetworkManager {
    async fn overview(&self) -> Result<NetworkOverview> {
        let hostname = hostname::get()
            .context("failed to read hostname")?
            .to_string_lossy()
            .to_string();

        let (interfaces, default_gateway, forwarding_enabled, firewall) = tokio::join!(
            self.interfaces(),
            self.default_gateway(),
            self.forwarding_enabled(),
            self.firewall_status(),
        );

        Ok(NetworkOverview {
            hostname,
            default_gateway,
            forwarding_enabled,
            interfaces: interfaces?,
            firewall: firewall?,
        })
    }

    async fn routes(&self) -> Result<Vec<Route>> {
        let out = self
            .runner
            .run("ip", &argv(["route", "show"]), RunOptions::default())
            .await
            .context("ip route failed")?;
        Ok(parse_routes(&out.stdout))
    }

    async fn firewall_status(&self) -> Result<FirewallStatus> {
        let json = self
            .runner
            .run("ufw", &argv(["status", "--format", "json"]), RunOptions::elevated())
            .await;

        match json {
            Ok(out) => match parse_ufw_json(&out.stdout) {
                Ok(status) => return Ok(status),
                Err(e) => debug!("ufw JSON status unreadable: {}", e),
            },
            Err(e) => debug!("ufw JSON status failed: {}", e),
        }

        let out = self
            .runner
            .run("ufw", &argv(["status", "numbered"]), RunOptions::elevated())
            .await
            .context("ufw status failed")?;
        Ok(parse_ufw_numbered(&out.stdout))
    }

    async fn firewall(&self, action: FirewallAction) -> Result<ActionOutcome> {
        let args = match &action {
            FirewallAction::Enable => argv(["--force", "enable"]),
            FirewallAction::Disable => argv(["--force", "disable"]),
            FirewallAction::Allow(rule) | FirewallAction::Deny(rule) => {
                let rule = rule.trim();
                if rule.is_empty() {
                    return Err(ValidationError::Empty("firewall rule").into());
                }
                argv([action.name(), rule])
            }
            FirewallAction::Delete(number) => {
                validate::rule_number(number)?;
                argv(["--force", "delete", number.as_str()])
            }
            FirewallAction::Reload => argv(["reload"]),
        };
        self.ufw(args, action.name()).await
    }

    async fn set_link(&self, interface: &str, up: bool) -> Result<ActionOutcome> {
        validate::interface_name(interface)?;
        let state = if up { "up" } else { "down" };

        info!("ip link set {} {}", interface, state);
        let out = self
            .runner
            .run(
                "ip",
                &argv(["link", "set", "dev", interface, state]),
                RunOptions::elevated(),
            )
            .await
            .with_context(|| format!("ip link set {} {} failed", interface, state))?;
        Ok(ActionOutcome::from_output(
            &out,
            format!("{} is now {}", interface, state),
        ))
    }

    async fn add_address(&self, interface: &str, cidr: &str) -> Result<ActionOutcome> {
        self.change_address("add", interface, cidr).await
    }

    async fn delete_address(&self, interface: &str, cidr: &str) -> Result<ActionOutcome> {
        self.change_address("del", interface, cidr).await
    }

    async fn add_route(&self, route: &RouteSpec) -> Result<ActionOutcome> {
        validate::ip_network(&route.destination)?;
        let mut args = argv(["route", "add", route.destination.as_str()]);
        if let Some(gateway) = route.gateway.as_deref().filter(|g| !g.is_empty()) {
            validate::ip_address(gateway)?;
            args.extend(argv(["via", gateway]));
        }
        if let Some(interface) = route.interface.as_deref().filter(|i| !i.is_empty()) {
            validate::interface_name(interface)?;
            args.extend(argv(["dev", interface]));
        }
        self.ip_admin(args, format!("route to {} added", route.destination))
            .await
    }

    async fn delete_route(&self, destination: &str) -> Result<ActionOutcome> {
        validate::ip_network(destination)?;
        self.ip_admin(
            argv(["route", "del", destination]),
            format!("route to {} removed", destination),
        )
        .await
    }
}

/// An unreadable address table yields no interfaces rather than an error.
fn parse_interfaces(stdout: &str) -> Vec<NetworkInterface> {
    let links: Vec<IpLink> = match serde_json::from_str(stdout) {
        Ok(links) => links,
        Err(e) => {
            warn!("ip -j address output unreadable: {}", e);
            return Vec::new();
        }
    };

    links
        .into_iter()
        .map(|link| {
            let cidrs = |family: &str| -> Vec<String> {
                link.addr_info
                    .iter()
                    .filter(|a| a.family == family)
                    .map(|a| format!("{}/{}", a.local, a.prefixlen))
                    .collect()
            };
            NetworkInterface {
                ipv4: cidrs("inet"),
                ipv6: cidrs("inet6"),
                up: link
                    .operstate
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case("up")),
                mac_address: link.address.clone().filter(|a| !a.is_empty()),
                mtu: link.mtu,
                name: link.ifname.clone(),
            }
        })
        .collect()
}

fn parse_default_gateway(stdout: &str) -> Option<String> {
    let line = stdout.lines().find(|l| l.starts_with("default"))?;
    token_after(line, "via")
}

fn token_after(line: &str, key: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    parts.find(|p| *p == key)?;
    parts.next().map(String::from)
}

fn parse_routes(stdout: &str) -> Vec<Route> {
    stdout
        .lines()
        .filter_map(|line| {
            let destination = line.split_whitespace().next()?;
            Some(Route {
                destination: destination.to_string(),
                gateway: token_after(line, "via"),
                interface: token_after(line, "dev"),
                metric: token_after(line, "metric"),
            })
        })
        .collect()
}

fn parse_ufw_json(stdout: &str) -> Result<FirewallStatus, serde_json::Error> {
    let data: UfwStatus = serde_json::from_str(stdout)?;
    Ok(FirewallStatus {
        enabled: data.status.eq_ignore_ascii_case("active"),
        raw_status: stdout.to_string(),
        rules: data
            .rules
            .iter()
            .map(|r| match r.comment.as_deref().filter(|c| !c.is_empty()) {
                Some(comment) => format!("{} {} ({})", r.action, r.to, comment),
                None => format!("{} {}", r.action, r.to),
            })
            .collect(),
    })
}

fn parse_ufw_numbered(stdout: &str) -> FirewallStatus {
    let lines: Vec<&str> = stdout.lines().map(str::trim).collect();
    FirewallStatus {
        enabled: lines
            .iter()
            .any(|l| l.to_lowercase().starts_with("status: active")),
        raw_status: stdout.to_string(),
        rules: lines
            .iter()
            .filter_map(|l| NUMBERED_RULE.captures(l))
            .map(|c| c[1].to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use orbit_platform::error::Fault;
    use std::fs;

    const IP_JSON: &str = r#"[
        {"ifindex":1,"ifname":"lo","flags":["LOOPBACK","UP"],"mtu":65536,"operstate":"UNKNOWN",
         "address":"00:00:00:00:00:00",
         "addr_info":[{"family":"inet","local":"127.0.0.1","prefixlen":8,"scope":"host"},
                      {"family":"inet6","local":"::1","prefixlen":128,"scope":"host"}]},
        {"ifindex":2,"ifname":"eth0","mtu":1500,"operstate":"UP","address":"52:54:00:12:34:56",
         "addr_info":[{"family":"inet","local":"192.168.1.10","prefixlen":24,"scope":"global"},
                      {"family":"inet6","local":"fe80::5054:ff:fe12:3456","prefixlen":64,"scope":"link"}]},
        {"ifindex":3,"ifname":"wlan0","operstate":"down"}
    ]"#;

    const NUMBERED: &str = "Status: active\n\n     To                         Action      From\n     --                         ------      ----\n[ 1] 22/tcp                     ALLOW IN    Anywhere\n[ 2] 80,443/tcp                 ALLOW IN    Anywhere                   # web\n[10] 22/tcp (v6)                ALLOW IN    Anywhere (v6)\n";

    #[test]
    fn test_parse_interfaces() {
        let ifaces = parse_interfaces(IP_JSON);
        assert_eq!(ifaces.len(), 3);

        assert!(!ifaces[0].up);
        assert_eq!(ifaces[0].ipv4, vec!["127.0.0.1/8"]);

        let eth0 = &ifaces[1];
        assert_eq!(eth0.name, "eth0");
        assert!(eth0.up);
        assert_eq!(eth0.mac_address.as_deref(), Some("52:54:00:12:34:56"));
        assert_eq!(eth0.ipv4, vec!["192.168.1.10/24"]);
        assert_eq!(eth0.ipv6, vec!["fe80::5054:ff:fe12:3456/64"]);
        assert_eq!(eth0.mtu, Some(1500));

        assert!(!ifaces[2].up);
        assert!(ifaces[2].ipv4.is_empty());
        assert_eq!(ifaces[2].mac_address, None);

        assert!(parse_interfaces("not json").is_empty());
    }

    #[test]
    fn test_parse_gateway_and_routes() {
        let stdout = "default via 192.168.1.1 dev eth0 proto dhcp src 192.168.1.10 metric 100\n\
                      192.168.1.0/24 dev eth0 proto kernel scope link src 192.168.1.10 metric 100\n";
        assert_eq!(parse_default_gateway(stdout).as_deref(), Some("192.168.1.1"));
        assert_eq!(parse_default_gateway("192.168.1.0/24 dev eth0\n"), None);
        assert_eq!(parse_default_gateway("default dev wg0 scope link\n"), None);

        let routes = parse_routes(stdout);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].destination, "default");
        assert_eq!(routes[0].gateway.as_deref(), Some("192.168.1.1"));
        assert_eq!(routes[0].metric.as_deref(), Some("100"));
        assert_eq!(routes[1].destination, "192.168.1.0/24");
        assert_eq!(routes[1].gateway, None);
        assert_eq!(routes[1].interface.as_deref(), Some("eth0"));
    }

    #[test]
    fn test_parse_ufw_json() {
        let stdout = r#"{"status":"active","rules":[{"to":"22/tcp","action":"ALLOW"},{"to":"443","action":"DENY","comment":"no tls"}]}"#;
        let status = parse_ufw_json(stdout).unwrap();
        assert!(status.enabled);
        assert_eq!(status.rules, vec!["ALLOW 22/tcp", "DENY 443 (no tls)"]);
        assert_eq!(status.raw_status, stdout);

        assert!(parse_ufw_json(r#"{"status":"Active"}"#).unwrap().enabled);
        assert!(!parse_ufw_json(r#"{"status":"Inactive"}"#).unwrap().enabled);
    }

    #[test]
    fn test_parse_ufw_numbered() {
        let status = parse_ufw_numbered(NUMBERED);
        assert!(status.enabled);
        assert_eq!(status.rules.len(), 3);
        assert_eq!(status.rules[0], "22/tcp                     ALLOW IN    Anywhere");
        assert!(status.rules[2].starts_with("22/tcp (v6)"));

        assert!(!parse_ufw_numbered("Status: inactive\n").enabled);
    }

    #[tokio::test]
    async fn test_firewall_status_falls_back_to_numbered() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .reply("ufw", "ERROR: Invalid syntax\n")
                .reply("ufw", NUMBERED),
        );
        let status = IpNetworkManager::new(runner.clone()).firewall_status().await.unwrap();
        assert!(status.enabled);
        assert_eq!(status.rules.len(), 3);

        let calls = runner.calls_to("ufw");
        assert_eq!(calls[0].args, argv(["status", "--format", "json"]));
        assert_eq!(calls[1].args, argv(["status", "numbered"]));
    }

    #[tokio::test]
    async fn test_firewall_status_falls_back_after_command_failure() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .fail("ufw", 1, "ERROR: Invalid argument")
                .reply("ufw", "Status: inactive\n"),
        );
        let status = IpNetworkManager::new(runner).firewall_status().await.unwrap();
        assert!(!status.enabled);
        assert!(status.rules.is_empty());
    }

    #[tokio::test]
    async fn test_firewall_action_vectors() {
        let runner = Arc::new(ScriptedRunner::new());
        let mgr = IpNetworkManager::new(runner.clone());
        mgr.firewall(FirewallAction::Enable).await.unwrap();
        mgr.firewall(FirewallAction::Disable).await.unwrap();
        mgr.firewall(FirewallAction::Allow("22/tcp".into())).await.unwrap();
        mgr.firewall(FirewallAction::Deny("from 10.0.0.0/8".into())).await.unwrap();
        mgr.firewall(FirewallAction::Delete("3".into())).await.unwrap();
        let outcome = mgr.firewall(FirewallAction::Reload).await.unwrap();
        assert_eq!(outcome.message, "ufw reload completed");

        let calls = runner.calls_to("ufw");
        let args: Vec<Vec<String>> = calls.iter().map(|c| c.args.clone()).collect();
        assert_eq!(
            args,
            vec![
                argv(["--force", "enable"]),
                argv(["--force", "disable"]),
                argv(["allow", "22/tcp"]),
                argv(["deny", "from 10.0.0.0/8"]),
                argv(["--force", "delete", "3"]),
                argv(["reload"]),
            ]
        );
        assert!(calls.iter().all(|c| c.options.require_elevation));
    }

    #[tokio::test]
    async fn test_firewall_rejects_bad_input() {
        let runner = Arc::new(ScriptedRunner::new());
        let mgr = IpNetworkManager::new(runner.clone());
        for action in [
            FirewallAction::Allow("  ".into()),
            FirewallAction::Delete("1; reboot".into()),
            FirewallAction::Delete("".into()),
        ] {
            let err = mgr.firewall(action).await.unwrap_err();
            assert_eq!(Fault::classify(&err), Fault::Client);
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_link() {
        let runner = Arc::new(ScriptedRunner::new());
        let mgr = IpNetworkManager::new(runner.clone());
        let outcome = mgr.set_link("eth0", false).await.unwrap();
        assert_eq!(outcome.message, "eth0 is now down");
        assert!(mgr.set_link("-force", true).await.is_err());
        assert!(mgr.set_link("eth0 up", true).await.is_err());

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, argv(["link", "set", "dev", "eth0", "down"]));
        assert!(calls[0].options.require_elevation);
    }

    #[tokio::test]
    async fn test_address_and_route_vectors() {
        let runner = Arc::new(ScriptedRunner::new());
        let mgr = IpNetworkManager::new(runner.clone());
        let outcome = mgr.add_address("eth0", "10.0.0.5/24").await.unwrap();
        assert_eq!(outcome.message, "10.0.0.5/24 added to eth0");
        mgr.delete_address("eth0", "fd00::5/64").await.unwrap();
        mgr.add_route(&RouteSpec {
            destination: "10.8.0.0/16".into(),
            gateway: Some("10.0.0.1".into()),
            interface: Some("eth0".into()),
        })
        .await
        .unwrap();
        mgr.add_route(&RouteSpec {
            destination: "192.168.50.0/24".into(),
            gateway: None,
            interface: Some("wg0".into()),
        })
        .await
        .unwrap();
        let outcome = mgr.delete_route("10.8.0.0/16").await.unwrap();
        assert_eq!(outcome.message, "route to 10.8.0.0/16 removed");

        let calls = runner.calls_to("ip");
        let args: Vec<Vec<String>> = calls.iter().map(|c| c.args.clone()).collect();
        assert_eq!(
            args,
            vec![
                argv(["addr", "add", "10.0.0.5/24", "dev", "eth0"]),
                argv(["addr", "del", "fd00::5/64", "dev", "eth0"]),
                argv(["route", "add", "10.8.0.0/16", "via", "10.0.0.1", "dev", "eth0"]),
                argv(["route", "add", "192.168.50.0/24", "dev", "wg0"]),
                argv(["route", "del", "10.8.0.0/16"]),
            ]
        );
        assert!(calls.iter().all(|c| c.options.require_elevation));
    }

    #[tokio::test]
    async fn test_address_and_route_reject_bad_input() {
        let runner = Arc::new(ScriptedRunner::new());
        let mgr = IpNetworkManager::new(runner.clone());

        let errors = vec![
            mgr.add_address("eth0", "10.0.0.5/40").await.unwrap_err(),
            mgr.add_address("-eth0", "10.0.0.5/24").await.unwrap_err(),
            mgr.delete_address("eth0", "10.0.0.5 dev lo").await.unwrap_err(),
            mgr.add_route(&RouteSpec {
                destination: "default".into(),
                ..RouteSpec::default()
            })
            .await
            .unwrap_err(),
            mgr.add_route(&RouteSpec {
                destination: "10.8.0.0/16".into(),
                gateway: Some("10.0.0.0/24".into()),
                interface: None,
            })
            .await
            .unwrap_err(),
            mgr.add_route(&RouteSpec {
                destination: "10.8.0.0/16".into(),
                gateway: None,
                interface: Some("eth0 metric 1".into()),
            })
            .await
            .unwrap_err(),
            mgr.delete_route("").await.unwrap_err(),
        ];
        for err in &errors {
            assert_eq!(Fault::classify(err), Fault::Client, "{err}");
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_route_failure_context() {
        let runner = Arc::new(ScriptedRunner::new().fail("ip", 2, "RTNETLINK answers: File exists"));
        let err = IpNetworkManager::new(runner)
            .add_route(&RouteSpec {
                destination: "10.8.0.0/16".into(),
                gateway: Some("10.0.0.1".into()),
                interface: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ip route add 10.8.0.0/16 via 10.0.0.1 failed");
        assert!(format!("{:#}", err).contains("File exists"));
    }

    #[tokio::test]
    async fn test_overview() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sys/net/ipv4")).unwrap();
        fs::write(dir.path().join("sys/net/ipv4/ip_forward"), "1\n").unwrap();

        let runner = Arc::new(
            ScriptedRunner::new()
                .reply("ip", IP_JSON)
                .reply("ip", "default via 10.0.0.1 dev eth0\n")
                .reply("ufw", r#"{"status":"inactive","rules":[]}"#),
        );
        let overview = IpNetworkManager::new(runner)
            .with_proc_root(dir.path())
            .overview()
            .await
            .unwrap();

        assert!(!overview.hostname.is_empty());
        assert_eq!(overview.interfaces.len(), 3);
        assert_eq!(overview.default_gateway.as_deref(), Some("10.0.0.1"));
        assert!(overview.forwarding_enabled);
        assert!(!overview.firewall.enabled);
    }

    #[tokio::test]
    async fn test_overview_tolerates_missing_gateway_and_forwarding() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            ScriptedRunner::new()
                .reply("ip", "[]")
                .fail("ip", 2, "RTNETLINK answers: Operation not permitted")
                .fail("ufw", 1, "ERROR: Invalid argument")
                .reply("ufw", NUMBERED),
        );
        let overview = IpNetworkManager::new(runner)
            .with_proc_root(dir.path())
            .overview()
            .await
            .unwrap();
        assert_eq!(overview.default_gateway, None);
        assert!(!overview.forwarding_enabled);
        assert!(overview.firewall.enabled);
    }
}

//! Allow-list checks applied to every user-influenced command argument.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9.+-]+$").expect("static regex"));
static SERVICE_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9@._-]+\.service$").expect("static regex"));
static JOURNAL_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9@._:-]{1,256}$").expect("static regex"));
static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("static regex"));
static INTERFACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.:-]{1,15}$").expect("static regex"));
static ABSOLUTE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[A-Za-z0-9._/-]*$").expect("static regex"));
// Relative offsets (`-1h`, `+5min`) and epoch stamps (`@1700000000`) are allowed; `--word` is not
static SINCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9@+]|-[0-9])[A-Za-z0-9 :._+@-]{0,62}$").expect("static regex")
});

pub fn package_name(name: &str) -> Result<(), ValidationError> {
    if PACKAGE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::PackageName(name.to_string()))
    }
}

pub fn is_service_unit(unit: &str) -> bool {
    SERVICE_UNIT.is_match(unit)
}

pub fn service_unit(unit: &str) -> Result<(), ValidationError> {
    if is_service_unit(unit) {
        Ok(())
    } else {
        Err(ValidationError::UnitName(unit.to_string()))
    }
}

/// Journal unit filters may omit the `.service` suffix or name other unit types.
pub fn journal_unit(unit: &str) -> Result<(), ValidationError> {
    if JOURNAL_UNIT.is_match(unit) && !unit.starts_with('-') {
        Ok(())
    } else {
        Err(ValidationError::UnitName(unit.to_string()))
    }
}

pub fn username(name: &str) -> Result<(), ValidationError> {
    if USERNAME.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::Username(name.to_string()))
    }
}

pub fn interface_name(name: &str) -> Result<(), ValidationError> {
    if INTERFACE.is_match(name) && !name.starts_with('-') {
        Ok(())
    } else {
        Err(ValidationError::InterfaceName(name.to_string()))
    }
}

pub fn rule_number(rule: &str) -> Result<(), ValidationError> {
    if !rule.is_empty() && rule.len() <= 6 && rule.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::RuleNumber(rule.to_string()))
    }
}

pub fn absolute_path(path: &str) -> Result<(), ValidationError> {
    if ABSOLUTE_PATH.is_match(path) && !path.split('/').any(|seg| seg == "..") {
        Ok(())
    } else {
        Err(ValidationError::Path(path.to_string()))
    }
}

/// chpasswd reads one `user:password` pair per line.
pub fn password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        Err(ValidationError::Password("must not be empty"))
    } else if password.contains(['\n', '\r', '\0']) {
        Err(ValidationError::Password("must be a single line"))
    } else {
        Ok(())
    }
}

/// A bare IPv4/IPv6 address, e.g. a route gateway.
pub fn ip_address(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::IpAddress(addr.to_string()))
}

/// An address with an optional prefix length: `10.0.0.5`, `10.0.0.0/24`, `fd00::1/64`.
pub fn ip_network(cidr: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::IpAddress(cidr.to_string());
    let (addr, prefix) = match cidr.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (cidr, None),
    };
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    if let Some(prefix) = prefix {
        let max = if addr.is_ipv4() { 32 } else { 128 };
        match prefix.parse::<u8>() {
            Ok(len) if len <= max && !prefix.starts_with('+') => {}
            _ => return Err(invalid()),
        }
    }
    Ok(())
}

pub fn since(spec: &str) -> Result<(), ValidationError> {
    if SINCE.is_match(spec) {
        Ok(())
    } else {
        Err(ValidationError::Since(spec.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_names() {
        for ok in ["nginx", "libc6", "g++", "python3.12", "lib32z1-dev"] {
            assert!(package_name(ok).is_ok(), "{ok}");
        }
        // Leading dashes fit the name grammar; apt-get sees them after `--`
        assert!(package_name("-y").is_ok());
        for bad in ["", "Nginx", "nginx;rm -rf /", "foo bar", "pkg_name", "a\nb"] {
            assert!(package_name(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_service_units() {
        for ok in ["nginx.service", "getty@tty1.service", "systemd-journald.service"] {
            assert!(service_unit(ok).is_ok(), "{ok}");
        }
        for bad in ["nginx", "nginx.socket", "../nginx.service", "a b.service", ".service\n"] {
            assert!(service_unit(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_usernames() {
        for ok in ["alice", "_svc", "deploy-bot", "u1"] {
            assert!(username(ok).is_ok(), "{ok}");
        }
        let long = "a".repeat(33);
        for bad in ["", "Alice", "1user", "-r", "root;id", long.as_str()] {
            assert!(username(bad).is_err(), "{bad:?}");
        }
        assert!(username(&"a".repeat(32)).is_ok());
    }

    #[test]
    fn test_rule_numbers_and_interfaces() {
        assert!(rule_number("3").is_ok());
        assert!(rule_number("").is_err());
        assert!(rule_number("3 && reboot").is_err());

        assert!(interface_name("eth0").is_ok());
        assert!(interface_name("br-lan.10").is_ok());
        assert!(interface_name("-up").is_err());
        assert!(interface_name("averyveryverylongname").is_err());
    }

    #[test]
    fn test_paths_and_since() {
        assert!(absolute_path("/bin/bash").is_ok());
        assert!(absolute_path("/home/alice").is_ok());
        assert!(absolute_path("bash").is_err());
        assert!(absolute_path("/home/../etc").is_err());

        assert!(since("2024-01-01 10:00:00").is_ok());
        assert!(since("1 hour ago").is_ok());
        assert!(since("-1h").is_ok());
        assert!(since("+5min").is_ok());
        assert!(since("@1700000000").is_ok());
        assert!(since("--all").is_err());
        assert!(since("-x").is_err());
        assert!(since("today; reboot").is_err());
    }

    #[test]
    fn test_passwords() {
        assert!(password("correct horse: battery").is_ok());
        assert!(password("").is_err());
        assert!(password("pw\nroot:pw").is_err());
        assert!(password("pw\r").is_err());
    }

    #[test]
    fn test_ip_addresses() {
        for ok in ["10.0.0.1", "fe80::1", "::1"] {
            assert!(ip_address(ok).is_ok(), "{ok}");
        }
        for bad in ["", "10.0.0.0/24", "10.0.0.256", "gw.example", "-1"] {
            assert!(ip_address(bad).is_err(), "{bad:?}");
        }

        for ok in ["10.0.0.5", "10.0.0.0/24", "0.0.0.0/0", "fd00::1/64", "2001:db8::/128"] {
            assert!(ip_network(ok).is_ok(), "{ok}");
        }
        for bad in ["", "10.0.0.0/33", "fd00::/129", "10.0.0.0/", "10.0.0.0/+8", "default", "10.0.0.0/24 dev lo"] {
            assert!(ip_network(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_journal_units() {
        assert!(journal_unit("nginx").is_ok());
        assert!(journal_unit("nginx.service").is_ok());
        assert!(journal_unit("--flush").is_err());
        assert!(journal_unit("a b").is_err());
    }
}

use thiserror::Error;

use crate::command::CommandError;

/// Input rejected before any host process is spawned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid package name: {0:?}")]
    PackageName(String),
    #[error("a package name is required for apt-get {0}")]
    MissingPackage(String),
    #[error("invalid service unit name: {0:?}")]
    UnitName(String),
    #[error("invalid username: {0:?}")]
    Username(String),
    #[error("invalid firewall rule number: {0:?}")]
    RuleNumber(String),
    #[error("invalid interface name: {0:?}")]
    InterfaceName(String),
    #[error("invalid path: {0:?}")]
    Path(String),
    #[error("invalid password: {0}")]
    Password(&'static str),
    #[error("invalid IP address: {0:?}")]
    IpAddress(String),
    #[error("invalid time specification: {0:?}")]
    Since(String),
    #[error("unknown configuration file: {0:?}")]
    UnknownConfig(String),
    #[error("unknown {kind}: {value:?}")]
    UnknownName { kind: &'static str, value: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Who is to blame for a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Malformed or disallowed input
    Client,
    /// Host tool failure, timeout, unreadable output
    Server,
}

impl Fault {
    pub fn classify(err: &anyhow::Error) -> Self {
        if err.chain().any(|e| e.is::<ValidationError>()) {
            Fault::Client
        } else {
            Fault::Server
        }
    }
}

/// Find the host command failure behind an adapter error, if there is one.
pub fn command_error(err: &anyhow::Error) -> Option<&CommandError> {
    err.chain().find_map(|e| e.downcast_ref::<CommandError>())
}

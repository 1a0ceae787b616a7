use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default number of journal lines requested
pub const DEFAULT_JOURNAL_LINES: u32 = 200;

/// Syslog severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Priority {
    /// Numeric syslog level, 0 (emerg) through 7 (debug)
    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emerg => "emerg",
            Self::Alert => "alert",
            Self::Crit => "crit",
            Self::Err => "err",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Spelled out as `Priority::` because `Self::Err` would clash with the `Err` variant.
impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Priority, ValidationError> {
        match s {
            "emerg" => Ok(Priority::Emerg),
            "alert" => Ok(Priority::Alert),
            "crit" => Ok(Priority::Crit),
            "err" => Ok(Priority::Err),
            "warning" => Ok(Priority::Warning),
            "notice" => Ok(Priority::Notice),
            "info" => Ok(Priority::Info),
            "debug" => Ok(Priority::Debug),
            other => Err(ValidationError::UnknownName {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalQuery {
    pub unit: Option<String>,
    pub lines: u32,
    /// Include entries at this severity or worse
    pub priority: Option<Priority>,
    /// Anything `journalctl --since` accepts, e.g. `"1 hour ago"`
    pub since: Option<String>,
}

impl Default for JournalQuery {
    fn default() -> Self {
        Self {
            unit: None,
            lines: DEFAULT_JOURNAL_LINES,
            priority: None,
            since: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait LogReader: Send + Sync {
    async fn query(&self, query: &JournalQuery) -> Result<Vec<JournalEntry>>;
}

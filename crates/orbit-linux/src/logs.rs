//! systemd journal access through `journalctl --output=json`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use orbit_platform::command::{argv, CommandRunner, RunOptions};
use orbit_platform::logs::{JournalEntry, JournalQuery, LogReader};
use orbit_platform::validate;

pub struct JournalctlReader {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl JournalctlReader {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LogReader for JournalctlReader {
    async fn query(&self, query: &JournalQuery) -> Result<Vec<JournalEntry>> {
        let args = journalctl_args(query)?;

        // Other units' journals are only readable by root or the adm group
        let options = RunOptions::default()
            .with_elevation(query.unit.is_some())
            .with_timeout(self.timeout);

        let out = self
            .runner
            .run("journalctl", &args, options)
            .await
            .context("journalctl failed")?;

        Ok(parse_journal(&out.stdout))
    }
}

fn journalctl_args(query: &JournalQuery) -> Result<Vec<String>> {
    let mut args = argv(["-n".to_string(), query.lines.to_string(), "--output=json".to_string()]);

    if let Some(unit) = &query.unit {
        validate::journal_unit(unit)?;
        args.extend(argv(["-u", unit.as_str()]));
    }
    if let Some(priority) = query.priority {
        args.extend(argv(["-p".to_string(), priority.level().to_string()]));
    }
    if let Some(since) = &query.since {
        validate::since(since)?;
        args.extend(argv(["--since", since.as_str()]));
    }
    args.push("--no-pager".to_string());
    Ok(args)
}

/// One JSON object per line; lines that fail to parse are skipped.
fn parse_journal(stdout: &str) -> Vec<JournalEntry> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .filter_map(|(index, line)| match serde_json::from_str::<Map<String, Value>>(line) {
            Ok(record) => Some(entry_from_record(index, &record)),
            Err(e) => {
                debug!("skipping journal line {}: {}", index, e);
                None
            }
        })
        .filter(|entry| !entry.message.trim().is_empty())
        .collect()
}

fn entry_from_record(index: usize, record: &Map<String, Value>) -> JournalEntry {
    let realtime = field_str(record, "__REALTIME_TIMESTAMP")
        .or_else(|| field_str(record, "_SOURCE_REALTIME_TIMESTAMP"));

    let id = realtime
        .clone()
        .or_else(|| field_str(record, "MESSAGE_ID"))
        .or_else(|| field_str(record, "__CURSOR"))
        .unwrap_or_else(|| index.to_string());

    JournalEntry {
        id,
        message: record.get("MESSAGE").map(message_text).unwrap_or_default(),
        unit: field_str(record, "_SYSTEMD_UNIT"),
        priority: field_str(record, "PRIORITY").and_then(|p| p.parse().ok()),
        timestamp: realtime
            .as_deref()
            .and_then(timestamp_from_micros)
            .unwrap_or_else(Utc::now),
    }
}

fn field_str(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// journald emits non-UTF-8 messages as an array of byte values.
fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(bytes) => {
            let raw: Vec<u8> = bytes
                .iter()
                .filter_map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            String::from_utf8_lossy(&raw).into_owned()
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn timestamp_from_micros(micros: &str) -> Option<DateTime<Utc>> {
    let micros: i64 = micros.parse().ok()?;
    DateTime::from_timestamp_millis(micros / 1000)
}

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default wall-clock limit for one host command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on captured stdout/stderr (10 MiB per stream)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Per-invocation options for a [`CommandRunner`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Run as superuser, wrapping with `sudo -n` when the process is not already root
    pub require_elevation: bool,
    /// `None` leaves the runner's own limit in force
    pub timeout: Option<Duration>,
    pub max_output_bytes: Option<usize>,
    /// Written to the child's stdin, which is then closed
    pub stdin: Option<Vec<u8>>,
}

impl RunOptions {
    pub fn elevated() -> Self {
        Self {
            require_elevation: true,
            ..Self::default()
        }
    }

    pub fn with_elevation(mut self, elevate: bool) -> Self {
        self.require_elevation = elevate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    pub fn with_stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }
}

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{message}")]
    Exit {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
        message: String,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { program: String, timeout: Duration },
    #[error("{program} produced more than {limit} bytes of output")]
    OutputOverflow { program: String, limit: usize },
    #[error("i/o error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Build a non-zero-exit error. The message prefers stderr, then stdout,
    /// then a generic status line.
    pub fn exit(program: &str, code: Option<i32>, stdout: String, stderr: String) -> Self {
        let message = if !stderr.trim().is_empty() {
            stderr.trim().to_string()
        } else if !stdout.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            match code {
                Some(c) => format!("{} exited with status {}", program, c),
                None => format!("{} was terminated by a signal", program),
            }
        };
        Self::Exit {
            program: program.to_string(),
            code,
            stdout,
            stderr,
            message,
        }
    }

    pub fn program(&self) -> &str {
        match self {
            Self::Spawn { program, .. }
            | Self::Exit { program, .. }
            | Self::Timeout { program, .. }
            | Self::OutputOverflow { program, .. }
            | Self::Io { program, .. } => program,
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => *code,
            _ => None,
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            Self::Exit { stderr, .. } => stderr,
            _ => "",
        }
    }
}

/// Message returned by mutating adapter calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub message: String,
}

impl ActionOutcome {
    /// Use the tool's own output when it printed anything, otherwise `fallback`.
    pub fn from_output(output: &CommandOutput, fallback: impl Into<String>) -> Self {
        let message = if !output.stdout.trim().is_empty() {
            output.stdout.trim().to_string()
        } else if !output.stderr.trim().is_empty() {
            output.stderr.trim().to_string()
        } else {
            fallback.into()
        };
        Self { message }
    }
}

/// Executes a fixed host program with an argument vector. Never a shell string.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: RunOptions,
    ) -> Result<CommandOutput, CommandError>;
}

/// Shorthand for building an owned argument vector from literals and values.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_message_prefers_stderr() {
        let err = CommandError::exit("apt-get", Some(100), "out".into(), "E: broken\n".into());
        assert_eq!(err.to_string(), "E: broken");
        assert_eq!(err.code(), Some(100));
        assert_eq!(err.stderr(), "E: broken\n");
    }

    #[test]
    fn test_exit_message_falls_back_to_stdout_then_status() {
        let err = CommandError::exit("ufw", Some(1), "ERROR: bad rule".into(), String::new());
        assert_eq!(err.to_string(), "ERROR: bad rule");

        let err = CommandError::exit("ufw", Some(1), String::new(), "  ".into());
        assert_eq!(err.to_string(), "ufw exited with status 1");
    }

    #[test]
    fn test_outcome_fallback() {
        let out = CommandOutput::default();
        assert_eq!(ActionOutcome::from_output(&out, "done").message, "done");

        let out = CommandOutput {
            stdout: "Firewall reloaded\n".into(),
            stderr: String::new(),
        };
        assert_eq!(ActionOutcome::from_output(&out, "done").message, "Firewall reloaded");
    }

    #[test]
    fn test_run_options_builders() {
        let opts = RunOptions::elevated()
            .with_timeout(Duration::from_secs(60))
            .with_stdin("data");
        assert!(opts.require_elevation);
        assert_eq!(opts.timeout, Some(Duration::from_secs(60)));
        assert_eq!(opts.stdin.as_deref(), Some(&b"data"[..]));
        assert_eq!(opts.max_output_bytes, None);
        assert_eq!(RunOptions::default().timeout, None);
    }
}

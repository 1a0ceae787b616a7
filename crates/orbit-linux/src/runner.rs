//! Host command execution with optional `sudo -n` elevation, bounded time and output.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use orbit_platform::command::{
    CommandError, CommandOutput, CommandRunner, RunOptions, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT,
};

const SUDO: &str = "sudo";

pub struct HostCommandRunner {
    /// Effective UID was 0 when the runner was created
    is_root: bool,
    timeout: Duration,
    max_output_bytes: usize,
}

impl HostCommandRunner {
    pub fn new() -> Self {
        Self::with_root(nix::unistd::geteuid().is_root())
    }

    /// Runner with a fixed notion of whether we already hold superuser rights
    pub fn with_root(is_root: bool) -> Self {
        Self {
            is_root,
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Host-wide limits for calls that set none in their [`RunOptions`].
    pub fn with_limits(mut self, timeout: Duration, max_output_bytes: usize) -> Self {
        self.timeout = timeout;
        self.max_output_bytes = max_output_bytes;
        self
    }

    fn effective_limits(&self, options: &RunOptions) -> (Duration, usize) {
        (
            options.timeout.unwrap_or(self.timeout),
            options.max_output_bytes.unwrap_or(self.max_output_bytes),
        )
    }

    /// Resolve the binary and argv actually executed for a request.
    pub fn command_line(&self, program: &str, args: &[String], elevate: bool) -> (String, Vec<String>) {
        if elevate && !self.is_root {
            let mut argv = Vec::with_capacity(args.len() + 2);
            argv.push("-n".to_string());
            argv.push(program.to_string());
            argv.extend_from_slice(args);
            (SUDO.to_string(), argv)
        } else {
            (program.to_string(), args.to_vec())
        }
    }
}

impl Default for HostCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for HostCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: RunOptions,
    ) -> Result<CommandOutput, CommandError> {
        let (binary, argv) = self.command_line(program, args, options.require_elevation);
        let (timeout, max_output) = self.effective_limits(&options);
        debug!(
            "exec {} ({} args, elevated={}, stdin={})",
            program,
            args.len(),
            binary == SUDO,
            options.stdin.is_some()
        );

        let mut child = Command::new(&binary)
            .args(&argv)
            .stdin(if options.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group, so a timeout also reaches whatever sudo started
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let collected = tokio::time::timeout(
            timeout,
            collect(&mut child, program, options.stdin, max_output),
        )
        .await;

        let (status, stdout, stderr) = match collected {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                reap(&mut child).await;
                return Err(e);
            }
            Err(_) => {
                warn!("{} timed out after {:?}, killing", program, timeout);
                reap(&mut child).await;
                return Err(CommandError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            debug!("{} exited with {:?}", program, status.code());
            Err(CommandError::exit(program, status.code(), stdout, stderr))
        }
    }
}

/// Feed stdin, drain both output pipes and wait for exit.
async fn collect(
    child: &mut Child,
    program: &str,
    payload: Option<Vec<u8>>,
    limit: usize,
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), CommandError> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let feed = async {
        if let (Some(mut pipe), Some(data)) = (stdin, payload) {
            let written = async {
                pipe.write_all(&data).await?;
                pipe.shutdown().await
            }
            .await;
            match written {
                Ok(()) => {}
                // The child may exit without reading; its exit status tells the story.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("{} closed stdin early", program);
                }
                Err(source) => {
                    return Err(CommandError::Io {
                        program: program.to_string(),
                        source,
                    })
                }
            }
        }
        Ok(())
    };

    let ((), out, err) = tokio::try_join!(
        feed,
        read_capped(stdout, program, limit),
        read_capped(stderr, program, limit),
    )?;

    let status = child.wait().await.map_err(|source| CommandError::Io {
        program: program.to_string(),
        source,
    })?;

    Ok((status, out, err))
}

async fn read_capped<R>(reader: Option<R>, program: &str, limit: usize) -> Result<Vec<u8>, CommandError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = BytesMut::with_capacity(8 * 1024);
    loop {
        let n = reader.read_buf(&mut buf).await.map_err(|source| CommandError::Io {
            program: program.to_string(),
            source,
        })?;
        if n == 0 {
            return Ok(buf.to_vec());
        }
        if buf.len() > limit {
            return Err(CommandError::OutputOverflow {
                program: program.to_string(),
                limit,
            });
        }
    }
}

/// Kill the child's whole process group and wait for the leader.
async fn reap(child: &mut Child) {
    match child.id() {
        Some(pid) => {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!("killpg {} failed: {}", pid, e);
            }
        }
        None => debug!("child already reaped"),
    }
    if let Err(e) = child.start_kill() {
        debug!("kill failed: {}", e);
    }
    let _ = child.wait().await;
}

//! Process Runner
//!
//! Runs exactly one child process per call with piped stdout/stderr and a
//! hard deadline. Every outcome (clean exit, non-zero exit, timeout, spawn
//! failure) is folded into an [`ExecutionResult`]; nothing here returns an
//! error to the caller and nothing is retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Exit code reported when the process did not run to completion
pub const RUNNER_FAILURE_EXIT_CODE: i32 = -1;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Time a child gets to exit after SIGTERM before it is killed outright
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Time allowed to collect buffered output once a timed-out child is gone
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// A concrete process to run: program, arguments and working directory
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Full argument vector, program first
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Normalized outcome of one process run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// `None` means the process never produced a usable result
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: i32,
    pub timed_out: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && self.stdout.is_some()
    }

    /// Whether the failure happened before/around the process rather than in it
    pub fn is_runner_failure(&self) -> bool {
        self.stdout.is_none()
    }
}

/// Seam between the chain executor and the OS
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation, timeout_secs: u64) -> ExecutionResult;
}

/// Runner backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

enum Completion {
    Exited {
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    TimedOut {
        status: Option<ExitStatus>,
        stdout: Vec<u8>,
    },
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &Invocation, timeout_secs: u64) -> ExecutionResult {
        debug!("Running {:?} (timeout {}s)", invocation.argv(), timeout_secs);

        let start_time = Utc::now();
        let started = Instant::now();
        let completion = run_child(invocation, timeout_secs).await;
        let end_time = Utc::now();
        let duration = started.elapsed();

        let (stdout, stderr, exit_code, timed_out) = match completion {
            Ok(Completion::Exited {
                status,
                stdout,
                stderr,
            }) => match (String::from_utf8(stdout), String::from_utf8(stderr)) {
                (Ok(stdout), Ok(stderr)) => {
                    let code = exit_code(&status);
                    info!("Job finished with returncode: '{}'.", code);
                    (Some(stdout), Some(stderr), code, false)
                }
                (Err(e), _) | (_, Err(e)) => {
                    let message = format!("command output is not valid UTF-8: {e}");
                    error!("Job failed: \"{}\".", message);
                    (None, Some(message), RUNNER_FAILURE_EXIT_CODE, false)
                }
            },
            Ok(Completion::TimedOut { status, stdout }) => {
                let message = format!("command timed out after {timeout_secs} seconds");
                error!("Job failed: \"{}\".", message);
                let code = status
                    .as_ref()
                    .map(exit_code)
                    .unwrap_or(RUNNER_FAILURE_EXIT_CODE);
                // Output cut off by the kill may end mid code point
                let stdout = String::from_utf8_lossy(&stdout).into_owned();
                (Some(stdout), Some(message), code, true)
            }
            Err(e) => {
                let message = format!("failed to run '{}': {}", invocation.program, e);
                error!("Job failed: \"{}\".", message);
                (None, Some(message), RUNNER_FAILURE_EXIT_CODE, false)
            }
        };

        ExecutionResult {
            stdout,
            stderr,
            exit_code,
            timed_out,
            start_time,
            end_time,
            duration,
        }
    }
}

async fn run_child(invocation: &Invocation, timeout_secs: u64) -> std::io::Result<Completion> {
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.working_dir {
        command.current_dir(dir);
    }
    // Own process group, so a timeout can take down grandchildren as well
    #[cfg(unix)]
    {
        command.process_group(0);
    }

    let mut child = command.spawn()?;
    let pid = child.id();

    // Drain both pipes while waiting so a chatty child can't block on a full pipe
    let mut stdout_reader = tokio::spawn(read_stream(child.stdout.take()));
    let mut stderr_reader = tokio::spawn(read_stream(child.stderr.take()));

    let limit = Duration::from_secs(timeout_secs);
    let waited = tokio::time::timeout(limit, async {
        let status = child.wait().await?;
        let stdout = join_reader(&mut stdout_reader).await?;
        let stderr = join_reader(&mut stderr_reader).await?;
        Ok::<_, std::io::Error>((status, stdout, stderr))
    })
    .await;

    match waited {
        Ok(Ok((status, stdout, stderr))) => Ok(Completion::Exited {
            status,
            stdout,
            stderr,
        }),
        Ok(Err(e)) => {
            terminate(&mut child, pid).await;
            stdout_reader.abort();
            stderr_reader.abort();
            Err(e)
        }
        Err(_) => {
            warn!(
                "Command exceeded {}s, terminating pid {:?}",
                timeout_secs,
                child.id()
            );
            let status = terminate(&mut child, pid).await;
            stderr_reader.abort();
            let drained = tokio::time::timeout(DRAIN_GRACE, join_reader(&mut stdout_reader)).await;
            let stdout = match drained {
                Ok(Ok(bytes)) => bytes,
                _ => {
                    stdout_reader.abort();
                    Vec::new()
                }
            };
            Ok(Completion::TimedOut { status, stdout })
        }
    }
}

/// SIGTERM to the process group, short grace period, then SIGKILL.
/// Always reaps the child. `pid` is the id captured at spawn time, which is
/// also the process group id.
///
/// A leader that was already reaped before we got here is left alone: its
/// group may be empty and the id free for reuse, so no signal is sent.
async fn terminate(child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            if let Ok(Some(status)) = child.try_wait() {
                debug!("pid {} already exited, skipping group signals", pid);
                return Some(status);
            }

            let group = -(pid as libc::pid_t);
            // SAFETY: the unreaped child leads this group, so the id is ours
            unsafe { libc::kill(group, libc::SIGTERM) };
            let status = match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                Ok(Ok(exited)) => Some(exited),
                _ => None,
            };

            // Sweep what the command left behind in its group. Best effort once
            // the leader is reaped: the id is reserved only while a member lives.
            // SAFETY: plain signal delivery, no memory is touched
            unsafe { libc::kill(group, libc::SIGKILL) };
            if status.is_some() {
                return status;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Ok(Some(status)) = child.try_wait() {
        return Some(status);
    }
    if let Err(e) = child.kill().await {
        warn!("Failed to kill child process: {}", e);
    }
    child.wait().await.ok()
}

async fn read_stream<R>(stream: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

async fn join_reader(
    reader: &mut JoinHandle<std::io::Result<Vec<u8>>>,
) -> std::io::Result<Vec<u8>> {
    reader.await.map_err(std::io::Error::other)?
}

fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    RUNNER_FAILURE_EXIT_CODE
}

//! Subprocess execution for allowed requests.
//!
//! The proxy never builds a shell command line. The argument vector from the
//! request is handed to the target binary as-is through
//! [`tokio::process::Command::args`], so a string such as `"; rm -rf /"` is
//! one opaque argument.
//!
//! Each run is bounded by [`ExecLimits`]: on timeout the child is killed
//! and the result carries [`TIMEOUT_EXIT_CODE`]. Children are spawned with
//! `kill_on_drop`, so dropping the run future (for instance because the
//! client hung up) also terminates the process.

use std::ffi::OsString;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::limits::{ExecLimits, LimitedBuffer};

/// Exit code reported when a subprocess exceeds its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Environment variables stripped from every child. The debug and pager
/// variables keep it in its normal, non-interactive mode; `GH_REPO` and
/// `GH_HOST` would otherwise redirect commands to a repository other than
/// the workspace.
const STRIPPED_ENV: &[&str] = &[
    "GH_DEBUG", "DEBUG", "GH_PAGER", "PAGER", "GH_REPO", "GH_HOST",
];

/// Errors starting or supervising a subprocess.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The program could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// Reading output or waiting for the child failed.
    #[error("I/O error while running {program}: {source}")]
    Io {
        /// Program being supervised
        program: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Captured result of a subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code; `128 + signal` when killed by a signal
    pub exit_code: i32,
    /// Raw standard output
    pub stdout: Vec<u8>,
    /// Raw standard error
    pub stderr: Vec<u8>,
    /// Whether either stream hit the output limit
    pub truncated: bool,
    /// Whether the child was killed for exceeding the timeout
    pub timed_out: bool,
}

/// Runs the underlying CLI with an explicit argument vector.
///
/// This is the seam between request handling and process spawning: the
/// proxy services only ever talk to a `CommandRunner`, which lets tests
/// observe exactly which vectors would have been executed.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the target program with `args` and capture its output.
    async fn run(&self, args: &[String]) -> Result<ExecOutput, ExecError>;
}

/// [`CommandRunner`] that spawns a real program.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    working_dir: Option<PathBuf>,
    limits: ExecLimits,
}

impl ProcessRunner {
    /// Create a runner for `program` (resolved through `PATH` when not a path).
    pub fn new(program: impl Into<PathBuf>, limits: ExecLimits) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
            limits,
        }
    }

    /// Run children in `dir` instead of the proxy's own working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args.iter().map(OsString::from))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("GH_PROMPT_DISABLED", "1")
            .kill_on_drop(true);
        for var in STRIPPED_ENV {
            cmd.env_remove(var);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, args: &[String]) -> Result<ExecOutput, ExecError> {
        let program = self.program_name();
        let mut child = self
            .command(args)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.limits.max_output_bytes;

        let supervised = async {
            let (out, err) = tokio::join!(drain(stdout, limit), drain(stderr, limit));
            let status = child.wait().await?;
            Ok::<_, io::Error>((status, out?, err?))
        };

        match tokio::time::timeout(self.limits.timeout, supervised).await {
            Ok(Ok((status, out, err))) => Ok(ExecOutput {
                exit_code: exit_code(status),
                truncated: out.was_truncated() || err.was_truncated(),
                stdout: out.into_bytes(),
                stderr: err.into_bytes(),
                timed_out: false,
            }),
            Ok(Err(source)) => Err(ExecError::Io { program, source }),
            Err(_elapsed) => {
                if let Err(e) = child.start_kill() {
                    tracing::warn!("failed to kill timed out {}: {}", program, e);
                }
                // Reap so the child does not linger as a zombie.
                if let Err(e) = child.wait().await {
                    tracing::warn!("failed to reap timed out {}: {}", program, e);
                }
                tracing::info!(
                    "{} timed out after {}s",
                    program,
                    self.limits.timeout.as_secs_f64()
                );
                Ok(ExecOutput {
                    exit_code: TIMEOUT_EXIT_CODE,
                    stdout: Vec::new(),
                    stderr: format!(
                        "{} timed out after {}s and was killed\n",
                        program,
                        self.limits.timeout.as_secs_f64()
                    )
                    .into_bytes(),
                    truncated: false,
                    timed_out: true,
                })
            }
        }
    }
}

/// Read a child pipe to EOF, keeping at most `limit` bytes.
async fn drain<R>(pipe: Option<R>, limit: usize) -> io::Result<LimitedBuffer>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = LimitedBuffer::new(limit);
    let Some(mut pipe) = pipe else {
        return Ok(buffer);
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buffer);
        }
        buffer.write(&chunk[..n]);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

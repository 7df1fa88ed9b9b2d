//! Extension commands: proxy-side operations that are not a direct
//! passthrough of a `gh` subcommand.
//!
//! Extensions are matched on exact `(group, subcommand)` before the
//! passthrough table and bypass the flag allowlist entirely, so each handler
//! is responsible for validating its own arguments.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::executor::{CommandRunner, ExecError, ExecOutput};
use crate::repo::RepoSlug;

/// Errors an extension handler can report.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// Wrong number of arguments.
    #[error("usage: {0}")]
    Usage(&'static str),
    /// An argument failed validation.
    #[error("{0}")]
    InvalidArgument(String),
    /// The command needs the workspace repository and none is known.
    #[error("could not detect repository from git remote")]
    NoWorkspaceRepo,
    /// The underlying CLI could not be run.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl ExtensionError {
    /// Returns true when the request was rejected before anything ran.
    pub fn is_denial(&self) -> bool {
        !matches!(self, ExtensionError::Exec(_))
    }
}

/// What a handler gets to work with.
#[derive(Clone, Copy)]
pub struct ExtensionContext<'a> {
    /// Runner for the underlying CLI.
    pub runner: &'a dyn CommandRunner,
    /// The repository the proxy was launched for, if known.
    pub workspace_repo: Option<&'a RepoSlug>,
}

impl fmt::Debug for ExtensionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionContext")
            .field("workspace_repo", &self.workspace_repo)
            .finish_non_exhaustive()
    }
}

/// Custom logic behind an extension command.
#[async_trait]
pub trait ExtensionHandler: Send + Sync {
    /// Validate the arguments that follow `<group> <subcommand>` without
    /// running anything. Called before the request is recorded as allowed.
    fn check(&self, _args: &[String], _ctx: ExtensionContext<'_>) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Run with the arguments that follow `<group> <subcommand>`.
    async fn run(
        &self,
        args: &[String],
        ctx: ExtensionContext<'_>,
    ) -> Result<ExecOutput, ExtensionError>;
}

/// A named extension command.
#[derive(Clone)]
pub struct ExtensionCommand {
    /// First argument, e.g. `ext`.
    pub group: &'static str,
    /// Second argument, e.g. `run-logs`.
    pub subcommand: &'static str,
    /// One-line description for group help.
    pub description: &'static str,
    /// Full help text for `gh <group> <subcommand> -h`.
    pub help_text: &'static str,
    /// The handler.
    pub handler: Arc<dyn ExtensionHandler>,
}

impl fmt::Debug for ExtensionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionCommand")
            .field("group", &self.group)
            .field("subcommand", &self.subcommand)
            .finish_non_exhaustive()
    }
}

const RUN_LOGS_USAGE: &str = "gh ext run-logs <run-id>";

/// `gh ext run-logs <run-id>`: download workflow run logs for the workspace
/// repository via `gh api`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunLogs;

impl RunLogs {
    /// The `gh api` path for `args`, or why there is none.
    fn api_path(args: &[String], ctx: ExtensionContext<'_>) -> Result<String, ExtensionError> {
        let [run_id] = args else {
            return Err(ExtensionError::Usage(RUN_LOGS_USAGE));
        };

        // Numeric only: the id becomes part of an API path.
        if run_id.is_empty() || !run_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ExtensionError::InvalidArgument(format!(
                "invalid run id: {}",
                run_id
            )));
        }

        let repo = ctx.workspace_repo.ok_or(ExtensionError::NoWorkspaceRepo)?;
        Ok(format!(
            "/repos/{}/{}/actions/runs/{}/logs",
            repo.owner(),
            repo.name(),
            run_id
        ))
    }
}

#[async_trait]
impl ExtensionHandler for RunLogs {
    fn check(&self, args: &[String], ctx: ExtensionContext<'_>) -> Result<(), ExtensionError> {
        Self::api_path(args, ctx).map(|_| ())
    }

    async fn run(
        &self,
        args: &[String],
        ctx: ExtensionContext<'_>,
    ) -> Result<ExecOutput, ExtensionError> {
        let api_path = Self::api_path(args, ctx)?;
        Ok(ctx.runner.run(&["api".to_string(), api_path]).await?)
    }
}

/// The `ext run-logs` command definition.
pub fn run_logs_command() -> ExtensionCommand {
    ExtensionCommand {
        group: "ext",
        subcommand: "run-logs",
        description: "Download workflow run logs",
        help_text: "gh ext run-logs <run-id> (workspace repo only)\n\n\
                    Download workflow run logs for the current repository.\n\
                    Translates to: gh api /repos/{owner}/{repo}/actions/runs/{run-id}/logs\n",
        handler: Arc::new(RunLogs),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, args: &[String]) -> Result<ExecOutput, ExecError> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(ExecOutput {
                exit_code: 0,
                stdout: vec![0x50, 0x4b, 0x03, 0x04],
                ..Default::default()
            })
        }
    }

    fn strs(s: &[&str]) -> Vec<String> {
        s.iter().map(|x| x.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_logs_calls_api_for_workspace_repo() {
        let runner = RecordingRunner::default();
        let repo: RepoSlug = "owner/repo".parse().unwrap();
        let ctx = ExtensionContext {
            runner: &runner,
            workspace_repo: Some(&repo),
        };

        let out = RunLogs.run(&strs(&["12345"]), ctx).await.unwrap();

        assert_eq!(out.stdout, vec![0x50, 0x4b, 0x03, 0x04]);
        assert_eq!(
            *runner.calls.lock().unwrap(),
            vec![strs(&["api", "/repos/owner/repo/actions/runs/12345/logs"])]
        );
    }

    #[tokio::test]
    async fn test_run_logs_rejects_non_numeric_id() {
        let runner = RecordingRunner::default();
        let repo: RepoSlug = "owner/repo".parse().unwrap();
        let ctx = ExtensionContext {
            runner: &runner,
            workspace_repo: Some(&repo),
        };

        for bad in ["../etc/passwd", "12a", "", "-1"] {
            let err = RunLogs.check(&strs(&[bad]), ctx).unwrap_err();
            assert!(err.is_denial());
            assert!(err.to_string().contains("invalid run id"), "{err}");

            let err = RunLogs.run(&strs(&[bad]), ctx).await.unwrap_err();
            assert!(err.is_denial());
        }
        assert!(RunLogs.check(&strs(&["12345"]), ctx).is_ok());
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_logs_usage() {
        let runner = RecordingRunner::default();
        let ctx = ExtensionContext {
            runner: &runner,
            workspace_repo: None,
        };

        let err = RunLogs.run(&[], ctx).await.unwrap_err();
        assert!(err.to_string().contains("usage"));

        let err = RunLogs.run(&strs(&["1", "2"]), ctx).await.unwrap_err();
        assert!(err.to_string().contains("usage"));
    }

    #[tokio::test]
    async fn test_run_logs_needs_workspace_repo() {
        let runner = RecordingRunner::default();
        let ctx = ExtensionContext {
            runner: &runner,
            workspace_repo: None,
        };

        let err = RunLogs.run(&strs(&["42"]), ctx).await.unwrap_err();
        assert!(matches!(err, ExtensionError::NoWorkspaceRepo));
        assert!(runner.calls.lock().unwrap().is_empty());
    }
}

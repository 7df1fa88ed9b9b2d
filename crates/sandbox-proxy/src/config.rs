//! Proxy configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLog;
use crate::executor::ProcessRunner;
use crate::limits::ExecLimits;
use crate::policy::github_policy;
use crate::repo::{RepoSlug, detect_workspace_repo};
use crate::screenshot::DEFAULT_MAX_AGE;
use crate::service::{ClipboardService, GhService};

/// Directory holding both sockets and their logs, relative to the
/// workspace.
pub const DEFAULT_RUNTIME_DIR: &str = ".claude-sandbox";

/// Environment variable overriding the screenshot directory.
pub const SCREENSHOTS_DIR_ENV: &str = "CLIPBOARD_SCREENSHOTS_DIR";

/// Configuration for the gh proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhProxyConfig {
    /// Socket to listen on
    pub socket: PathBuf,
    /// Audit log; defaults to `gh-proxy.log` next to the socket
    pub audit_log: Option<PathBuf>,
    /// Working directory for `gh`, normally the workspace checkout
    pub workspace: PathBuf,
    /// The `gh` executable
    pub gh_binary: PathBuf,
    /// Timeout and output limits
    pub limits: ExecLimits,
    /// Workspace repository; detected from the git remote when unset
    pub repo: Option<RepoSlug>,
    /// Shut down when the parent process exits
    pub watch_parent: bool,
}

impl Default for GhProxyConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from(DEFAULT_RUNTIME_DIR).join("gh-proxy.sock"),
            audit_log: None,
            workspace: PathBuf::from("."),
            gh_binary: PathBuf::from("gh"),
            limits: ExecLimits::default(),
            repo: None,
            watch_parent: true,
        }
    }
}

impl GhProxyConfig {
    /// Where audit records go.
    pub fn audit_log_path(&self) -> PathBuf {
        self.audit_log
            .clone()
            .unwrap_or_else(|| self.socket.with_file_name("gh-proxy.log"))
    }

    /// Build the service, detecting the workspace repository if it was not
    /// configured.
    pub async fn build_service(&self) -> GhService {
        let repo = match &self.repo {
            Some(repo) => Some(repo.clone()),
            None => detect_workspace_repo(&self.workspace).await,
        };
        match &repo {
            Some(repo) => tracing::info!("Workspace repository: {}", repo),
            None => tracing::warn!(
                "Could not detect workspace repository in {}; ext run-logs disabled",
                self.workspace.display()
            ),
        }

        let runner = ProcessRunner::new(&self.gh_binary, self.limits.clone())
            .with_working_dir(&self.workspace);
        GhService::new(
            Arc::new(github_policy()),
            Arc::new(runner),
            Arc::new(AuditLog::new(self.audit_log_path())),
        )
        .with_workspace_repo(repo)
    }
}

/// Configuration for the clipboard proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardProxyConfig {
    /// Socket to listen on
    pub socket: PathBuf,
    /// Audit log; defaults to `clipboard-proxy.log` next to the socket
    pub audit_log: Option<PathBuf>,
    /// Directory scanned for screenshots
    pub screenshots_dir: PathBuf,
    /// Oldest screenshot that is still handed out
    pub max_age: Duration,
    /// Shut down when the parent process exits
    pub watch_parent: bool,
}

impl Default for ClipboardProxyConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from(DEFAULT_RUNTIME_DIR).join("clipboard-proxy.sock"),
            audit_log: None,
            screenshots_dir: default_screenshots_dir(),
            max_age: DEFAULT_MAX_AGE,
            watch_parent: true,
        }
    }
}

impl ClipboardProxyConfig {
    /// Where audit records go.
    pub fn audit_log_path(&self) -> PathBuf {
        self.audit_log
            .clone()
            .unwrap_or_else(|| self.socket.with_file_name("clipboard-proxy.log"))
    }

    /// Build the service.
    pub fn build_service(&self) -> ClipboardService {
        ClipboardService::new(
            &self.screenshots_dir,
            self.max_age,
            Arc::new(AuditLog::new(self.audit_log_path())),
        )
    }
}

/// `$CLIPBOARD_SCREENSHOTS_DIR`, else `$HOME/Pictures/Screenshots`.
pub fn default_screenshots_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(SCREENSHOTS_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join("Pictures").join("Screenshots")
}

//! Workspace repository identification.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tokio::process::Command;

/// A GitHub `owner/name` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    owner: String,
    name: String,
}

/// Error parsing a [`RepoSlug`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid repository slug: {0:?} (expected owner/name)")]
pub struct InvalidRepoSlug(pub String);

impl RepoSlug {
    /// Repository owner (user or organisation).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extract the slug from a GitHub remote URL.
    ///
    /// Accepts `git@github.com:owner/repo(.git)`,
    /// `ssh://git@github.com/owner/repo(.git)` and
    /// `http(s)://github.com/owner/repo(.git)`. Remotes on other hosts yield
    /// `None`.
    pub fn from_remote_url(url: &str) -> Option<Self> {
        let url = url.trim();
        let rest = url
            .strip_prefix("git@github.com:")
            .or_else(|| url.strip_prefix("ssh://git@github.com/"))
            .or_else(|| url.strip_prefix("https://github.com/"))
            .or_else(|| url.strip_prefix("http://github.com/"))?;
        let rest = rest.trim_end_matches('/');
        let rest = rest.strip_suffix(".git").unwrap_or(rest);
        rest.parse().ok()
    }
}

impl FromStr for RepoSlug {
    type Err = InvalidRepoSlug;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRepoSlug(s.to_string());
        let (owner, name) = s.split_once('/').ok_or_else(invalid)?;
        if !is_valid_component(owner) || !is_valid_component(name) {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Owner and repo names end up in API paths, so only the characters GitHub
/// itself allows are accepted.
fn is_valid_component(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Detect the workspace repository from `git remote get-url origin` run in
/// `workspace`. Returns `None` when git fails or the remote is not on
/// GitHub.
pub async fn detect_workspace_repo(workspace: &Path) -> Option<RepoSlug> {
    let output = match Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(workspace)
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!("git remote lookup failed: {}", e);
            return None;
        }
    };
    if !output.status.success() {
        tracing::debug!(
            "git remote get-url origin exited with {}",
            output.status.code().unwrap_or(-1)
        );
        return None;
    }
    let url = String::from_utf8(output.stdout).ok()?;
    RepoSlug::from_remote_url(&url)
}

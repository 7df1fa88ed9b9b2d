//! The compiled-in allowlist for the GitHub CLI.
//!
//! Flags are listed long form first, followed by the matching short form
//! when one exists; help output relies on that ordering to pair them.
//!
//! Write commands never accept `--repo`/`-R` (they act on the workspace
//! repository only) nor `--body-file`/`-F` (which would read host files).
//! `--web` is omitted everywhere because it opens a browser on the host.

use super::table::{CommandRule, PolicyBuilder, PolicyTable};
use crate::extension::run_logs_command;

const PR_LIST: &[&str] = &[
    "--state",
    "-s",
    "--limit",
    "-L",
    "--json",
    "--jq",
    "-q",
    "--label",
    "-l",
    "--author",
    "-A",
    "--assignee",
    "-a",
    "--base",
    "-B",
    "--head",
    "-H",
    "--search",
    "-S",
    "--draft",
    "-d",
    "--template",
    "-t",
    "--app",
    "--repo",
    "-R",
];

const VIEW_WITH_COMMENTS: &[&str] = &[
    "--json",
    "--jq",
    "-q",
    "--comments",
    "-c",
    "--template",
    "-t",
    "--repo",
    "-R",
];

const PR_DIFF: &[&str] = &["--color", "--patch", "--name-only", "--repo", "-R"];

const PR_CHECKS: &[&str] = &[
    "--json",
    "--jq",
    "-q",
    "--watch",
    "--interval",
    "-i",
    "--fail-fast",
    "--required",
    "--repo",
    "-R",
];

const ISSUE_LIST: &[&str] = &[
    "--state",
    "-s",
    "--limit",
    "-L",
    "--json",
    "--jq",
    "-q",
    "--label",
    "-l",
    "--author",
    "-A",
    "--assignee",
    "-a",
    "--milestone",
    "-m",
    "--search",
    "-S",
    "--template",
    "-t",
    "--repo",
    "-R",
];

const PLAIN_VIEW: &[&str] = &["--json", "--jq", "-q", "--template", "-t", "--repo", "-R"];

const RELEASE_LIST: &[&str] = &[
    "--limit",
    "-L",
    "--json",
    "--jq",
    "-q",
    "--exclude-drafts",
    "--exclude-pre-releases",
    "--order",
    "-O",
    "--repo",
    "-R",
];

const RUN_LIST: &[&str] = &[
    "--limit",
    "-L",
    "--json",
    "--jq",
    "-q",
    "--branch",
    "-b",
    "--workflow",
    "-w",
    "--status",
    "-s",
    "--event",
    "-e",
    "--user",
    "-u",
    "--commit",
    "-c",
    "--repo",
    "-R",
];

const RUN_VIEW: &[&str] = &[
    "--json",
    "--jq",
    "-q",
    "--log",
    "--log-failed",
    "--exit-status",
    "--verbose",
    "-v",
    "--job",
    "-j",
    "--attempt",
    "--repo",
    "-R",
];

const PR_CREATE: &[&str] = &[
    "--title",
    "-t",
    "--body",
    "-b",
    "--base",
    "-B",
    "--head",
    "-H",
    "--draft",
    "-d",
    "--label",
    "-l",
    "--assignee",
    "-a",
    "--reviewer",
    "-r",
    "--milestone",
    "-m",
    "--fill",
    "-f",
    "--fill-first",
    "--fill-verbose",
    "--template",
    "-T",
    "--no-maintainer-edit",
];

const ISSUE_CREATE: &[&str] = &[
    "--title",
    "-t",
    "--body",
    "-b",
    "--label",
    "-l",
    "--assignee",
    "-a",
    "--milestone",
    "-m",
    "--project",
    "-p",
    "--template",
    "-T",
];

const COMMENT: &[&str] = &["--body", "-b", "--edit-last"];

const READ_RULES: &[CommandRule] = &[
    CommandRule::read("pr", "list", PR_LIST),
    CommandRule::read("pr", "view", VIEW_WITH_COMMENTS),
    CommandRule::read("pr", "diff", PR_DIFF),
    CommandRule::read("pr", "checks", PR_CHECKS),
    CommandRule::read("issue", "list", ISSUE_LIST),
    CommandRule::read("issue", "view", VIEW_WITH_COMMENTS),
    CommandRule::read("repo", "view", PLAIN_VIEW),
    CommandRule::read("release", "list", RELEASE_LIST),
    CommandRule::read("release", "view", PLAIN_VIEW),
    CommandRule::read("run", "list", RUN_LIST),
    CommandRule::read("run", "view", RUN_VIEW),
];

const WRITE_RULES: &[CommandRule] = &[
    CommandRule::write("pr", "create", PR_CREATE),
    CommandRule::write("pr", "comment", COMMENT),
    CommandRule::write("issue", "create", ISSUE_CREATE),
    CommandRule::write("issue", "comment", COMMENT),
];

/// The policy the gh proxy runs with.
pub fn github_policy() -> PolicyTable {
    PolicyBuilder::new()
        .rules(READ_RULES.iter().cloned())
        .rules(WRITE_RULES.iter().cloned())
        .extension(run_logs_command())
        .build()
}

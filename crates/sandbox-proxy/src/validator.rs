//! Command validation against the policy table.
//!
//! `validate` decides, for a raw argument vector, whether the request may run
//! and how:
//!
//! 1. Help requests are answered from the table itself.
//! 2. An exact `(group, subcommand)` extension match routes to its handler
//!    without flag checks.
//! 3. Otherwise the pair must be in the table, every flag must be in the
//!    rule's allowlist, and write-scope rules reject any repository
//!    selector: a `-R`/`--repo` flag or a GitHub URL naming the target.
//!
//! Flag parsing is deliberately conservative. Any token starting with `-`
//! before a bare `--` is a flag; `--name=value` is checked by `--name`;
//! every other form (`-R=x`, `-Rx`, `-sopen`) must appear verbatim in the
//! allowlist, which in practice means it is rejected. Flag values that look
//! like flags are therefore treated as flags.

use thiserror::Error;

use crate::extension::ExtensionCommand;
use crate::help;
use crate::policy::{CommandRule, PolicyTable, Scope};

/// Why a request was refused.
///
/// The message names the rejected command or flag so the caller can fix the
/// invocation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Denial {
    /// No rule or extension for this `(group, subcommand)`.
    #[error("unsupported command: gh {0}")]
    UnsupportedCommand(String),
    /// A flag outside the rule's allowlist.
    #[error("flag not permitted for gh {command}: {flag}")]
    FlagNotPermitted {
        /// `group subcommand`
        command: String,
        /// The rejected flag
        flag: String,
    },
    /// A write command tried to select another repository.
    #[error(
        "repository override not permitted for gh {command}: {selector} \
         (write commands only act on the workspace repository)"
    )]
    RepoOverride {
        /// `group subcommand`
        command: String,
        /// The flag name or URL that selected the repository
        selector: String,
    },
}

/// How an allowed request is carried out.
#[derive(Clone, Debug)]
pub enum ExecutionPlan {
    /// Answer with locally generated help text.
    Help(String),
    /// Run the underlying CLI with the request's exact argument vector.
    Passthrough {
        /// Arguments, unchanged
        args: Vec<String>,
        /// Scope of the matched rule
        scope: Scope,
    },
    /// Hand the remaining arguments to an extension handler.
    Extension {
        /// The matched extension
        command: ExtensionCommand,
        /// Arguments after `<group> <subcommand>`
        args: Vec<String>,
    },
}

/// Decide whether `args` may run under `table`.
pub fn validate(table: &PolicyTable, args: &[String]) -> Result<ExecutionPlan, Denial> {
    if let Some(text) = help::maybe_help(table, args) {
        return Ok(ExecutionPlan::Help(text));
    }

    let [group, subcommand, rest @ ..] = args else {
        return Err(Denial::UnsupportedCommand(args.join(" ")));
    };

    if let Some(ext) = table.find_extension(group, subcommand) {
        return Ok(ExecutionPlan::Extension {
            command: ext.clone(),
            args: rest.to_vec(),
        });
    }

    let command = format!("{} {}", group, subcommand);
    let rule = table
        .find(group, subcommand)
        .ok_or_else(|| Denial::UnsupportedCommand(command.clone()))?;

    if rule.scope.is_write()
        && let Some(selector) = rest.iter().find(|a| is_repo_selector(a))
    {
        return Err(Denial::RepoOverride {
            command,
            selector: flag_name(selector).to_string(),
        });
    }

    check_flags(rule, rest).map_err(|flag| Denial::FlagNotPermitted {
        command,
        flag: flag.to_string(),
    })?;

    Ok(ExecutionPlan::Passthrough {
        args: args.to_vec(),
        scope: rule.scope,
    })
}

/// The flag name of a token: `--state=open` is `--state`, anything else is
/// the token itself.
fn flag_name(arg: &str) -> &str {
    if arg.starts_with("--")
        && let Some((name, _value)) = arg.split_once('=')
    {
        return name;
    }
    arg
}

/// `-R`, `-Rowner/repo`, `-R=owner/repo`, `--repo`, `--repo=x`, and anything
/// else that begins like them.
/// A token that is a GitHub URL also selects its repository, since `gh`
/// accepts `https://github.com/<owner>/<repo>/pull/1` in place of a number.
fn is_repo_selector(arg: &str) -> bool {
    arg.starts_with("-R") || arg.starts_with("--repo") || is_github_url(arg)
}

fn is_github_url(arg: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "https://github.com/",
        "http://github.com/",
        "https://www.github.com/",
        "http://www.github.com/",
        "github.com/",
        "www.github.com/",
        "git@github.com:",
        "ssh://git@github.com/",
    ];
    let lower = arg.to_ascii_lowercase();
    PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

/// Returns the first flag not in the allowlist. Tokens after a bare `--`
/// are positional.
fn check_flags<'a>(rule: &CommandRule, rest: &'a [String]) -> Result<(), &'a str> {
    for arg in rest {
        if arg == "--" {
            break;
        }
        if arg.starts_with('-') {
            let flag = flag_name(arg);
            if !rule.allows_flag(flag) {
                return Err(flag);
            }
        }
    }
    Ok(())
}

//! Help text derived from the policy table.
//!
//! The real `gh` help would advertise commands the proxy refuses, so help
//! requests are answered locally from the same table the validator uses.

use std::fmt::Write as _;

use crate::policy::{CommandRule, PolicyTable};

fn is_help_flag(arg: &str) -> bool {
    arg == "-h" || arg == "--help"
}

/// Returns help text if `args` is a help request.
///
/// Recognised forms: `gh`, `gh -h`, `gh --help`, `gh help`,
/// `gh help <group> [<sub>]`, `gh <group> -h` and `gh <group> <sub> ... -h`.
/// Help for an unknown group falls back to the top-level listing; help for
/// an unknown subcommand is `None` so the request is validated (and denied)
/// normally.
pub fn maybe_help(table: &PolicyTable, args: &[String]) -> Option<String> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        [] => Some(toplevel(table)),
        [only] if is_help_flag(only) || *only == "help" => Some(toplevel(table)),
        ["help", group] => Some(group_help(table, group).unwrap_or_else(|| toplevel(table))),
        ["help", group, sub, ..] => {
            command_help(table, group, sub).or_else(|| group_help(table, group))
        }
        [group, flag] if is_help_flag(flag) => {
            Some(group_help(table, group).unwrap_or_else(|| toplevel(table)))
        }
        [group, sub, rest @ ..] if rest.iter().any(|a| is_help_flag(a)) => {
            command_help(table, group, sub)
        }
        _ => None,
    }
}

/// Listing of every group and its subcommands.
pub fn toplevel(table: &PolicyTable) -> String {
    let mut out =
        String::from("gh - GitHub CLI (proxy, restricted subset)\n\nAvailable command groups:\n");
    for group in table.groups() {
        let subs: Vec<&str> = table
            .rules()
            .iter()
            .filter(|r| r.group == group)
            .map(|r| r.subcommand)
            .chain(
                table
                    .extensions()
                    .iter()
                    .filter(|e| e.group == group)
                    .map(|e| e.subcommand),
            )
            .collect();
        let _ = writeln!(out, "  {:12} {}", group, subs.join(", "));
    }
    out.push_str("\nRun 'gh <command> -h' for more information about a command.\n");
    out.push_str(
        "Note: This is a sandboxed proxy. Only the commands listed above are available.\n",
    );
    out
}

fn group_help(table: &PolicyTable, group: &str) -> Option<String> {
    if !table.has_group(group) {
        return None;
    }

    let mut out = format!("gh {} - available subcommands:\n\n", group);
    for rule in table.rules().iter().filter(|r| r.group == group) {
        let rw = if rule.scope.is_write() { " (write)" } else { "" };
        let _ = writeln!(out, "  {:12}{}", rule.subcommand, rw);
    }
    for ext in table.extensions().iter().filter(|e| e.group == group) {
        let _ = writeln!(out, "  {:12} {}", ext.subcommand, ext.description);
    }
    let _ = write!(
        out,
        "\nRun 'gh {} <subcommand> -h' for more information.\n",
        group
    );
    Some(out)
}

fn command_help(table: &PolicyTable, group: &str, subcommand: &str) -> Option<String> {
    if let Some(ext) = table.find_extension(group, subcommand) {
        return Some(ext.help_text.to_string());
    }

    let rule = table.find(group, subcommand)?;
    let rw = if rule.scope.is_write() {
        " (write, workspace repo only, no -R/--repo)"
    } else {
        " (read)"
    };
    let mut out = format!("gh {} {}{}\n\nAllowed flags:\n", group, subcommand, rw);
    for line in format_flags(rule) {
        out.push_str(&line);
        out.push('\n');
    }
    Some(out)
}

/// Pair each long flag with the short flag listed right after it:
/// `["--state", "-s", "--json"]` renders as `-s, --state` and `--json`.
fn format_flags(rule: &CommandRule) -> Vec<String> {
    let flags = rule.allowed_flags;
    let mut lines = Vec::new();
    let mut i = 0;
    while i < flags.len() {
        let flag = flags[i];
        let next_short = flags
            .get(i + 1)
            .filter(|next| next.starts_with('-') && !next.starts_with("--"));
        match next_short {
            Some(short) if flag.starts_with("--") => {
                lines.push(format!("  {}, {}", short, flag));
                i += 2;
            }
            _ if flag.starts_with("--") => {
                lines.push(format!("      {}", flag));
                i += 1;
            }
            _ => {
                lines.push(format!("  {}", flag));
                i += 1;
            }
        }
    }
    lines
}

//! Policy rules and the immutable table they live in.

use crate::extension::ExtensionCommand;

/// Where a command is allowed to act.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Read-only; may target any repository.
    ReadAny,
    /// Mutating; restricted to the workspace repository.
    WriteWorkspaceOnly,
}

impl Scope {
    /// Returns true for write-restricted rules.
    pub fn is_write(self) -> bool {
        matches!(self, Scope::WriteWorkspaceOnly)
    }
}

/// A single allowlisted `gh <group> <subcommand>` invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRule {
    /// First argument, e.g. `pr`.
    pub group: &'static str,
    /// Second argument, e.g. `list`.
    pub subcommand: &'static str,
    /// Read or write scope.
    pub scope: Scope,
    /// Every flag name this command accepts, long and short forms listed
    /// separately (`--state`, `-s`).
    pub allowed_flags: &'static [&'static str],
}

impl CommandRule {
    /// Create a read-scope rule.
    pub const fn read(
        group: &'static str,
        subcommand: &'static str,
        allowed_flags: &'static [&'static str],
    ) -> Self {
        Self {
            group,
            subcommand,
            scope: Scope::ReadAny,
            allowed_flags,
        }
    }

    /// Create a write-scope rule.
    pub const fn write(
        group: &'static str,
        subcommand: &'static str,
        allowed_flags: &'static [&'static str],
    ) -> Self {
        Self {
            group,
            subcommand,
            scope: Scope::WriteWorkspaceOnly,
            allowed_flags,
        }
    }

    /// Returns true if `flag` (already stripped of any `=value`) is allowed.
    pub fn allows_flag(&self, flag: &str) -> bool {
        self.allowed_flags.contains(&flag)
    }

    fn matches(&self, group: &str, subcommand: &str) -> bool {
        self.group == group && self.subcommand == subcommand
    }
}

/// The process-wide allowlist.
///
/// Built once at startup and shared read-only (typically behind an `Arc`)
/// between connection workers. There is no way to mutate a table after
/// [`PolicyBuilder::build`].
#[derive(Clone, Debug, Default)]
pub struct PolicyTable {
    rules: Vec<CommandRule>,
    extensions: Vec<ExtensionCommand>,
}

impl PolicyTable {
    /// Look up the passthrough rule for an exact `(group, subcommand)`.
    pub fn find(&self, group: &str, subcommand: &str) -> Option<&CommandRule> {
        self.rules.iter().find(|r| r.matches(group, subcommand))
    }

    /// Look up an extension command by exact `(group, subcommand)`.
    pub fn find_extension(&self, group: &str, subcommand: &str) -> Option<&ExtensionCommand> {
        self.extensions
            .iter()
            .find(|e| e.group == group && e.subcommand == subcommand)
    }

    /// All passthrough rules, in declaration order.
    pub fn rules(&self) -> &[CommandRule] {
        &self.rules
    }

    /// All extension commands, in declaration order.
    pub fn extensions(&self) -> &[ExtensionCommand] {
        &self.extensions
    }

    /// Distinct command groups in order of first appearance, passthrough
    /// rules first.
    pub fn groups(&self) -> Vec<&'static str> {
        let mut groups: Vec<&'static str> = Vec::new();
        let names = self
            .rules
            .iter()
            .map(|r| r.group)
            .chain(self.extensions.iter().map(|e| e.group));
        for group in names {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        groups
    }

    /// Returns true if `group` has at least one rule or extension.
    pub fn has_group(&self, group: &str) -> bool {
        self.rules.iter().any(|r| r.group == group)
            || self.extensions.iter().any(|e| e.group == group)
    }
}

/// Builder for [`PolicyTable`].
///
/// Adding a rule for a `(group, subcommand)` that is already present
/// replaces the earlier rule, so each pair has exactly one entry.
#[derive(Clone, Debug, Default)]
pub struct PolicyBuilder {
    rules: Vec<CommandRule>,
    extensions: Vec<ExtensionCommand>,
}

impl PolicyBuilder {
    /// Create an empty builder. An empty table denies everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    pub fn rule(mut self, rule: CommandRule) -> Self {
        if let Some(existing) = self
            .rules
            .iter_mut()
            .find(|r| r.matches(rule.group, rule.subcommand))
        {
            *existing = rule;
        } else {
            self.rules.push(rule);
        }
        self
    }

    /// Add several rules.
    pub fn rules(self, rules: impl IntoIterator<Item = CommandRule>) -> Self {
        rules.into_iter().fold(self, Self::rule)
    }

    /// Allow a read-scope command with the given flags.
    pub fn read(
        self,
        group: &'static str,
        subcommand: &'static str,
        allowed_flags: &'static [&'static str],
    ) -> Self {
        self.rule(CommandRule::read(group, subcommand, allowed_flags))
    }

    /// Allow a write-scope command with the given flags.
    pub fn write(
        self,
        group: &'static str,
        subcommand: &'static str,
        allowed_flags: &'static [&'static str],
    ) -> Self {
        self.rule(CommandRule::write(group, subcommand, allowed_flags))
    }

    /// Register an extension command.
    pub fn extension(mut self, command: ExtensionCommand) -> Self {
        self.extensions
            .retain(|e| !(e.group == command.group && e.subcommand == command.subcommand));
        self.extensions.push(command);
        self
    }

    /// Freeze the table.
    pub fn build(self) -> PolicyTable {
        PolicyTable {
            rules: self.rules,
            extensions: self.extensions,
        }
    }
}

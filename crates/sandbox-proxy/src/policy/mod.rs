//! Command allowlist for the gh proxy.
//!
//! The policy is a static table of `(group, subcommand)` rules, each with the
//! exact set of flags it accepts and a [`Scope`]:
//!
//! - **Read** rules may target any repository (`--repo`/`-R` is allowed when
//!   listed).
//! - **Write** rules only ever act on the workspace repository the proxy was
//!   launched for, so a repository selector anywhere in the argument vector
//!   denies the request.
//!
//! A handful of named extension commands sit in front of the table and are
//! handled by custom code instead of a passthrough to `gh`.
//!
//! Nothing is matched by prefix or wildcard: an unlisted subcommand under an
//! otherwise-allowed group is denied.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sandbox_proxy::policy::{PolicyBuilder, Scope};
//!
//! let table = PolicyBuilder::new()
//!     .read("pr", "list", &["--state", "-s", "--limit", "-L"])
//!     .write("pr", "comment", &["--body", "-b"])
//!     .build();
//!
//! assert!(table.find("pr", "list").is_some());
//! assert!(table.find("pr", "merge").is_none());
//! ```

mod github;
mod table;

pub use github::github_policy;
pub use table::{CommandRule, PolicyBuilder, PolicyTable, Scope};

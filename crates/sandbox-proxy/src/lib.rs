//! Sandbox Proxy: host-side gatekeepers for an isolated container
//!
//! Two small servers listen on Unix domain sockets mounted into the
//! container. The gh proxy runs an allowlisted subset of the GitHub CLI with
//! the host's credentials; the clipboard proxy hands out the most recent
//! screenshot. Each connection carries exactly one JSON request line and one
//! JSON response line, and every request is recorded in an append-only audit
//! log.

mod audit;
mod client;
mod codec;
mod config;
mod error;
mod executor;
mod extension;
mod help;
mod limits;
mod repo;
mod screenshot;
mod server;
mod service;
mod validator;

pub mod policy;
pub mod shutdown;

pub use audit::{
    AuditError, AuditEvent, AuditLog, AuditRecord, AuditRequest, Decision, Proxy,
};
pub use client::{ClientError, MAX_RESPONSE_BYTES, ProxyClient};
pub use codec::{
    ClipboardCommand, ClipboardRequest, CodecError, GhRequest, MAX_REQUEST_BYTES, Response,
};
pub use config::{ClipboardProxyConfig, GhProxyConfig, SCREENSHOTS_DIR_ENV, default_screenshots_dir};
pub use error::ProxyError;
pub use executor::{CommandRunner, ExecError, ExecOutput, ProcessRunner, TIMEOUT_EXIT_CODE};
pub use extension::{ExtensionCommand, ExtensionContext, ExtensionError, ExtensionHandler};
pub use limits::ExecLimits;
pub use repo::{InvalidRepoSlug, RepoSlug};
pub use screenshot::{Screenshot, ScreenshotError, latest_image};
pub use server::{ProxyServer, handle_connection};
pub use service::{
    ClipboardService, DENIED_EXIT_CODE, DISCONNECTED_REASON, GhService, ProxyService,
};
pub use validator::{Denial, ExecutionPlan, validate};

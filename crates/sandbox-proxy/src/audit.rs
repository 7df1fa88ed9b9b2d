//! Append-only audit log.
//!
//! Every request produces a `decision` record as soon as the policy outcome
//! is known, before anything is executed. Allowed requests that do work
//! follow it with a `completion` record carrying the exit code, or noting
//! that the client went away. A request cut short by shutdown therefore
//! still leaves its decision behind.
//!
//! The file is opened, appended to and closed on every write under an async
//! mutex, so concurrent workers never interleave lines. Write failures are
//! reported through `tracing` and never change the outcome of a request.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Longest raw frame kept in a record when a request could not be decoded.
pub const MAX_RAW_REQUEST_BYTES: usize = 512;

/// Errors writing an audit record.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The record could not be serialized.
    #[error("failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The log file could not be created or written.
    #[error("failed to write audit log {}: {source}", .path.display())]
    Io {
        /// Log file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Which proxy handled the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proxy {
    /// The GitHub CLI proxy
    Gh,
    /// The clipboard proxy
    Clipboard,
}

impl Proxy {
    /// Name used as the prefix of diagnostics sent to clients.
    pub fn name(self) -> &'static str {
        match self {
            Proxy::Gh => "gh-proxy",
            Proxy::Clipboard => "clipboard-proxy",
        }
    }
}

/// The request as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditRequest {
    /// gh argument vector
    Args(Vec<String>),
    /// Clipboard command name
    Command(String),
    /// A frame that could not be decoded, lossily converted and truncated
    Raw(String),
}

impl AuditRequest {
    /// Record an undecodable frame, keeping at most
    /// [`MAX_RAW_REQUEST_BYTES`] of it.
    pub fn raw(frame: &[u8]) -> Self {
        let kept = &frame[..frame.len().min(MAX_RAW_REQUEST_BYTES)];
        AuditRequest::Raw(String::from_utf8_lossy(kept).into_owned())
    }
}

/// Policy outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The request was executed (or answered locally).
    Allowed,
    /// The request was refused without running anything.
    Denied,
}

/// Which stage of a request a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// The policy outcome, written before any execution
    Decision,
    /// The end of an allowed request
    Completion,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the record was written
    pub timestamp: DateTime<Utc>,
    /// Decision or completion
    pub event: AuditEvent,
    /// Which proxy handled it
    pub proxy: Proxy,
    /// What was asked
    pub request: AuditRequest,
    /// Allowed or denied
    pub decision: Decision,
    /// Denial reason or execution note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Exit code returned to the client, on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl AuditRecord {
    /// The decision to allow a request, timestamped now.
    pub fn allowed(proxy: Proxy, request: AuditRequest) -> Self {
        Self {
            timestamp: Utc::now(),
            event: AuditEvent::Decision,
            proxy,
            request,
            decision: Decision::Allowed,
            reason: None,
            exit_code: None,
        }
    }

    /// The end of an allowed request, timestamped now. `exit_code` is `None`
    /// when no response was delivered.
    pub fn completed(proxy: Proxy, request: AuditRequest, exit_code: Option<i32>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: AuditEvent::Completion,
            proxy,
            request,
            decision: Decision::Allowed,
            reason: None,
            exit_code,
        }
    }

    /// The decision to deny a request, timestamped now.
    pub fn denied(proxy: Proxy, request: AuditRequest, reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: AuditEvent::Decision,
            proxy,
            request,
            decision: Decision::Denied,
            reason: Some(reason.into()),
            exit_code: None,
        }
    }

    /// Attach a note.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Serialized writer for the audit log file.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    /// Log to `path`. Nothing is created until the first record.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record`, logging a warning on failure.
    pub async fn record(&self, record: &AuditRecord) {
        if let Err(e) = self.try_record(record).await {
            tracing::warn!("audit log write failed: {}", e);
        }
    }

    /// Append `record`, creating the file and its parent directories if
    /// needed.
    pub async fn try_record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let io_err = |source| AuditError::Io {
            path: self.path.clone(),
            source,
        };

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(&line).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

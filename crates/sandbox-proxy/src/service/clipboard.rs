use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{DENIED_EXIT_CODE, DISCONNECTED_REASON, ProxyService, denied_response};
use crate::audit::{AuditLog, AuditRecord, AuditRequest, Proxy};
use crate::codec::{self, ClipboardCommand, Response};
use crate::screenshot;

/// The clipboard proxy: hands out the most recent screenshot.
#[derive(Debug, Clone)]
pub struct ClipboardService {
    screenshots_dir: PathBuf,
    max_age: Duration,
    audit: Arc<AuditLog>,
}

impl ClipboardService {
    /// Serve screenshots from `screenshots_dir` that are at most `max_age`
    /// old.
    pub fn new(
        screenshots_dir: impl Into<PathBuf>,
        max_age: Duration,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            screenshots_dir: screenshots_dir.into(),
            max_age,
            audit,
        }
    }

    /// The directory scanned for screenshots.
    pub fn screenshots_dir(&self) -> &Path {
        &self.screenshots_dir
    }

    async fn read_image(&self) -> (Response, AuditRecord) {
        let request = read_image_request();
        match screenshot::latest_image(&self.screenshots_dir, self.max_age).await {
            Ok(shot) => {
                tracing::info!(
                    "clipboard-proxy: sending {} ({} bytes)",
                    shot.path.display(),
                    shot.bytes.len()
                );
                let record = AuditRecord::completed(Proxy::Clipboard, request, Some(0))
                    .with_reason(format!("{} ({} bytes)", shot.path.display(), shot.bytes.len()));
                (Response::binary(0, &shot.bytes, ""), record)
            }
            Err(e) => {
                tracing::info!("clipboard-proxy: {}", e);
                let record =
                    AuditRecord::completed(Proxy::Clipboard, request, Some(DENIED_EXIT_CODE))
                        .with_reason(e.to_string());
                let response = Response {
                    exit_code: DENIED_EXIT_CODE,
                    stdout: None,
                    stdout_b64: Some(String::new()),
                    stderr: format!("clipboard-proxy: {}\n", e),
                };
                (response, record)
            }
        }
    }
}

fn read_image_request() -> AuditRequest {
    AuditRequest::Command(ClipboardCommand::ReadImage.as_str().to_string())
}

#[async_trait]
impl ProxyService for ClipboardService {
    fn proxy(&self) -> Proxy {
        Proxy::Clipboard
    }

    fn audit(&self) -> &AuditLog {
        &self.audit
    }

    async fn handle(&self, frame: &[u8], cancel: CancellationToken) -> Response {
        let request = match codec::decode_clipboard_request(frame) {
            Ok(request) => request,
            Err(e) => return self.reject(frame, &e).await,
        };

        let Some(ClipboardCommand::ReadImage) = request.parsed() else {
            let reason = format!("unknown command: {}", request.command);
            tracing::info!("clipboard-proxy: denied: {}", reason);
            self.audit
                .record(&AuditRecord::denied(
                    Proxy::Clipboard,
                    AuditRequest::Command(request.command),
                    &reason,
                ))
                .await;
            return denied_response(Proxy::Clipboard, &reason);
        };

        self.audit
            .record(&AuditRecord::allowed(Proxy::Clipboard, read_image_request()))
            .await;

        let (response, record) = tokio::select! {
            done = self.read_image() => done,
            () = cancel.cancelled() => {
                tracing::info!("clipboard-proxy: client disconnected, abandoning request");
                self.audit
                    .record(
                        &AuditRecord::completed(Proxy::Clipboard, read_image_request(), None)
                            .with_reason(DISCONNECTED_REASON),
                    )
                    .await;
                return Response::error(DENIED_EXIT_CODE, DISCONNECTED_REASON);
            }
        };

        self.audit.record(&record).await;
        response
    }
}

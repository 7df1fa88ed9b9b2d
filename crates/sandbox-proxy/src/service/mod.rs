//! Request handlers behind the socket server.
//!
//! A [`ProxyService`] turns one request frame into one [`Response`]. It owns
//! the audit trail for the request: every frame it sees produces exactly one
//! audit record, whether it is denied, executed, abandoned or malformed.

mod clipboard;
mod gh;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use clipboard::ClipboardService;
pub use gh::GhService;

use crate::audit::{AuditLog, AuditRecord, AuditRequest, Proxy};
use crate::codec::{CodecError, Response};

/// Exit code for denied and malformed requests.
pub const DENIED_EXIT_CODE: i32 = 1;

/// Audit note for requests abandoned because the client went away.
pub const DISCONNECTED_REASON: &str = "client disconnected";

/// Handles requests for one proxy.
#[async_trait]
pub trait ProxyService: Send + Sync {
    /// Which proxy this is.
    fn proxy(&self) -> Proxy;

    /// The audit log requests are recorded in.
    fn audit(&self) -> &AuditLog;

    /// Handle a complete request frame.
    ///
    /// `cancel` fires when the client hangs up. The service then stops any
    /// work in flight and records the abandonment; its return value is not
    /// delivered.
    async fn handle(&self, frame: &[u8], cancel: CancellationToken) -> Response;

    /// Answer a frame that could not be read or decoded.
    async fn reject(&self, frame: &[u8], error: &CodecError) -> Response {
        let proxy = self.proxy();
        tracing::info!("{}: rejected malformed request: {}", proxy.name(), error);
        self.audit()
            .record(&AuditRecord::denied(
                proxy,
                AuditRequest::raw(frame),
                format!("invalid request: {}", error),
            ))
            .await;
        Response::error(
            DENIED_EXIT_CODE,
            format!("{}: invalid request: {}\n", proxy.name(), error),
        )
    }
}

/// Response for a refused request.
pub(crate) fn denied_response(proxy: Proxy, reason: &str) -> Response {
    Response::error(DENIED_EXIT_CODE, format!("{}: {}\n", proxy.name(), reason))
}

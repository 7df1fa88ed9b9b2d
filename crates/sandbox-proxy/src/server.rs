//! One-shot request/response server on a Unix domain socket.
//!
//! Each accepted connection gets its own task, which reads one
//! newline-terminated frame, hands it to the [`ProxyService`], writes one
//! response line and closes. While the service works, the connection is
//! watched for hang-up; if the client goes away the service is cancelled and
//! nothing is written.

use std::future::Future;
use std::os::unix::fs::{DirBuilderExt, FileTypeExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader, Interest};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::codec::{self, CodecError, MAX_REQUEST_BYTES};
use crate::error::ProxyError;
use crate::service::ProxyService;

const SOCKET_DIR_MODE: u32 = 0o700;

const HANGUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The socket file on disk. Removed when dropped.
#[derive(Debug)]
struct SocketFile {
    path: PathBuf,
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        match std::fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.file_type().is_socket() => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::warn!("Failed to remove socket {}: {}", self.path.display(), e);
                } else {
                    tracing::debug!("Removed socket {}", self.path.display());
                }
            }
            _ => {}
        }
    }
}

/// A bound proxy server.
pub struct ProxyServer<S: ?Sized> {
    listener: UnixListener,
    socket: SocketFile,
    service: Arc<S>,
}

impl<S: ?Sized> std::fmt::Debug for ProxyServer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("socket", &self.socket.path)
            .finish_non_exhaustive()
    }
}

impl<S> ProxyServer<S>
where
    S: ProxyService + ?Sized + 'static,
{
    /// Bind `socket_path`, creating its directory (mode 0700) if missing and
    /// removing a stale socket left by a previous run.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(socket_path: impl Into<PathBuf>, service: Arc<S>) -> Result<Self, ProxyError> {
        let path = socket_path.into();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            ensure_socket_dir(dir)?;
        }
        remove_stale_socket(&path)?;

        let listener = UnixListener::bind(&path).map_err(ProxyError::io("bind", &path))?;
        tracing::info!("{} listening on {}", service.proxy().name(), path.display());
        Ok(Self {
            listener,
            socket: SocketFile { path },
            service,
        })
    }

    /// The bound socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket.path
    }

    /// Accept connections until `shutdown` resolves, then remove the socket.
    ///
    /// Connections still in flight at shutdown are not waited for.
    pub async fn serve_with_shutdown<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let name = self.service.proxy().name();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let service = Arc::clone(&self.service);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, service.as_ref()).await {
                                tracing::debug!("{}: connection error: {}", name, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!("{}: accept failed: {}", name, e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
        tracing::info!("{} shutting down", name);
    }
}

/// Serve a single connection.
pub async fn handle_connection<S>(stream: UnixStream, service: &S) -> Result<(), CodecError>
where
    S: ProxyService + ?Sized,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let response = match codec::read_frame(&mut reader, MAX_REQUEST_BYTES).await {
        Ok(frame) => {
            let cancel = CancellationToken::new();
            let handling = service.handle(&frame, cancel.clone());
            tokio::pin!(handling);

            let finished = tokio::select! {
                response = &mut handling => Some(response),
                () = wait_for_hangup(&write_half) => None,
            };
            match finished {
                Some(response) => response,
                None => {
                    tracing::debug!("{}: client hung up", service.proxy().name());
                    cancel.cancel();
                    // Let the service stop its work and record the abandonment.
                    handling.await;
                    return Ok(());
                }
            }
        }
        Err(CodecError::Io(e)) => {
            tracing::debug!("{}: read failed: {}", service.proxy().name(), e);
            return Ok(());
        }
        // A connect-and-close, such as a liveness check, carries no request.
        Err(CodecError::Closed) => {
            tracing::debug!("{}: closed without a request", service.proxy().name());
            return Ok(());
        }
        Err(e) => service.reject(&[], &e).await,
    };

    let line = codec::encode(&response)?;
    write_half.write_all(&line).await?;
    write_half.flush().await?;
    write_half.shutdown().await?;
    Ok(())
}

/// Resolves when the peer has closed the connection.
async fn wait_for_hangup(stream: &OwnedWriteHalf) {
    loop {
        match stream.ready(Interest::WRITABLE).await {
            Ok(ready) if ready.is_write_closed() => return,
            Ok(_) => tokio::time::sleep(HANGUP_POLL_INTERVAL).await,
            Err(_) => return,
        }
    }
}

/// Create the socket directory with mode 0700. An existing directory is
/// used as is.
fn ensure_socket_dir(dir: &Path) -> Result<(), ProxyError> {
    match std::fs::symlink_metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ProxyError::NotADirectory(dir.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => std::fs::DirBuilder::new()
            .recursive(true)
            .mode(SOCKET_DIR_MODE)
            .create(dir)
            .map_err(ProxyError::io("create socket directory", dir)),
        Err(e) => Err(ProxyError::io("stat", dir)(e)),
    }
}

/// Remove a socket left behind by a previous run. Anything else at the path
/// is an error.
fn remove_stale_socket(path: &Path) -> Result<(), ProxyError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            std::fs::remove_file(path).map_err(ProxyError::io("remove stale socket", path))?;
            tracing::debug!("Removed stale socket {}", path.display());
            Ok(())
        }
        Ok(_) => Err(ProxyError::NotASocket(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProxyError::io("stat", path)(e)),
    }
}

//! Errors setting up and running a proxy server.

use std::path::PathBuf;

use thiserror::Error;

/// Server lifecycle errors. Everything that happens inside a single request
/// is turned into a response instead.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Something other than a socket occupies the socket path.
    #[error("{} exists but is not a socket; refusing to remove it", .0.display())]
    NotASocket(PathBuf),
    /// The socket directory path is not a directory.
    #[error("{} exists but is not a directory", .0.display())]
    NotADirectory(PathBuf),
    /// A filesystem or socket operation failed.
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        /// What was being attempted
        action: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ProxyError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ProxyError::Io {
            action,
            path,
            source,
        }
    }
}

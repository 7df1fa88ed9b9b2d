//! Client side of the wire protocol, as used inside the container.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::codec::{self, CodecError, Response};

/// Largest response a client accepts. Allows for a full-size capture
/// encoded as base64.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// Why a call produced no usable response.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The socket could not be reached.
    #[error("cannot connect to {}: {source}", .path.display())]
    Connect {
        /// Socket path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Sending the request failed.
    #[error("failed to send request: {0}")]
    Send(#[source] std::io::Error),
    /// The response was missing, malformed or lacked `exit_code`.
    #[error("invalid response from proxy: {0}")]
    Protocol(#[from] CodecError),
}

/// Connects to a proxy socket, one connection per call.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    socket_path: PathBuf,
}

impl ProxyClient {
    /// A client for the proxy listening on `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Send `request` and wait for the response.
    pub async fn call<T: Serialize>(&self, request: &T) -> Result<Response, ClientError> {
        let line = codec::encode(request)?;
        self.call_raw(&line).await
    }

    /// Send pre-encoded bytes as the request frame.
    pub async fn call_raw(&self, frame: &[u8]) -> Result<Response, ClientError> {
        let stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|source| ClientError::Connect {
                    path: self.socket_path.clone(),
                    source,
                })?;
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(frame).await.map_err(ClientError::Send)?;
        write_half.flush().await.map_err(ClientError::Send)?;

        let mut reader = BufReader::new(read_half);
        let line = codec::read_frame(&mut reader, MAX_RESPONSE_BYTES).await?;
        Ok(codec::decode_response(&line)?)
    }
}

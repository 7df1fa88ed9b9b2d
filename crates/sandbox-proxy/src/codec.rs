//! Newline-delimited JSON wire format.
//!
//! Each direction carries exactly one UTF-8 JSON object terminated by `\n`.
//! Requests are decoded strictly: unknown fields, missing fields and
//! argument strings containing NUL are all rejected. Responses carry stdout
//! either as text (`stdout`) or, when the payload is not valid UTF-8, as
//! base64 (`stdout_b64`).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Largest request frame the servers accept, excluding the newline.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Errors decoding or framing a message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The peer closed the connection without sending a single byte.
    #[error("connection closed before a message was sent")]
    Closed,
    /// The frame was blank.
    #[error("empty request")]
    Empty,
    /// The frame exceeded the size limit before a newline was seen.
    #[error("message exceeds {limit} bytes")]
    TooLarge {
        /// The limit that was exceeded
        limit: usize,
    },
    /// Not a JSON object of the expected shape.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// An argument contained a NUL byte, which no process argument can carry.
    #[error("argument {index} contains a NUL byte")]
    NulInArgument {
        /// Position in `args`
        index: usize,
    },
    /// `stdout_b64` was not valid base64.
    #[error("invalid base64 in stdout_b64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Reading the frame failed.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Request to the gh proxy: the literal argument vector the client received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GhRequest {
    /// Arguments after the program name
    pub args: Vec<String>,
}

/// Request to the clipboard proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClipboardRequest {
    /// Command name; see [`ClipboardCommand`]
    pub command: String,
}

/// Commands the clipboard proxy understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardCommand {
    /// Return the most recent screenshot.
    ReadImage,
}

impl ClipboardCommand {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            ClipboardCommand::ReadImage => "read_image",
        }
    }
}

impl ClipboardRequest {
    /// A request for `command`.
    pub fn new(command: ClipboardCommand) -> Self {
        Self {
            command: command.as_str().to_string(),
        }
    }

    /// The recognised command, if any.
    pub fn parsed(&self) -> Option<ClipboardCommand> {
        match self.command.as_str() {
            "read_image" => Some(ClipboardCommand::ReadImage),
            _ => None,
        }
    }
}

/// Reply to either proxy.
///
/// At most one of `stdout` and `stdout_b64` is set. A response without
/// `exit_code` does not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Exit code the client should exit with
    pub exit_code: i32,
    /// Standard output, when it is valid UTF-8
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Standard output, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_b64: Option<String>,
    /// Standard error
    #[serde(default)]
    pub stderr: String,
}

impl Response {
    /// Build a response from captured output, using `stdout` for UTF-8 and
    /// `stdout_b64` for anything else.
    pub fn from_output(exit_code: i32, stdout: Vec<u8>, stderr: impl Into<String>) -> Self {
        let (stdout, stdout_b64) = match String::from_utf8(stdout) {
            Ok(text) => (Some(text), None),
            Err(e) => (None, Some(STANDARD.encode(e.into_bytes()))),
        };
        Self {
            exit_code,
            stdout,
            stdout_b64,
            stderr: stderr.into(),
        }
    }

    /// Build a response whose stdout is always base64 encoded.
    pub fn binary(exit_code: i32, stdout: &[u8], stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: None,
            stdout_b64: Some(STANDARD.encode(stdout)),
            stderr: stderr.into(),
        }
    }

    /// A response with empty stdout.
    pub fn error(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: Some(String::new()),
            stdout_b64: None,
            stderr: stderr.into(),
        }
    }

    /// The stdout payload as bytes, decoding base64 if necessary.
    pub fn stdout_bytes(&self) -> Result<Vec<u8>, CodecError> {
        if let Some(encoded) = &self.stdout_b64 {
            return Ok(STANDARD.decode(encoded)?);
        }
        Ok(self
            .stdout
            .as_deref()
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default())
    }
}

/// Serialize `message` as one JSON line.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CodecError> {
    if frame.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_slice(frame)?)
}

/// Decode a gh proxy request frame.
pub fn decode_gh_request(frame: &[u8]) -> Result<GhRequest, CodecError> {
    let request: GhRequest = decode(frame)?;
    if let Some(index) = request.args.iter().position(|a| a.contains('\0')) {
        return Err(CodecError::NulInArgument { index });
    }
    Ok(request)
}

/// Decode a clipboard proxy request frame.
pub fn decode_clipboard_request(frame: &[u8]) -> Result<ClipboardRequest, CodecError> {
    decode(frame)
}

/// Decode a response frame.
pub fn decode_response(frame: &[u8]) -> Result<Response, CodecError> {
    decode(frame)
}

/// Read one frame, without its trailing newline.
///
/// A frame ends at `\n` or at end of stream. At most `limit` bytes are
/// buffered; a longer frame is [`CodecError::TooLarge`]. End of stream
/// before any byte is [`CodecError::Closed`].
pub async fn read_frame<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let read = (&mut *reader).take(cap).read_until(b'\n', &mut frame).await?;
    if read == 0 {
        return Err(CodecError::Closed);
    }

    if frame.last() == Some(&b'\n') {
        frame.pop();
    }
    if frame.len() > limit {
        return Err(CodecError::TooLarge { limit });
    }
    if frame.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(frame)
}

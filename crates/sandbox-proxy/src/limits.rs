//! Execution limits for proxied subprocesses

use std::time::Duration;

/// Limits applied to every subprocess the proxy spawns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecLimits {
    /// Wall-clock timeout; the child is killed when it expires
    pub timeout: Duration,
    /// Maximum bytes captured per stream (stdout and stderr separately)
    pub max_output_bytes: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),  // 2 minute wall clock
            max_output_bytes: 32 * 1024 * 1024, // 32 MB per stream
        }
    }
}

/// Buffer that keeps at most `limit` bytes and remembers whether anything
/// was dropped.
///
/// Unlike a text buffer it never appends a marker to the data itself, since
/// the captured stream may be binary (an archive, an image). Callers report
/// truncation out of band.
#[derive(Debug, Clone)]
pub struct LimitedBuffer {
    buffer: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl LimitedBuffer {
    /// Create an empty buffer capped at `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append as much of `data` as fits. Always reports the full length as
    /// consumed so the producer keeps draining.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let remaining = self.limit.saturating_sub(self.buffer.len());
        let to_write = data.len().min(remaining);
        self.buffer.extend_from_slice(&data[..to_write]);
        if to_write < data.len() {
            self.truncated = true;
        }
        data.len()
    }

    /// Consume the buffer and return the kept bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Returns true if any data was dropped.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ExecLimits::default();
        assert_eq!(limits.timeout, Duration::from_secs(120));
        assert_eq!(limits.max_output_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn test_limited_buffer_under_limit() {
        let mut buffer = LimitedBuffer::new(100);
        assert_eq!(buffer.write(b"hello world"), 11);
        assert!(!buffer.was_truncated());
        assert_eq!(buffer.into_bytes(), b"hello world");
    }

    #[test]
    fn test_limited_buffer_exact_boundary() {
        let mut buffer = LimitedBuffer::new(10);

        buffer.write(b"12345");
        buffer.write(b"67890");
        assert!(!buffer.was_truncated());

        assert_eq!(buffer.write(b"x"), 1);
        assert!(buffer.was_truncated());
        assert_eq!(buffer.into_bytes(), b"1234567890");
    }

    #[test]
    fn test_limited_buffer_keeps_binary_intact() {
        let mut buffer = LimitedBuffer::new(4);
        buffer.write(&[0xff, 0x00, 0xfe, 0x01, 0x02]);
        assert!(buffer.was_truncated());
        assert_eq!(buffer.into_bytes(), vec![0xff, 0x00, 0xfe, 0x01]);
    }

    #[test]
    fn test_limited_buffer_zero_limit() {
        let mut buffer = LimitedBuffer::new(0);
        assert_eq!(buffer.write(b"hello"), 5);
        assert!(buffer.was_truncated());
        assert!(buffer.into_bytes().is_empty());
    }
}

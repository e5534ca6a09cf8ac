use std::time::Duration;

use thiserror::Error;

use crate::session::state::CallStateError;

/// Socket-level failures, including the bounded read deadline.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("recv timeout after {0:?}")]
    Timeout(Duration),
    #[error("read task failed: {0}")]
    Task(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Wire-format violations detected while building or parsing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
    #[error("frame shorter than header: {0} bytes")]
    Truncated(usize),
    #[error("bad magic 0x{0:04x}")]
    BadMagic(u16),
    #[error("length field {declared} does not match datagram size {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("ciphertext length {0} is not a multiple of the block size")]
    UnalignedCiphertext(usize),
    #[error("frame of {0} bytes exceeds the 16-bit length field")]
    Oversized(usize),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::Io(err.to_string())
    }
}

/// Errors returned from a miIO call.
///
/// Nothing is retried internally; the first failure aborts the call and the
/// socket is released before the error reaches the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MiioError {
    /// Socket open/write/read failures, including the read deadline.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Malformed handshake or response frames.
    #[error("protocol format error: {0}")]
    Format(#[from] FrameError),
    /// Request serialization failures.
    #[error("encoding error: {0}")]
    Encoding(String),
    /// Response body was not JSON (only raised by `MiioClient::call_json`).
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("call state error: {0}")]
    State(#[from] CallStateError),
}

impl MiioError {
    /// True when the call failed because the device did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MiioError::Transport(TransportError::Timeout(_)))
    }
}

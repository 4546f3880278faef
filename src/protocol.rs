//! Wire framing for framewire services.
//!
//! Every server-to-client message is a single frame:
//!
//! ```text
//! <decimal-status-code>:<payload>
//!
//! 200:Connection established.
//! 201:Invalid command.
//! 400:Goodbye!
//! ```
//!
//! Payload bytes are not escaped. Decoding splits on the first `:` only, so a
//! payload may itself contain separators.

use bytes::{BufMut, Bytes, BytesMut};

/// Frame separator between the status code and the payload.
pub const SEPARATOR: u8 = b':';

/// Normal successful response, session continues.
pub const STATUS_OK: u32 = 200;
/// Recoverable problem, session continues.
pub const STATUS_ERROR: u32 = 201;
/// Server is about to close the connection.
pub const STATUS_END: u32 = 400;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub status: u32,
    pub payload: Bytes,
}

/// Severity class derived from a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Error,
    EndOfSession,
}

impl Severity {
    /// Classify one of the reserved status codes.
    pub fn from_status(status: u32) -> Result<Self, FrameError> {
        match status {
            STATUS_OK => Ok(Severity::Ok),
            STATUS_ERROR => Ok(Severity::Error),
            STATUS_END => Ok(Severity::EndOfSession),
            other => Err(FrameError::UnknownStatus(other)),
        }
    }

    /// Numeric severity level (0, 1 or 2).
    pub fn level(self) -> u8 {
        match self {
            Severity::Ok => 0,
            Severity::Error => 1,
            Severity::EndOfSession => 2,
        }
    }
}

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// No `:` separator in the frame
    MissingSeparator,
    /// Status prefix is not a base-10 integer
    InvalidStatus(String),
    /// Status code outside the reserved classes
    UnknownStatus(u32),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::MissingSeparator => write!(f, "Missing status separator"),
            FrameError::InvalidStatus(prefix) => write!(f, "Invalid status code: {:?}", prefix),
            FrameError::UnknownStatus(code) => write!(f, "Unknown status code: {}", code),
        }
    }
}

impl std::error::Error for FrameError {}

/// Encode a payload with its status code.
pub fn encode(status: u32, payload: &[u8]) -> Bytes {
    let status = status.to_string();
    let mut frame = BytesMut::with_capacity(status.len() + 1 + payload.len());
    frame.put_slice(status.as_bytes());
    frame.put_u8(SEPARATOR);
    frame.put_slice(payload);
    frame.freeze()
}

/// Decode a frame into its status code and payload.
pub fn decode(frame: &[u8]) -> Result<Frame, FrameError> {
    let split = frame
        .iter()
        .position(|&b| b == SEPARATOR)
        .ok_or(FrameError::MissingSeparator)?;

    let prefix = &frame[..split];
    // `u32::from_str` accepts a leading '+', the wire format does not
    if prefix.is_empty() || !prefix.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::InvalidStatus(
            String::from_utf8_lossy(prefix).into_owned(),
        ));
    }

    let status = std::str::from_utf8(prefix)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| FrameError::InvalidStatus(String::from_utf8_lossy(prefix).into_owned()))?;

    Ok(Frame {
        status,
        payload: Bytes::copy_from_slice(&frame[split + 1..]),
    })
}

/// Decode a frame and classify its status.
pub fn decode_with_severity(frame: &[u8]) -> Result<(Bytes, Severity), FrameError> {
    let frame = decode(frame)?;
    let severity = Severity::from_status(frame.status)?;
    Ok((frame.payload, severity))
}

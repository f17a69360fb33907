//! Wire format and shared vocabulary for the delivery engine.
//!
//! Frames on the remote command socket look like this (all integers are
//! little-endian `i32`):
//!
//! ```text
//! | size | request id | type | body (UTF-8) | 0x00 0x00 |
//! ```
//!
//! where `size` counts everything after itself. Nothing in this crate performs
//! I/O; the server crate owns sockets and persistence.

pub mod render;
pub mod types;

pub use render::{render_command, RenderContext};
pub use types::{AttemptLog, DeliveryMode, DeliveryReport, DeliveryStatus, PaymentStatus};

use thiserror::Error;

/// Login request carrying the shared secret as its body.
pub const SERVERDATA_AUTH: i32 = 3;
/// Command request; also the type the peer uses to answer a login.
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
/// Plain command output.
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Request id the peer echoes back when the secret is wrong.
pub const AUTH_REJECTED_ID: i32 = -1;

/// Bytes taken by the length prefix itself.
pub const SIZE_PREFIX_LEN: usize = 4;
/// Smallest legal value of the size field: id + type + terminator.
pub const MIN_PACKET_SIZE: usize = 4 + 4 + 2;
/// Largest size field we are willing to allocate for.
pub const MAX_PACKET_SIZE: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("declared packet size {0} is out of range")]
    InvalidLength(i32),
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// One request or response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn auth(id: i32, secret: &str) -> Self {
        Self::new(id, SERVERDATA_AUTH, secret)
    }

    pub fn command(id: i32, command: &str) -> Self {
        Self::new(id, SERVERDATA_EXECCOMMAND, command)
    }

    /// True when this is the peer's answer to a login with a bad secret.
    pub fn is_auth_rejection(&self) -> bool {
        self.id == AUTH_REJECTED_ID
    }

    /// Value of the size field for this packet.
    pub fn wire_size(&self) -> usize {
        MIN_PACKET_SIZE + self.body.len()
    }

    /// Serializes the packet including its length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let size = self.wire_size();
        let mut buf = Vec::with_capacity(SIZE_PREFIX_LEN + size);
        buf.extend_from_slice(&(size as i32).to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(self.body.as_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    /// Parses a complete frame, length prefix included.
    ///
    /// Extra bytes after the declared frame are ignored so callers can decode
    /// from the front of a larger buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < SIZE_PREFIX_LEN {
            return Err(FrameError::Truncated {
                expected: SIZE_PREFIX_LEN,
                actual: bytes.len(),
            });
        }
        let size = Self::parse_size(read_i32(&bytes[..SIZE_PREFIX_LEN]))?;
        let payload = &bytes[SIZE_PREFIX_LEN..];
        if payload.len() < size {
            return Err(FrameError::Truncated {
                expected: size,
                actual: payload.len(),
            });
        }
        Self::decode_payload(&payload[..size])
    }

    /// Validates a raw size field and returns it as a byte count.
    pub fn parse_size(raw: i32) -> Result<usize, FrameError> {
        match usize::try_from(raw) {
            Ok(size) if (MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) => Ok(size),
            _ => Err(FrameError::InvalidLength(raw)),
        }
    }

    /// Parses the bytes that follow the length prefix.
    ///
    /// The last two bytes are the terminator and are dropped unconditionally;
    /// invalid UTF-8 in the body is replaced rather than rejected.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < MIN_PACKET_SIZE {
            return Err(FrameError::Truncated {
                expected: MIN_PACKET_SIZE,
                actual: payload.len(),
            });
        }
        let id = read_i32(&payload[0..4]);
        let kind = read_i32(&payload[4..8]);
        let body = String::from_utf8_lossy(&payload[8..payload.len() - 2]).into_owned();
        Ok(Self { id, kind, body })
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    i32::from_le_bytes(raw)
}

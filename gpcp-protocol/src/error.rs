//! Errors produced while framing or decoding GPCP wire data.

use thiserror::Error;

/// Result type alias for `gpcp-protocol` operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Codec-level errors. These are fatal for the frame currently being
/// encoded or decoded but do not, on their own, imply the connection must
/// close — the caller (dispatcher/endpoint) decides that.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Requested frame body length does not fit in the 28-bit length field.
    #[error("frame length too {0} to encode")]
    LengthOverflow(&'static str),

    /// A packet type byte did not map to a known `PacketType`.
    #[error("unknown packet type: {0}")]
    UnknownType(u8),

    /// A command payload could not be split into name + JSON argument array.
    #[error("invalid command payload: {0}")]
    InvalidMessage(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying I/O failure while framing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

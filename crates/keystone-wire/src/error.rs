//! Wire protocol errors.

use std::io;

use thiserror::Error;

/// Errors raised while reading or writing wire frames.
///
/// Every variant except [`WireError::ConnectionClosed`] and
/// [`WireError::Io`] is a protocol violation: the peer sent bytes that cannot
/// be a valid frame, and the connection must be torn down.
#[derive(Debug, Error)]
pub enum WireError {
    /// The type byte is not one of the known frontend message kinds.
    #[error("unknown message type {byte:#04x} ({:?})", as_char(.byte))]
    UnknownMessageType {
        /// The offending byte.
        byte: u8,
    },

    /// The declared length is smaller than the length field itself.
    #[error("invalid message length {length}")]
    InvalidLength {
        /// Declared length, including its own four bytes.
        length: u32,
    },

    /// The declared payload exceeds the configured maximum.
    #[error("message length {length} exceeds maximum of {max}")]
    FrameTooLarge {
        /// Declared length, including its own four bytes.
        length: u32,
        /// Largest accepted payload length.
        max: usize,
    },

    /// The stream ended or failed partway through a frame.
    #[error("incomplete frame: {0}")]
    IncompleteFrame(#[source] io::Error),

    /// The startup packet could not be parsed.
    #[error("malformed startup message: {0}")]
    MalformedStartup(String),

    /// The peer closed the connection cleanly between frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// Writing to the peer failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl WireError {
    /// Returns `true` if the peer broke the framing rules.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        !matches!(self, Self::ConnectionClosed | Self::Io(_))
    }
}

fn as_char(byte: &u8) -> char {
    char::from(*byte)
}

/// Result type alias for wire operations.
pub type WireResult<T> = Result<T, WireError>;

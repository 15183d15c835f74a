//! Frame reader and writer.
//!
//! A frame is `[1 byte type][4 bytes big-endian length][length - 4 bytes payload]`.
//! The declared length counts itself but not the type byte. All reads are
//! full reads, so a frame split across any number of TCP segments decodes
//! the same as one delivered whole.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{WireError, WireResult};
use crate::message::{MessageType, RawMessage, LENGTH_FIELD_LEN};

/// Default cap on a frame's payload: 64 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Reads and writes frames on a byte stream.
///
/// The reader holds no per-connection state. One instance can serve every
/// connection; each connection must use it sequentially.
#[derive(Debug, Clone, Copy)]
pub struct MessageReader {
    max_frame_len: usize,
}

impl Default for MessageReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageReader {
    /// Create a reader with the default frame cap.
    #[must_use]
    pub const fn new() -> Self {
        Self { max_frame_len: DEFAULT_MAX_FRAME_LEN }
    }

    /// Set the largest payload accepted, in bytes.
    #[must_use]
    pub const fn max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    /// The largest payload accepted, in bytes.
    #[must_use]
    pub const fn frame_limit(&self) -> usize {
        self.max_frame_len
    }

    /// Read exactly one frame.
    ///
    /// # Errors
    ///
    /// - [`WireError::ConnectionClosed`] if the stream ends before the type byte
    /// - [`WireError::UnknownMessageType`] if the type byte is not a known kind
    /// - [`WireError::InvalidLength`] if the declared length is below 4; no
    ///   payload is read in that case
    /// - [`WireError::FrameTooLarge`] if the payload exceeds the cap
    /// - [`WireError::IncompleteFrame`] if the stream fails or ends mid-frame
    pub async fn read_raw_message<R>(&self, reader: &mut R) -> WireResult<RawMessage>
    where
        R: AsyncRead + Unpin,
    {
        let mut type_byte = [0u8; 1];
        if let Err(e) = reader.read_exact(&mut type_byte).await {
            return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
                WireError::ConnectionClosed
            } else {
                WireError::IncompleteFrame(e)
            });
        }
        let kind = MessageType::try_from(type_byte[0])?;

        let mut length_bytes = [0u8; LENGTH_FIELD_LEN];
        reader.read_exact(&mut length_bytes).await.map_err(WireError::IncompleteFrame)?;
        let length = u32::from_be_bytes(length_bytes);

        let payload_len = self.payload_len(length)?;
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).await.map_err(WireError::IncompleteFrame)?;

        trace!(kind = ?kind, len = payload_len, "read frame");
        Ok(RawMessage { kind, payload })
    }

    /// Validate a declared length and return the payload size it implies.
    pub(crate) fn payload_len(&self, length: u32) -> WireResult<usize> {
        let declared = length as usize;
        if declared < LENGTH_FIELD_LEN {
            return Err(WireError::InvalidLength { length });
        }
        let payload_len = declared - LENGTH_FIELD_LEN;
        if payload_len > self.max_frame_len {
            return Err(WireError::FrameTooLarge { length, max: self.max_frame_len });
        }
        Ok(payload_len)
    }
}

/// Write an already framed message verbatim, then flush.
///
/// Returns the number of bytes written, which is always `msg.len()`.
///
/// # Errors
///
/// Returns [`WireError::Io`] if the write or flush fails.
pub async fn write_message<W>(writer: &mut W, msg: &[u8]) -> WireResult<usize>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(msg).await?;
    writer.flush().await?;
    Ok(msg.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_one_frame() {
        let bytes = RawMessage::new(MessageType::Terminate, Vec::new()).encode().expect("encode");
        let mut stream = bytes.as_slice();

        let msg = MessageReader::new().read_raw_message(&mut stream).await.expect("read");
        assert_eq!(msg.kind, MessageType::Terminate);
        assert!(msg.payload.is_empty());
    }

    #[tokio::test]
    async fn test_clean_eof_is_connection_closed() {
        let mut stream: &[u8] = &[];
        let err = MessageReader::new().read_raw_message(&mut stream).await.unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_incomplete() {
        let mut stream: &[u8] = &[b'Q', 0, 0, 0, 10, b'a', b'b'];
        let err = MessageReader::new().read_raw_message(&mut stream).await.unwrap_err();
        assert!(matches!(err, WireError::IncompleteFrame(_)));
    }

    #[tokio::test]
    async fn test_frame_cap() {
        let reader = MessageReader::new().max_frame_len(8);
        let mut stream: &[u8] = &[b'd', 0, 0, 0, 13];

        let err = reader.read_raw_message(&mut stream).await.unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge { length: 13, max: 8 }));
    }

    #[tokio::test]
    async fn test_write_message_returns_length() {
        let mut out = Vec::new();
        let written = write_message(&mut out, b"Z\0\0\0\x05I").await.expect("write");
        assert_eq!(written, 6);
        assert_eq!(out, b"Z\0\0\0\x05I");
    }
}

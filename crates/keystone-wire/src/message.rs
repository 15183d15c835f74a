//! Frontend message kinds and raw frames.

use crate::error::WireError;

/// Size of the big-endian length field that follows the type byte.
pub const LENGTH_FIELD_LEN: usize = 4;

/// The closed set of message kinds a client may send after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// `p`: password in reply to an authentication request.
    PasswordMessage = b'p',
    /// `Q`: simple query.
    Query = b'Q',
    /// `X`: the client is going away.
    Terminate = b'X',
    /// `P`: extended-query parse.
    Parse = b'P',
    /// `B`: extended-query bind.
    Bind = b'B',
    /// `D`: describe a statement or portal.
    Describe = b'D',
    /// `E`: execute a portal.
    Execute = b'E',
    /// `H`: flush pending output.
    Flush = b'H',
    /// `S`: end of an extended-query cycle.
    Sync = b'S',
    /// `C`: close a statement or portal.
    Close = b'C',
    /// `d`: COPY data.
    CopyData = b'd',
    /// `c`: COPY complete.
    CopyDone = b'c',
    /// `f`: COPY failed.
    CopyFail = b'f',
    /// `F`: function call.
    FunctionCall = b'F',
}

impl MessageType {
    /// Every known kind, in no particular order.
    pub const ALL: [Self; 14] = [
        Self::PasswordMessage,
        Self::Query,
        Self::Terminate,
        Self::Parse,
        Self::Bind,
        Self::Describe,
        Self::Execute,
        Self::Flush,
        Self::Sync,
        Self::Close,
        Self::CopyData,
        Self::CopyDone,
        Self::CopyFail,
        Self::FunctionCall,
    ];

    /// The type byte on the wire.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let kind = match byte {
            b'p' => Self::PasswordMessage,
            b'Q' => Self::Query,
            b'X' => Self::Terminate,
            b'P' => Self::Parse,
            b'B' => Self::Bind,
            b'D' => Self::Describe,
            b'E' => Self::Execute,
            b'H' => Self::Flush,
            b'S' => Self::Sync,
            b'C' => Self::Close,
            b'd' => Self::CopyData,
            b'c' => Self::CopyDone,
            b'f' => Self::CopyFail,
            b'F' => Self::FunctionCall,
            _ => return Err(WireError::UnknownMessageType { byte }),
        };
        Ok(kind)
    }
}

/// One decoded frame: its kind and opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message kind.
    pub kind: MessageType,
    /// Payload, without the type byte or length field.
    pub payload: Vec<u8>,
}

impl RawMessage {
    /// Create a message.
    pub fn new(kind: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self { kind, payload: payload.into() }
    }

    /// Length as declared on the wire: the payload plus the length field.
    #[must_use]
    pub fn declared_len(&self) -> usize {
        self.payload.len() + LENGTH_FIELD_LEN
    }

    /// Frame the message as `[type][length][payload]`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::FrameTooLarge`] if the length does not fit the
    /// four-byte field.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        frame(self.kind.as_byte(), &self.payload)
    }

    /// Interpret the payload as one NUL-terminated string, as carried by
    /// `PasswordMessage` and `Query`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::MalformedStartup`] if the terminator is missing or
    /// the bytes are not UTF-8.
    pub fn cstring_payload(&self) -> Result<&str, WireError> {
        let bytes = self.payload.strip_suffix(&[0]).ok_or_else(|| {
            WireError::MalformedStartup(format!("{:?} payload is not NUL-terminated", self.kind))
        })?;
        std::str::from_utf8(bytes)
            .map_err(|e| WireError::MalformedStartup(format!("{:?} payload: {e}", self.kind)))
    }
}

/// Build a typed frame from a type byte and payload.
///
/// # Errors
///
/// Returns [`WireError::FrameTooLarge`] if the length does not fit in a `u32`.
pub fn frame(kind: u8, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    let declared = u32::try_from(payload.len() + LENGTH_FIELD_LEN)
        .map_err(|_| WireError::FrameTooLarge { length: u32::MAX, max: u32::MAX as usize })?;

    let mut buf = Vec::with_capacity(1 + LENGTH_FIELD_LEN + payload.len());
    buf.push(kind);
    buf.extend_from_slice(&declared.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

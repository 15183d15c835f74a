//! The untyped packets a client sends before authentication.
//!
//! Startup packets have no type byte: `[4 bytes length][4 bytes code][body]`.
//! The code distinguishes an encryption probe from a real startup message.

use std::collections::BTreeMap;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{WireError, WireResult};

/// Protocol version 3.0, the only one accepted.
pub const PROTOCOL_VERSION_3: u32 = 196_608;
/// Request to upgrade the connection to TLS.
pub const SSL_REQUEST_CODE: u32 = 80_877_103;
/// Request to upgrade the connection to GSSAPI encryption.
pub const GSSENC_REQUEST_CODE: u32 = 80_877_104;
/// Out-of-band query cancellation.
pub const CANCEL_REQUEST_CODE: u32 = 80_877_102;

/// Longest startup packet accepted, matching what PostgreSQL servers allow.
pub const MAX_STARTUP_PACKET_LEN: u32 = 10_000;

/// A decoded startup packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupPacket {
    /// TLS or GSSAPI probe. The server answers with a single `N` byte.
    EncryptionRequest,
    /// Cancel request; carries no session information this server uses.
    CancelRequest,
    /// A version 3.0 startup message.
    Startup(StartupMessage),
}

/// Connection parameters from a startup message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupMessage {
    params: BTreeMap<String, String>,
}

impl StartupMessage {
    /// The `user` parameter.
    pub fn user(&self) -> Option<&str> {
        self.param("user")
    }

    /// The `database` parameter, falling back to the user name as
    /// PostgreSQL clients expect.
    pub fn database(&self) -> Option<&str> {
        self.param("database").or_else(|| self.user())
    }

    /// Any parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Encode as a complete startup packet. Used by clients and tests.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&PROTOCOL_VERSION_3.to_be_bytes());
        for (key, value) in &self.params {
            body.extend_from_slice(key.as_bytes());
            body.push(0);
            body.extend_from_slice(value.as_bytes());
            body.push(0);
        }
        body.push(0);

        let mut packet = Vec::with_capacity(body.len() + 4);
        packet.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
        packet.extend_from_slice(&body);
        packet
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StartupMessage {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { params: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

/// Read one startup packet.
///
/// # Errors
///
/// Returns [`WireError::ConnectionClosed`] if the stream ends before any
/// byte, [`WireError::MalformedStartup`] for a bad length, code or parameter
/// list, and [`WireError::IncompleteFrame`] if the stream ends mid-packet.
pub async fn read_startup<R>(reader: &mut R) -> WireResult<StartupPacket>
where
    R: AsyncRead + Unpin,
{
    let mut length_bytes = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut length_bytes).await {
        return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
            WireError::ConnectionClosed
        } else {
            WireError::IncompleteFrame(e)
        });
    }
    let length = u32::from_be_bytes(length_bytes);
    if !(8..=MAX_STARTUP_PACKET_LEN).contains(&length) {
        return Err(WireError::MalformedStartup(format!("invalid packet length {length}")));
    }

    let mut body = vec![0u8; length as usize - 4];
    reader.read_exact(&mut body).await.map_err(WireError::IncompleteFrame)?;

    let (code_bytes, rest) = body.split_at(4);
    let code = u32::from_be_bytes([code_bytes[0], code_bytes[1], code_bytes[2], code_bytes[3]]);
    match code {
        SSL_REQUEST_CODE | GSSENC_REQUEST_CODE => Ok(StartupPacket::EncryptionRequest),
        CANCEL_REQUEST_CODE => Ok(StartupPacket::CancelRequest),
        PROTOCOL_VERSION_3 => parse_params(rest).map(StartupPacket::Startup),
        other => Err(WireError::MalformedStartup(format!(
            "unsupported protocol version {}.{}",
            other >> 16,
            other & 0xffff
        ))),
    }
}

fn parse_params(mut rest: &[u8]) -> WireResult<StartupMessage> {
    let mut params = BTreeMap::new();
    loop {
        let key = take_cstring(&mut rest)?;
        if key.is_empty() {
            break;
        }
        let value = take_cstring(&mut rest)?;
        params.insert(key, value);
    }
    if !rest.is_empty() {
        return Err(WireError::MalformedStartup("trailing bytes after parameters".into()));
    }
    Ok(StartupMessage { params })
}

fn take_cstring(rest: &mut &[u8]) -> WireResult<String> {
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| WireError::MalformedStartup("unterminated parameter".into()))?;
    let s = std::str::from_utf8(&rest[..end])
        .map_err(|e| WireError::MalformedStartup(format!("parameter is not UTF-8: {e}")))?
        .to_string();
    *rest = &rest[end + 1..];
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_startup_round_trip() {
        let msg: StartupMessage = [("user", "immudb"), ("database", "defaultdb")].into_iter().collect();
        let bytes = msg.encode();

        let packet = read_startup(&mut bytes.as_slice()).await.expect("read");
        let StartupPacket::Startup(parsed) = packet else { panic!("expected startup") };
        assert_eq!(parsed.user(), Some("immudb"));
        assert_eq!(parsed.database(), Some("defaultdb"));
    }

    #[tokio::test]
    async fn test_database_defaults_to_user() {
        let msg: StartupMessage = [("user", "alice")].into_iter().collect();
        let bytes = msg.encode();

        let StartupPacket::Startup(parsed) =
            read_startup(&mut bytes.as_slice()).await.expect("read")
        else {
            panic!("expected startup")
        };
        assert_eq!(parsed.database(), Some("alice"));
    }

    #[tokio::test]
    async fn test_ssl_request() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&8u32.to_be_bytes());
        bytes.extend_from_slice(&SSL_REQUEST_CODE.to_be_bytes());

        let packet = read_startup(&mut bytes.as_slice()).await.expect("read");
        assert_eq!(packet, StartupPacket::EncryptionRequest);
    }

    #[tokio::test]
    async fn test_rejects_old_protocol() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&9u32.to_be_bytes());
        bytes.extend_from_slice(&(2u32 << 16).to_be_bytes());
        bytes.push(0);

        let err = read_startup(&mut bytes.as_slice()).await.unwrap_err();
        assert!(matches!(err, WireError::MalformedStartup(ref m) if m.contains("2.0")));
    }

    #[tokio::test]
    async fn test_rejects_short_length() {
        let bytes = 4u32.to_be_bytes();
        let err = read_startup(&mut bytes.as_slice()).await.unwrap_err();
        assert!(matches!(err, WireError::MalformedStartup(_)));
    }
}

//! Server-to-client messages.

use crate::message::frame;

/// SQLSTATE codes used in error responses.
pub mod sqlstate {
    /// `28P01`: password authentication failed.
    pub const INVALID_PASSWORD: &str = "28P01";
    /// `28000`: the role may not log in or connect.
    pub const INVALID_AUTHORIZATION: &str = "28000";
    /// `3D000`: database does not exist.
    pub const INVALID_CATALOG_NAME: &str = "3D000";
    /// `42501`: insufficient privilege.
    pub const INSUFFICIENT_PRIVILEGE: &str = "42501";
    /// `08P01`: protocol violation.
    pub const PROTOCOL_VIOLATION: &str = "08P01";
    /// `0A000`: feature not supported.
    pub const FEATURE_NOT_SUPPORTED: &str = "0A000";
    /// `57P01`: server is shutting down.
    pub const ADMIN_SHUTDOWN: &str = "57P01";
    /// `XX000`: internal error.
    pub const INTERNAL_ERROR: &str = "XX000";
}

/// Transaction status reported in `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// `I`: not in a transaction block.
    Idle,
    /// `T`: inside a transaction block.
    InTransaction,
    /// `E`: inside a failed transaction block.
    Failed,
}

impl TransactionStatus {
    const fn as_byte(self) -> u8 {
        match self {
            Self::Idle => b'I',
            Self::InTransaction => b'T',
            Self::Failed => b'E',
        }
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// Ask the client for a cleartext password.
    AuthenticationCleartextPassword,
    /// Authentication succeeded.
    AuthenticationOk,
    /// A run-time parameter the client should know about.
    ParameterStatus {
        /// Parameter name.
        name: String,
        /// Parameter value.
        value: String,
    },
    /// Ready for the next request.
    ReadyForQuery(TransactionStatus),
    /// A request failed.
    ErrorResponse {
        /// `ERROR` or `FATAL`.
        severity: &'static str,
        /// SQLSTATE code.
        code: &'static str,
        /// Human-readable message.
        message: String,
    },
}

impl BackendMessage {
    /// A non-fatal error.
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::ErrorResponse { severity: "ERROR", code, message: message.into() }
    }

    /// An error after which the server closes the connection.
    pub fn fatal(code: &'static str, message: impl Into<String>) -> Self {
        Self::ErrorResponse { severity: "FATAL", code, message: message.into() }
    }

    /// Frame the message for the wire.
    pub fn encode(&self) -> Vec<u8> {
        let (kind, payload) = match self {
            Self::AuthenticationCleartextPassword => (b'R', 3i32.to_be_bytes().to_vec()),
            Self::AuthenticationOk => (b'R', 0i32.to_be_bytes().to_vec()),
            Self::ParameterStatus { name, value } => {
                let mut payload = Vec::with_capacity(name.len() + value.len() + 2);
                put_cstring(&mut payload, name);
                put_cstring(&mut payload, value);
                (b'S', payload)
            }
            Self::ReadyForQuery(status) => (b'Z', vec![status.as_byte()]),
            Self::ErrorResponse { severity, code, message } => {
                let mut payload = Vec::new();
                for (field, value) in [(b'S', *severity), (b'V', *severity), (b'C', *code)] {
                    payload.push(field);
                    put_cstring(&mut payload, value);
                }
                payload.push(b'M');
                put_cstring(&mut payload, message);
                payload.push(0);
                (b'E', payload)
            }
        };

        // Server messages are small; the length always fits.
        frame(kind, &payload).unwrap_or_default()
    }
}

fn put_cstring(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

//! Wire-protocol front-end.
//!
//! Speaks the startup and authentication part of the PostgreSQL frontend
//! protocol: a client connects, names its user and database, sends a
//! cleartext password and gets a session that lives as long as the
//! connection. Queries are not served; every request after login is
//! answered with a "feature not supported" error.

use std::sync::Arc;

use keystone::protocol::OpenSessionRequest;
use keystone::{CallContext, Error, Service};
use keystone_wire::{
    read_startup, sqlstate, write_message, BackendMessage, MessageReader, MessageType,
    StartupMessage, StartupPacket, TransactionStatus, WireError,
};
use metrics::counter;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Byte answering an SSL or GSSAPI encryption request: not supported.
const ENCRYPTION_REFUSED: u8 = b'N';

/// Accept connections until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns the listener's error if accepting fails.
pub async fn serve(
    listener: TcpListener,
    service: Arc<Service>,
    reader: MessageReader,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    loop {
        let (socket, peer) = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };

        counter!("keystone_wire_connections_total").increment(1);
        debug!(%peer, "wire connection accepted");

        let service = Arc::clone(&service);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, service, reader, shutdown).await {
                debug!(%peer, error = %e, "wire connection ended with an I/O error");
            }
            debug!(%peer, "wire connection closed");
        });
    }
    Ok(())
}

/// Serve one client connection to completion.
///
/// The session opened during the handshake is closed when the connection
/// ends for any reason, rolling back its open transaction.
///
/// # Errors
///
/// Returns [`WireError::Io`] if writing to the client fails.
pub async fn handle_connection<S>(
    mut stream: S,
    service: Arc<Service>,
    reader: MessageReader,
    shutdown: CancellationToken,
) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(startup) = negotiate(&mut stream).await? else {
        return Ok(());
    };

    let Some(ctx) = authenticate(&mut stream, &service, reader, &startup).await? else {
        return Ok(());
    };

    let result = serve_session(&mut stream, reader, &shutdown).await;

    match service.close_session(&ctx).await {
        Ok(()) => {}
        // The idle reaper got there first.
        Err(Error::NoSessionFound { .. }) => {}
        Err(e) => warn!(error = %e, "failed to close session"),
    }
    result
}

/// Read startup packets until the client sends its startup message.
async fn negotiate<S>(stream: &mut S) -> Result<Option<StartupMessage>, WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match read_startup(stream).await {
            Ok(StartupPacket::EncryptionRequest) => {
                write_message(stream, &[ENCRYPTION_REFUSED]).await?;
            }
            Ok(StartupPacket::CancelRequest) => return Ok(None),
            Ok(StartupPacket::Startup(message)) => return Ok(Some(message)),
            Err(WireError::ConnectionClosed) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "invalid startup packet");
                send(stream, &BackendMessage::fatal(sqlstate::PROTOCOL_VIOLATION, e.to_string())).await?;
                return Ok(None);
            }
        }
    }
}

/// Ask for a password and open a session. Returns `None` after reporting a
/// failed login to the client.
async fn authenticate<S>(
    stream: &mut S,
    service: &Service,
    reader: MessageReader,
    startup: &StartupMessage,
) -> Result<Option<CallContext>, WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(user) = startup.user() else {
        let reply = BackendMessage::fatal(sqlstate::INVALID_AUTHORIZATION, "no user name in startup message");
        send(stream, &reply).await?;
        return Ok(None);
    };
    let database = startup.database().unwrap_or_default().to_string();

    send(stream, &BackendMessage::AuthenticationCleartextPassword).await?;
    let password = match reader.read_raw_message(stream).await {
        Ok(msg) if msg.kind == MessageType::PasswordMessage => match msg.cstring_payload() {
            Ok(password) => password.to_string(),
            Err(e) => return refuse_protocol(stream, &e).await,
        },
        Ok(msg) => {
            let e = WireError::MalformedStartup(format!("expected password message, got {:?}", msg.kind));
            return refuse_protocol(stream, &e).await;
        }
        Err(WireError::ConnectionClosed) => return Ok(None),
        Err(e) => return refuse_protocol(stream, &e).await,
    };

    let request = OpenSessionRequest { username: user.to_string(), password, database_name: database };
    let opened = match service.open_session(&CallContext::new(), request).await {
        Ok(opened) => opened,
        Err(e) => {
            debug!(user, error = %e, "wire login refused");
            send(stream, &BackendMessage::fatal(sqlstate_for(&e), e.to_string())).await?;
            return Ok(None);
        }
    };

    info!(user, session = %opened.session_id, "wire session opened");
    send(stream, &BackendMessage::AuthenticationOk).await?;
    for (name, value) in [
        ("server_version", env!("CARGO_PKG_VERSION").to_string()),
        ("server_instance_id", opened.server_instance_id.clone()),
        ("session_id", opened.session_id.to_string()),
    ] {
        send(stream, &BackendMessage::ParameterStatus { name: name.into(), value }).await?;
    }
    send(stream, &BackendMessage::ReadyForQuery(TransactionStatus::Idle)).await?;

    Ok(Some(CallContext::new().with_session(opened.session_id)))
}

/// Answer requests in arrival order until the client leaves.
async fn serve_session<S>(
    stream: &mut S,
    reader: MessageReader,
    shutdown: &CancellationToken,
) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            next = reader.read_raw_message(stream) => Some(next),
        };
        let Some(next) = next else {
            send(stream, &BackendMessage::fatal(sqlstate::ADMIN_SHUTDOWN, "server is shutting down")).await?;
            return Ok(());
        };

        match next {
            Ok(msg) if msg.kind == MessageType::Terminate => return Ok(()),
            Ok(msg) => {
                let reply = BackendMessage::error(
                    sqlstate::FEATURE_NOT_SUPPORTED,
                    format!("unsupported message: {}", char::from(msg.kind.as_byte())),
                );
                send(stream, &reply).await?;
                send(stream, &BackendMessage::ReadyForQuery(TransactionStatus::Idle)).await?;
            }
            Err(WireError::ConnectionClosed) => return Ok(()),
            Err(e) if e.is_protocol_violation() => {
                refuse_protocol::<_, ()>(stream, &e).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

async fn refuse_protocol<S, T>(stream: &mut S, err: &WireError) -> Result<Option<T>, WireError>
where
    S: AsyncWrite + Unpin,
{
    warn!(error = %err, "protocol violation, closing connection");
    counter!("keystone_wire_protocol_violations_total").increment(1);
    send(stream, &BackendMessage::fatal(sqlstate::PROTOCOL_VIOLATION, err.to_string())).await?;
    Ok(None)
}

async fn send<S>(stream: &mut S, message: &BackendMessage) -> Result<(), WireError>
where
    S: AsyncWrite + Unpin,
{
    write_message(stream, &message.encode()).await?;
    Ok(())
}

/// SQLSTATE reported for a failed login.
pub fn sqlstate_for(err: &Error) -> &'static str {
    match err {
        Error::InvalidCredentials => sqlstate::INVALID_PASSWORD,
        Error::UserInactive | Error::AuthDisabled => sqlstate::INVALID_AUTHORIZATION,
        Error::UnknownDatabase { .. } => sqlstate::INVALID_CATALOG_NAME,
        Error::PermissionDenied { .. } => sqlstate::INSUFFICIENT_PRIVILEGE,
        Error::Wire(_) => sqlstate::PROTOCOL_VIOLATION,
        _ => sqlstate::INTERNAL_ERROR,
    }
}

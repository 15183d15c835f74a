//! HTTP/JSON front-end.
//!
//! Every operation is a `POST` carrying one request message from
//! [`keystone::protocol`]. The caller's session travels in the
//! `x-session-id` header and an optional `x-timeout-ms` header sets a
//! deadline for the call.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use keystone::protocol::{
    BeginTxRequest, BeginTxResponse, CommitRequest, CommitResponse, GetRequest, GetResponse,
    OpenSessionRequest, OpenSessionResponse, RollbackRequest, SetRequest,
};
use keystone::{CallContext, Error, ErrorKind, MetricsSnapshot, Service, SessionId};
use keystone_storage::StorageError;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the session identifier.
pub const SESSION_HEADER: &str = "x-session-id";
/// Header carrying the call deadline in milliseconds.
pub const TIMEOUT_HEADER: &str = "x-timeout-ms";

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the router over a service.
pub fn router(service: Arc<Service>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/metrics", get(metrics))
        .route("/v1/session/open", post(open_session))
        .route("/v1/session/close", post(close_session))
        .route("/v1/tx/begin", post(begin_tx))
        .route("/v1/tx/set", post(set))
        .route("/v1/tx/get", post(get_key))
        .route("/v1/tx/commit", post(commit))
        .route("/v1/tx/rollback", post(rollback))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

async fn health(State(service): State<Arc<Service>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "serverId": service.server_id().to_string(),
        "sessions": service.sessions().len(),
    }))
}

async fn metrics(State(service): State<Arc<Service>>) -> Json<MetricsSnapshot> {
    Json(service.metrics().snapshot())
}

async fn open_session(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    Json(request): Json<OpenSessionRequest>,
) -> ApiResult<OpenSessionResponse> {
    let ctx = call_context(&headers)?;
    Ok(Json(service.open_session(&ctx, request).await?))
}

async fn close_session(State(service): State<Arc<Service>>, headers: HeaderMap) -> ApiResult<Value> {
    let ctx = call_context(&headers)?;
    service.close_session(&ctx).await?;
    Ok(Json(json!({})))
}

async fn begin_tx(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    Json(request): Json<BeginTxRequest>,
) -> ApiResult<BeginTxResponse> {
    let ctx = call_context(&headers)?;
    Ok(Json(service.begin_tx(&ctx, request).await?))
}

async fn set(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    Json(request): Json<SetRequest>,
) -> ApiResult<Value> {
    let ctx = call_context(&headers)?;
    service.set(&ctx, request).await?;
    Ok(Json(json!({})))
}

/// Responds with `null` when the key has no value.
async fn get_key(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    Json(request): Json<GetRequest>,
) -> ApiResult<Option<GetResponse>> {
    let ctx = call_context(&headers)?;
    Ok(Json(service.get(&ctx, request).await?))
}

async fn commit(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    Json(request): Json<CommitRequest>,
) -> ApiResult<CommitResponse> {
    let ctx = call_context(&headers)?;
    Ok(Json(service.commit(&ctx, request).await?))
}

async fn rollback(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    Json(request): Json<RollbackRequest>,
) -> ApiResult<Value> {
    let ctx = call_context(&headers)?;
    service.rollback(&ctx, request).await?;
    Ok(Json(json!({})))
}

fn call_context(headers: &HeaderMap) -> Result<CallContext, ApiError> {
    let mut ctx = CallContext::new();

    if let Some(raw) = headers.get(SESSION_HEADER) {
        let id = raw
            .to_str()
            .ok()
            .and_then(|s| SessionId::parse(s).ok())
            .ok_or_else(|| ApiError::BadRequest(format!("malformed {SESSION_HEADER} header")))?;
        ctx = ctx.with_session(id);
    }

    if let Some(raw) = headers.get(TIMEOUT_HEADER) {
        let millis: u64 = raw
            .to_str()
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ApiError::BadRequest(format!("malformed {TIMEOUT_HEADER} header")))?;
        ctx = ctx.with_timeout(Duration::from_millis(millis));
    }

    Ok(ctx)
}

/// An error as returned to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    /// A service error.
    Service(Error),
    /// The request itself could not be understood.
    BadRequest(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Service(err) => {
                let body = json!({
                    "code": err.code(),
                    "kind": err.kind().as_str(),
                    "message": err.to_string(),
                });
                (status_for(&err), Json(body)).into_response()
            }
            Self::BadRequest(message) => {
                let body = json!({ "code": "BadRequest", "kind": "BadRequest", "message": message });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}

/// HTTP status for a service error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::AuthDisabled | Error::Wire(_) => StatusCode::BAD_REQUEST,
        Error::InvalidCredentials | Error::UserInactive => StatusCode::UNAUTHORIZED,
        Error::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        Error::UnknownDatabase { .. } | Error::NoSessionFound { .. } => StatusCode::NOT_FOUND,
        Error::SessionAlreadyPresent { .. } => StatusCode::CONFLICT,
        Error::Backend { source: StorageError::Unavailable(_), .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::Backend { .. } if err.is_conflict() => StatusCode::CONFLICT,
        _ => match err.kind() {
            ErrorKind::Transaction => StatusCode::CONFLICT,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

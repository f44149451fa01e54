//! RPC endpoints. Each one decodes its JSON body and runs it through the pipeline.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tonic::{Code, Status};
use utoipa::ToSchema;

use crate::{
    pipeline::{
        rpc::{
            CreateUserRequest, Empty, GetUserByEmailRequest, GetUserByIdRequest, HealthRequest, HealthResponse,
            LoginRequest, LogoutRequest, RefreshTokenRequest, RegisterRequest, TokenPair,
            UpdateUserPasswordRequest, UserResponse, ValidateTokenRequest, ValidateTokenResponse,
        },
        Call, Method, Payload, Pipeline,
    },
    GIT_COMMIT_HASH,
};

/// Error body for every failed RPC.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[must_use]
pub const fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}

#[must_use]
pub const fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A wire status rendered as JSON with a `grpc-status` header.
#[derive(Debug)]
pub struct RpcError(pub Status);

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let body = ErrorBody {
            code: code_name(code).to_string(),
            message: self.0.message().to_string(),
        };
        let mut response = (http_status(code), Json(body)).into_response();
        response
            .headers_mut()
            .insert("grpc-status", HeaderValue::from(i32::from(code)));
        response
    }
}

pub(crate) async fn invoke(
    pipeline: &Pipeline,
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: &[u8],
) -> Response {
    let payload = match Payload::decode(method, body) {
        Ok(payload) => payload,
        Err(e) => {
            return RpcError(Status::invalid_argument(format!("invalid request body: {e}")))
                .into_response()
        }
    };

    let call = Call::new(payload, headers).with_peer(peer.map(|ConnectInfo(addr)| addr));
    match pipeline.call(call).await {
        Ok(reply) => {
            let mut response = Json(reply).into_response();
            response
                .headers_mut()
                .insert("grpc-status", HeaderValue::from(i32::from(Code::Ok)));
            response
        }
        Err(status) => RpcError(status).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth.AuthService/Register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Identity created and first session opened", body = TokenPair),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::Register, headers, peer, &body).await
}

#[utoipa::path(
    post,
    path = "/auth.AuthService/Login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "New session opened", body = TokenPair),
        (status = 401, description = "Invalid password", body = ErrorBody),
        (status = 404, description = "Unknown email", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::Login, headers, peer, &body).await
}

#[utoipa::path(
    post,
    path = "/auth.AuthService/Logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Session revoked", body = Empty),
        (status = 401, description = "Not authenticated or already logged out", body = ErrorBody),
        (status = 403, description = "Token belongs to another session", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::Logout, headers, peer, &body).await
}

#[utoipa::path(
    post,
    path = "/auth.AuthService/RefreshToken",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Token pair rotated", body = TokenPair),
        (status = 401, description = "Refresh token invalid, reused or expired", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::RefreshToken, headers, peer, &body).await
}

#[utoipa::path(
    post,
    path = "/auth.AuthService/ValidateToken",
    request_body = ValidateTokenRequest,
    responses(
        (status = 200, description = "Validation result", body = ValidateTokenResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn validate_token(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::ValidateToken, headers, peer, &body).await
}

#[utoipa::path(
    post,
    path = "/auth.AuthService/Health",
    request_body = HealthRequest,
    responses(
        (status = 200, description = "Service and session store are healthy", body = HealthResponse),
        (status = 503, description = "Session store is unavailable", body = ErrorBody)
    ),
    tag = "health"
)]
pub async fn health_rpc(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::Health, headers, peer, &body).await
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and session store are healthy", body = HealthResponse),
        (status = 503, description = "Session store is unavailable", body = ErrorBody)
    ),
    tag = "health"
)]
pub async fn health(pipeline: Extension<Arc<Pipeline>>, headers: HeaderMap) -> Response {
    let mut response = invoke(&pipeline, Method::Health, headers, None, &[]).await;

    let short_hash = GIT_COMMIT_HASH.get(0..7).unwrap_or_default();
    if let Ok(value) = HeaderValue::from_str(&format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )) {
        response.headers_mut().insert("X-App", value);
    }

    response
}

#[utoipa::path(
    post,
    path = "/user.UserService/CreateUser",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = UserResponse),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "user"
)]
pub async fn create_user(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::CreateUser, headers, peer, &body).await
}

#[utoipa::path(
    post,
    path = "/user.UserService/GetUserById",
    request_body = GetUserByIdRequest,
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "user"
)]
pub async fn get_user_by_id(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::GetUserById, headers, peer, &body).await
}

#[utoipa::path(
    post,
    path = "/user.UserService/GetUserByEmail",
    request_body = GetUserByEmailRequest,
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "user"
)]
pub async fn get_user_by_email(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::GetUserByEmail, headers, peer, &body).await
}

#[utoipa::path(
    post,
    path = "/user.UserService/UpdateUserPassword",
    request_body = UpdateUserPasswordRequest,
    responses(
        (status = 200, description = "Password replaced", body = Empty),
        (status = 401, description = "Old password does not match", body = ErrorBody),
        (status = 403, description = "Not the caller's own account", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "user"
)]
pub async fn update_user_password(
    pipeline: Extension<Arc<Pipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&pipeline, Method::UpdateUserPassword, headers, peer, &body).await
}

/// Prometheus text exposition.
pub async fn metrics(handle: Extension<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

//! Terminal handler: maps each payload onto the lifecycle engine or user service.

use async_trait::async_trait;
use axum::http::{header::USER_AGENT, HeaderMap};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tonic::Status;
use tracing::error;
use uuid::Uuid;

use super::{
    authn::AUTH_FAILED,
    recovery::INTERNAL_MESSAGE,
    rpc::{
        Empty, HealthResponse, Reply, TokenPair, UserResponse, ValidateTokenResponse,
    },
    AuthContext, Call, CallResult, Fault, Handler, Payload,
};
use crate::{
    auth::{AuthError, ClientInfo, Identity, Session, SessionLifecycleEngine},
    GIT_COMMIT_HASH,
};

pub const DEADLINE_MESSAGE: &str = "deadline exceeded";

impl From<&Session> for TokenPair {
    fn from(session: &Session) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
        }
    }
}

impl From<&Identity> for UserResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.to_string(),
            email: identity.email.clone(),
            is_active: identity.is_active,
        }
    }
}

/// User agent and client address from call metadata, falling back to the peer.
#[must_use]
pub fn client_info(metadata: &HeaderMap, peer: Option<SocketAddr>) -> ClientInfo {
    let header = |name: &str| {
        metadata
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let user_agent = metadata
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let ip_address = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()));

    ClientInfo::new(user_agent, ip_address)
}

fn authenticated(call: &Call) -> Result<AuthContext, Fault> {
    call.context
        .auth
        .ok_or_else(|| Status::unauthenticated(AUTH_FAILED).into())
}

fn parse_id(value: &str, field: &str) -> Result<Uuid, Fault> {
    Uuid::parse_str(value)
        .map_err(|_| Status::invalid_argument(format!("{field} must be a valid UUID")).into())
}

#[derive(Clone, Debug)]
pub struct Dispatcher {
    engine: Arc<SessionLifecycleEngine>,
    timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(engine: Arc<SessionLifecycleEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    async fn route(&self, call: Call) -> CallResult {
        let engine = &self.engine;
        let client = client_info(&call.metadata, call.peer);

        match &call.payload {
            Payload::Register(r) => {
                let session = engine.register(&r.email, &r.password, &client).await?;
                Ok(Reply::Tokens(TokenPair::from(&session)))
            }
            Payload::Login(r) => {
                let session = engine.login(&r.email, &r.password, &client).await?;
                Ok(Reply::Tokens(TokenPair::from(&session)))
            }
            Payload::Logout(r) => {
                let auth = authenticated(&call)?;
                let result = engine.validate_token(&r.access_token).await;
                let Some(session_id) = result.session_id.filter(|_| result.valid) else {
                    return Err(result.error.unwrap_or(AuthError::InvalidAccessToken).into());
                };
                if session_id != auth.session_id {
                    return Err(AuthError::PermissionDenied.into());
                }
                engine.logout(session_id).await?;
                Ok(Reply::Empty(Empty {}))
            }
            Payload::RefreshToken(r) => {
                let session = engine.refresh_token(&r.refresh_token).await?;
                Ok(Reply::Tokens(TokenPair::from(&session)))
            }
            Payload::ValidateToken(r) => {
                let result = engine.validate_token(&r.token).await;
                Ok(Reply::Validation(ValidateTokenResponse {
                    valid: result.valid,
                    user_id: result.user_id.map(|id| id.to_string()).unwrap_or_default(),
                    session_id: result
                        .session_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                    error: result
                        .error
                        .map(|e| {
                            if e.is_infra() {
                                INTERNAL_MESSAGE.to_string()
                            } else {
                                e.to_string()
                            }
                        })
                        .unwrap_or_default(),
                }))
            }
            Payload::Health(_) => {
                if let Err(e) = engine.sessions().ping().await {
                    error!("Session store health check failed: {}", e);
                    return Err(Status::unavailable("session store unavailable").into());
                }
                Ok(Reply::Health(HealthResponse {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    build: GIT_COMMIT_HASH.to_string(),
                    store: "ok".to_string(),
                }))
            }
            Payload::CreateUser(r) => {
                let identity = engine.users().create_user(&r.email, &r.password).await?;
                Ok(Reply::User(UserResponse::from(&identity)))
            }
            Payload::GetUserById(r) => {
                let id = parse_id(&r.user_id, "user_id")?;
                let identity = engine.users().get_user_by_id(id).await?;
                Ok(Reply::User(UserResponse::from(&identity)))
            }
            Payload::GetUserByEmail(r) => {
                let identity = engine.users().get_user_by_email(&r.email).await?;
                Ok(Reply::User(UserResponse::from(&identity)))
            }
            Payload::UpdateUserPassword(r) => {
                let auth = authenticated(&call)?;
                let id = parse_id(&r.id, "id")?;
                if id != auth.user_id {
                    return Err(AuthError::PermissionDenied.into());
                }
                engine
                    .users()
                    .update_user_password(id, &r.old_password, &r.new_password)
                    .await?;
                Ok(Reply::Empty(Empty {}))
            }
        }
    }
}

#[async_trait]
impl Handler for Dispatcher {
    async fn handle(&self, call: Call) -> CallResult {
        match tokio::time::timeout(self.timeout, self.route(call)).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded(DEADLINE_MESSAGE).into()),
        }
    }
}

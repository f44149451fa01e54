//! Authentication gate: non-public methods need a live credential.
//!
//! `RefreshToken` is authenticated by the refresh token it carries, so a client
//! whose access token has expired can still rotate. Every other non-public
//! method needs `authorization: Bearer <access token>`. `ValidateToken` is no
//! exception: the bearer identifies the caller, while the token in the body is
//! only inspected and reported on.

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;
use tonic::Status;
use tracing::debug;

use super::{AuthContext, Call, CallResult, Interceptor, Next, Payload};
use crate::auth::SessionLifecycleEngine;

pub const AUTH_FAILED: &str = "authentication failed";

/// Token from an `authorization: Bearer <token>` header. The scheme is case-insensitive.
#[must_use]
pub fn bearer_token(metadata: &HeaderMap) -> Option<&str> {
    let value = metadata.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[derive(Clone, Debug)]
pub struct AuthGate {
    engine: Arc<SessionLifecycleEngine>,
}

impl AuthGate {
    #[must_use]
    pub fn new(engine: Arc<SessionLifecycleEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Interceptor for AuthGate {
    async fn intercept(&self, mut call: Call, next: Next<'_>) -> CallResult {
        let method = call.method();
        if method.is_public() {
            return next.run(call).await;
        }

        let result = match &call.payload {
            Payload::RefreshToken(r) => self.engine.validate_refresh_token(&r.refresh_token).await,
            _ => {
                let Some(token) = bearer_token(&call.metadata) else {
                    debug!(%method, "missing bearer token");
                    return Err(Status::unauthenticated(AUTH_FAILED).into());
                };
                self.engine.validate_token(token).await
            }
        };

        match (result.valid, result.user_id, result.session_id) {
            (true, Some(user_id), Some(session_id)) => {
                call.context.auth = Some(AuthContext {
                    user_id,
                    session_id,
                });
                next.run(call).await
            }
            _ => {
                if let Some(err) = result.error {
                    debug!(%method, "credential rejected: {}", err);
                }
                Err(Status::unauthenticated(AUTH_FAILED).into())
            }
        }
    }
}

//! Session lifecycle: register, login, refresh, validate and logout.

use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use subtle::ConstantTimeEq;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::{
    error::AuthError,
    identity::{Identity, UserService},
    session::{ClientInfo, Session, SessionStore},
    token::{TokenCodec, TokenKind},
};

/// Outcome of [`SessionLifecycleEngine::validate_token`]. Never an error.
#[derive(Debug)]
pub struct TokenValidation {
    pub valid: bool,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub error: Option<AuthError>,
}

impl TokenValidation {
    fn valid(user_id: Uuid, session_id: Uuid) -> Self {
        Self {
            valid: true,
            user_id: Some(user_id),
            session_id: Some(session_id),
            error: None,
        }
    }

    fn invalid(error: AuthError) -> Self {
        Self {
            valid: false,
            user_id: None,
            session_id: None,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct SessionLifecycleEngine {
    sessions: Arc<dyn SessionStore>,
    users: UserService,
    tokens: TokenCodec,
    session_ttl: Duration,
}

impl SessionLifecycleEngine {
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        users: UserService,
        tokens: TokenCodec,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            users,
            tokens,
            session_ttl,
        }
    }

    #[must_use]
    pub const fn users(&self) -> &UserService {
        &self.users
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Create an identity and open its first session.
    ///
    /// # Errors
    /// `UserAlreadyExists` when the email is taken, or any failure of session creation.
    #[instrument(skip(self, password, client))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<Session, AuthError> {
        let identity = self.users.create_user(email, password).await?;
        self.create_session(&identity, client).await
    }

    /// Verify credentials and open a new session.
    ///
    /// # Errors
    /// `UserNotFound` for an unknown email, `InvalidPassword` on mismatch.
    #[instrument(skip(self, password, client))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<Session, AuthError> {
        let identity = self.users.get_user_by_email(email).await?;

        if !self.users.verify(&identity, password).await? {
            warn!(user_id = %identity.id, "login with invalid password");
            return Err(AuthError::InvalidPassword);
        }

        self.create_session(&identity, client).await
    }

    /// Issue a token pair bound to a fresh session id and persist the session.
    ///
    /// # Errors
    /// Token signing or store failures; nothing is persisted in that case.
    pub async fn create_session(
        &self,
        identity: &Identity,
        client: &ClientInfo,
    ) -> Result<Session, AuthError> {
        let session_id = Uuid::now_v7();
        let access_token = self
            .tokens
            .issue(TokenKind::Access, identity.id, session_id)?;
        let refresh_token = self
            .tokens
            .issue(TokenKind::Refresh, identity.id, session_id)?;

        let now = Utc::now();
        let session = Session {
            id: session_id,
            user_id: identity.id,
            access_expires_at: expiry(now, self.tokens.access_ttl()),
            refresh_expires_at: expiry(now, self.tokens.refresh_ttl()),
            created_at: now,
            access_token,
            refresh_token,
            user_agent: client.user_agent.clone().unwrap_or_default(),
            ip_address: client.ip_address.clone().unwrap_or_default(),
        };

        self.sessions.create(&session, self.session_ttl).await?;

        debug!(session_id = %session.id, user_id = %session.user_id, "session created");

        Ok(session)
    }

    /// Rotate the token pair of a session.
    ///
    /// Only the refresh token currently stored on the session is accepted, so a
    /// rotated-out token is rejected even while its signature and expiry still verify.
    /// The session's refresh expiry is never extended.
    ///
    /// # Errors
    /// `InvalidRefreshToken` for unparsable, superseded or concurrently rotated tokens,
    /// `TokenExpired` past either the embedded or the stored refresh expiry,
    /// `SessionNotFound` when the session is gone.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let claims = self.tokens.parse(refresh_token).map_err(|e| match e {
            AuthError::TokenExpired => AuthError::TokenExpired,
            _ => AuthError::InvalidRefreshToken,
        })?;

        let mut session = self.sessions.get_by_id(claims.session_id).await?;

        if !tokens_match(&session.refresh_token, refresh_token) {
            warn!(session_id = %session.id, "refresh token reuse");
            return Err(AuthError::InvalidRefreshToken);
        }

        let now = Utc::now();
        if session.refresh_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        session.access_token = self
            .tokens
            .issue(TokenKind::Access, session.user_id, session.id)?;
        session.refresh_token = self
            .tokens
            .issue(TokenKind::Refresh, session.user_id, session.id)?;
        session.access_expires_at = expiry(now, self.tokens.access_ttl());

        self.sessions.rotate(&session, refresh_token).await?;

        debug!(session_id = %session.id, "session refreshed");

        Ok(session)
    }

    /// Check an access token against its live session.
    ///
    /// Always returns a result value; failures are reported in `error`.
    #[instrument(skip_all)]
    pub async fn validate_token(&self, access_token: &str) -> TokenValidation {
        self.check(TokenKind::Access, access_token).await
    }

    /// Check a refresh token against its live session without rotating it.
    ///
    /// Lets a caller whose access token has expired prove the session before
    /// [`Self::refresh_token`] swaps the pair.
    #[instrument(skip_all)]
    pub async fn validate_refresh_token(&self, refresh_token: &str) -> TokenValidation {
        self.check(TokenKind::Refresh, refresh_token).await
    }

    async fn check(&self, kind: TokenKind, token: &str) -> TokenValidation {
        let claims = match self.tokens.parse(token) {
            Ok(claims) => claims,
            Err(e) => return TokenValidation::invalid(e),
        };

        let session = match self.sessions.get_by_id(claims.session_id).await {
            Ok(session) => session,
            Err(e) => {
                if e.is_infra() {
                    error!("Failed to load session: {}", e);
                }
                return TokenValidation::invalid(e);
            }
        };

        let now = Utc::now();
        let (stored, expired, mismatch) = match kind {
            TokenKind::Access => (
                &session.access_token,
                session.access_expired(now),
                AuthError::InvalidAccessToken,
            ),
            TokenKind::Refresh => (
                &session.refresh_token,
                session.refresh_expired(now),
                AuthError::InvalidRefreshToken,
            ),
        };

        if !tokens_match(stored, token) {
            return TokenValidation::invalid(mismatch);
        }

        if expired {
            return TokenValidation::invalid(AuthError::TokenExpired);
        }

        TokenValidation::valid(session.user_id, session.id)
    }

    /// Revoke a session. A second logout for the same id fails with `SessionExpired`.
    ///
    /// # Errors
    /// `SessionExpired` when the session no longer exists.
    #[instrument(skip(self))]
    pub async fn logout(&self, session_id: Uuid) -> Result<(), AuthError> {
        self.sessions.revoke(session_id).await?;

        debug!("session revoked");

        Ok(())
    }
}

impl std::fmt::Debug for SessionLifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycleEngine")
            .field("tokens", &self.tokens)
            .field("session_ttl", &self.session_ttl)
            .finish_non_exhaustive()
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl).map_or(DateTime::<Utc>::MAX_UTC, |ttl| {
        now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    })
}

fn tokens_match(stored: &str, presented: &str) -> bool {
    bool::from(stored.as_bytes().ct_eq(presented.as_bytes()))
}

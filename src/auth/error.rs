//! Domain errors for the session lifecycle.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the lifecycle engine and the stores behind it.
///
/// Infrastructure failures keep their source and the failing operation so they
/// can be logged with context; they are never folded into a domain variant.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("session not found")]
    SessionNotFound,

    #[error("session already exists")]
    SessionAlreadyExists,

    #[error("session expired or revoked")]
    SessionExpired,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid password")]
    InvalidPassword,

    #[error("invalid access token")]
    InvalidAccessToken,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("token expired")]
    TokenExpired,

    #[error("token malformed")]
    TokenMalformed,

    #[error("invalid token")]
    TokenInvalidFormat,

    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid hashed password length: {0}")]
    InvalidHashLength(usize),

    #[error("hashing error: {0}")]
    Hash(String),

    #[error("failed to generate token")]
    Token(#[source] jsonwebtoken::errors::Error),

    #[error("{op}: {source}")]
    Infra {
        op: &'static str,
        #[source]
        source: BoxError,
    },
}

impl AuthError {
    /// Wrap an infrastructure failure with the name of the operation that hit it.
    pub fn infra(op: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Infra {
            op,
            source: source.into(),
        }
    }

    /// True for failures of the backing stores rather than of the caller's input.
    #[must_use]
    pub const fn is_infra(&self) -> bool {
        matches!(self, Self::Infra { .. })
    }
}

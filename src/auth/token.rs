//! Signed bearer tokens (HS256 JWT) for access and refresh credentials.

use chrono::Utc;
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::error::AuthError;

pub const MIN_SECRET_LEN: usize = 32;

/// Configuration errors detected when building a [`TokenCodec`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenConfigError {
    #[error("expiration must be positive")]
    NonPositiveTtl,

    #[error("access expiration must be less than refresh")]
    AccessNotShorterThanRefresh,

    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    SecretTooShort(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Wire claims. Field names are part of the token format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct WireClaims {
    uid: String,
    sid: String,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Verified token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// Build a codec, enforcing `0 < access_ttl < refresh_ttl`.
    ///
    /// # Errors
    /// Returns a [`TokenConfigError`] when the TTLs or the secret are unusable.
    pub fn new(
        secret: &SecretString,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, TokenConfigError> {
        if access_ttl.is_zero() || refresh_ttl.is_zero() {
            return Err(TokenConfigError::NonPositiveTtl);
        }
        if access_ttl >= refresh_ttl {
            return Err(TokenConfigError::AccessNotShorterThanRefresh);
        }
        let secret = secret.expose_secret().as_bytes();
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenConfigError::SecretTooShort(secret.len()));
        }

        // Any HMAC algorithm is accepted on parse; other families are rejected.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            refresh_ttl,
        })
    }

    #[must_use]
    pub const fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub const fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    #[must_use]
    pub const fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a new token of the given kind for a user and session.
    ///
    /// # Errors
    /// Returns `AuthError::Token` if signing fails.
    pub fn issue(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = WireClaims {
            uid: user_id.to_string(),
            sid: session_id.to_string(),
            iat: now,
            exp: now + ttl_secs(self.ttl(kind)),
            jti: Uuid::new_v4().to_string(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::Token)
    }

    /// Verify signature, algorithm family and expiry, and return the claims.
    ///
    /// # Errors
    /// `TokenExpired` after `exp`, `TokenInvalidFormat` for a non-HMAC algorithm,
    /// `TokenMalformed` for anything else that does not verify.
    pub fn parse(&self, token: &str) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::decode::<WireClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidAlgorithm => AuthError::TokenInvalidFormat,
                _ => AuthError::TokenMalformed,
            })?;

        let claims = data.claims;
        let user_id = Uuid::parse_str(&claims.uid).map_err(|_| AuthError::TokenMalformed)?;
        let session_id = Uuid::parse_str(&claims.sid).map_err(|_| AuthError::TokenMalformed)?;

        Ok(Claims {
            user_id,
            session_id,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"***")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

pub(crate) fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn codec(access: u64, refresh: u64) -> TokenCodec {
        TokenCodec::new(
            &SecretString::from(SECRET),
            Duration::from_secs(access),
            Duration::from_secs(refresh),
        )
        .unwrap()
    }

    #[test]
    fn round_trip_recovers_ids() {
        let codec = codec(60, 120);
        let user_id = Uuid::now_v7();
        let session_id = Uuid::now_v7();

        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let token = codec.issue(kind, user_id, session_id).unwrap();
            let claims = codec.parse(&token).unwrap();
            assert_eq!(claims.user_id, user_id);
            assert_eq!(claims.session_id, session_id);
            assert_eq!(
                claims.expires_at - claims.issued_at,
                ttl_secs(codec.ttl(kind))
            );
        }
    }

    #[test]
    fn tokens_minted_together_differ() {
        let codec = codec(60, 120);
        let (user_id, session_id) = (Uuid::now_v7(), Uuid::now_v7());
        let first = codec.issue(TokenKind::Access, user_id, session_id).unwrap();
        let second = codec.issue(TokenKind::Access, user_id, session_id).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn rejects_bad_ttls() {
        let secret = SecretString::from(SECRET);
        let err = TokenCodec::new(&secret, Duration::ZERO, Duration::from_secs(10));
        assert_eq!(err.err(), Some(TokenConfigError::NonPositiveTtl));

        let err = TokenCodec::new(&secret, Duration::from_secs(10), Duration::from_secs(10));
        assert_eq!(
            err.err(),
            Some(TokenConfigError::AccessNotShorterThanRefresh)
        );

        let err = TokenCodec::new(&secret, Duration::from_secs(20), Duration::from_secs(10));
        assert_eq!(
            err.err(),
            Some(TokenConfigError::AccessNotShorterThanRefresh)
        );
    }

    #[test]
    fn rejects_short_secret() {
        let err = TokenCodec::new(
            &SecretString::from("short"),
            Duration::from_secs(1),
            Duration::from_secs(2),
        );
        assert_eq!(err.err(), Some(TokenConfigError::SecretTooShort(5)));
    }

    #[test]
    fn other_secret_is_malformed() {
        let token = codec(60, 120)
            .issue(TokenKind::Access, Uuid::now_v7(), Uuid::now_v7())
            .unwrap();
        let other = TokenCodec::new(
            &SecretString::from("fedcba9876543210fedcba9876543210"),
            Duration::from_secs(60),
            Duration::from_secs(120),
        )
        .unwrap();
        assert!(matches!(other.parse(&token), Err(AuthError::TokenMalformed)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            codec(60, 120).parse("not.a.token"),
            Err(AuthError::TokenMalformed)
        ));
        assert!(matches!(
            codec(60, 120).parse(""),
            Err(AuthError::TokenMalformed)
        ));
    }

    #[test]
    fn expired_token_is_reported() {
        let codec = codec(60, 120);
        let past = Utc::now().timestamp() - 10;
        let claims = WireClaims {
            uid: Uuid::now_v7().to_string(),
            sid: Uuid::now_v7().to_string(),
            iat: past - 60,
            exp: past,
            jti: Uuid::new_v4().to_string(),
        };
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &codec.encoding).unwrap();
        assert!(matches!(codec.parse(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn hs512_is_accepted() {
        let codec = codec(60, 120);
        let now = Utc::now().timestamp();
        let claims = WireClaims {
            uid: Uuid::now_v7().to_string(),
            sid: Uuid::now_v7().to_string(),
            iat: now,
            exp: now + 60,
            jti: Uuid::new_v4().to_string(),
        };
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS512), &claims, &codec.encoding).unwrap();
        assert!(codec.parse(&token).is_ok());
    }

    #[test]
    fn non_hmac_algorithm_is_invalid_format() {
        // header {"alg":"RS256","typ":"JWT"} over an otherwise valid payload
        let codec = codec(60, 120);
        let token = codec
            .issue(TokenKind::Access, Uuid::now_v7(), Uuid::now_v7())
            .unwrap();
        let mut parts = token.splitn(2, '.');
        let _ = parts.next();
        let rest = parts.next().unwrap();
        let forged = format!("eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.{rest}");
        assert!(matches!(
            codec.parse(&forged),
            Err(AuthError::TokenInvalidFormat)
        ));
    }
}

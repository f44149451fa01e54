//! Session records and the storage contract behind them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::AuthError;

/// One authenticated login.
///
/// `access_token` and `refresh_token` always hold the latest issued pair; any
/// presented token must equal the stored one to be live.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub access_token: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub ip_address: String,
}

impl Session {
    #[must_use]
    pub fn access_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.access_expires_at
    }

    #[must_use]
    pub fn refresh_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .field("created_at", &self.created_at)
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("user_agent", &self.user_agent)
            .field("ip_address", &self.ip_address)
            .finish()
    }
}

/// Where a login came from. Both fields are optional and stored as empty strings when absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl ClientInfo {
    #[must_use]
    pub fn new(user_agent: Option<String>, ip_address: Option<String>) -> Self {
        Self {
            user_agent,
            ip_address,
        }
    }
}

/// Keyed storage of session records with an absolute per-record TTL.
///
/// Implementations surface backend failures as `AuthError::Infra`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create-if-absent in one conditional write; the record expires after `ttl`.
    async fn create(&self, session: &Session, ttl: std::time::Duration) -> Result<(), AuthError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Session, AuthError>;

    /// Overwrite all fields of a live record without touching its TTL.
    async fn update(&self, session: &Session) -> Result<(), AuthError>;

    /// Overwrite a live record only if its stored refresh token still equals
    /// `expected_refresh_token`. The TTL is left as is.
    async fn rotate(&self, session: &Session, expected_refresh_token: &str)
        -> Result<(), AuthError>;

    async fn revoke(&self, id: Uuid) -> Result<(), AuthError>;

    async fn exists(&self, id: Uuid) -> Result<bool, AuthError>;

    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn debug_masks_tokens() {
        let now = Utc::now();
        let session = Session {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            access_expires_at: now,
            refresh_expires_at: now,
            created_at: now,
            access_token: "access-secret".to_string(),
            refresh_token: "refresh-secret".to_string(),
            user_agent: "curl/8".to_string(),
            ip_address: String::new(),
        };
        let out = format!("{session:?}");
        assert!(!out.contains("access-secret"));
        assert!(!out.contains("refresh-secret"));
        assert!(out.contains("curl/8"));
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let session = Session {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            access_expires_at: now,
            refresh_expires_at: now + Duration::seconds(10),
            created_at: now,
            access_token: String::new(),
            refresh_token: String::new(),
            user_agent: String::new(),
            ip_address: String::new(),
        };
        assert!(session.access_expired(now));
        assert!(!session.refresh_expired(now));
        assert!(session.refresh_expired(now + Duration::seconds(10)));
    }
}

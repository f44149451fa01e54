//! Postgres-backed stores.
//!
//! Sessions emulate a key-value store with per-key expiry through the
//! `record_expires_at` column: every read and write ignores rows past it, and
//! [`spawn_sweeper`] deletes them in the background.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, Instrument};
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    identity::{Identity, IdentityRepository},
    session::{Session, SessionStore},
};

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const SESSION_COLUMNS: &str = "id, user_id, access_token, refresh_token, user_agent, ip_address, created_at, expires_at, refresh_expires_at";

/// Apply `sql/schema.sql` one statement at a time.
///
/// # Errors
/// Returns the first failing statement's error.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in statements(SCHEMA) {
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

fn statements(script: &str) -> Vec<String> {
    let without_comments = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::infra("postgres.sessions.decode", format!("bad timestamp {secs}")))
}

fn session_from_row(row: &PgRow) -> Result<Session, AuthError> {
    let decode = |e: sqlx::Error| AuthError::infra("postgres.sessions.decode", e);
    Ok(Session {
        id: row.try_get("id").map_err(decode)?,
        user_id: row.try_get("user_id").map_err(decode)?,
        access_token: row.try_get("access_token").map_err(decode)?,
        refresh_token: row.try_get("refresh_token").map_err(decode)?,
        user_agent: row.try_get("user_agent").map_err(decode)?,
        ip_address: row.try_get("ip_address").map_err(decode)?,
        created_at: from_epoch(row.try_get("created_at").map_err(decode)?)?,
        access_expires_at: from_epoch(row.try_get("expires_at").map_err(decode)?)?,
        refresh_expires_at: from_epoch(row.try_get("refresh_expires_at").map_err(decode)?)?,
    })
}

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete rows past their record TTL, returning how many were removed.
    ///
    /// # Errors
    /// Returns an infrastructure error if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE record_expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::infra("postgres.sessions.purge", e))?;
        Ok(result.rows_affected())
    }
}

/// Purge expired session rows every `every` until the task is aborted.
pub fn spawn_sweeper(store: PgSessionStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let span = info_span!("db.sweep", db.system = "postgresql", db.operation = "DELETE");
            match store.purge_expired().instrument(span).await {
                Ok(0) => {}
                Ok(n) => debug!("Purged {} expired sessions", n),
                Err(e) => error!("Failed to purge expired sessions: {}", e),
            }
        }
    })
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &Session, ttl: Duration) -> Result<(), AuthError> {
        // A row whose record TTL elapsed is still physically present until swept;
        // it counts as absent and is overwritten.
        let result = sqlx::query(
            r"
            INSERT INTO sessions
            (id, user_id, access_token, refresh_token, user_agent, ip_address,
             created_at, expires_at, refresh_expires_at, record_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW() + make_interval(secs => $10))
            ON CONFLICT (id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                user_agent = EXCLUDED.user_agent,
                ip_address = EXCLUDED.ip_address,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at,
                refresh_expires_at = EXCLUDED.refresh_expires_at,
                record_expires_at = EXCLUDED.record_expires_at
            WHERE sessions.record_expires_at <= NOW()
            ",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.created_at.timestamp())
        .bind(session.access_expires_at.timestamp())
        .bind(session.refresh_expires_at.timestamp())
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::infra("postgres.sessions.create", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::SessionAlreadyExists);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Session, AuthError> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 AND record_expires_at > NOW()"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::infra("postgres.sessions.get", e))?
            .ok_or(AuthError::SessionNotFound)?;

        session_from_row(&row)
    }

    async fn update(&self, session: &Session) -> Result<(), AuthError> {
        let result = sqlx::query(
            r"
            UPDATE sessions SET
                user_id = $2,
                access_token = $3,
                refresh_token = $4,
                user_agent = $5,
                ip_address = $6,
                created_at = $7,
                expires_at = $8,
                refresh_expires_at = $9
            WHERE id = $1 AND record_expires_at > NOW()
            ",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.created_at.timestamp())
        .bind(session.access_expires_at.timestamp())
        .bind(session.refresh_expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::infra("postgres.sessions.update", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::SessionExpired);
        }
        Ok(())
    }

    async fn rotate(
        &self,
        session: &Session,
        expected_refresh_token: &str,
    ) -> Result<(), AuthError> {
        let result = sqlx::query(
            r"
            UPDATE sessions SET
                access_token = $2,
                refresh_token = $3,
                expires_at = $4
            WHERE id = $1 AND refresh_token = $5 AND record_expires_at > NOW()
            ",
        )
        .bind(session.id)
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(session.access_expires_at.timestamp())
        .bind(expected_refresh_token)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::infra("postgres.sessions.rotate", e))?;

        if result.rows_affected() == 0 {
            return if self.exists(session.id).await? {
                Err(AuthError::InvalidRefreshToken)
            } else {
                Err(AuthError::SessionExpired)
            };
        }
        Ok(())
    }

    async fn revoke(&self, id: Uuid) -> Result<(), AuthError> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE id = $1 AND record_expires_at > NOW()")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| AuthError::infra("postgres.sessions.revoke", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::SessionExpired);
        }
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> Result<bool, AuthError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = $1 AND record_expires_at > NOW())",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuthError::infra("postgres.sessions.exists", e))
    }

    async fn ping(&self) -> Result<(), AuthError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| AuthError::infra("postgres.ping", e))
    }
}

#[derive(Clone, Debug)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn identity_from_row(row: &PgRow) -> Result<Identity, AuthError> {
    let decode = |e: sqlx::Error| AuthError::infra("postgres.users.decode", e);
    Ok(Identity {
        id: row.try_get("id").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        password_hash: row.try_get("password").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        is_active: row.try_get("is_active").map_err(decode)?,
    })
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn create_user(&self, identity: &Identity) -> Result<(), AuthError> {
        sqlx::query(
            r"
            INSERT INTO users (id, email, password, created_at, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(identity.id)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.created_at)
        .bind(identity.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AuthError::UserAlreadyExists
            }
            e => AuthError::infra("postgres.users.create", e),
        })?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Identity, AuthError> {
        let row = sqlx::query(
            "SELECT id, email, password, created_at, is_active FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::infra("postgres.users.get_by_id", e))?
        .ok_or(AuthError::UserNotFound)?;

        identity_from_row(&row)
    }

    async fn get_by_email(&self, email: &str) -> Result<Identity, AuthError> {
        let row = sqlx::query(
            "SELECT id, email, password, created_at, is_active FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::infra("postgres.users.get_by_email", e))?
        .ok_or(AuthError::UserNotFound)?;

        identity_from_row(&row)
    }

    async fn update_password(&self, id: Uuid, password_hash: &[u8]) -> Result<(), AuthError> {
        let result = sqlx::query("UPDATE users SET password = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::infra("postgres.users.update_password", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }
}

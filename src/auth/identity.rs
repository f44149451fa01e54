//! User identity records, the repository contract, and the user service on top of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{error::AuthError, password::PasswordHasher};

#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Identity {
    /// New active identity with a time-ordered id.
    #[must_use]
    pub fn new(email: impl Into<String>, password_hash: Vec<u8>) -> Self {
        Self {
            id: Uuid::now_v7(),
            email: email.into(),
            password_hash,
            created_at: Utc::now(),
            is_active: true,
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

/// Storage of identity records. Emails are unique and compared as stored.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn create_user(&self, identity: &Identity) -> Result<(), AuthError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Identity, AuthError>;

    async fn get_by_email(&self, email: &str) -> Result<Identity, AuthError>;

    async fn update_password(&self, id: Uuid, password_hash: &[u8]) -> Result<(), AuthError>;
}

/// Identity operations that need password hashing.
///
/// Argon2 runs on the blocking pool so a hash never stalls the runtime.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn IdentityRepository>,
    hasher: PasswordHasher,
}

impl UserService {
    #[must_use]
    pub fn new(repo: Arc<dyn IdentityRepository>, hasher: PasswordHasher) -> Self {
        Self { repo, hasher }
    }

    async fn hash(&self, password: &str) -> Result<Vec<u8>, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))?
    }

    /// Check `password` against the identity's stored hash.
    ///
    /// # Errors
    /// `InvalidHashLength` for corrupt stored hashes, `Hash` if the worker fails.
    pub async fn verify(&self, identity: &Identity, password: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored = identity.password_hash.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))?
    }

    /// # Errors
    /// `UserAlreadyExists` when the email is taken.
    #[instrument(skip(self, password))]
    pub async fn create_user(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let password_hash = self.hash(password).await?;
        let identity = Identity::new(email, password_hash);
        self.repo.create_user(&identity).await?;

        debug!(user_id = %identity.id, "user created");

        Ok(identity)
    }

    /// # Errors
    /// `UserNotFound` when no identity has this id.
    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Identity, AuthError> {
        self.repo.get_by_id(id).await
    }

    /// # Errors
    /// `UserNotFound` when no identity has this email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Identity, AuthError> {
        self.repo.get_by_email(email).await
    }

    /// Replace the password after checking the current one.
    ///
    /// # Errors
    /// `UserNotFound`, or `InvalidPassword` when `old_password` does not match.
    #[instrument(skip(self, old_password, new_password))]
    pub async fn update_user_password(
        &self,
        id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let identity = self.repo.get_by_id(id).await?;
        if !self.verify(&identity, old_password).await? {
            return Err(AuthError::InvalidPassword);
        }

        let password_hash = self.hash(new_password).await?;
        self.repo.update_password(id, &password_hash).await
    }
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService")
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryIdentityRepository;

    fn service() -> UserService {
        UserService::new(
            Arc::new(MemoryIdentityRepository::default()),
            PasswordHasher::with_params(1024, 1, 1).unwrap(),
        )
    }

    #[tokio::test]
    async fn create_then_lookup() {
        let users = service();
        let created = users.create_user("a@b.com", "Str0ng!Pass").await.unwrap();

        let by_id = users.get_user_by_id(created.id).await.unwrap();
        let by_email = users.get_user_by_email("a@b.com").await.unwrap();
        assert_eq!(by_id.id, created.id);
        assert_eq!(by_email.id, created.id);
        assert!(by_id.is_active);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let users = service();
        users.create_user("a@b.com", "Str0ng!Pass").await.unwrap();
        let err = users.create_user("a@b.com", "Other0!Pass").await.unwrap_err();
        assert!(matches!(err, AuthError::UserAlreadyExists));
    }

    #[tokio::test]
    async fn email_lookup_is_case_sensitive() {
        let users = service();
        users.create_user("a@b.com", "Str0ng!Pass").await.unwrap();
        let err = users.get_user_by_email("A@B.com").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn password_update_requires_old_password() {
        let users = service();
        let user = users.create_user("a@b.com", "Str0ng!Pass").await.unwrap();

        let err = users
            .update_user_password(user.id, "wrong", "N3w!Password")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidPassword));

        users
            .update_user_password(user.id, "Str0ng!Pass", "N3w!Password")
            .await
            .unwrap();
        let stored = users.get_user_by_id(user.id).await.unwrap();
        assert!(users.verify(&stored, "N3w!Password").await.unwrap());
        assert!(!users.verify(&stored, "Str0ng!Pass").await.unwrap());
    }

    #[tokio::test]
    async fn password_update_for_missing_user() {
        let err = service()
            .update_user_password(Uuid::now_v7(), "a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }
}

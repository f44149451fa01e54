//! In-process stores for tests and local development.
//!
//! Sessions carry a deadline that emulates a key-value store's per-key TTL:
//! an expired entry behaves exactly like an absent one.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    identity::{Identity, IdentityRepository},
    session::{Session, SessionStore},
};

#[derive(Debug)]
struct Entry {
    session: Session,
    deadline: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        now < self.deadline
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl MemorySessionStore {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Entry>>, AuthError> {
        self.entries
            .lock()
            .map_err(|_| AuthError::infra("memory.sessions.lock", "lock poisoned"))
    }

    /// Number of live records.
    ///
    /// # Errors
    /// Fails only if the lock is poisoned.
    #[cfg(test)]
    pub fn len(&self) -> Result<usize, AuthError> {
        let now = Instant::now();
        Ok(self.lock()?.values().filter(|e| e.live(now)).count())
    }

    /// # Errors
    /// Fails only if the lock is poisoned.
    #[cfg(test)]
    pub fn is_empty(&self) -> Result<bool, AuthError> {
        Ok(self.len()? == 0)
    }
}

/// Live entry for `id`, dropping it first if its deadline passed.
fn live_entry(entries: &mut HashMap<Uuid, Entry>, id: Uuid) -> Option<&mut Entry> {
    let now = Instant::now();
    if entries.get(&id).is_some_and(|e| !e.live(now)) {
        entries.remove(&id);
    }
    entries.get_mut(&id)
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session, ttl: Duration) -> Result<(), AuthError> {
        let mut entries = self.lock()?;
        if live_entry(&mut entries, session.id).is_some() {
            return Err(AuthError::SessionAlreadyExists);
        }
        let deadline = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| AuthError::infra("memory.sessions.create", "ttl out of range"))?;
        entries.insert(
            session.id,
            Entry {
                session: session.clone(),
                deadline,
            },
        );
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Session, AuthError> {
        let mut entries = self.lock()?;
        live_entry(&mut entries, id)
            .map(|e| e.session.clone())
            .ok_or(AuthError::SessionNotFound)
    }

    async fn update(&self, session: &Session) -> Result<(), AuthError> {
        let mut entries = self.lock()?;
        let entry = live_entry(&mut entries, session.id).ok_or(AuthError::SessionExpired)?;
        entry.session = session.clone();
        Ok(())
    }

    async fn rotate(
        &self,
        session: &Session,
        expected_refresh_token: &str,
    ) -> Result<(), AuthError> {
        let mut entries = self.lock()?;
        let entry = live_entry(&mut entries, session.id).ok_or(AuthError::SessionExpired)?;
        let current = entry.session.refresh_token.as_bytes();
        if !bool::from(current.ct_eq(expected_refresh_token.as_bytes())) {
            return Err(AuthError::InvalidRefreshToken);
        }
        entry.session = session.clone();
        Ok(())
    }

    async fn revoke(&self, id: Uuid) -> Result<(), AuthError> {
        let mut entries = self.lock()?;
        live_entry(&mut entries, id).ok_or(AuthError::SessionExpired)?;
        entries.remove(&id);
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> Result<bool, AuthError> {
        let mut entries = self.lock()?;
        Ok(live_entry(&mut entries, id).is_some())
    }

    async fn ping(&self) -> Result<(), AuthError> {
        self.lock().map(|_| ())
    }
}

#[derive(Debug, Default)]
pub struct MemoryIdentityRepository {
    users: Mutex<HashMap<Uuid, Identity>>,
}

impl MemoryIdentityRepository {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Identity>>, AuthError> {
        self.users
            .lock()
            .map_err(|_| AuthError::infra("memory.users.lock", "lock poisoned"))
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityRepository {
    async fn create_user(&self, identity: &Identity) -> Result<(), AuthError> {
        let mut users = self.lock()?;
        if users
            .values()
            .any(|u| u.id == identity.id || u.email == identity.email)
        {
            return Err(AuthError::UserAlreadyExists);
        }
        users.insert(identity.id, identity.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Identity, AuthError> {
        self.lock()?
            .get(&id)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Identity, AuthError> {
        self.lock()?
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn update_password(&self, id: Uuid, password_hash: &[u8]) -> Result<(), AuthError> {
        let mut users = self.lock()?;
        let user = users.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        user.password_hash = password_hash.to_vec();
        Ok(())
    }
}

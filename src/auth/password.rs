//! Password hashing with Argon2id.
//!
//! Stored hashes are the raw concatenation `salt || derived_key`. The cost
//! parameters are not encoded in the hash, so every hasher that verifies a
//! stored value must be built with the parameters that produced it.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

use super::error::AuthError;

pub const SALT_LEN: usize = 32;
pub const KEY_LEN: usize = 32;

const DEFAULT_ITERATIONS: u32 = 1;
const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
const DEFAULT_PARALLELISM: u32 = 4;

#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Hasher with the production cost parameters (t=1, m=64 MiB, p=4).
    ///
    /// # Errors
    /// Returns an error if the parameters are rejected by `argon2`.
    pub fn new() -> Result<Self, AuthError> {
        Self::with_params(DEFAULT_MEMORY_KIB, DEFAULT_ITERATIONS, DEFAULT_PARALLELISM)
    }

    /// Hasher with explicit cost parameters.
    ///
    /// # Errors
    /// Returns an error if the parameters are out of range for Argon2.
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
            .map_err(|e| AuthError::Hash(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN], AuthError> {
        let mut key = [0u8; KEY_LEN];
        self.argon2()
            .hash_password_into(password, salt, &mut key)
            .map_err(|e| AuthError::Hash(e.to_string()))?;
        Ok(key)
    }

    /// Hash a password with a fresh random salt.
    ///
    /// # Errors
    /// Returns `AuthError::Hash` if the OS randomness source fails.
    pub fn hash(&self, password: &str) -> Result<Vec<u8>, AuthError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| AuthError::Hash(e.to_string()))?;

        let key = self.derive(password.as_bytes(), &salt)?;

        let mut stored = Vec::with_capacity(SALT_LEN + KEY_LEN);
        stored.extend_from_slice(&salt);
        stored.extend_from_slice(&key);
        Ok(stored)
    }

    /// Check a password against a stored `salt || key` value.
    ///
    /// The comparison runs in constant time over the derived key.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidHashLength` when the stored value is shorter than the salt.
    pub fn verify(&self, password: &str, stored: &[u8]) -> Result<bool, AuthError> {
        if stored.len() < SALT_LEN {
            return Err(AuthError::InvalidHashLength(stored.len()));
        }
        let (salt, expected) = stored.split_at(SALT_LEN);

        let key = self.derive(password.as_bytes(), salt)?;

        Ok(bool::from(key.as_slice().ct_eq(expected)))
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .finish()
    }
}

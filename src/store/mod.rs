//! Storage backends for sessions and identities.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryIdentityRepository, MemorySessionStore};
pub use postgres::{apply_schema, spawn_sweeper, PgIdentityRepository, PgSessionStore};

//! Credentials, bearer tokens and the session lifecycle built on them.

pub mod engine;
pub mod error;
pub mod identity;
pub mod password;
pub mod session;
pub mod token;

pub use engine::{SessionLifecycleEngine, TokenValidation};
pub use error::AuthError;
pub use identity::{Identity, IdentityRepository, UserService};
pub use password::PasswordHasher;
pub use session::{ClientInfo, Session, SessionStore};
pub use token::{Claims, TokenCodec, TokenConfigError, TokenKind};

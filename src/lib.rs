//! # Tessera (session and token lifecycle service)
//!
//! `tessera` issues, rotates, validates and revokes authentication sessions.
//!
//! ## Sessions and tokens
//!
//! A login opens a session and hands out an access/refresh token pair (HS256 JWT).
//! The session record always holds the latest pair; a token that no longer matches
//! the stored one is dead even before its embedded expiry, so a refresh token can
//! be used exactly once. Refreshing never extends the session's refresh expiry.
//!
//! ## Request pipeline
//!
//! Every RPC passes through metrics, validation, an authentication gate, logging
//! with error translation and panic recovery before reaching the handler.
//! `Register`, `Login` and `Health` are public; everything else needs
//! `authorization: Bearer <access token>`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod pipeline;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

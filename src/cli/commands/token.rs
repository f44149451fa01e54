use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl";
pub const ARG_SESSION_TTL: &str = "session-ttl";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long("jwt-secret")
                .help("HMAC secret used to sign tokens (at least 32 bytes)")
                .env("TESSERA_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long("access-token-ttl")
                .help("Access token TTL in seconds")
                .env("TESSERA_ACCESS_TOKEN_TTL")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long("refresh-token-ttl")
                .help("Refresh token TTL in seconds, must exceed the access token TTL")
                .env("TESSERA_REFRESH_TOKEN_TTL")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long("session-ttl")
                .help("Absolute session record lifetime in seconds")
                .env("TESSERA_SESSION_TTL")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub session_ttl: Duration,
}

impl Options {
    /// # Errors
    /// Returns an error if the signing secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secs = |id: &str| Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(0));

        Ok(Self {
            jwt_secret: matches
                .get_one::<String>(ARG_JWT_SECRET)
                .map(|s| SecretString::from(s.as_str()))
                .context("missing required argument: --jwt-secret")?,
            access_token_ttl: secs(ARG_ACCESS_TOKEN_TTL),
            refresh_token_ttl: secs(ARG_REFRESH_TOKEN_TTL),
            session_ttl: secs(ARG_SESSION_TTL),
        })
    }
}

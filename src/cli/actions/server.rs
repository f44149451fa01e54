use crate::{
    api,
    auth::{PasswordHasher, SessionLifecycleEngine, TokenCodec, UserService},
    cli::telemetry,
    pipeline::Pipeline,
    store::{self, PgIdentityRepository, PgSessionStore},
};
use anyhow::{ensure, Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub max_connections: u32,
    pub auto_migrate: bool,
    pub jwt_secret: SecretString,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub session_ttl: Duration,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Args {
    /// Check the token settings before anything touches the network.
    ///
    /// # Errors
    /// Returns an error for a short secret, a zero TTL, an access TTL that is not
    /// shorter than the refresh TTL, or a session TTL below the refresh TTL.
    pub fn token_codec(&self) -> Result<TokenCodec> {
        let codec = TokenCodec::new(
            &self.jwt_secret,
            self.access_token_ttl,
            self.refresh_token_ttl,
        )
        .context("Invalid token configuration")?;

        ensure!(
            self.session_ttl >= self.refresh_token_ttl,
            "Invalid token configuration: session TTL ({}s) is shorter than the refresh token TTL ({}s)",
            self.session_ttl.as_secs(),
            self.refresh_token_ttl.as_secs()
        );

        Ok(codec)
    }
}

/// Wire the stores, engine and pipeline together and serve until shutdown.
///
/// # Errors
/// Returns an error on invalid configuration, database failure or server failure.
pub async fn execute(args: Args) -> Result<()> {
    let tokens = args.token_codec()?;

    debug!("Server args: {:?}", args);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(args.max_connections)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    if args.auto_migrate {
        store::apply_schema(&pool)
            .await
            .context("Failed to apply database schema")?;
        info!("Database schema applied");
    }

    let sessions = PgSessionStore::new(pool.clone());
    let sweeper = store::spawn_sweeper(sessions.clone(), SWEEP_INTERVAL);

    let users = UserService::new(
        Arc::new(PgIdentityRepository::new(pool.clone())),
        PasswordHasher::new()?,
    );

    let engine = Arc::new(SessionLifecycleEngine::new(
        Arc::new(sessions),
        users,
        tokens,
        args.session_ttl,
    ));

    let pipeline = Arc::new(
        Pipeline::standard(engine, args.request_timeout)
            .context("Failed to build request pipeline")?,
    );

    let metrics = api::setup_metrics()?;

    let result = api::new(args.port, pipeline, Some(metrics), args.shutdown_timeout).await;

    sweeper.abort();
    pool.close().await;
    telemetry::shutdown_tracer();

    result
}

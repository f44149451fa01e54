use crate::pipeline::{metrics as rpc_metrics, Method, Pipeline};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal, sync::Notify};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Install the Prometheus recorder with the RPC latency buckets.
///
/// # Errors
/// Fails if a recorder is already installed.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(rpc_metrics::REQUEST_DURATION_SECONDS.to_string()),
            rpc_metrics::DURATION_BUCKETS,
        )?
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    rpc_metrics::describe();

    Ok(handle)
}

/// Routes for every RPC plus health, docs and (when given) metrics.
#[must_use]
pub fn router(pipeline: Arc<Pipeline>, metrics: Option<PrometheusHandle>) -> Router {
    let mut app = Router::new()
        .route(Method::Register.path(), post(handlers::register))
        .route(Method::Login.path(), post(handlers::login))
        .route(Method::Logout.path(), post(handlers::logout))
        .route(Method::RefreshToken.path(), post(handlers::refresh_token))
        .route(Method::ValidateToken.path(), post(handlers::validate_token))
        .route(Method::Health.path(), post(handlers::health_rpc))
        .route(Method::CreateUser.path(), post(handlers::create_user))
        .route(Method::GetUserById.path(), post(handlers::get_user_by_id))
        .route(Method::GetUserByEmail.path(), post(handlers::get_user_by_email))
        .route(
            Method::UpdateUserPassword.path(),
            post(handlers::update_user_password),
        )
        .route("/health", get(handlers::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()));

    if let Some(handle) = metrics {
        app = app.route(
            "/metrics",
            get(handlers::metrics).layer(Extension(handle)),
        );
    }

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(pipeline)),
    )
}

/// Serve until SIGINT/SIGTERM, then give in-flight calls `grace` to finish.
///
/// # Errors
/// Returns an error if binding or serving fails.
pub async fn new(
    port: u16,
    pipeline: Arc<Pipeline>,
    metrics: Option<PrometheusHandle>,
    grace: Duration,
) -> Result<()> {
    let app = router(pipeline, metrics);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    serve(listener, app, shutdown_signal(), grace).await
}

/// Serve `app` until `shutdown` resolves, then wait at most `grace` before aborting.
///
/// # Errors
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    grace: Duration,
) -> Result<()> {
    let stop = Arc::new(Notify::new());

    let mut server = tokio::spawn({
        let stop = stop.clone();
        async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { stop.notified().await })
            .await
        }
    });

    tokio::select! {
        result = &mut server => {
            result.context("Server task failed")??;
            return Ok(());
        }
        () = shutdown => {}
    }

    info!("Gracefully shutdown, grace period {:?}", grace);
    stop.notify_one();

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result.context("Server task failed")??,
        Err(_) => {
            warn!("Grace period elapsed, aborting in-flight requests");
            server.abort();
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

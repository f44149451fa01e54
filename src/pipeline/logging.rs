//! Per-call logging, trace correlation and domain-to-wire error translation.

use async_trait::async_trait;
use opentelemetry::trace::TraceContextExt;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tonic::{Code, Status};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use ulid::Ulid;

use super::{Call, CallResult, Fault, Interceptor, Next};
use crate::auth::error::AuthError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MASK: &str = "***";

/// Wire status for a domain error. The message is the error's display text.
#[must_use]
pub fn to_status(err: &AuthError) -> Status {
    let code = match err {
        AuthError::UserNotFound | AuthError::SessionNotFound => Code::NotFound,
        AuthError::UserAlreadyExists | AuthError::SessionAlreadyExists => Code::AlreadyExists,
        AuthError::SessionExpired
        | AuthError::InvalidCredentials
        | AuthError::InvalidPassword
        | AuthError::InvalidAccessToken
        | AuthError::InvalidRefreshToken
        | AuthError::TokenExpired
        | AuthError::TokenMalformed
        | AuthError::TokenInvalidFormat => Code::Unauthenticated,
        AuthError::PermissionDenied => Code::PermissionDenied,
        AuthError::InvalidHashLength(_)
        | AuthError::Hash(_)
        | AuthError::Token(_)
        | AuthError::Infra { .. } => Code::Internal,
    };
    Status::new(code, err.to_string())
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("password") || key.contains("token")
}

/// Mask every string under a key that names a password or token.
pub fn scrub(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if is_secret_key(key) && !field.is_null() {
                    *field = Value::String(MASK.to_string());
                } else {
                    scrub(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(scrub),
        _ => {}
    }
}

/// JSON rendering of a message with secrets masked.
#[must_use]
pub fn scrubbed<T: Serialize>(message: &T) -> String {
    serde_json::to_value(message).map_or_else(
        |_| MASK.to_string(),
        |mut value| {
            scrub(&mut value);
            value.to_string()
        },
    )
}

/// Trace id of the active OpenTelemetry span, else the request id header, else a new ULID.
fn trace_id(call: &Call) -> String {
    let context = Span::current().context();
    let span = context.span();
    let span_context = span.span_context();
    if span_context.is_valid() {
        return span_context.trace_id().to_string();
    }

    call.metadata
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Ulid::new().to_string(), str::to_string)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Logging;

#[async_trait]
impl Interceptor for Logging {
    async fn intercept(&self, mut call: Call, next: Next<'_>) -> CallResult {
        let method = call.method();
        let trace_id = trace_id(&call);
        call.context.trace_id = Some(trace_id.clone());

        let span = info_span!("rpc", rpc.method = %method, trace_id = %trace_id);

        async move {
            debug!(request = %scrubbed(&call.payload), "request started");
            let start = Instant::now();

            let result = next.run(call).await;
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(reply) => {
                    debug!(response = %scrubbed(&reply), "response");
                    info!(duration_ms, code = "Ok", "request finished");
                    Ok(reply)
                }
                Err(Fault::Domain(err)) => {
                    let status = to_status(&err);
                    if status.code() == Code::Internal {
                        error!(duration_ms, error = ?err, "request failed: {}", err);
                    } else {
                        warn!(duration_ms, code = ?status.code(), "request failed: {}", err);
                    }
                    Err(Fault::Status(status))
                }
                Err(Fault::Status(status)) => {
                    warn!(
                        duration_ms,
                        code = ?status.code(),
                        "request failed: {}",
                        status.message()
                    );
                    Err(Fault::Status(status))
                }
            }
        }
        .instrument(span)
        .await
    }
}

//! Request metrics: in-flight gauge, totals, latency and error counters.

use async_trait::async_trait;
use metrics::{counter, gauge, histogram};
use std::time::Instant;
use tonic::Code;

use super::{Call, CallResult, Interceptor, Method, Next};

pub const REQUESTS_IN_FLIGHT: &str = "grpc_requests_in_flight";
pub const REQUESTS_TOTAL: &str = "grpc_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "grpc_request_duration_seconds";
pub const REQUEST_ERRORS_TOTAL: &str = "grpc_request_errors_total";

pub const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    metrics::describe_gauge!(REQUESTS_IN_FLIGHT, "Number of RPCs currently being served");
    metrics::describe_counter!(REQUESTS_TOTAL, "Total number of RPCs by method and status");
    metrics::describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "RPC latency in seconds"
    );
    metrics::describe_counter!(REQUEST_ERRORS_TOTAL, "Total number of failed RPCs by error type");
}

/// Status code label, e.g. `Ok`, `InvalidArgument`.
#[must_use]
pub fn code_label(code: Code) -> String {
    format!("{code:?}")
}

/// Decrements the in-flight gauge when dropped, including on unwind.
struct InFlight {
    method: Method,
}

impl InFlight {
    fn enter(method: Method) -> Self {
        gauge!(REQUESTS_IN_FLIGHT, "service" => method.service(), "method" => method.name())
            .increment(1.0);
        Self { method }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(
            REQUESTS_IN_FLIGHT,
            "service" => self.method.service(),
            "method" => self.method.name()
        )
        .decrement(1.0);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Metrics;

#[async_trait]
impl Interceptor for Metrics {
    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let method = call.method();
        let _in_flight = InFlight::enter(method);
        let start = Instant::now();

        let result = next.run(call).await;

        let code = match &result {
            Ok(_) => Code::Ok,
            Err(fault) => fault.code(),
        };
        let status_code = code_label(code);
        let path = method.path();

        counter!(REQUESTS_TOTAL, "method" => path, "status_code" => status_code.clone())
            .increment(1);
        histogram!(REQUEST_DURATION_SECONDS, "method" => path, "status_code" => status_code.clone())
            .record(start.elapsed().as_secs_f64());
        if code != Code::Ok {
            counter!(REQUEST_ERRORS_TOTAL, "method" => path, "error_type" => status_code)
                .increment(1);
        }

        result
    }
}

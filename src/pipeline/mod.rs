//! Request pipeline: an ordered chain of interceptors around the RPC handler.
//!
//! Order, outermost first: metrics, validation, authentication, logging with
//! error translation, panic recovery, then the handler.

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tonic::{Code, Status};
use uuid::Uuid;

use crate::auth::{error::AuthError, SessionLifecycleEngine};

pub mod authn;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod recovery;
pub mod rpc;
pub mod validation;

pub use rpc::{Method, Payload, Reply};

/// Identity attached by the authentication stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

#[derive(Clone, Debug, Default)]
pub struct CallContext {
    pub trace_id: Option<String>,
    pub auth: Option<AuthContext>,
}

/// One inbound call as seen by interceptors.
#[derive(Clone, Debug)]
pub struct Call {
    pub payload: Payload,
    pub metadata: HeaderMap,
    pub peer: Option<SocketAddr>,
    pub context: CallContext,
}

impl Call {
    #[must_use]
    pub fn new(payload: Payload, metadata: HeaderMap) -> Self {
        Self {
            payload,
            metadata,
            peer: None,
            context: CallContext::default(),
        }
    }

    #[must_use]
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    #[must_use]
    pub const fn method(&self) -> Method {
        self.payload.method()
    }
}

/// Failure travelling back up the chain. Domain errors stay typed until the
/// logging stage translates them.
#[derive(Debug)]
pub enum Fault {
    Status(Status),
    Domain(AuthError),
}

impl Fault {
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            Self::Status(status) => status.code(),
            Self::Domain(err) => logging::to_status(err).code(),
        }
    }

    #[must_use]
    pub fn into_status(self) -> Status {
        match self {
            Self::Status(status) => status,
            Self::Domain(err) => logging::to_status(&err),
        }
    }
}

impl From<Status> for Fault {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

impl From<AuthError> for Fault {
    fn from(err: AuthError) -> Self {
        Self::Domain(err)
    }
}

pub type CallResult = Result<Reply, Fault>;

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult;
}

/// Terminal stage of the chain.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, call: Call) -> CallResult;
}

/// The remainder of the chain after the current interceptor.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    handler: &'a dyn Handler,
}

impl Next<'_> {
    pub async fn run(self, call: Call) -> CallResult {
        match self.interceptors.split_first() {
            Some((first, rest)) => {
                first
                    .intercept(
                        call,
                        Next {
                            interceptors: rest,
                            handler: self.handler,
                        },
                    )
                    .await
            }
            None => self.handler.handle(call).await,
        }
    }
}

/// Built once at startup and shared with the transport.
pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
    handler: Arc<dyn Handler>,
}

impl Pipeline {
    #[must_use]
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            interceptors: Vec::new(),
            handler,
        }
    }

    /// Append an interceptor inside the ones already added.
    #[must_use]
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// The production chain around the lifecycle engine.
    ///
    /// # Errors
    /// Fails if the validation rules cannot be compiled.
    pub fn standard(
        engine: Arc<SessionLifecycleEngine>,
        request_timeout: Duration,
    ) -> Result<Self, regex::Error> {
        Ok(
            Self::new(Arc::new(dispatch::Dispatcher::new(engine.clone(), request_timeout)))
                .with(metrics::Metrics)
                .with(validation::Validation::new()?)
                .with(authn::AuthGate::new(engine))
                .with(logging::Logging)
                .with(recovery::Recovery::new()),
        )
    }

    /// Run a call through every stage.
    ///
    /// # Errors
    /// Returns the wire status of whichever stage rejected the call.
    pub async fn call(&self, call: Call) -> Result<Reply, Status> {
        Next {
            interceptors: &self.interceptors,
            handler: self.handler.as_ref(),
        }
        .run(call)
        .await
        .map_err(Fault::into_status)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

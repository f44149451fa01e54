//! Panic containment for the handler.
//!
//! A panic hook records the backtrace of the panicking thread; the interceptor
//! catches the unwind on the same thread, logs both and answers `Internal`.

use async_trait::async_trait;
use futures::FutureExt;
use std::{
    any::Any,
    backtrace::Backtrace,
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    sync::Once,
};
use tonic::Status;
use tracing::error;

use super::{Call, CallResult, Interceptor, Next};

pub const INTERNAL_MESSAGE: &str = "internal server error";

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .map_or_else(|| "unavailable".to_string(), |bt| bt.to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[derive(Clone, Copy, Debug)]
pub struct Recovery;

impl Recovery {
    #[must_use]
    pub fn new() -> Self {
        install_hook();
        Self
    }
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interceptor for Recovery {
    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let method = call.method();
        match AssertUnwindSafe(next.run(call)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let backtrace = take_backtrace();
                error!(
                    %method,
                    panic = panic_message(panic.as_ref()),
                    %backtrace,
                    "panic while handling request"
                );
                Err(Status::internal(INTERNAL_MESSAGE).into())
            }
        }
    }
}

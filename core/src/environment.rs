//! Injected dependencies.
//!
//! Time and waiting are abstracted behind traits so lock acquisition and
//! table polling can be driven deterministically in tests.

use crate::handler::{ErrorHandler, TracingErrorHandler};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time.
///
/// [`SystemClock`] in production; tests use `ManualClock` from
/// `composable-session-testing`, advanced by its scheduler.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Suspends the caller between retry attempts.
pub trait Scheduler: Send + Sync {
    /// Wait for `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Scheduler backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Dependencies shared by the locking strategies and the session manager.
#[derive(Clone)]
pub struct SessionEnvironment {
    /// Time source.
    pub clock: Arc<dyn Clock>,

    /// Waits between lock and provisioning retries.
    pub scheduler: Arc<dyn Scheduler>,

    /// Error observer.
    pub errors: Arc<dyn ErrorHandler>,
}

impl SessionEnvironment {
    /// System clock, tokio sleeps, tracing error handler.
    #[must_use]
    pub fn production() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(TokioScheduler),
            errors: Arc::new(TracingErrorHandler),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the scheduler.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Replace the error handler.
    #[must_use]
    pub fn with_error_handler(mut self, errors: Arc<dyn ErrorHandler>) -> Self {
        self.errors = errors;
        self
    }
}

impl Default for SessionEnvironment {
    fn default() -> Self {
        Self::production()
    }
}

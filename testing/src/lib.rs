//! # Composable Session Testing
//!
//! Testing utilities and helpers for composable session persistence.
//!
//! This crate provides:
//! - Mock implementations of the environment traits (clocks, scheduler, error handler)
//! - An in-memory key-value store that records every call
//! - An in-memory table admin for provisioning tests
//! - Fixtures for signers and test logging
//!
//! ## Example
//!
//! ```ignore
//! use composable_session_testing::{InMemoryStore, TestHarness};
//!
//! #[tokio::test]
//! async fn test_session_flow() {
//!     let harness = TestHarness::new();
//!     let store = InMemoryStore::new();
//!     let locking = NullLocking::new(store.clone(), vec![], harness.environment());
//!     // ...
//!     assert_eq!(store.call_count(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use composable_session_core::environment::Clock;

pub mod store_mocks;

/// Mock implementations of environment traits
pub mod mocks {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

    use super::{Clock, DateTime, Utc};
    use composable_session_core::{ErrorHandler, RequestContext, Scheduler, SessionError};
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::sync::{Arc, RwLock};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_session_testing::mocks::FixedClock;
    /// use composable_session_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move time forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap();
            *time += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Scheduler that never waits
    ///
    /// Each sleep advances the paired [`ManualClock`] instead and is recorded,
    /// so backoff schedules can be asserted exactly.
    #[derive(Debug, Clone)]
    pub struct ManualScheduler {
        clock: ManualClock,
        sleeps: Arc<RwLock<Vec<Duration>>>,
    }

    impl ManualScheduler {
        /// Create a scheduler advancing `clock`
        #[must_use]
        pub fn new(clock: ManualClock) -> Self {
            Self {
                clock,
                sleeps: Arc::new(RwLock::new(Vec::new())),
            }
        }

        /// Requested sleeps, in order
        #[must_use]
        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.read().unwrap().clone()
        }

        /// Sum of requested sleeps
        #[must_use]
        pub fn total_slept(&self) -> Duration {
            self.sleeps.read().unwrap().iter().sum()
        }
    }

    impl Scheduler for ManualScheduler {
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            self.sleeps.write().unwrap().push(duration);
            self.clock.advance(duration);
            futures::future::ready(()).boxed()
        }
    }

    /// Error handler that remembers what it saw
    #[derive(Debug, Clone, Default)]
    pub struct RecordingErrorHandler {
        seen: Arc<RwLock<Vec<(SessionError, RequestContext)>>>,
    }

    impl RecordingErrorHandler {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Errors observed so far, in order
        #[must_use]
        pub fn errors(&self) -> Vec<SessionError> {
            self.seen.read().unwrap().iter().map(|(e, _)| e.clone()).collect()
        }

        /// Contexts the errors were observed with
        #[must_use]
        pub fn contexts(&self) -> Vec<RequestContext> {
            self.seen.read().unwrap().iter().map(|(_, c)| c.clone()).collect()
        }

        /// Number of errors observed
        #[must_use]
        pub fn count(&self) -> usize {
            self.seen.read().unwrap().len()
        }
    }

    impl ErrorHandler for RecordingErrorHandler {
        fn handle(&self, error: &SessionError, context: &RequestContext) {
            self.seen.write().unwrap().push((error.clone(), context.clone()));
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// 2025-01-01 00:00:00 UTC
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is hardcoded.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

/// Test helpers and utilities
pub mod helpers {
    use super::mocks::{ManualClock, ManualScheduler, RecordingErrorHandler, test_epoch};
    use composable_session_core::{SessionEnvironment, SessionSigner};
    use std::sync::Arc;

    /// Secret used by [`test_signer`].
    pub const TEST_SECRET: &str = "composable-session-test-secret";

    /// Signer keyed with [`TEST_SECRET`]
    ///
    /// # Panics
    ///
    /// Never in practice; the secret is non-empty.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_signer() -> SessionSigner {
        SessionSigner::new(TEST_SECRET).expect("test secret is non-empty")
    }

    /// Bundle of deterministic environment pieces sharing one clock
    #[derive(Debug, Clone)]
    pub struct TestHarness {
        /// Manual clock (starts at 2025-01-01 00:00:00 UTC)
        pub clock: ManualClock,
        /// Scheduler advancing `clock`
        pub scheduler: ManualScheduler,
        /// Recorder for reported errors
        pub errors: RecordingErrorHandler,
    }

    impl TestHarness {
        /// Fresh harness
        #[must_use]
        pub fn new() -> Self {
            let clock = ManualClock::new(test_epoch());
            Self {
                scheduler: ManualScheduler::new(clock.clone()),
                clock,
                errors: RecordingErrorHandler::new(),
            }
        }

        /// Environment wired to the harness pieces
        #[must_use]
        pub fn environment(&self) -> SessionEnvironment {
            SessionEnvironment::production()
                .with_clock(Arc::new(self.clock.clone()))
                .with_scheduler(Arc::new(self.scheduler.clone()))
                .with_error_handler(Arc::new(self.errors.clone()))
        }
    }

    impl Default for TestHarness {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Install a test-friendly tracing subscriber (idempotent)
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::{TEST_SECRET, TestHarness, init_test_tracing, test_signer};
pub use mocks::{
    FixedClock, ManualClock, ManualScheduler, RecordingErrorHandler, test_clock, test_epoch,
};
pub use store_mocks::{InMemoryStore, InMemoryTableAdmin, StoreCall};

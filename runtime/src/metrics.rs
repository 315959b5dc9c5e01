//! Prometheus metrics for session persistence.
//!
//! Counters recorded by the locking strategies and the session manager:
//! - Store operations issued
//! - Writes that carried (or skipped) the session body
//! - Lock acquisition outcomes
//! - Errors by kind
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_session_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! let text = server.render();
//! # Ok(())
//! # }
//! ```

use composable_session_core::{ErrorHandler, RequestContext, SessionError};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::counter;

/// Store operations issued, labelled by `op`.
pub const STORE_OPERATIONS: &str = "session_store_operations_total";

/// Session writes, labelled by `data` (`written` or `skipped`).
pub const WRITES: &str = "session_writes_total";

/// Lock acquisitions, labelled by `outcome`.
pub const LOCK_ACQUISITIONS: &str = "session_lock_acquisitions_total";

/// Errors observed, labelled by `kind`.
pub const ERRORS: &str = "session_errors_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder for session metrics.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the host application exposes the metrics on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe session metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if the recorder cannot be installed.
    /// An already installed recorder is tolerated with a warning.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Session metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(STORE_OPERATIONS, "Total number of store operations issued");
    describe_counter!(
        WRITES,
        "Total number of session writes, split by whether the body was sent"
    );
    describe_counter!(
        LOCK_ACQUISITIONS,
        "Total number of pessimistic lock acquisition outcomes"
    );
    describe_counter!(ERRORS, "Total number of session errors by kind");
}

pub(crate) fn record_store_operation(op: &'static str) {
    counter!(STORE_OPERATIONS, "op" => op).increment(1);
}

pub(crate) fn record_write(data_written: bool) {
    let data = if data_written { "written" } else { "skipped" };
    counter!(WRITES, "data" => data).increment(1);
}

pub(crate) fn record_lock(outcome: &'static str) {
    counter!(LOCK_ACQUISITIONS, "outcome" => outcome).increment(1);
}

/// Counts errors by kind, then delegates.
pub struct MetricsErrorHandler {
    inner: Arc<dyn ErrorHandler>,
}

impl MetricsErrorHandler {
    /// Wrap another handler.
    #[must_use]
    pub fn new(inner: Arc<dyn ErrorHandler>) -> Self {
        Self { inner }
    }
}

impl ErrorHandler for MetricsErrorHandler {
    fn handle(&self, error: &SessionError, context: &RequestContext) {
        counter!(ERRORS, "kind" => error.kind()).increment(1);
        self.inner.handle(error, context);
    }
}

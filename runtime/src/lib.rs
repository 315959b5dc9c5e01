//! # Composable Session Runtime
//!
//! Locking strategies and the per-request session driver.
//!
//! ## Core Components
//!
//! - **`NullLocking`**: change detection, last writer wins per column
//! - **`PessimisticLocking`**: exclusive lock taken on read, released on write
//! - **`Locking`**: strategy selected from [`SessionConfig`]
//! - **`SessionManager`**: open / save / destroy for one request
//! - **Provisioning**: [`ensure_table`] and [`drop_table`]
//!
//! ## Example
//!
//! ```ignore
//! use composable_session_runtime::{SessionConfig, SessionManager};
//! use composable_session_core::SessionEnvironment;
//!
//! let config = SessionConfig::from_env()?;
//! let manager = SessionManager::from_config(&config, store, SessionEnvironment::production())?;
//!
//! let mut session = manager.open(presented_id).await?;
//! session.insert("visits", 1);
//! let id = manager.save(&mut session).await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// Session configuration
pub mod config;

/// Write planning and change detection
pub mod write;

/// Locking strategy without mutual exclusion
pub mod null;

/// Exclusive per-session locking
pub mod pessimistic;

/// Strategy selected from configuration
pub mod strategy;

/// Per-request session driver
pub mod manager;

/// Table provisioning
pub mod provision;

pub use config::{ConfigError, LockConfig, LockingMode, SessionConfig, TableConfig};
pub use manager::{ActiveSession, IdOrigin, SessionManager};
pub use self::metrics::{MetricsError, MetricsErrorHandler, MetricsServer, register_metrics};
pub use null::NullLocking;
pub use pessimistic::PessimisticLocking;
pub use provision::{drop_table, ensure_table};
pub use retry::{Backoff, RetryPolicy};
pub use strategy::Locking;

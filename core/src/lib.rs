//! # Composable Session Core
//!
//! Core traits and types for key-value backed session persistence.
//!
//! A session is an opaque, signed identifier mapped to a mutable attribute
//! bag. This crate defines the pieces every deployment shares:
//!
//! - **Value model and codec**: [`SessionValue`], [`codec::encode`], [`codec::decode`]
//! - **Identifiers**: [`SessionSigner`] issues and verifies `signature.token` ids
//! - **Store model**: [`Item`], [`ItemUpdate`], [`Expectations`]
//! - **Contracts**: [`KeyValueStore`], [`TableAdmin`], [`LockingStrategy`], [`ErrorHandler`]
//! - **Environment**: [`Clock`], [`Scheduler`], [`SessionEnvironment`]
//!
//! ## Request Flow
//!
//! ```text
//! presented id ──► SessionSigner::check ──► LockingStrategy::get ──► handler mutates data
//!                                                                        │
//! response id  ◄── LockingStrategy::set (changed columns only) ◄─────────┘
//! ```
//!
//! Concrete strategies live in `composable-session-runtime`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod codec;
pub mod context;
pub mod environment;
pub mod error;
pub mod handler;
pub mod identifier;
pub mod item;
pub mod locking;
pub mod store;
pub mod value;

// Re-export main types for convenience
pub use context::RequestContext;
pub use environment::{Clock, Scheduler, SessionEnvironment, SystemClock, TokioScheduler};
pub use error::{Result, SessionError, StoreError};
pub use handler::{ErrorHandler, TracingErrorHandler};
pub use identifier::{IdCheck, SessionId, SessionSigner};
pub use item::{
    AttributeValue, Condition, ConditionalOperator, Expectations, Item, ItemUpdate, UpdateAction,
    columns,
};
pub use locking::{LockingStrategy, SessionSnapshot, SetOptions};
pub use store::{KeyValueStore, TableAdmin, TableSpec, TableStatus};
pub use value::{SessionData, SessionValue};

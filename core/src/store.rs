//! Store client contracts.
//!
//! This module defines the traits for the external key-value store. The
//! session engine only issues logical operations (get, conditional update,
//! delete); wire protocols live in adapter crates.
//!
//! ```text
//! LockingStrategy ──► KeyValueStore ──► RedisStore / in-memory mock
//!
//! Provisioning    ──► TableAdmin    (not on the request path)
//! ```

use crate::error::StoreError;
use crate::item::{Expectations, Item, ItemUpdate};
use std::future::Future;

/// Key-value store holding one record per session id.
///
/// # Implementation Notes
///
/// - `update_item` must evaluate expectations and apply actions atomically
/// - Updates merge at column level; untouched columns are preserved
/// - A record left without columns is removed
pub trait KeyValueStore: Send + Sync {
    /// Fetch a record.
    ///
    /// # Returns
    ///
    /// `None` if no record exists for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Service`] if the backend call fails.
    fn get_item(&self, key: &str) -> impl Future<Output = Result<Option<Item>, StoreError>> + Send;

    /// Conditionally update a record, creating it if needed.
    ///
    /// # Returns
    ///
    /// The record as it exists after the update.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Expectations do not hold → [`StoreError::ConditionalCheckFailed`]
    /// - Backend call fails → [`StoreError::Service`]
    fn update_item(
        &self,
        key: &str,
        update: &ItemUpdate,
    ) -> impl Future<Output = Result<Item, StoreError>> + Send;

    /// Delete a record if `expected` holds.
    ///
    /// Expectations are evaluated as for `update_item`, a missing record
    /// having every column absent. Deleting a missing record whose
    /// expectations hold succeeds.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Expectations do not hold → [`StoreError::ConditionalCheckFailed`]
    /// - Backend call fails → [`StoreError::Service`]
    fn delete_item(
        &self,
        key: &str,
        expected: &Expectations,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Table definition used by provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name.
    pub name: String,
    /// Primary key column.
    pub key_attribute: String,
    /// Secondary index names (typically over shadow columns).
    pub secondary_indexes: Vec<String>,
    /// Provisioned read capacity.
    pub read_capacity: u64,
    /// Provisioned write capacity.
    pub write_capacity: u64,
}

/// Lifecycle state reported by the store for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Being created.
    Creating,
    /// Ready for traffic.
    Active,
    /// Being deleted.
    Deleting,
    /// Does not exist.
    Missing,
}

/// Table provisioning.
pub trait TableAdmin: Send + Sync {
    /// Request creation of a table.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Table already exists → [`StoreError::TableExists`]
    /// - Backend call fails → [`StoreError::Service`]
    fn create_table(&self, spec: &TableSpec) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Request deletion of a table.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Table does not exist → [`StoreError::TableNotFound`]
    /// - Backend call fails → [`StoreError::Service`]
    fn delete_table(&self, name: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Current lifecycle state of a table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Service`] if the backend call fails.
    fn table_status(&self, name: &str) -> impl Future<Output = Result<TableStatus, StoreError>> + Send;
}

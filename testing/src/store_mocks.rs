//! In-memory store testing utilities
//!
//! Provides fast, deterministic stand-ins for the external store:
//! - [`InMemoryStore`]: `KeyValueStore` with conditional updates and call recording
//! - [`InMemoryTableAdmin`]: `TableAdmin` whose tables become active after N polls

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use composable_session_core::{
    Expectations, Item, ItemUpdate, KeyValueStore, StoreError, TableAdmin, TableSpec, TableStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A store call, as observed by [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    /// `get_item(key)`
    Get(String),
    /// `update_item(key, update)`
    Update(String, ItemUpdate),
    /// `delete_item(key, expected)`
    Delete(String),
}

/// In-memory key-value store for fast, deterministic testing.
///
/// Applies [`ItemUpdate`]s with the same semantics a real store client must
/// provide: expectations evaluated against the current record, column-level
/// merge, empty records removed.
///
/// # Example
///
/// ```
/// use composable_session_testing::InMemoryStore;
/// use composable_session_core::{AttributeValue, ItemUpdate, KeyValueStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryStore::new();
///
/// let mut update = ItemUpdate::new();
/// update.put("role", AttributeValue::Text("admin".into()));
/// store.update_item("session-1", &update).await?;
///
/// assert!(store.get_item("session-1").await?.is_some());
/// assert_eq!(store.call_count(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    items: Arc<RwLock<HashMap<String, Item>>>,
    calls: Arc<RwLock<Vec<StoreCall>>>,
    failure: Arc<RwLock<Option<StoreError>>>,
}

impl InMemoryStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `error` (until cleared)
    pub fn fail_with(&self, error: StoreError) {
        *self.failure.write().unwrap() = Some(error);
    }

    /// Stop injecting failures
    pub fn recover(&self) {
        *self.failure.write().unwrap() = None;
    }

    /// Seed a record directly, bypassing call recording
    pub fn insert(&self, key: &str, item: Item) {
        self.items.write().unwrap().insert(key.to_string(), item);
    }

    /// Current record for `key`, bypassing call recording
    #[must_use]
    pub fn item(&self, key: &str) -> Option<Item> {
        self.items.read().unwrap().get(key).cloned()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().unwrap().is_empty()
    }

    /// All calls made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of calls made so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Updates issued so far, in order
    #[must_use]
    pub fn updates(&self) -> Vec<ItemUpdate> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                StoreCall::Update(_, update) => Some(update.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recent update, if any
    #[must_use]
    pub fn last_update(&self) -> Option<ItemUpdate> {
        self.updates().pop()
    }

    /// Forget recorded calls (records are kept)
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn record(&self, call: StoreCall) -> Result<(), StoreError> {
        self.calls.write().unwrap().push(call);
        match self.failure.read().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl KeyValueStore for InMemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<Item>, StoreError> {
        self.record(StoreCall::Get(key.to_string()))?;
        Ok(self.item(key))
    }

    async fn update_item(&self, key: &str, update: &ItemUpdate) -> Result<Item, StoreError> {
        self.record(StoreCall::Update(key.to_string(), update.clone()))?;

        let mut items = self.items.write().unwrap();
        if !update.expected.matches(items.get(key)) {
            return Err(StoreError::ConditionalCheckFailed);
        }

        let mut item = items.remove(key).unwrap_or_default();
        update.apply(&mut item);
        if !item.is_empty() {
            items.insert(key.to_string(), item.clone());
        }
        Ok(item)
    }

    async fn delete_item(&self, key: &str, expected: &Expectations) -> Result<(), StoreError> {
        self.record(StoreCall::Delete(key.to_string()))?;

        let mut items = self.items.write().unwrap();
        if !expected.matches(items.get(key)) {
            return Err(StoreError::ConditionalCheckFailed);
        }
        items.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct TableEntry {
    spec: TableSpec,
    status: TableStatus,
    pending_polls: usize,
}

/// In-memory table admin.
///
/// Created tables report `Creating` for `polls_until_ready` status polls,
/// then `Active`; deleted tables report `Deleting` for the same number of
/// polls, then disappear.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTableAdmin {
    tables: Arc<RwLock<HashMap<String, TableEntry>>>,
    polls_until_ready: usize,
    status_polls: Arc<RwLock<usize>>,
}

impl InMemoryTableAdmin {
    /// Tables transition after `polls_until_ready` status polls
    #[must_use]
    pub fn new(polls_until_ready: usize) -> Self {
        Self {
            polls_until_ready,
            ..Self::default()
        }
    }

    /// Spec of an existing table
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<TableSpec> {
        self.tables.read().unwrap().get(name).map(|t| t.spec.clone())
    }

    /// Number of `table_status` calls so far
    #[must_use]
    pub fn status_polls(&self) -> usize {
        *self.status_polls.read().unwrap()
    }
}

impl TableAdmin for InMemoryTableAdmin {
    async fn create_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        if tables.contains_key(&spec.name) {
            return Err(StoreError::TableExists(spec.name.clone()));
        }

        let status = if self.polls_until_ready == 0 {
            TableStatus::Active
        } else {
            TableStatus::Creating
        };
        tables.insert(
            spec.name.clone(),
            TableEntry {
                spec: spec.clone(),
                status,
                pending_polls: self.polls_until_ready,
            },
        );
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        let Some(entry) = tables.get_mut(name) else {
            return Err(StoreError::TableNotFound(name.to_string()));
        };

        if self.polls_until_ready == 0 {
            tables.remove(name);
        } else {
            entry.status = TableStatus::Deleting;
            entry.pending_polls = self.polls_until_ready;
        }
        Ok(())
    }

    async fn table_status(&self, name: &str) -> Result<TableStatus, StoreError> {
        *self.status_polls.write().unwrap() += 1;

        let mut tables = self.tables.write().unwrap();
        let Some(entry) = tables.get_mut(name) else {
            return Ok(TableStatus::Missing);
        };

        if entry.pending_polls > 0 {
            entry.pending_polls -= 1;
            return Ok(entry.status);
        }

        let status = entry.status;
        match status {
            TableStatus::Creating => {
                entry.status = TableStatus::Active;
                Ok(TableStatus::Active)
            }
            TableStatus::Deleting => {
                tables.remove(name);
                Ok(TableStatus::Missing)
            }
            status => Ok(status),
        }
    }
}

//! Locking strategy contract.
//!
//! A strategy translates session reads and writes into conditional store
//! operations. Two variants exist in the runtime crate:
//!
//! - **Null**: no mutual exclusion, change detection plus last-writer-wins
//! - **Pessimistic**: exclusive lock record taken on `get`, released by `set`/`delete`

use crate::codec;
use crate::context::RequestContext;
use crate::error::{Result, SessionError};
use crate::identifier::SessionId;
use crate::item::{AttributeValue, Condition, Item, columns};
use crate::value::SessionData;
use chrono::{DateTime, Utc};
use std::future::Future;

/// Session state loaded by [`LockingStrategy::get`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    /// Decoded attribute bag (empty when not found).
    pub attributes: SessionData,
    /// A stored session exists for the id.
    pub found: bool,
    /// First write time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last write time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Build a snapshot from a stored record.
    ///
    /// A record carrying only lock columns counts as not found.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CorruptSessionData`](crate::SessionError::CorruptSessionData)
    /// if the `data` column cannot be decoded.
    pub fn from_item(item: Option<&Item>) -> Result<Self> {
        let Some(item) = item else {
            return Ok(Self::default());
        };

        let attributes = match item.get(columns::DATA) {
            Some(AttributeValue::Bytes(body)) => codec::decode(body)?,
            Some(_) => {
                return Err(SessionError::CorruptSessionData(
                    "data column does not hold bytes".to_string(),
                ));
            }
            None => SessionData::new(),
        };

        Ok(Self {
            attributes,
            found: item.contains_key(columns::DATA) || item.contains_key(columns::CREATED_AT),
            created_at: item.get(columns::CREATED_AT).and_then(AttributeValue::as_timestamp),
            updated_at: item.get(columns::UPDATED_AT).and_then(AttributeValue::as_timestamp),
        })
    }
}

/// Encoded body stored in a record, used to seed change detection.
#[must_use]
pub fn stored_body(item: Option<&Item>) -> Option<Vec<u8>> {
    item.and_then(|i| i.get(columns::DATA))
        .and_then(AttributeValue::as_bytes)
        .map(<[u8]>::to_vec)
}

/// Extra knobs for [`LockingStrategy::set`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetOptions {
    /// Columns written as-is. A non-empty set always writes the body.
    pub force: Item,
    /// Column conditions that must all hold for the write to apply.
    pub expected: Vec<(String, Condition)>,
}

impl SetOptions {
    /// No forced columns, no expectations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a column value.
    #[must_use]
    pub fn force(mut self, column: impl Into<String>, value: AttributeValue) -> Self {
        self.force.insert(column.into(), value);
        self
    }

    /// Require a column condition.
    #[must_use]
    pub fn expect(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.expected.push((column.into(), condition));
        self
    }
}

/// Session read/write contract.
///
/// Every error is handed to the strategy's error handler before being
/// returned unchanged.
pub trait LockingStrategy: Send + Sync {
    /// Load a session.
    ///
    /// Records the stored body in `ctx.prior_body` and sets `ctx.is_new`
    /// when no session exists.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Backend call fails → `StoreUnavailable` (not retried)
    /// - Stored body is malformed → `CorruptSessionData`
    /// - Lock cannot be acquired in budget → `LockTimeout` (pessimistic only)
    fn get(
        &self,
        id: &SessionId,
        ctx: &mut RequestContext,
    ) -> impl Future<Output = Result<SessionSnapshot>> + Send;

    /// Persist a session.
    ///
    /// # Returns
    ///
    /// `None` without touching the store when `attributes` is empty,
    /// otherwise the id written.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Backend call fails → `StoreUnavailable`
    /// - An expectation (or lock ownership) does not hold → `ConditionFailed`
    /// - A forced column is engine-managed → `ReservedAttribute`
    fn set(
        &self,
        id: &SessionId,
        attributes: &SessionData,
        options: SetOptions,
        ctx: &mut RequestContext,
    ) -> impl Future<Output = Result<Option<SessionId>>> + Send;

    /// Remove a session. Removing an unknown id succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend call fails.
    fn delete(&self, id: &SessionId, ctx: &mut RequestContext) -> impl Future<Output = Result<()>> + Send;

    /// Drop a held lock without writing session data.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend call fails.
    fn release(&self, id: &SessionId, ctx: &mut RequestContext) -> impl Future<Output = Result<()>> + Send {
        let _ = id;
        ctx.lock_token = None;
        async { Ok(()) }
    }
}

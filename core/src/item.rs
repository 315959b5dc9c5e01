//! Store item model.
//!
//! A session record is an [`Item`]: named columns holding [`AttributeValue`]s.
//! Writes are expressed as an [`ItemUpdate`], a per-column action map guarded
//! by optional [`Expectations`]. Store clients apply updates atomically and
//! evaluate expectations against the record as it exists at write time.

use crate::value::SessionValue;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column names managed by the session engine.
pub mod columns {
    /// Encoded session body.
    pub const DATA: &str = "data";

    /// Creation timestamp, written once.
    pub const CREATED_AT: &str = "created_at";

    /// Timestamp of the last successful write.
    pub const UPDATED_AT: &str = "updated_at";

    /// Holder token of the current pessimistic lock.
    pub const LOCK_FLAG: &str = "lock_flag";

    /// Epoch milliseconds at which the current lock was taken.
    pub const LOCK_TIME: &str = "lock_time";

    /// All engine-managed columns.
    pub const RESERVED: [&str; 5] = [DATA, CREATED_AT, UPDATED_AT, LOCK_FLAG, LOCK_TIME];

    /// Returns `true` if `name` is an engine-managed column.
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        RESERVED.contains(&name)
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Text.
    Text(String),
    /// Integer, comparable with [`Condition::LessThan`].
    Number(i64),
    /// Boolean.
    Bool(bool),
    /// Structured session value (shadow columns).
    Value(SessionValue),
}

impl AttributeValue {
    /// Text column holding an RFC 3339 timestamp with millisecond precision.
    #[must_use]
    pub fn timestamp(at: DateTime<Utc>) -> Self {
        Self::Text(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Parse a timestamp column written by [`AttributeValue::timestamp`].
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Borrow byte content.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrow text content.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content.
    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A stored record.
pub type Item = BTreeMap<String, AttributeValue>;

/// What to do with one column.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Write the value, replacing any existing one.
    Put(AttributeValue),
    /// Write the value only if the column is absent.
    PutIfAbsent(AttributeValue),
    /// Remove the column.
    Delete,
}

/// Precondition on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Column must not exist.
    Absent,
    /// Column must exist.
    Present,
    /// Column must equal the value.
    Equals(AttributeValue),
    /// Column must be a number strictly below the bound.
    LessThan(i64),
}

impl Condition {
    /// Evaluate against the current column value (`None` if absent).
    #[must_use]
    pub fn holds(&self, current: Option<&AttributeValue>) -> bool {
        match (self, current) {
            (Self::Absent, current) => current.is_none(),
            (Self::Present, current) => current.is_some(),
            (Self::Equals(expected), Some(actual)) => expected == actual,
            (Self::LessThan(bound), Some(AttributeValue::Number(n))) => n < bound,
            _ => false,
        }
    }
}

/// How the conditions of an [`Expectations`] set combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionalOperator {
    /// Every condition must hold.
    #[default]
    And,
    /// At least one condition must hold.
    Or,
}

/// Preconditions attached to an update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expectations {
    /// Combination rule.
    pub operator: ConditionalOperator,
    /// Column conditions, evaluated in order.
    pub conditions: Vec<(String, Condition)>,
}

impl Expectations {
    /// Empty set (always satisfied) combining with AND.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            operator: ConditionalOperator::And,
            conditions: Vec::new(),
        }
    }

    /// Empty set combining with OR.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            operator: ConditionalOperator::Or,
            conditions: Vec::new(),
        }
    }

    /// Add a condition.
    #[must_use]
    pub fn expect(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((column.into(), condition));
        self
    }

    /// Returns `true` if no conditions are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a record; a missing record has every column absent.
    #[must_use]
    pub fn matches(&self, item: Option<&Item>) -> bool {
        if self.conditions.is_empty() {
            return true;
        }

        let mut results = self
            .conditions
            .iter()
            .map(|(column, condition)| condition.holds(item.and_then(|i| i.get(column))));

        match self.operator {
            ConditionalOperator::And => results.all(|held| held),
            ConditionalOperator::Or => results.any(|held| held),
        }
    }
}

/// A conditional, attribute-level update of one record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemUpdate {
    /// Per-column actions.
    pub actions: BTreeMap<String, UpdateAction>,
    /// Preconditions.
    pub expected: Expectations,
}

impl ItemUpdate {
    /// Empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a column value.
    pub fn put(&mut self, column: impl Into<String>, value: AttributeValue) -> &mut Self {
        self.actions.insert(column.into(), UpdateAction::Put(value));
        self
    }

    /// Put a column value only if the column is absent.
    pub fn put_if_absent(&mut self, column: impl Into<String>, value: AttributeValue) -> &mut Self {
        self.actions.insert(column.into(), UpdateAction::PutIfAbsent(value));
        self
    }

    /// Delete a column.
    pub fn delete(&mut self, column: impl Into<String>) -> &mut Self {
        self.actions.insert(column.into(), UpdateAction::Delete);
        self
    }

    /// Action planned for a column.
    #[must_use]
    pub fn action(&self, column: &str) -> Option<&UpdateAction> {
        self.actions.get(column)
    }

    /// Returns `true` if the update touches the column.
    #[must_use]
    pub fn touches(&self, column: &str) -> bool {
        self.actions.contains_key(column)
    }

    /// Apply the actions to a record in place, ignoring expectations.
    ///
    /// Store clients call this after checking [`Expectations::matches`].
    pub fn apply(&self, item: &mut Item) {
        for (column, action) in &self.actions {
            match action {
                UpdateAction::Put(value) => {
                    item.insert(column.clone(), value.clone());
                }
                UpdateAction::PutIfAbsent(value) => {
                    item.entry(column.clone()).or_insert_with(|| value.clone());
                }
                UpdateAction::Delete => {
                    item.remove(column);
                }
            }
        }
    }
}

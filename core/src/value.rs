//! Session value model.
//!
//! Session data is a closed, tagged tree of values rather than an arbitrary
//! host object graph, which keeps the codec deterministic and testable.
//! Maps are ordered (`BTreeMap`) so that two equal values always encode to
//! the same bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute bag held by a session.
pub type SessionData = BTreeMap<String, SessionValue>;

/// A single session value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Text(String),
    /// Ordered sequence.
    List(Vec<SessionValue>),
    /// Nested mapping with ordered keys.
    Map(BTreeMap<String, SessionValue>),
}

impl SessionValue {
    /// Borrow the string content, if this is a `Text` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an `Int` value.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean content, if this is a `Bool` value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for SessionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SessionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SessionValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for SessionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SessionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for SessionValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Self>> for SessionValue {
    fn from(map: BTreeMap<String, Self>) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Self>> From<Option<T>> for SessionValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(SessionValue::from("admin"), SessionValue::Text("admin".into()));
        assert_eq!(SessionValue::from(7), SessionValue::Int(7));
        assert_eq!(SessionValue::from(None::<bool>), SessionValue::Null);
        assert_eq!(
            SessionValue::from(vec![1, 2]),
            SessionValue::List(vec![SessionValue::Int(1), SessionValue::Int(2)])
        );
    }

    #[test]
    fn test_accessors() {
        assert_eq!(SessionValue::from("x").as_str(), Some("x"));
        assert_eq!(SessionValue::from(3).as_i64(), Some(3));
        assert_eq!(SessionValue::from(true).as_bool(), Some(true));
        assert!(SessionValue::Null.is_null());
        assert_eq!(SessionValue::from(1.5).as_i64(), None);
    }
}

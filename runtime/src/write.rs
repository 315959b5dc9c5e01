//! Write planning and change detection.
//!
//! Both strategies build their session update here; they differ only in
//! the lock columns and expectations layered on top.

use composable_session_core::codec;
use composable_session_core::{
    AttributeValue, Expectations, ItemUpdate, RequestContext, Result, SessionData, SessionError,
    SessionId, SetOptions, StoreError, columns,
};
use chrono::{DateTime, Utc};

/// A planned session write.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    /// Update to send.
    pub update: ItemUpdate,
    /// Encoded body of the attributes being written.
    pub body: Vec<u8>,
    /// The update carries the `data` column.
    pub data_written: bool,
}

impl WritePlan {
    /// Record a successful write in the request context.
    pub fn commit(self, ctx: &mut RequestContext) {
        ctx.prior_body = Some(self.body);
        ctx.is_new = false;
    }
}

/// Build the update for `attributes`.
///
/// The `data` and shadow columns are left out when the encoded body matches
/// `ctx.prior_body` and nothing is forced; `updated_at` is always written,
/// and `created_at` only if absent on a new session.
///
/// # Errors
///
/// Returns error if:
/// - A forced column is engine-managed → `ReservedAttribute`
/// - The attributes cannot be encoded → `Serialization`
pub fn plan_write(
    attributes: &SessionData,
    options: &SetOptions,
    ctx: &RequestContext,
    shadow_keys: &[String],
    now: DateTime<Utc>,
) -> Result<WritePlan> {
    if let Some(column) = options.force.keys().find(|c| columns::is_reserved(c)) {
        return Err(SessionError::ReservedAttribute(column.clone()));
    }

    let body = codec::encode(attributes)?;
    let unchanged = options.force.is_empty() && ctx.prior_body.as_deref() == Some(body.as_slice());

    let mut update = ItemUpdate::new();
    update.put(columns::UPDATED_AT, AttributeValue::timestamp(now));
    if ctx.is_new {
        update.put_if_absent(columns::CREATED_AT, AttributeValue::timestamp(now));
    }

    if !unchanged {
        update.put(columns::DATA, AttributeValue::Bytes(body.clone()));
        for key in shadow_keys {
            match attributes.get(key) {
                Some(value) => update.put(key.as_str(), AttributeValue::Value(value.clone())),
                None => update.delete(key.as_str()),
            };
        }
        for (column, value) in &options.force {
            update.put(column.as_str(), value.clone());
        }
    }

    update.expected = options
        .expected
        .iter()
        .cloned()
        .fold(Expectations::all(), |acc, (column, condition)| {
            acc.expect(column, condition)
        });

    Ok(WritePlan {
        update,
        body,
        data_written: !unchanged,
    })
}

/// Map a failed write: a rejected precondition is a `ConditionFailed`,
/// anything else means the store is unavailable.
pub(crate) fn write_error(err: StoreError, id: &SessionId) -> SessionError {
    match err {
        StoreError::ConditionalCheckFailed => SessionError::ConditionFailed {
            id: id.log_prefix().to_string(),
        },
        other => SessionError::StoreUnavailable(other),
    }
}

//! Redis-based key-value store for session records.
//!
//! # Architecture
//!
//! Each session record is a Redis hash:
//! - **Key**: `{prefix}:{session_id}` (prefix defaults to `session`)
//! - **Fields**: one per column, each value prefixed with a one-byte type tag
//!
//! | tag | column value |
//! |---|---|
//! | `b` | bytes |
//! | `s` | UTF-8 text |
//! | `n` | decimal integer |
//! | `t` / `f` | boolean |
//! | `v` | bincode-encoded session value |
//!
//! Conditional updates and deletes run as a single Lua script, so
//! expectations are evaluated and the write applied atomically on the
//! server.
//!
//! # Example
//!
//! ```no_run
//! use composable_session_redis::RedisStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use composable_session_core::{
    AttributeValue, Condition, ConditionalOperator, Expectations, Item, ItemUpdate, KeyValueStore,
    StoreError, UpdateAction,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;

/// Evaluates expectations, then updates or deletes the record.
///
/// ARGV layout: operator, condition count, (field, kind, operand) triples,
/// then either `update`, action count, (field, action, value) triples, or
/// `delete`. Returns nil when the expectations fail, the resulting hash
/// after an update, an empty array after a delete.
const WRITE_SCRIPT: &str = r"
    local key = KEYS[1]
    local operator = ARGV[1]
    local ncond = tonumber(ARGV[2])
    local i = 3

    local result = operator == 'and' or ncond == 0
    for _ = 1, ncond do
        local field, kind, operand = ARGV[i], ARGV[i + 1], ARGV[i + 2]
        i = i + 3

        local current = redis.call('HGET', key, field)
        local held = false
        if kind == 'absent' then
            held = current == false
        elseif kind == 'present' then
            held = current ~= false
        elseif kind == 'eq' then
            held = current == operand
        elseif kind == 'lt' and current ~= false and string.sub(current, 1, 1) == 'n' then
            local n = tonumber(string.sub(current, 2))
            held = n ~= nil and n < tonumber(operand)
        end

        if operator == 'and' then
            result = result and held
        else
            result = result or held
        end
    end

    if not result then
        return false
    end

    if ARGV[i] == 'delete' then
        redis.call('DEL', key)
        return {}
    end

    local nupd = tonumber(ARGV[i + 1])
    i = i + 2
    for _ = 1, nupd do
        local field, action, value = ARGV[i], ARGV[i + 1], ARGV[i + 2]
        i = i + 3

        if action == 'put' then
            redis.call('HSET', key, field, value)
        elseif action == 'keep' then
            redis.call('HSETNX', key, field, value)
        elseif action == 'del' then
            redis.call('HDEL', key, field)
        end
    end

    return redis.call('HGETALL', key)
";

/// Redis-backed [`KeyValueStore`].
///
/// Uses `ConnectionManager` for automatic reconnection; clones share the
/// underlying connection.
#[derive(Clone)]
pub struct RedisStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    prefix: String,
    write_script: Script,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Service`] if connection to Redis fails.
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            StoreError::Service(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Service(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("Connected session store to Redis");
        Ok(Self {
            conn_manager,
            prefix: "session".to_string(),
            write_script: Script::new(WRITE_SCRIPT),
        })
    }

    /// Namespace records under `prefix` instead of `session`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Redis key holding the record for `key`.
    #[must_use]
    pub fn record_key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

impl KeyValueStore for RedisStore {
    async fn get_item(&self, key: &str) -> Result<Option<Item>, StoreError> {
        let mut conn = self.conn_manager.clone();

        let fields: HashMap<String, Vec<u8>> = conn
            .hgetall(self.record_key(key))
            .await
            .map_err(|e| service("Failed to load session record", &e))?;

        if fields.is_empty() {
            return Ok(None);
        }

        fields
            .into_iter()
            .map(|(field, raw)| Ok((field, decode_value(&raw)?)))
            .collect::<Result<Item, StoreError>>()
            .map(Some)
    }

    async fn update_item(&self, key: &str, update: &ItemUpdate) -> Result<Item, StoreError> {
        let mut conn = self.conn_manager.clone();

        let reply = self
            .run_write_script(&mut conn, key, update_args(update)?)
            .await
            .map_err(|e| service("Failed to update session record", &e))?;

        match reply {
            Some(flat) => decode_hash(flat),
            None => Err(StoreError::ConditionalCheckFailed),
        }
    }

    async fn delete_item(&self, key: &str, expected: &Expectations) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();

        let reply = self
            .run_write_script(&mut conn, key, delete_args(expected)?)
            .await
            .map_err(|e| service("Failed to delete session record", &e))?;

        match reply {
            Some(_) => Ok(()),
            None => Err(StoreError::ConditionalCheckFailed),
        }
    }
}

impl RedisStore {
    async fn run_write_script(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        args: Vec<Vec<u8>>,
    ) -> redis::RedisResult<Option<Vec<Vec<u8>>>> {
        let mut invocation = self.write_script.prepare_invoke();
        invocation.key(self.record_key(key));
        for arg in args {
            invocation.arg(arg);
        }
        invocation.invoke_async(conn).await
    }
}

fn service(context: &str, err: &redis::RedisError) -> StoreError {
    StoreError::Service(format!("{context}: {err}"))
}

/// Encode a column value with its type tag.
///
/// # Errors
///
/// Returns [`StoreError::Service`] if a structured value cannot be encoded.
pub fn encode_value(value: &AttributeValue) -> Result<Vec<u8>, StoreError> {
    let encoded = match value {
        AttributeValue::Bytes(bytes) => tagged(b'b', bytes),
        AttributeValue::Text(text) => tagged(b's', text.as_bytes()),
        AttributeValue::Number(n) => tagged(b'n', n.to_string().as_bytes()),
        AttributeValue::Bool(true) => vec![b't'],
        AttributeValue::Bool(false) => vec![b'f'],
        AttributeValue::Value(inner) => {
            let body = bincode::serialize(inner)
                .map_err(|e| StoreError::Service(format!("Failed to encode column: {e}")))?;
            tagged(b'v', &body)
        }
    };
    Ok(encoded)
}

/// Decode a column value written by [`encode_value`].
///
/// # Errors
///
/// Returns [`StoreError::Service`] if the tag is unknown or the payload is
/// malformed.
pub fn decode_value(raw: &[u8]) -> Result<AttributeValue, StoreError> {
    let Some((&tag, body)) = raw.split_first() else {
        return Err(malformed("empty column value"));
    };

    match tag {
        b'b' => Ok(AttributeValue::Bytes(body.to_vec())),
        b's' => String::from_utf8(body.to_vec())
            .map(AttributeValue::Text)
            .map_err(|_| malformed("text column is not UTF-8")),
        b'n' => std::str::from_utf8(body)
            .ok()
            .and_then(|s| s.parse().ok())
            .map(AttributeValue::Number)
            .ok_or_else(|| malformed("number column is not an integer")),
        b't' if body.is_empty() => Ok(AttributeValue::Bool(true)),
        b'f' if body.is_empty() => Ok(AttributeValue::Bool(false)),
        b'v' => bincode::deserialize(body)
            .map(AttributeValue::Value)
            .map_err(|e| malformed(&format!("value column: {e}"))),
        _ => Err(malformed("unknown column tag")),
    }
}

fn tagged(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(tag);
    out.extend_from_slice(body);
    out
}

fn malformed(reason: &str) -> StoreError {
    StoreError::Service(format!("Malformed session column: {reason}"))
}

fn decode_hash(flat: Vec<Vec<u8>>) -> Result<Item, StoreError> {
    let mut item = Item::new();
    let mut entries = flat.into_iter();
    while let (Some(field), Some(raw)) = (entries.next(), entries.next()) {
        let field =
            String::from_utf8(field).map_err(|_| malformed("field name is not UTF-8"))?;
        item.insert(field, decode_value(&raw)?);
    }
    Ok(item)
}

/// Script arguments for an update, in the layout `WRITE_SCRIPT` expects.
fn update_args(update: &ItemUpdate) -> Result<Vec<Vec<u8>>, StoreError> {
    let mut args = condition_args(&update.expected)?;

    args.push(b"update".to_vec());
    args.push(update.actions.len().to_string().into_bytes());
    for (field, action) in &update.actions {
        let (verb, value): (&[u8], Vec<u8>) = match action {
            UpdateAction::Put(value) => (b"put", encode_value(value)?),
            UpdateAction::PutIfAbsent(value) => (b"keep", encode_value(value)?),
            UpdateAction::Delete => (b"del", Vec::new()),
        };
        args.push(field.as_bytes().to_vec());
        args.push(verb.to_vec());
        args.push(value);
    }

    Ok(args)
}

/// Script arguments for a conditional delete.
fn delete_args(expected: &Expectations) -> Result<Vec<Vec<u8>>, StoreError> {
    let mut args = condition_args(expected)?;
    args.push(b"delete".to_vec());
    Ok(args)
}

fn condition_args(expected: &Expectations) -> Result<Vec<Vec<u8>>, StoreError> {
    let mut args = Vec::with_capacity(3 + 3 * expected.conditions.len());

    let operator: &[u8] = match expected.operator {
        ConditionalOperator::And => b"and",
        ConditionalOperator::Or => b"or",
    };
    args.push(operator.to_vec());
    args.push(expected.conditions.len().to_string().into_bytes());

    for (field, condition) in &expected.conditions {
        let (kind, operand): (&[u8], Vec<u8>) = match condition {
            Condition::Absent => (b"absent", Vec::new()),
            Condition::Present => (b"present", Vec::new()),
            Condition::Equals(value) => (b"eq", encode_value(value)?),
            Condition::LessThan(bound) => (b"lt", bound.to_string().into_bytes()),
        };
        args.push(field.as_bytes().to_vec());
        args.push(kind.to_vec());
        args.push(operand);
    }

    Ok(args)
}

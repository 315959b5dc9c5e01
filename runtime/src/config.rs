//! Session configuration.
//!
//! Values are normally loaded from the environment at startup:
//!
//! | variable | default |
//! |---|---|
//! | `SESSION_SECRET_KEY` | required |
//! | `SESSION_TABLE` | `sessions` |
//! | `SESSION_LOCKING` | `null` (`null` or `pessimistic`) |
//! | `SESSION_SHADOW_KEYS` | none (comma-separated) |
//! | `SESSION_LOCK_EXPIRY_MS` | `30000` |
//! | `SESSION_LOCK_MAX_RETRIES` | `10` |
//!
//! # Example
//!
//! ```rust
//! use composable_session_runtime::config::{LockingMode, SessionConfig};
//!
//! let config = SessionConfig::new("server-secret")
//!     .with_locking(LockingMode::Pessimistic)
//!     .with_shadow_keys(["user_id"]);
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::retry::RetryPolicy;
use composable_session_core::{SessionError, SessionSigner, TableSpec, columns};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No secret key was supplied.
    #[error("SESSION_SECRET_KEY is not set")]
    MissingSecretKey,

    /// A variable could not be parsed.
    #[error("Invalid value for {var}: {value}")]
    Parse {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },

    /// The configuration is inconsistent.
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingSecretKey => Self::MissingSecretKey,
            other => Self::Config(other.to_string()),
        }
    }
}

/// Which concurrency strategy guards session writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockingMode {
    /// Last writer wins per column.
    #[default]
    Null,
    /// Exclusive lock per session for the duration of a request.
    Pessimistic,
}

impl FromStr for LockingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "null" | "none" => Ok(Self::Null),
            "pessimistic" => Ok(Self::Pessimistic),
            _ => Err(ConfigError::Parse {
                var: "SESSION_LOCKING",
                value: s.to_string(),
            }),
        }
    }
}

/// Table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Table name.
    ///
    /// Default: `sessions`
    pub name: String,

    /// Primary key column.
    ///
    /// Default: `id`
    pub key_attribute: String,

    /// Secondary index names.
    pub secondary_indexes: Vec<String>,

    /// Provisioned read capacity.
    ///
    /// Default: 5
    pub read_capacity: u64,

    /// Provisioned write capacity.
    ///
    /// Default: 5
    pub write_capacity: u64,
}

impl TableConfig {
    /// Default table layout under `name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Table spec handed to a [`TableAdmin`](composable_session_core::TableAdmin).
    #[must_use]
    pub fn spec(&self) -> TableSpec {
        TableSpec {
            name: self.name.clone(),
            key_attribute: self.key_attribute.clone(),
            secondary_indexes: self.secondary_indexes.clone(),
            read_capacity: self.read_capacity,
            write_capacity: self.write_capacity,
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "sessions".to_string(),
            key_attribute: "id".to_string(),
            secondary_indexes: Vec::new(),
            read_capacity: 5,
            write_capacity: 5,
        }
    }
}

/// Pessimistic lock tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct LockConfig {
    /// Age after which a held lock may be seized.
    ///
    /// Default: 30 seconds
    pub expiry: Duration,

    /// Backoff between acquisition attempts.
    pub retry: RetryPolicy,
}

impl LockConfig {
    /// Set lock expiry.
    #[must_use]
    pub const fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Set acquisition backoff.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Session persistence configuration.
#[derive(Clone, PartialEq)]
pub struct SessionConfig {
    /// Backing table.
    pub table: TableConfig,

    /// Server secret for signing session ids.
    pub secret_key: String,

    /// Concurrency strategy.
    pub locking: LockingMode,

    /// Attribute keys mirrored into their own columns.
    pub shadow_keys: Vec<String>,

    /// Pessimistic lock tuning (ignored by null locking).
    pub lock: LockConfig,
}

impl SessionConfig {
    /// Defaults with the given secret.
    #[must_use]
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            table: TableConfig::default(),
            secret_key: secret_key.into(),
            locking: LockingMode::default(),
            shadow_keys: Vec::new(),
            lock: LockConfig::default(),
        }
    }

    /// Set the backing table.
    #[must_use]
    pub fn with_table(mut self, table: TableConfig) -> Self {
        self.table = table;
        self
    }

    /// Set the concurrency strategy.
    #[must_use]
    pub const fn with_locking(mut self, locking: LockingMode) -> Self {
        self.locking = locking;
        self
    }

    /// Set the shadow keys.
    #[must_use]
    pub fn with_shadow_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shadow_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set pessimistic lock tuning.
    #[must_use]
    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    /// Load from process environment variables.
    ///
    /// # Errors
    ///
    /// See [`SessionConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `SESSION_SECRET_KEY` is missing or empty → [`ConfigError::MissingSecretKey`]
    /// - A numeric or enum variable does not parse → [`ConfigError::Parse`]
    /// - The result fails [`SessionConfig::validate`]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("SESSION_SECRET_KEY")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecretKey)?;
        let mut config = Self::new(secret);

        if let Some(name) = lookup("SESSION_TABLE") {
            config.table.name = name;
        }
        if let Some(mode) = lookup("SESSION_LOCKING") {
            config.locking = mode.parse()?;
        }
        if let Some(keys) = lookup("SESSION_SHADOW_KEYS") {
            config.shadow_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(ms) = lookup("SESSION_LOCK_EXPIRY_MS") {
            let ms = parse_number("SESSION_LOCK_EXPIRY_MS", &ms)?;
            config.lock.expiry = Duration::from_millis(ms);
        }
        if let Some(retries) = lookup("SESSION_LOCK_MAX_RETRIES") {
            let retries = parse_number("SESSION_LOCK_MAX_RETRIES", &retries)?;
            config.lock.retry.max_retries = usize::try_from(retries).map_err(|_| {
                ConfigError::Parse {
                    var: "SESSION_LOCK_MAX_RETRIES",
                    value: retries.to_string(),
                }
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The secret key is empty → [`ConfigError::MissingSecretKey`]
    /// - The table name is empty
    /// - Lock expiry is zero
    /// - A shadow key is empty, duplicated, or names an engine column
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.is_empty() {
            return Err(ConfigError::MissingSecretKey);
        }
        if self.table.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "table name cannot be empty".to_string(),
            ));
        }
        if self.lock.expiry.is_zero() {
            return Err(ConfigError::Validation(
                "lock expiry must be > 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for key in &self.shadow_keys {
            if key.is_empty() {
                return Err(ConfigError::Validation(
                    "shadow keys cannot be empty".to_string(),
                ));
            }
            if columns::is_reserved(key) || *key == self.table.key_attribute {
                return Err(ConfigError::Validation(format!(
                    "shadow key {key} collides with a reserved column"
                )));
            }
            if !seen.insert(key.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "shadow key {key} is listed twice"
                )));
            }
        }

        Ok(())
    }

    /// Build the id signer.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingSecretKey`] if no secret is configured.
    pub fn signer(&self) -> Result<SessionSigner, SessionError> {
        SessionSigner::new(self.secret_key.as_bytes())
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("table", &self.table)
            .field("secret_key", &"<redacted>")
            .field("locking", &self.locking)
            .field("shadow_keys", &self.shadow_keys)
            .field("lock", &self.lock)
            .finish()
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Parse {
        var,
        value: value.to_string(),
    })
}

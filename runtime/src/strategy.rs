//! Strategy chosen from configuration.

use crate::config::{LockingMode, SessionConfig};
use crate::null::NullLocking;
use crate::pessimistic::PessimisticLocking;
use composable_session_core::{
    KeyValueStore, LockingStrategy, RequestContext, Result, SessionData, SessionEnvironment,
    SessionId, SessionSnapshot, SetOptions,
};

/// Either locking strategy, selected at startup.
#[derive(Clone)]
pub enum Locking<S> {
    /// Last writer wins.
    Null(NullLocking<S>),
    /// Exclusive lock per request.
    Pessimistic(PessimisticLocking<S>),
}

impl<S: KeyValueStore> Locking<S> {
    /// Build the strategy named by `config.locking`.
    #[must_use]
    pub fn from_config(config: &SessionConfig, store: S, env: SessionEnvironment) -> Self {
        let shadow_keys = config.shadow_keys.clone();
        match config.locking {
            LockingMode::Null => Self::Null(NullLocking::new(store, shadow_keys, env)),
            LockingMode::Pessimistic => Self::Pessimistic(PessimisticLocking::new(
                store,
                shadow_keys,
                config.lock.clone(),
                env,
            )),
        }
    }

    /// Mode this strategy was built for.
    #[must_use]
    pub const fn mode(&self) -> LockingMode {
        match self {
            Self::Null(_) => LockingMode::Null,
            Self::Pessimistic(_) => LockingMode::Pessimistic,
        }
    }
}

impl<S: KeyValueStore> LockingStrategy for Locking<S> {
    async fn get(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<SessionSnapshot> {
        match self {
            Self::Null(strategy) => strategy.get(id, ctx).await,
            Self::Pessimistic(strategy) => strategy.get(id, ctx).await,
        }
    }

    async fn set(
        &self,
        id: &SessionId,
        attributes: &SessionData,
        options: SetOptions,
        ctx: &mut RequestContext,
    ) -> Result<Option<SessionId>> {
        match self {
            Self::Null(strategy) => strategy.set(id, attributes, options, ctx).await,
            Self::Pessimistic(strategy) => strategy.set(id, attributes, options, ctx).await,
        }
    }

    async fn delete(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<()> {
        match self {
            Self::Null(strategy) => strategy.delete(id, ctx).await,
            Self::Pessimistic(strategy) => strategy.delete(id, ctx).await,
        }
    }

    async fn release(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<()> {
        match self {
            Self::Null(strategy) => strategy.release(id, ctx).await,
            Self::Pessimistic(strategy) => strategy.release(id, ctx).await,
        }
    }
}

//! Per-request session driver.
//!
//! Host frameworks call [`SessionManager::open`] with whatever identifier
//! the client presented, let the handler mutate the [`ActiveSession`], then
//! call [`SessionManager::save`] (or [`SessionManager::destroy`]) before the
//! response is sent, handing [`ActiveSession::id`] back to the client.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = SessionManager::from_config(SessionConfig::from_env()?, store, env)?;
//!
//! let mut session = manager.open(cookie.as_deref()).await?;
//! session.insert("user_id", 42);
//! if let Some(id) = manager.save(&mut session).await? {
//!     set_cookie(id.as_str());
//! }
//! ```

use crate::config::SessionConfig;
use crate::strategy::Locking;
use chrono::{DateTime, Utc};
use composable_session_core::{
    IdCheck, KeyValueStore, LockingStrategy, RequestContext, Result, SessionData,
    SessionEnvironment, SessionId, SessionSigner, SessionValue, SetOptions,
};

/// How the session id of a request was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOrigin {
    /// The client presented a valid id.
    Presented,
    /// The client presented nothing; a fresh id was issued.
    Issued,
    /// The client presented an invalid id; it was reported and replaced.
    Reissued,
}

/// A session opened for one request.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    id: SessionId,
    origin: IdOrigin,
    data: SessionData,
    found: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    ctx: RequestContext,
}

impl ActiveSession {
    fn fresh(id: SessionId, origin: IdOrigin, ctx: RequestContext) -> Self {
        Self {
            id,
            origin,
            data: SessionData::new(),
            found: false,
            created_at: None,
            updated_at: None,
            ctx: RequestContext {
                is_new: true,
                ..ctx
            },
        }
    }

    /// Session id to hand back to the client.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// How the id was obtained.
    #[must_use]
    pub const fn origin(&self) -> IdOrigin {
        self.origin
    }

    /// No stored record exists for this session yet.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.ctx.is_new
    }

    /// First write time, if stored.
    #[must_use]
    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Last write time, if stored.
    #[must_use]
    pub const fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Attribute bag.
    #[must_use]
    pub const fn data(&self) -> &SessionData {
        &self.data
    }

    /// Mutable attribute bag.
    pub fn data_mut(&mut self) -> &mut SessionData {
        &mut self.data
    }

    /// Read one attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.data.get(key)
    }

    /// Set one attribute, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<SessionValue>,
    ) -> Option<SessionValue> {
        self.data.insert(key.into(), value.into())
    }

    /// Remove one attribute.
    pub fn remove(&mut self, key: &str) -> Option<SessionValue> {
        self.data.remove(key)
    }

    /// Remove every attribute; a following save deletes the stored session.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Request context carried between calls.
    #[must_use]
    pub const fn context(&self) -> &RequestContext {
        &self.ctx
    }
}

/// Opens, saves and destroys sessions through a [`LockingStrategy`].
pub struct SessionManager<L> {
    signer: SessionSigner,
    strategy: L,
    env: SessionEnvironment,
}

impl<S: KeyValueStore> SessionManager<Locking<S>> {
    /// Build a manager from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The configuration is invalid → `Config`
    /// - No secret key is configured → `MissingSecretKey`
    pub fn from_config(config: &SessionConfig, store: S, env: SessionEnvironment) -> Result<Self> {
        config.validate()?;
        let signer = config.signer()?;
        let strategy = Locking::from_config(config, store, env.clone());

        tracing::info!(
            table = %config.table.name,
            locking = ?config.locking,
            shadow_keys = config.shadow_keys.len(),
            "Session manager configured"
        );
        Ok(Self::new(signer, strategy, env))
    }
}

impl<L: LockingStrategy> SessionManager<L> {
    /// Create a manager.
    #[must_use]
    pub const fn new(signer: SessionSigner, strategy: L, env: SessionEnvironment) -> Self {
        Self {
            signer,
            strategy,
            env,
        }
    }

    /// Strategy in use.
    pub const fn strategy(&self) -> &L {
        &self.strategy
    }

    /// Id signer in use.
    pub const fn signer(&self) -> &SessionSigner {
        &self.signer
    }

    /// Open the session for a request.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`LockingStrategy::get`]. An invalid presented
    /// id is not an error: it is reported and replaced.
    pub async fn open(&self, presented: Option<&str>) -> Result<ActiveSession> {
        self.open_with(presented, RequestContext::new()).await
    }

    /// Open the session with a caller-supplied context (e.g. carrying a
    /// request id).
    ///
    /// # Errors
    ///
    /// See [`SessionManager::open`].
    pub async fn open_with(
        &self,
        presented: Option<&str>,
        mut ctx: RequestContext,
    ) -> Result<ActiveSession> {
        match self.signer.check(presented) {
            IdCheck::Missing => {
                let session = ActiveSession::fresh(self.signer.generate(), IdOrigin::Issued, ctx);
                tracing::debug!(session_id = session.id.log_prefix(), "Issued new session");
                Ok(session)
            }
            IdCheck::Invalid(err) => {
                self.env.errors.handle(&err, &ctx);
                let session = ActiveSession::fresh(self.signer.generate(), IdOrigin::Reissued, ctx);
                tracing::debug!(
                    session_id = session.id.log_prefix(),
                    "Replaced invalid session id"
                );
                Ok(session)
            }
            IdCheck::Valid(id) => {
                let snapshot = self.strategy.get(&id, &mut ctx).await?;
                Ok(ActiveSession {
                    id,
                    origin: IdOrigin::Presented,
                    data: snapshot.attributes,
                    found: snapshot.found,
                    created_at: snapshot.created_at,
                    updated_at: snapshot.updated_at,
                    ctx,
                })
            }
        }
    }

    /// Persist the session at the end of a request.
    ///
    /// # Returns
    ///
    /// The id written, or `None` when the session is empty. An empty session
    /// that was stored before is deleted; otherwise any held lock is released.
    ///
    /// # Errors
    ///
    /// Propagates errors from the strategy.
    pub async fn save(&self, session: &mut ActiveSession) -> Result<Option<SessionId>> {
        self.save_with(session, SetOptions::new()).await
    }

    /// Persist with forced columns or write preconditions.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::save`].
    pub async fn save_with(
        &self,
        session: &mut ActiveSession,
        options: SetOptions,
    ) -> Result<Option<SessionId>> {
        if session.data.is_empty() {
            if session.found {
                self.strategy.delete(&session.id, &mut session.ctx).await?;
                session.found = false;
            } else {
                self.strategy.release(&session.id, &mut session.ctx).await?;
            }
            return Ok(None);
        }

        let written = self
            .strategy
            .set(&session.id, &session.data, options, &mut session.ctx)
            .await?;
        session.found = true;
        Ok(written)
    }

    /// Delete the session.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`LockingStrategy::delete`].
    pub async fn destroy(&self, mut session: ActiveSession) -> Result<()> {
        self.strategy.delete(&session.id, &mut session.ctx).await
    }
}

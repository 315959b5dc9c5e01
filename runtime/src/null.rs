//! Locking strategy without mutual exclusion.
//!
//! Concurrent writers to the same session are resolved by the store's
//! per-column atomicity: the last writer wins for each column it touches.

use crate::metrics;
use crate::write::{plan_write, write_error};
use composable_session_core::handler::observe;
use composable_session_core::locking::stored_body;
use composable_session_core::{
    Expectations, KeyValueStore, LockingStrategy, RequestContext, Result, SessionData,
    SessionEnvironment, SessionId, SessionSnapshot, SetOptions,
};

/// Change detection plus last-writer-wins writes.
///
/// One store call per operation: `get_item` for `get`, `update_item` for
/// `set`, `delete_item` for `delete`.
#[derive(Clone)]
pub struct NullLocking<S> {
    store: S,
    shadow_keys: Vec<String>,
    env: SessionEnvironment,
}

impl<S: KeyValueStore> NullLocking<S> {
    /// Create a strategy over `store`, mirroring `shadow_keys` into columns.
    #[must_use]
    pub const fn new(store: S, shadow_keys: Vec<String>, env: SessionEnvironment) -> Self {
        Self {
            store,
            shadow_keys,
            env,
        }
    }

    /// Underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    async fn load(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<SessionSnapshot> {
        tracing::debug!(session_id = id.log_prefix(), "Loading session");
        metrics::record_store_operation("get");

        let item = self.store.get_item(id.as_str()).await?;
        let snapshot = SessionSnapshot::from_item(item.as_ref())?;

        ctx.prior_body = stored_body(item.as_ref());
        ctx.is_new = !snapshot.found;
        Ok(snapshot)
    }

    async fn write(
        &self,
        id: &SessionId,
        attributes: &SessionData,
        options: &SetOptions,
        ctx: &mut RequestContext,
    ) -> Result<Option<SessionId>> {
        let plan = plan_write(
            attributes,
            options,
            ctx,
            &self.shadow_keys,
            self.env.clock.now(),
        )?;

        tracing::debug!(
            session_id = id.log_prefix(),
            data_written = plan.data_written,
            "Writing session"
        );
        metrics::record_store_operation("update");

        self.store
            .update_item(id.as_str(), &plan.update)
            .await
            .map_err(|e| write_error(e, id))?;

        metrics::record_write(plan.data_written);
        plan.commit(ctx);
        Ok(Some(id.clone()))
    }

    async fn remove(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<()> {
        tracing::debug!(session_id = id.log_prefix(), "Deleting session");
        metrics::record_store_operation("delete");

        self.store.delete_item(id.as_str(), &Expectations::all()).await?;

        ctx.prior_body = None;
        ctx.is_new = true;
        Ok(())
    }
}

impl<S: KeyValueStore> LockingStrategy for NullLocking<S> {
    async fn get(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<SessionSnapshot> {
        let result = self.load(id, ctx).await;
        observe(self.env.errors.as_ref(), ctx, result)
    }

    async fn set(
        &self,
        id: &SessionId,
        attributes: &SessionData,
        options: SetOptions,
        ctx: &mut RequestContext,
    ) -> Result<Option<SessionId>> {
        if attributes.is_empty() {
            return Ok(None);
        }

        let result = self.write(id, attributes, &options, ctx).await;
        observe(self.env.errors.as_ref(), ctx, result)
    }

    async fn delete(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<()> {
        let result = self.remove(id, ctx).await;
        observe(self.env.errors.as_ref(), ctx, result)
    }
}

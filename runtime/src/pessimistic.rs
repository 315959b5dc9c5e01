//! Exclusive per-session locking.
//!
//! `get` takes a lock by conditionally writing a holder token and timestamp
//! into the session record; `set` and `delete` release it. Abandoned locks
//! become seizable once older than the configured expiry.
//!
//! ```text
//!            get: put lock_flag/lock_time
//!            if absent OR lock_time < now - expiry
//! Unlocked ─────────────────────────────────────► Locked
//!    ▲                                              │
//!    └──────────── set / delete / release ──────────┘
//!           expects lock_flag == holder token
//! ```
//!
//! A failed `set` or `delete` still drops the lock it holds.

use crate::config::LockConfig;
use crate::metrics;
use crate::retry::Backoff;
use crate::write::{plan_write, write_error};
use composable_session_core::handler::observe;
use composable_session_core::locking::stored_body;
use composable_session_core::{
    AttributeValue, Condition, Expectations, ItemUpdate, KeyValueStore, LockingStrategy,
    RequestContext, Result, SessionData, SessionEnvironment, SessionError, SessionId,
    SessionSnapshot, SetOptions, StoreError, columns,
};
use uuid::Uuid;

/// Lock-on-read strategy.
#[derive(Clone)]
pub struct PessimisticLocking<S> {
    store: S,
    shadow_keys: Vec<String>,
    lock: LockConfig,
    env: SessionEnvironment,
}

impl<S: KeyValueStore> PessimisticLocking<S> {
    /// Create a strategy over `store`.
    #[must_use]
    pub const fn new(
        store: S,
        shadow_keys: Vec<String>,
        lock: LockConfig,
        env: SessionEnvironment,
    ) -> Self {
        Self {
            store,
            shadow_keys,
            lock,
            env,
        }
    }

    /// Underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Lock tuning in effect.
    pub const fn lock_config(&self) -> &LockConfig {
        &self.lock
    }

    fn lock_update(&self, token: &str) -> ItemUpdate {
        let now_ms = self.env.clock.now().timestamp_millis();
        let expiry_ms = i64::try_from(self.lock.expiry.as_millis()).unwrap_or(i64::MAX);

        let mut update = ItemUpdate::new();
        update
            .put(columns::LOCK_FLAG, AttributeValue::Text(token.to_string()))
            .put(columns::LOCK_TIME, AttributeValue::Number(now_ms));
        update.expected = Expectations::any()
            .expect(columns::LOCK_FLAG, Condition::Absent)
            .expect(
                columns::LOCK_TIME,
                Condition::LessThan(now_ms.saturating_sub(expiry_ms)),
            );
        update
    }

    async fn acquire(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<SessionSnapshot> {
        let token = Uuid::new_v4().to_string();
        let mut backoff = Backoff::start(&self.lock.retry, self.env.clock.now());

        let item = loop {
            metrics::record_store_operation("update");
            match self.store.update_item(id.as_str(), &self.lock_update(&token)).await {
                Ok(item) => break item,
                Err(StoreError::ConditionalCheckFailed) => {}
                Err(other) => return Err(other.into()),
            }

            let now = self.env.clock.now();
            let Some(delay) = backoff.next_delay(now) else {
                metrics::record_lock("timeout");
                return Err(SessionError::LockTimeout {
                    id: id.log_prefix().to_string(),
                    attempts: backoff.attempts(),
                    waited: backoff.elapsed(now),
                });
            };

            tracing::debug!(
                session_id = id.log_prefix(),
                attempt = backoff.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Session locked, retrying"
            );
            self.env.scheduler.sleep(delay).await;
        };

        let outcome = if backoff.attempts() > 1 {
            "contended"
        } else {
            "acquired"
        };
        metrics::record_lock(outcome);
        tracing::debug!(
            session_id = id.log_prefix(),
            attempts = backoff.attempts(),
            "Session lock acquired"
        );

        ctx.lock_token = Some(token);
        let snapshot = match SessionSnapshot::from_item(Some(&item)) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.abandon_lock(id, ctx).await;
                return Err(err);
            }
        };

        ctx.prior_body = stored_body(Some(&item));
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
        let result = self.write_and_unlock(id, attributes, options, ctx).await;
        if result.is_err() {
            self.abandon_lock(id, ctx).await;
        }
        result
    }

    async fn write_and_unlock(
        &self,
        id: &SessionId,
        attributes: &SessionData,
        options: &SetOptions,
        ctx: &mut RequestContext,
    ) -> Result<Option<SessionId>> {
        let mut plan = plan_write(
            attributes,
            options,
            ctx,
            &self.shadow_keys,
            self.env.clock.now(),
        )?;

        plan.update.delete(columns::LOCK_FLAG).delete(columns::LOCK_TIME);
        plan.update
            .expected
            .conditions
            .push((columns::LOCK_FLAG.to_string(), ownership(ctx)));

        tracing::debug!(
            session_id = id.log_prefix(),
            data_written = plan.data_written,
            "Writing session and releasing lock"
        );
        metrics::record_store_operation("update");

        self.store
            .update_item(id.as_str(), &plan.update)
            .await
            .map_err(|e| write_error(e, id))?;

        metrics::record_write(plan.data_written);
        ctx.lock_token = None;
        plan.commit(ctx);
        Ok(Some(id.clone()))
    }

    async fn remove(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<()> {
        tracing::debug!(session_id = id.log_prefix(), "Deleting session");
        metrics::record_store_operation("delete");

        let expected = Expectations::all().expect(columns::LOCK_FLAG, ownership(ctx));
        let result = self
            .store
            .delete_item(id.as_str(), &expected)
            .await
            .map_err(|e| write_error(e, id));
        if let Err(err) = result {
            self.abandon_lock(id, ctx).await;
            return Err(err);
        }

        ctx.lock_token = None;
        ctx.prior_body = None;
        ctx.is_new = true;
        Ok(())
    }

    /// Drop a held lock after a failed operation.
    async fn abandon_lock(&self, id: &SessionId, ctx: &mut RequestContext) {
        if let Err(unlock) = self.unlock(id, ctx).await {
            tracing::warn!(
                session_id = id.log_prefix(),
                error = %unlock,
                "Failed to release lock after error"
            );
        }
    }

    async fn unlock(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<()> {
        let Some(token) = ctx.lock_token.take() else {
            return Ok(());
        };

        let mut update = ItemUpdate::new();
        update.delete(columns::LOCK_FLAG).delete(columns::LOCK_TIME);
        update.expected = Expectations::all().expect(
            columns::LOCK_FLAG,
            Condition::Equals(AttributeValue::Text(token)),
        );

        metrics::record_store_operation("update");
        match self.store.update_item(id.as_str(), &update).await {
            Ok(_) => {
                tracing::debug!(session_id = id.log_prefix(), "Session lock released");
                Ok(())
            }
            Err(StoreError::ConditionalCheckFailed) => {
                tracing::warn!(
                    session_id = id.log_prefix(),
                    "Session lock was seized before release"
                );
                Ok(())
            }
            Err(other) => Err(other.into()),
        }
    }
}

/// Lock ownership a write must prove.
fn ownership(ctx: &RequestContext) -> Condition {
    match &ctx.lock_token {
        Some(token) => Condition::Equals(AttributeValue::Text(token.clone())),
        None => Condition::Absent,
    }
}

impl<S: KeyValueStore> LockingStrategy for PessimisticLocking<S> {
    async fn get(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<SessionSnapshot> {
        let result = self.acquire(id, ctx).await;
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

    async fn release(&self, id: &SessionId, ctx: &mut RequestContext) -> Result<()> {
        let result = self.unlock(id, ctx).await;
        observe(self.env.errors.as_ref(), ctx, result)
    }
}

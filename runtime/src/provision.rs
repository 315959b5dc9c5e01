//! Table provisioning.
//!
//! Blocking helpers for setup scripts and tests; never on the request path.

use crate::retry::{Backoff, RetryPolicy};
use composable_session_core::handler::observe;
use composable_session_core::{
    RequestContext, Result, SessionEnvironment, SessionError, StoreError, TableAdmin, TableSpec,
    TableStatus,
};

/// Create a table if needed.
///
/// An existing table counts as success. With a `wait` policy, polls until
/// the table is `Active`.
///
/// # Errors
///
/// Returns error if:
/// - The admin call fails → `StoreUnavailable`
/// - The table is not active within the policy → `TableNotReady`
pub async fn ensure_table<A: TableAdmin>(
    admin: &A,
    spec: &TableSpec,
    wait: Option<&RetryPolicy>,
    env: &SessionEnvironment,
) -> Result<()> {
    let result = create(admin, spec, wait, env).await;
    observe(env.errors.as_ref(), &RequestContext::new(), result)
}

async fn create<A: TableAdmin>(
    admin: &A,
    spec: &TableSpec,
    wait: Option<&RetryPolicy>,
    env: &SessionEnvironment,
) -> Result<()> {
    match admin.create_table(spec).await {
        Ok(()) => tracing::info!(table = %spec.name, "Requested table creation"),
        Err(StoreError::TableExists(_)) => {
            tracing::debug!(table = %spec.name, "Table already exists");
        }
        Err(other) => return Err(other.into()),
    }

    match wait {
        Some(policy) => wait_for_status(admin, &spec.name, TableStatus::Active, policy, env).await,
        None => Ok(()),
    }
}

/// Delete a table if present.
///
/// A missing table counts as success. With a `wait` policy, polls until the
/// table is gone.
///
/// # Errors
///
/// Returns error if:
/// - The admin call fails → `StoreUnavailable`
/// - The table is still present when the policy runs out → `TableNotReady`
pub async fn drop_table<A: TableAdmin>(
    admin: &A,
    name: &str,
    wait: Option<&RetryPolicy>,
    env: &SessionEnvironment,
) -> Result<()> {
    let result = delete(admin, name, wait, env).await;
    observe(env.errors.as_ref(), &RequestContext::new(), result)
}

async fn delete<A: TableAdmin>(
    admin: &A,
    name: &str,
    wait: Option<&RetryPolicy>,
    env: &SessionEnvironment,
) -> Result<()> {
    match admin.delete_table(name).await {
        Ok(()) => tracing::info!(table = %name, "Requested table deletion"),
        Err(StoreError::TableNotFound(_)) => {
            tracing::debug!(table = %name, "Table already absent");
        }
        Err(other) => return Err(other.into()),
    }

    match wait {
        Some(policy) => wait_for_status(admin, name, TableStatus::Missing, policy, env).await,
        None => Ok(()),
    }
}

async fn wait_for_status<A: TableAdmin>(
    admin: &A,
    name: &str,
    target: TableStatus,
    policy: &RetryPolicy,
    env: &SessionEnvironment,
) -> Result<()> {
    let mut backoff = Backoff::start(policy, env.clock.now());

    loop {
        let status = admin.table_status(name).await?;
        if status == target {
            tracing::info!(table = %name, status = ?status, "Table ready");
            return Ok(());
        }

        let Some(delay) = backoff.next_delay(env.clock.now()) else {
            return Err(SessionError::TableNotReady {
                table: name.to_string(),
            });
        };

        tracing::debug!(
            table = %name,
            status = ?status,
            attempt = backoff.attempts(),
            "Waiting for table"
        );
        env.scheduler.sleep(delay).await;
    }
}

//! Integration tests for `PessimisticLocking`
//!
//! Lock acquisition, release, stale-lock seizure and timeouts. Most tests
//! drive time through the manual clock and scheduler; one runs real tokio
//! tasks contending for the same session.

#![allow(clippy::unwrap_used)] // Tests can use unwrap

use composable_session_core::{
    AttributeValue, Clock, Condition, Item, LockingStrategy, RequestContext, SessionData, SessionEnvironment,
    SessionError, SessionId, SessionValue, SetOptions, columns,
};
use composable_session_runtime::{LockConfig, PessimisticLocking, RetryPolicy};
use composable_session_testing::{InMemoryStore, TestHarness, test_signer};
use std::sync::Arc;
use std::time::Duration;

fn quick_retry(max_retries: usize) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(100))
        .multiplier(2.0)
        .max_delay(Duration::from_secs(1))
        .build()
}

fn setup(lock: LockConfig) -> (InMemoryStore, PessimisticLocking<InMemoryStore>, TestHarness) {
    let harness = TestHarness::new();
    let store = InMemoryStore::new();
    let locking = PessimisticLocking::new(store.clone(), vec![], lock, harness.environment());
    (store, locking, harness)
}

fn new_id() -> SessionId {
    test_signer().generate()
}

fn data(pairs: &[(&str, SessionValue)]) -> SessionData {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_get_takes_lock() {
    let (store, locking, harness) = setup(LockConfig::default());
    let id = new_id();
    let mut ctx = RequestContext::new();

    let snapshot = locking.get(&id, &mut ctx).await.unwrap();

    assert!(!snapshot.found);
    assert!(ctx.is_new);
    let token = ctx.lock_token.clone().unwrap();
    let item = store.item(id.as_str()).unwrap();
    assert_eq!(item[columns::LOCK_FLAG], AttributeValue::Text(token));
    assert_eq!(
        item[columns::LOCK_TIME],
        AttributeValue::Number(harness.clock.now().timestamp_millis())
    );
}

#[tokio::test]
async fn test_set_writes_and_releases() {
    let (store, locking, _harness) = setup(LockConfig::default());
    let id = new_id();
    let mut ctx = RequestContext::new();
    locking.get(&id, &mut ctx).await.unwrap();
    let token = ctx.lock_token.clone().unwrap();

    let attrs = data(&[("user", "alice".into())]);
    locking.set(&id, &attrs, SetOptions::new(), &mut ctx).await.unwrap();

    let update = store.last_update().unwrap();
    assert!(update.expected.conditions.contains(&(
        columns::LOCK_FLAG.to_string(),
        Condition::Equals(AttributeValue::Text(token))
    )));

    let item = store.item(id.as_str()).unwrap();
    assert!(!item.contains_key(columns::LOCK_FLAG));
    assert!(!item.contains_key(columns::LOCK_TIME));
    assert!(item.contains_key(columns::CREATED_AT));
    assert!(!ctx.holds_lock());

    let mut next = RequestContext::new();
    let snapshot = locking.get(&id, &mut next).await.unwrap();
    assert_eq!(snapshot.attributes, attrs);
}

#[tokio::test]
async fn test_unchanged_set_still_releases_lock() {
    let (store, locking, _harness) = setup(LockConfig::default());
    let id = new_id();
    let attrs = data(&[("user", "alice".into())]);
    let mut ctx = RequestContext::new();
    locking.get(&id, &mut ctx).await.unwrap();
    locking.set(&id, &attrs, SetOptions::new(), &mut ctx).await.unwrap();

    let mut ctx = RequestContext::new();
    let snapshot = locking.get(&id, &mut ctx).await.unwrap();
    locking
        .set(&id, &snapshot.attributes, SetOptions::new(), &mut ctx)
        .await
        .unwrap();

    let update = store.last_update().unwrap();
    assert!(!update.touches(columns::DATA));
    assert!(update.touches(columns::LOCK_FLAG));
    assert!(!store.item(id.as_str()).unwrap().contains_key(columns::LOCK_FLAG));
}

#[tokio::test]
async fn test_contended_lock_times_out() {
    let lock = LockConfig::default().with_retry(quick_retry(3));
    let (store, locking, harness) = setup(lock);
    let id = new_id();
    locking.get(&id, &mut RequestContext::new()).await.unwrap();

    let result = locking.get(&id, &mut RequestContext::new()).await;

    assert_eq!(
        result,
        Err(SessionError::LockTimeout {
            id: id.log_prefix().to_string(),
            attempts: 4,
            waited: Duration::from_millis(700),
        })
    );
    assert_eq!(
        harness.scheduler.sleeps(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
        ]
    );
    assert_eq!(store.call_count(), 5);
    assert_eq!(harness.errors.count(), 1);
    assert_eq!(harness.errors.errors()[0].kind(), "lock_timeout");
}

#[tokio::test]
async fn test_elapsed_budget_bounds_waiting() {
    let retry = RetryPolicy::builder()
        .max_retries(100)
        .initial_delay(Duration::from_millis(500))
        .multiplier(1.0)
        .max_elapsed(Some(Duration::from_secs(2)))
        .build();
    let (_store, locking, harness) = setup(LockConfig::default().with_retry(retry));
    let id = new_id();
    locking.get(&id, &mut RequestContext::new()).await.unwrap();

    let result = locking.get(&id, &mut RequestContext::new()).await;

    assert!(matches!(result, Err(SessionError::LockTimeout { attempts: 5, .. })));
    assert_eq!(harness.scheduler.total_slept(), Duration::from_secs(2));
}

#[tokio::test]
async fn test_live_lock_is_not_seized_before_expiry() {
    let lock = LockConfig::default()
        .with_expiry(Duration::from_secs(30))
        .with_retry(quick_retry(0));
    let (_store, locking, harness) = setup(lock);
    let id = new_id();
    locking.get(&id, &mut RequestContext::new()).await.unwrap();

    harness.clock.advance(Duration::from_secs(29));
    let result = locking.get(&id, &mut RequestContext::new()).await;

    assert!(matches!(result, Err(SessionError::LockTimeout { attempts: 1, .. })));
}

#[tokio::test]
async fn test_stale_lock_is_seized() {
    let lock = LockConfig::default()
        .with_expiry(Duration::from_secs(30))
        .with_retry(quick_retry(0));
    let (store, locking, harness) = setup(lock);
    let id = new_id();

    let mut abandoned = RequestContext::new();
    locking.get(&id, &mut abandoned).await.unwrap();

    harness.clock.advance(Duration::from_secs(31));
    let mut fresh = RequestContext::new();
    locking.get(&id, &mut fresh).await.unwrap();

    assert_ne!(fresh.lock_token, abandoned.lock_token);
    assert_eq!(
        store.item(id.as_str()).unwrap()[columns::LOCK_FLAG],
        AttributeValue::Text(fresh.lock_token.clone().unwrap())
    );

    // The original holder lost its lock and must not write
    let result = locking
        .set(&id, &data(&[("who", "abandoned".into())]), SetOptions::new(), &mut abandoned)
        .await;
    assert_eq!(
        result,
        Err(SessionError::ConditionFailed {
            id: id.log_prefix().to_string()
        })
    );

    locking
        .set(&id, &data(&[("who", "fresh".into())]), SetOptions::new(), &mut fresh)
        .await
        .unwrap();
    let snapshot = locking.get(&id, &mut RequestContext::new()).await.unwrap();
    assert_eq!(snapshot.attributes.get("who"), Some(&SessionValue::from("fresh")));
}

#[tokio::test]
async fn test_stale_holder_cannot_delete_seized_session() {
    let lock = LockConfig::default()
        .with_expiry(Duration::from_secs(30))
        .with_retry(quick_retry(0));
    let (store, locking, harness) = setup(lock);
    let id = new_id();

    let mut seed = RequestContext::new();
    locking.get(&id, &mut seed).await.unwrap();
    locking
        .set(&id, &data(&[("who", "seed".into())]), SetOptions::new(), &mut seed)
        .await
        .unwrap();

    let mut stale = RequestContext::new();
    locking.get(&id, &mut stale).await.unwrap();
    harness.clock.advance(Duration::from_secs(31));
    let mut fresh = RequestContext::new();
    locking.get(&id, &mut fresh).await.unwrap();

    let result = locking.delete(&id, &mut stale).await;

    assert_eq!(
        result,
        Err(SessionError::ConditionFailed {
            id: id.log_prefix().to_string()
        })
    );
    assert!(!stale.holds_lock());
    let item = store.item(id.as_str()).unwrap();
    assert_eq!(
        item[columns::LOCK_FLAG],
        AttributeValue::Text(fresh.lock_token.clone().unwrap())
    );

    locking
        .set(&id, &data(&[("who", "fresh".into())]), SetOptions::new(), &mut fresh)
        .await
        .unwrap();
    let snapshot = locking.get(&id, &mut RequestContext::new()).await.unwrap();
    assert_eq!(snapshot.attributes.get("who"), Some(&SessionValue::from("fresh")));
}

#[tokio::test]
async fn test_delete_of_unknown_session_is_noop() {
    let (store, locking, _harness) = setup(LockConfig::default());
    let id = new_id();

    locking.delete(&id, &mut RequestContext::new()).await.unwrap();

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_failed_set_releases_lock() {
    let lock = LockConfig::default().with_retry(quick_retry(0));
    let (store, locking, _harness) = setup(lock);
    let id = new_id();
    let mut ctx = RequestContext::new();
    locking.get(&id, &mut ctx).await.unwrap();

    let options = SetOptions::new().expect("version", Condition::Present);
    let result = locking
        .set(&id, &data(&[("n", 1.into())]), options, &mut ctx)
        .await;

    assert_eq!(
        result,
        Err(SessionError::ConditionFailed {
            id: id.log_prefix().to_string()
        })
    );
    assert!(!ctx.holds_lock());
    assert!(
        store
            .item(id.as_str())
            .is_none_or(|item| !item.contains_key(columns::LOCK_FLAG))
    );

    let mut next = RequestContext::new();
    locking.get(&id, &mut next).await.unwrap();
    assert!(next.holds_lock());
}

#[tokio::test]
async fn test_rejected_set_releases_lock() {
    let lock = LockConfig::default().with_retry(quick_retry(0));
    let (store, locking, _harness) = setup(lock);
    let id = new_id();
    let mut ctx = RequestContext::new();
    locking.get(&id, &mut ctx).await.unwrap();

    let options =
        SetOptions::new().force(columns::LOCK_FLAG, AttributeValue::Text("forged".into()));
    let result = locking
        .set(&id, &data(&[("n", 1.into())]), options, &mut ctx)
        .await;

    assert_eq!(
        result,
        Err(SessionError::ReservedAttribute(columns::LOCK_FLAG.to_string()))
    );
    assert!(!ctx.holds_lock());
    assert!(store.is_empty());
    locking.get(&id, &mut RequestContext::new()).await.unwrap();
}

#[tokio::test]
async fn test_release_removes_lock_only_record() {
    let lock = LockConfig::default().with_retry(quick_retry(0));
    let (store, locking, _harness) = setup(lock);
    let id = new_id();
    let mut ctx = RequestContext::new();
    locking.get(&id, &mut ctx).await.unwrap();

    locking.release(&id, &mut ctx).await.unwrap();

    assert!(!ctx.holds_lock());
    assert!(store.is_empty());
    locking.get(&id, &mut RequestContext::new()).await.unwrap();
}

#[tokio::test]
async fn test_release_after_seizure_is_tolerated() {
    let lock = LockConfig::default().with_retry(quick_retry(0));
    let (store, locking, harness) = setup(lock);
    let id = new_id();
    let mut first = RequestContext::new();
    locking.get(&id, &mut first).await.unwrap();

    harness.clock.advance(Duration::from_secs(31));
    let mut second = RequestContext::new();
    locking.get(&id, &mut second).await.unwrap();

    locking.release(&id, &mut first).await.unwrap();

    assert_eq!(harness.errors.count(), 0);
    assert_eq!(
        store.item(id.as_str()).unwrap()[columns::LOCK_FLAG],
        AttributeValue::Text(second.lock_token.unwrap())
    );
}

#[tokio::test]
async fn test_delete_removes_record_and_lock() {
    let (store, locking, _harness) = setup(LockConfig::default());
    let id = new_id();
    let mut ctx = RequestContext::new();
    locking.get(&id, &mut ctx).await.unwrap();
    locking
        .set(&id, &data(&[("n", 1.into())]), SetOptions::new(), &mut ctx)
        .await
        .unwrap();

    let mut ctx = RequestContext::new();
    locking.get(&id, &mut ctx).await.unwrap();
    locking.delete(&id, &mut ctx).await.unwrap();

    assert!(store.is_empty());
    assert!(!ctx.holds_lock());
}

#[tokio::test]
async fn test_empty_set_makes_no_store_calls() {
    let (store, locking, _harness) = setup(LockConfig::default());
    let id = new_id();
    let mut ctx = RequestContext::new();
    locking.get(&id, &mut ctx).await.unwrap();
    store.clear_calls();

    let result = locking
        .set(&id, &SessionData::new(), SetOptions::new(), &mut ctx)
        .await
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(store.call_count(), 0);
    assert!(ctx.holds_lock());
}

#[tokio::test]
async fn test_corrupt_body_releases_lock() {
    let (store, locking, harness) = setup(LockConfig::default());
    let id = new_id();
    let mut item = Item::new();
    item.insert(columns::DATA.into(), AttributeValue::Bytes(vec![0xff, 0xff, 0xff]));
    store.insert(id.as_str(), item);

    let mut ctx = RequestContext::new();
    let result = locking.get(&id, &mut ctx).await;

    assert!(matches!(result, Err(SessionError::CorruptSessionData(_))));
    assert!(!ctx.holds_lock());
    assert!(!store.item(id.as_str()).unwrap().contains_key(columns::LOCK_FLAG));
    assert_eq!(harness.errors.count(), 1);
}

#[tokio::test]
async fn test_waiter_acquires_after_holder_writes() {
    let store = InMemoryStore::new();
    let lock = LockConfig::default().with_retry(
        RetryPolicy::builder()
            .max_retries(100)
            .initial_delay(Duration::from_millis(5))
            .max_delay(Duration::from_millis(20))
            .build(),
    );
    let locking = Arc::new(PessimisticLocking::new(
        store.clone(),
        vec![],
        lock,
        SessionEnvironment::production(),
    ));
    let id = new_id();
    let attrs = data(&[("step", "holder".into())]);

    let mut holder = RequestContext::new();
    locking.get(&id, &mut holder).await.unwrap();

    let waiter = {
        let locking = Arc::clone(&locking);
        let id = id.clone();
        tokio::spawn(async move {
            let mut ctx = RequestContext::new();
            let snapshot = locking.get(&id, &mut ctx).await;
            (snapshot, ctx)
        })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    locking.set(&id, &attrs, SetOptions::new(), &mut holder).await.unwrap();

    let (snapshot, ctx) = waiter.await.unwrap();
    assert_eq!(snapshot.unwrap().attributes, attrs);
    assert!(ctx.holds_lock());
}

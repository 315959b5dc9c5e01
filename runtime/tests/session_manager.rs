//! Integration tests for `SessionManager`
//!
//! Full request cycles over both strategies: id issuance, invalid-id
//! replacement, saving, empty-session cleanup and destruction.

#![allow(clippy::unwrap_used)] // Tests can use unwrap

use composable_session_core::{
    AttributeValue, Condition, SessionError, SessionValue, SetOptions, columns,
};
use composable_session_runtime::{
    IdOrigin, Locking, LockingMode, SessionConfig, SessionManager, TableConfig,
};
use composable_session_testing::{InMemoryStore, StoreCall, TEST_SECRET, TestHarness};

fn setup(mode: LockingMode) -> (SessionManager<Locking<InMemoryStore>>, InMemoryStore, TestHarness) {
    let harness = TestHarness::new();
    let store = InMemoryStore::new();
    let config = SessionConfig::new(TEST_SECRET)
        .with_locking(mode)
        .with_shadow_keys(["user_id"]);
    let manager = SessionManager::from_config(&config, store.clone(), harness.environment()).unwrap();
    (manager, store, harness)
}

#[tokio::test]
async fn test_request_cycle() {
    for mode in [LockingMode::Null, LockingMode::Pessimistic] {
        let (manager, store, harness) = setup(mode);

        let mut session = manager.open(None).await.unwrap();
        assert_eq!(session.origin(), IdOrigin::Issued);
        assert!(session.is_new());
        assert_eq!(store.call_count(), 0);

        session.insert("user_id", 42);
        let id = manager.save(&mut session).await.unwrap().unwrap();
        assert_eq!(&id, session.id());
        assert!(!session.is_new());
        assert_eq!(
            store.item(id.as_str()).unwrap().get("user_id"),
            Some(&AttributeValue::Value(SessionValue::Int(42)))
        );

        let reopened = manager.open(Some(id.as_str())).await.unwrap();
        assert_eq!(reopened.origin(), IdOrigin::Presented);
        assert!(!reopened.is_new());
        assert_eq!(reopened.get("user_id"), Some(&SessionValue::Int(42)));
        assert!(reopened.created_at().is_some());
        assert_eq!(harness.errors.count(), 0);
    }
}

#[tokio::test]
async fn test_tampered_id_is_reported_once_and_replaced() {
    let (manager, store, harness) = setup(LockingMode::Null);
    let issued = manager.open(None).await.unwrap();
    let mut tampered = issued.id().as_str().to_string();
    tampered.push('x');

    let session = manager.open(Some(&tampered)).await.unwrap();

    assert_eq!(session.origin(), IdOrigin::Reissued);
    assert_ne!(session.id().as_str(), tampered);
    assert!(session.is_new());
    assert_eq!(harness.errors.count(), 1);
    assert!(harness.errors.errors()[0].is_integrity_issue());
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_empty_presented_id_is_missing() {
    let (manager, _store, harness) = setup(LockingMode::Null);

    let session = manager.open(Some("")).await.unwrap();

    assert_eq!(session.origin(), IdOrigin::Issued);
    assert_eq!(harness.errors.count(), 0);
}

#[tokio::test]
async fn test_unchanged_save_skips_body() {
    let (manager, store, _harness) = setup(LockingMode::Null);
    let mut session = manager.open(None).await.unwrap();
    session.insert("cart", vec!["sku-1"]);
    let id = manager.save(&mut session).await.unwrap().unwrap();

    let mut session = manager.open(Some(id.as_str())).await.unwrap();
    manager.save(&mut session).await.unwrap();

    let update = store.last_update().unwrap();
    assert!(!update.touches(columns::DATA));
    assert!(update.touches(columns::UPDATED_AT));
}

#[tokio::test]
async fn test_empty_save_of_stored_session_deletes_it() {
    for mode in [LockingMode::Null, LockingMode::Pessimistic] {
        let (manager, store, _harness) = setup(mode);
        let mut session = manager.open(None).await.unwrap();
        session.insert("user_id", 7);
        let id = manager.save(&mut session).await.unwrap().unwrap();

        let mut session = manager.open(Some(id.as_str())).await.unwrap();
        session.clear();
        let result = manager.save(&mut session).await.unwrap();

        assert_eq!(result, None);
        assert!(store.is_empty());
        assert_eq!(
            store.calls().last(),
            Some(&StoreCall::Delete(id.as_str().to_string()))
        );
    }
}

#[tokio::test]
async fn test_empty_save_of_fresh_session_writes_nothing() {
    let (manager, store, _harness) = setup(LockingMode::Null);
    let mut session = manager.open(None).await.unwrap();

    assert_eq!(manager.save(&mut session).await.unwrap(), None);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_empty_save_releases_lock_on_unknown_session() {
    let (manager, store, _harness) = setup(LockingMode::Pessimistic);
    let id = manager.signer().generate();

    let mut session = manager.open(Some(id.as_str())).await.unwrap();
    assert!(session.context().holds_lock());
    assert!(session.is_new());

    assert_eq!(manager.save(&mut session).await.unwrap(), None);
    assert!(!session.context().holds_lock());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_failed_save_releases_lock() {
    let (manager, store, _harness) = setup(LockingMode::Pessimistic);
    let mut session = manager.open(None).await.unwrap();
    session.insert("user_id", 1);
    let id = manager.save(&mut session).await.unwrap().unwrap();

    let mut session = manager.open(Some(id.as_str())).await.unwrap();
    session.insert("user_id", 2);
    let options = SetOptions::new().expect("version", Condition::Present);
    let result = manager.save_with(&mut session, options).await;

    assert!(matches!(result, Err(SessionError::ConditionFailed { .. })));
    assert!(!session.context().holds_lock());
    assert!(!store.item(id.as_str()).unwrap().contains_key(columns::LOCK_FLAG));

    let reopened = manager.open(Some(id.as_str())).await.unwrap();
    assert_eq!(reopened.get("user_id"), Some(&SessionValue::Int(1)));
}

#[tokio::test]
async fn test_destroy() {
    let (manager, store, _harness) = setup(LockingMode::Pessimistic);
    let mut session = manager.open(None).await.unwrap();
    session.insert("user_id", 1);
    let id = manager.save(&mut session).await.unwrap().unwrap();

    let session = manager.open(Some(id.as_str())).await.unwrap();
    manager.destroy(session).await.unwrap();

    assert!(store.is_empty());
    let reopened = manager.open(Some(id.as_str())).await.unwrap();
    assert!(reopened.is_new());
    assert!(reopened.data().is_empty());
}

#[tokio::test]
async fn test_from_config_rejections() {
    let harness = TestHarness::new();

    let result = SessionManager::from_config(
        &SessionConfig::new(""),
        InMemoryStore::new(),
        harness.environment(),
    );
    assert!(matches!(result, Err(SessionError::MissingSecretKey)));

    let result = SessionManager::from_config(
        &SessionConfig::new(TEST_SECRET).with_table(TableConfig::named("")),
        InMemoryStore::new(),
        harness.environment(),
    );
    assert!(matches!(result, Err(SessionError::Config(_))));
}

#[tokio::test]
async fn test_strategy_follows_config() {
    let (null, _, _) = setup(LockingMode::Null);
    let (pessimistic, _, _) = setup(LockingMode::Pessimistic);

    assert_eq!(null.strategy().mode(), LockingMode::Null);
    assert_eq!(pessimistic.strategy().mode(), LockingMode::Pessimistic);
}

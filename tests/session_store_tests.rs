use chrono::Duration;
use std::{collections::HashSet, sync::Arc};
use voting_portal::session::{
    InMemorySessionStore, SessionState, SessionStore, TOKEN_BYTES, spawn_purge_task,
};

#[tokio::test]
async fn test_create_then_resolve() {
    let store = InMemorySessionStore::default();
    let session = store.create(42).await.unwrap();

    assert_eq!(session.identity_id, 42);
    assert_eq!(session.token.len(), TOKEN_BYTES * 2);
    assert_eq!(store.resolve(&session.token).await, Some(42));
}

#[tokio::test]
async fn test_unknown_token_resolves_to_none() {
    let store = InMemorySessionStore::default();
    store.create(1).await.unwrap();

    assert_eq!(store.resolve("not-a-token").await, None);
    assert_eq!(store.resolve("").await, None);
}

#[tokio::test]
async fn test_destroy_is_idempotent() {
    let store = InMemorySessionStore::default();
    let session = store.create(5).await.unwrap();

    store.destroy(&session.token).await;
    assert_eq!(store.resolve(&session.token).await, None);

    // A second destroy and a destroy of an unknown token are both silent.
    store.destroy(&session.token).await;
    store.destroy("never-issued").await;
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_sessions_of_one_identity_are_independent() {
    let store = InMemorySessionStore::default();
    let first = store.create(9).await.unwrap();
    let second = store.create(9).await.unwrap();
    assert_ne!(first.token, second.token);

    store.destroy(&first.token).await;
    assert_eq!(store.resolve(&first.token).await, None);
    assert_eq!(store.resolve(&second.token).await, Some(9));
}

#[tokio::test]
async fn test_ttl_expiry_and_purge() {
    let expiring = InMemorySessionStore::new(Some(Duration::zero()));
    expiring.create(1).await.unwrap();
    expiring.create(2).await.unwrap();
    assert_eq!(expiring.len().await, 2);
    assert_eq!(expiring.purge_expired().await, 2);
    assert!(expiring.is_empty().await);

    let lasting = InMemorySessionStore::new(Some(Duration::hours(1)));
    let session = lasting.create(3).await.unwrap();
    assert_eq!(lasting.purge_expired().await, 0);
    assert_eq!(lasting.resolve(&session.token).await, Some(3));
}

#[tokio::test]
async fn test_purge_task_reclaims_sessions_nobody_resolves() {
    let store = Arc::new(InMemorySessionStore::new(Some(Duration::zero())));
    for identity_id in 0..100 {
        store.create(identity_id).await.unwrap();
    }
    assert_eq!(store.len().await, 100);

    let task = spawn_purge_task(store.clone(), std::time::Duration::from_millis(10));
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while !store.is_empty().await {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sessions were never purged");
    task.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_resolve_destroy() {
    let store: SessionState = Arc::new(InMemorySessionStore::default());

    let mut tasks = Vec::new();
    for identity_id in 0..64_i64 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let session = store.create(identity_id).await.unwrap();
            assert_eq!(store.resolve(&session.token).await, Some(identity_id));
            if identity_id % 2 == 0 {
                store.destroy(&session.token).await;
                assert_eq!(store.resolve(&session.token).await, None);
            }
            session
        }));
    }

    let mut tokens = HashSet::new();
    for task in tasks {
        let session = task.await.unwrap();
        assert!(tokens.insert(session.token.clone()), "token issued twice");

        let expected = (session.identity_id % 2 != 0).then_some(session.identity_id);
        assert_eq!(store.resolve(&session.token).await, expected);
    }
    assert_eq!(tokens.len(), 64);
}

//! Session lifecycle specs
//!
//! Verify lease renewal, destruction and plain locks.

use crate::prelude::*;

#[tokio::test(start_paused = true)]
async fn lease_outlives_its_ttl_while_renewed() {
    let store = store();
    let session = Session::start(store.clone(), session_config("worker"))
        .await
        .unwrap();
    let id = session.id().unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(session.id(), Some(id.clone()));
    assert!(store.inner().has_session(&id));
}

#[tokio::test(start_paused = true)]
async fn destroyed_lease_frees_its_lock_after_lock_delay() {
    let store = store();
    let leader = Session::start(store.clone(), session_config("leader"))
        .await
        .unwrap();
    let follower = Session::start(store.clone(), session_config("follower"))
        .await
        .unwrap();
    assert!(leader.lock("service/jobs/leader").await.unwrap());

    leader.destroy().await.unwrap();
    let start = tokio::time::Instant::now();
    let acquired = tokio::time::timeout(
        Duration::from_secs(120),
        follower.lock("service/jobs/leader"),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(acquired);
    assert!(start.elapsed() >= follower.lock_delay());
}

#[tokio::test(start_paused = true)]
async fn registry_shares_sessions_until_shutdown() {
    let store = store();
    let registry = Registry::new(store.clone());

    let semaphore = registry
        .semaphore(session_config("jobs"), group_config())
        .await
        .unwrap();
    let session = registry.session(session_config("jobs")).await.unwrap();
    assert_eq!(semaphore.session().id(), session.id());

    let id = session.id().unwrap();
    registry.shutdown().await;
    assert!(!store.inner().has_session(&id));
}

//! Semaphore recovery specs
//!
//! Verify that slots held by crashed or expired workers are reclaimed
//! without manual cleanup.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test(start_paused = true)]
async fn crashed_holder_is_replaced_after_ttl() {
    let store = store();
    let crashed = worker(&store, "crashed").await;
    let waiting = worker(&store, "waiting").await;
    let crashed_handle = crashed.lock(1).await.unwrap();
    let _waiting_handle = waiting.lock(1).await.unwrap();
    settle().await;
    assert!(!waiting.is_locked());

    // Process dies: no more renewals, no release
    drop(crashed_handle);
    drop(crashed);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!waiting.is_locked());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(waiting.is_locked());
    assert_eq!(
        lock_file(&store),
        Some(LockFile::new(1, [holder_id(&waiting)]))
    );
}

#[tokio::test(start_paused = true)]
async fn holder_losing_its_lease_gives_up_the_slot() {
    let store = store();
    let config = group_config().with_wait_timeout(Duration::from_secs(10));
    let holder = Semaphore::start(store.clone(), session_config("holder"), config)
        .await
        .unwrap();
    let waiting = worker(&store, "waiting").await;
    let _holder_handle = holder.lock(1).await.unwrap();
    let _waiting_handle = waiting.lock(1).await.unwrap();
    settle().await;
    let old = holder_id(&holder);

    store.inner().invalidate_session(&old);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_ne!(holder_id(&holder), old);
    assert!(holder.members().await.contains(&holder_id(&holder)));
    assert!(waiting.is_locked());
    assert!(!holder.is_locked());
    assert_eq!(
        lock_file(&store),
        Some(LockFile::new(1, [holder_id(&waiting)]))
    );
}

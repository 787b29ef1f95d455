//! Semaphore capacity specs
//!
//! Verify that a group never admits more holders than its limit.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test(start_paused = true)]
async fn five_workers_share_three_slots() {
    let store = store();
    let mut workers = Vec::new();
    let mut handles = Vec::new();
    for name in ["w1", "w2", "w3", "w4", "w5"] {
        let worker = worker(&store, name).await;
        handles.push(worker.lock(3).await.unwrap());
        workers.push(worker);
    }
    settle().await;

    let locked: Vec<_> = workers.iter().filter(|w| w.is_locked()).collect();
    assert_eq!(locked.len(), 3);

    let lock = lock_file(&store).unwrap();
    assert_eq!(lock.limit, 3);
    let expected: std::collections::BTreeSet<_> = locked.iter().map(|w| holder_id(w)).collect();
    assert_eq!(lock.holders, expected);
}

#[tokio::test(start_paused = true)]
async fn limit_of_one_admits_a_single_holder() {
    let store = store();
    let first = worker(&store, "first").await;
    let second = worker(&store, "second").await;

    let _first_handle = first.lock(1).await.unwrap();
    let _second_handle = second.lock(1).await.unwrap();
    settle().await;

    assert!(first.is_locked());
    assert!(!second.is_locked());
    assert_eq!(
        lock_file(&store),
        Some(LockFile::new(1, [holder_id(&first)]))
    );
    assert_eq!(second.members().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn first_limit_written_binds_the_group() {
    let store = store();
    let first = worker(&store, "first").await;
    let second = worker(&store, "second").await;
    let third = worker(&store, "third").await;

    let _first_handle = first.lock(2).await.unwrap();
    let _second_handle = second.lock(5).await.unwrap();
    let _third_handle = third.lock(5).await.unwrap();
    settle().await;

    assert_eq!(second.limit().await, 2);
    assert_eq!(third.limit().await, 2);
    assert!(!third.is_locked());
    assert_eq!(lock_file(&store).unwrap().limit, 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_attempts_do_not_rewrite_the_lock_file() {
    let store = store();
    let worker = worker(&store, "only").await;
    let _handle = worker.lock(3).await.unwrap();
    settle().await;

    let key = worker.lock_key().to_string();
    let before = store.inner().entry(&key).unwrap().modify_index;
    worker.semaphore_state().await.unwrap();
    assert!(worker.try_lock().await.unwrap());
    assert!(worker.try_lock().await.unwrap());
    settle().await;

    assert_eq!(store.inner().entry(&key).unwrap().modify_index, before);
}

#[tokio::test(start_paused = true)]
async fn fresh_group_reads_empty() {
    let store = store();
    let worker = worker(&store, "only").await;

    assert!(worker.semaphore_state().await.unwrap().is_empty());
    assert!(!worker.lock_exists().await);
    assert!(worker.members().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn first_writer_sets_the_limit_for_racing_workers() {
    let store = store();
    let strict = worker(&store, "strict").await;
    let loose = worker(&store, "loose").await;

    // Both see an empty group before either writes
    for w in [&strict, &loose] {
        w.contender_key("none").await.unwrap();
        w.semaphore_state().await.unwrap();
    }
    strict.set_limit(1).await;
    loose.set_limit(3).await;
    assert!(strict.try_lock().await.unwrap());
    assert!(!loose.try_lock().await.unwrap());

    // Re-reading picks up the winner's file, whose limit now applies
    loose.semaphore_state().await.unwrap();
    assert!(!loose.try_lock().await.unwrap());
    assert_eq!(loose.limit().await, 1);

    let _loose_handle = loose.lock(3).await.unwrap();
    let late = worker(&store, "late").await;
    let _late_handle = late.lock(5).await.unwrap();
    settle().await;

    assert!(!loose.is_locked());
    assert!(!late.is_locked());
    assert_eq!(
        lock_file(&store),
        Some(LockFile::new(1, [holder_id(&strict)]))
    );
}

//! Semaphore hand-off specs
//!
//! Verify that released slots pass to waiting workers.

use crate::prelude::*;
use similar_asserts::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn released_slot_goes_to_waiting_worker() {
    let store = store();
    let first = worker(&store, "first").await;
    let second = worker(&store, "second").await;
    let _first_handle = first.lock(1).await.unwrap();
    let _second_handle = second.lock(1).await.unwrap();
    settle().await;
    assert!(!second.is_locked());

    first.release().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), second.wait_until_locked())
        .await
        .unwrap();

    assert_eq!(
        lock_file(&store),
        Some(LockFile::new(1, [holder_id(&second)]))
    );
}

#[tokio::test(start_paused = true)]
async fn released_slot_goes_to_exactly_one_of_many_waiters() {
    let store = store();
    let holder = worker(&store, "holder").await;
    let _holder_handle = holder.lock(1).await.unwrap();

    let mut waiters = Vec::new();
    let mut handles = Vec::new();
    for name in ["w1", "w2", "w3"] {
        let waiter = worker(&store, name).await;
        handles.push(waiter.lock(1).await.unwrap());
        waiters.push(waiter);
    }
    settle().await;
    assert!(waiters.iter().all(|w| !w.is_locked()));

    holder.release().await.unwrap();
    for _ in 0..5 {
        settle().await;
    }

    let locked: Vec<_> = waiters.iter().filter(|w| w.is_locked()).collect();
    assert_eq!(locked.len(), 1);
    assert_eq!(
        lock_file(&store),
        Some(LockFile::new(1, [holder_id(locked[0])]))
    );
}

#[tokio::test(start_paused = true)]
async fn lock_with_runs_one_worker_at_a_time() {
    let store = store();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for name in ["w1", "w2", "w3"] {
        let worker = worker(&store, name).await;
        let (active, peak, finished) = (active.clone(), peak.clone(), finished.clone());
        tasks.push(tokio::spawn(async move {
            worker
                .lock_with(1, || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    finished.fetch_add(1, Ordering::SeqCst);
                })
                .await
        }));
    }
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(120), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    assert_eq!(finished.load(Ordering::SeqCst), 3);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn lock_with_releases_even_when_work_fails() {
    let store = store();
    let first = worker(&store, "first").await;
    let second = worker(&store, "second").await;

    let result: Result<(), String> = first
        .lock_with(1, || async { Err("job failed".to_string()) })
        .await
        .unwrap();
    assert!(result.is_err());

    let _handle = second.lock(1).await.unwrap();
    settle().await;
    assert!(second.is_locked());
}

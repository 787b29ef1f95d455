//! Shared helpers for specs

#![allow(dead_code)]

pub use dr_adapters::{MemoryStore, StoreAdapter, TracedStoreAdapter};
pub use dr_core::{Behavior, LockFile, RunnerConfig, SemaphoreConfig, SessionConfig, SessionId};
pub use dr_engine::{MaintenanceHandle, Registry, Semaphore, Session};
pub use std::time::Duration;

pub type Store = TracedStoreAdapter<MemoryStore>;

/// Group name used by most specs
pub const GROUP: &str = "jobs";

pub fn store() -> Store {
    TracedStoreAdapter::new(MemoryStore::new())
}

pub fn session_config(name: &str) -> SessionConfig {
    SessionConfig::new(name)
}

pub fn group_config() -> SemaphoreConfig {
    SemaphoreConfig::new(GROUP)
}

/// A worker with its own lease in the shared group
pub async fn worker(store: &Store, name: &str) -> Semaphore<Store> {
    Semaphore::start(store.clone(), session_config(name), group_config())
        .await
        .unwrap()
}

/// Decoded lock file of the shared group
pub fn lock_file(store: &Store) -> Option<LockFile> {
    let key = group_config().layout().lock_key().to_string();
    store
        .inner()
        .entry(&key)
        .map(|entry| LockFile::decode(&entry.value).unwrap())
}

pub fn holder_id(semaphore: &Semaphore<Store>) -> SessionId {
    semaphore.session().id().unwrap()
}

/// Let background tasks react to the last change
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake store adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{
    KvQuery, KvResponse, MemoryStore, PutOptions, SessionInfo, StoreAdapter, StoreError,
};
use async_trait::async_trait;
use dr_core::{SessionId, SessionSpec};
use std::sync::{Arc, Mutex};

/// Recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateSession {
        name: String,
    },
    RenewSession {
        id: SessionId,
    },
    DestroySession {
        id: SessionId,
    },
    ListSessions,
    Get {
        key: String,
        recurse: bool,
        wait_index: Option<u64>,
    },
    Put {
        key: String,
        value: Vec<u8>,
        opts: PutOptions,
    },
    Delete {
        key: String,
        cas: Option<u64>,
    },
}

#[derive(Default)]
struct Faults {
    /// Remaining create_session calls that fail as unavailable
    create_failures: u32,
    renew_fails: bool,
    watch_fails: bool,
    /// Remaining list_sessions calls that return nothing
    list_lag: u32,
}

/// Store adapter backed by [`MemoryStore`] that records calls and injects faults
#[derive(Clone, Default)]
pub struct FakeStoreAdapter {
    store: MemoryStore,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    faults: Arc<Mutex<Faults>>,
}

impl FakeStoreAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backing store, for inspecting or mutating state directly
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Clear recorded calls
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Recorded writes to `key`
    pub fn puts_to(&self, key: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Put { key: k, .. } if k == key))
            .count()
    }

    /// Fail the next `count` session creations as unavailable
    pub fn fail_creates(&self, count: u32) {
        self.faults().create_failures = count;
    }

    /// Make renewals fail as unavailable
    pub fn set_renew_fails(&self, fails: bool) {
        self.faults().renew_fails = fails;
    }

    /// Make blocking queries fail as unavailable
    pub fn set_watch_fails(&self, fails: bool) {
        self.faults().watch_fails = fails;
    }

    /// Hide sessions from the next `count` session listings
    pub fn lag_session_list(&self, count: u32) {
        self.faults().list_lag = count;
    }

    /// Invalidate a session as if its TTL ran out
    pub fn expire_session(&self, id: &SessionId) -> bool {
        self.store.invalidate_session(id)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: StoreCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl StoreAdapter for FakeStoreAdapter {
    async fn create_session(&self, spec: &SessionSpec) -> Result<SessionId, StoreError> {
        self.record(StoreCall::CreateSession {
            name: spec.name.clone(),
        });
        {
            let mut faults = self.faults();
            if faults.create_failures > 0 {
                faults.create_failures -= 1;
                return Err(StoreError::Unavailable("injected create failure".into()));
            }
        }
        self.store.create_session(spec).await
    }

    async fn renew_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.record(StoreCall::RenewSession { id: id.clone() });
        if self.faults().renew_fails {
            return Err(StoreError::Unavailable("injected renew failure".into()));
        }
        self.store.renew_session(id).await
    }

    async fn destroy_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.record(StoreCall::DestroySession { id: id.clone() });
        self.store.destroy_session(id).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, StoreError> {
        self.record(StoreCall::ListSessions);
        {
            let mut faults = self.faults();
            if faults.list_lag > 0 {
                faults.list_lag -= 1;
                return Ok(Vec::new());
            }
        }
        self.store.list_sessions().await
    }

    async fn kv_get(&self, key: &str, query: &KvQuery) -> Result<KvResponse, StoreError> {
        self.record(StoreCall::Get {
            key: key.to_string(),
            recurse: query.recurse,
            wait_index: query.wait.map(|w| w.index),
        });
        if query.wait.is_some() && self.faults().watch_fails {
            return Err(StoreError::Timeout("injected watch failure".into()));
        }
        self.store.kv_get(key, query).await
    }

    async fn kv_put(
        &self,
        key: &str,
        value: &[u8],
        opts: &PutOptions,
    ) -> Result<bool, StoreError> {
        self.record(StoreCall::Put {
            key: key.to_string(),
            value: value.to_vec(),
            opts: opts.clone(),
        });
        self.store.kv_put(key, value, opts).await
    }

    async fn kv_delete(&self, key: &str, cas: Option<u64>) -> Result<bool, StoreError> {
        self.record(StoreCall::Delete {
            key: key.to_string(),
            cas,
        });
        self.store.kv_delete(key, cas).await
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

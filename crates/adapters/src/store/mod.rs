// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination store adapters (KV space with sessions)
//!
//! The store is the only shared resource between participants. It provides
//! leases, a key-value space with optimistic concurrency (modify indexes and
//! CAS writes), session-owned keys and blocking queries.

mod memory;

pub use memory::MemoryStore;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeStoreAdapter, StoreCall};

use async_trait::async_trait;
use dr_core::{Behavior, SessionId, SessionSpec};
use std::time::Duration;
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store request timed out: {0}")]
    Timeout(String),
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    /// Network or availability failure worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }

    /// The lease expired or was destroyed
    pub fn is_session_not_found(&self) -> bool {
        matches!(self, StoreError::SessionNotFound(_))
    }
}

/// A lease as reported by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub ttl: Duration,
    pub lock_delay: Duration,
    pub behavior: Behavior,
    pub create_index: u64,
}

/// A stored key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub create_index: u64,
    pub modify_index: u64,
    /// Number of times the key has been acquired
    pub lock_index: u64,
    /// Session currently holding the key
    pub session: Option<SessionId>,
}

/// Blocking query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitQuery {
    /// Return once the queried index moves past this value
    pub index: u64,
    /// Give up and return current state after this long
    pub timeout: Duration,
}

/// Read parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KvQuery {
    /// Treat the key as a prefix and return everything under it
    pub recurse: bool,
    /// Block until a change past `WaitQuery::index` (long-poll)
    pub wait: Option<WaitQuery>,
}

impl KvQuery {
    pub fn key() -> Self {
        Self::default()
    }

    pub fn prefix() -> Self {
        Self {
            recurse: true,
            wait: None,
        }
    }

    pub fn wait(mut self, index: u64, timeout: Duration) -> Self {
        self.wait = Some(WaitQuery { index, timeout });
        self
    }
}

/// Result of a read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvResponse {
    pub entries: Vec<KvEntry>,
    /// Index of the latest change affecting the queried key or prefix
    pub index: u64,
}

/// Write parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Succeed only if the key's modify index equals this (0: key must be absent)
    pub cas: Option<u64>,
    /// Tie the key to a live session
    pub acquire: Option<SessionId>,
    /// Drop the session's ownership of the key, keeping its value
    pub release: Option<SessionId>,
}

impl PutOptions {
    pub fn cas(index: u64) -> Self {
        Self {
            cas: Some(index),
            ..Self::default()
        }
    }

    pub fn acquire(session: &SessionId) -> Self {
        Self {
            acquire: Some(session.clone()),
            ..Self::default()
        }
    }

    pub fn release(session: &SessionId) -> Self {
        Self {
            release: Some(session.clone()),
            ..Self::default()
        }
    }
}

/// Adapter for a coordination store
#[async_trait]
pub trait StoreAdapter: Clone + Send + Sync + 'static {
    /// Create a lease
    async fn create_session(&self, spec: &SessionSpec) -> Result<SessionId, StoreError>;

    /// Extend a lease; `SessionNotFound` once it has been invalidated
    async fn renew_session(&self, id: &SessionId) -> Result<(), StoreError>;

    /// Invalidate a lease, applying its behavior to the keys it holds
    async fn destroy_session(&self, id: &SessionId) -> Result<(), StoreError>;

    /// List live leases
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, StoreError>;

    /// Read a key, or every key under a prefix when `query.recurse` is set
    async fn kv_get(&self, key: &str, query: &KvQuery) -> Result<KvResponse, StoreError>;

    /// Write a key; `Ok(false)` when a CAS or acquire precondition fails
    async fn kv_put(&self, key: &str, value: &[u8], opts: &PutOptions)
        -> Result<bool, StoreError>;

    /// Delete a key; `Ok(false)` when a CAS precondition fails
    async fn kv_delete(&self, key: &str, cas: Option<u64>) -> Result<bool, StoreError>;

    /// Try once to take the lock at `key` for `session`
    async fn lock_acquire(
        &self,
        key: &str,
        session: &SessionId,
        value: &[u8],
    ) -> Result<bool, StoreError> {
        self.kv_put(key, value, &PutOptions::acquire(session)).await
    }

    /// Release the lock at `key` held by `session`
    async fn lock_release(&self, key: &str, session: &SessionId) -> Result<bool, StoreError> {
        self.kv_put(key, &[], &PutOptions::release(session)).await
    }

    /// Block until the lock at `key` is taken by `session`
    ///
    /// Between attempts this long-polls the key so a release wakes the waiter.
    /// A refusal while nobody holds the key means a lock delay is running,
    /// which ends without a write, so those waits are short.
    async fn lock_wait_to_acquire(
        &self,
        key: &str,
        session: &SessionId,
        value: &[u8],
    ) -> Result<bool, StoreError> {
        const LOCK_WAIT: Duration = Duration::from_secs(60);
        const LOCK_DELAY_RETRY: Duration = Duration::from_secs(1);

        let mut response = self.kv_get(key, &KvQuery::key()).await?;
        loop {
            if self.lock_acquire(key, session, value).await? {
                return Ok(true);
            }
            let unheld = response.entries.first().map_or(true, |e| e.session.is_none());
            let wait = if unheld { LOCK_DELAY_RETRY } else { LOCK_WAIT };
            response = self
                .kv_get(key, &KvQuery::key().wait(response.index, wait))
                .await?;
        }
    }
}

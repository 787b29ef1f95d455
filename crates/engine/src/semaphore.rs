// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distributed counting semaphore
//!
//! Participants announce themselves with a session-owned contender key under
//! the group prefix and compete for a place in the lock file at
//! `<prefix>.lock` by CAS writes. A holder whose contender key disappears
//! (lease expired or released) is pruned by the next participant to write.
//! After [`Semaphore::lock`] a maintenance task long-polls the prefix and
//! re-runs the acquisition whenever the group changes.

use crate::error::SemaphoreError;
use crate::maintenance::{self, MaintenanceHandle};
use crate::session::Session;
use dr_adapters::{KvEntry, KvQuery, PutOptions, StoreAdapter, StoreError};
use dr_core::lock_file::agreed_limit;
use dr_core::{plan_acquire, KeyLayout, LockFile, SemaphoreConfig, SessionConfig, SessionId};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Shared handle to one participant in a semaphore group
pub struct Semaphore<S> {
    inner: Arc<SemaphoreInner<S>>,
}

impl<S> Clone for Semaphore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SemaphoreInner<S> {
    store: S,
    session: Session<S>,
    config: SemaphoreConfig,
    layout: KeyLayout,
    /// Serializes acquisition rounds between callers and maintenance
    state: Mutex<GroupState>,
    /// Store index of the last prefix read, the long-poll base
    last_index: AtomicU64,
    locked: watch::Sender<bool>,
}

/// Last observed state of the group
#[derive(Default)]
struct GroupState {
    limit: u32,
    members: BTreeSet<SessionId>,
    holders: BTreeSet<SessionId>,
    lock_modify_index: Option<u64>,
    lock_content: Option<LockFile>,
    /// Lease id our contender key was written under
    registered: Option<SessionId>,
}

impl<S: StoreAdapter> Semaphore<S> {
    /// Join a group using an existing session
    pub fn new(
        store: S,
        session: Session<S>,
        config: SemaphoreConfig,
    ) -> Result<Self, SemaphoreError> {
        config
            .validate()
            .map_err(|e| SemaphoreError::InvalidArgument(e.to_string()))?;
        let layout = config.layout();
        let (locked, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(SemaphoreInner {
                store,
                session,
                state: Mutex::new(GroupState {
                    limit: config.limit,
                    ..GroupState::default()
                }),
                config,
                layout,
                last_index: AtomicU64::new(0),
                locked,
            }),
        })
    }

    /// Start a dedicated session and join a group with it
    pub async fn start(
        store: S,
        session_config: SessionConfig,
        config: SemaphoreConfig,
    ) -> Result<Self, SemaphoreError> {
        let session = Session::start(store.clone(), session_config).await?;
        Self::new(store, session, config)
    }

    /// Write our contender key with `value`, tied to the session
    pub async fn contender_key(&self, value: &str) -> Result<bool, SemaphoreError> {
        let mut state = self.inner.state.lock().await;
        self.register(&mut state, value).await
    }

    /// Read the group: lock file, its modify index and the live members.
    ///
    /// Returns the raw entries under the prefix.
    pub async fn semaphore_state(&self) -> Result<Vec<KvEntry>, SemaphoreError> {
        let mut state = self.inner.state.lock().await;
        self.read_state(&mut state).await
    }

    /// Settle the limit: an existing lock file's limit wins over `requested`
    pub async fn set_limit(&self, requested: u32) -> u32 {
        let mut state = self.inner.state.lock().await;
        self.apply_limit(&mut state, requested)
    }

    /// Try to take a slot using the last read state.
    ///
    /// Returns whether we are a holder. Losing a CAS race is not an error.
    pub async fn try_lock(&self) -> Result<bool, SemaphoreError> {
        let mut state = self.inner.state.lock().await;
        self.try_lock_with(&mut state).await
    }

    /// Long-poll the prefix; `true` when the group changed.
    ///
    /// Store errors are logged and reported as no change.
    pub async fn poll_changes(&self) -> bool {
        match self.watch().await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!(prefix = self.prefix(), error = %e, "watch failed");
                false
            }
        }
    }

    /// Join the group, make a first acquisition attempt and keep competing
    /// in the background until the returned handle is stopped or dropped
    pub async fn lock(&self, limit: u32) -> Result<MaintenanceHandle, SemaphoreError> {
        {
            let mut state = self.inner.state.lock().await;
            self.register(&mut state, &self.inner.config.contender_value)
                .await?;
            self.read_state(&mut state).await?;
            self.apply_limit(&mut state, limit);
            self.try_lock_with(&mut state).await?;
        }
        Ok(maintenance::spawn(
            self.clone(),
            self.inner.config.error_backoff,
        ))
    }

    /// Hold a slot while `work` runs.
    ///
    /// Waits until a slot is held, runs `work`, then stops maintenance and
    /// releases the contender key whatever `work` returned.
    pub async fn lock_with<F, Fut, T>(&self, limit: u32, work: F) -> Result<T, SemaphoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let handle = self.lock(limit).await?;
        self.wait_until_locked().await;
        tracing::info!(prefix = self.prefix(), "running locked work");

        let output = work().await;

        handle.stop().await;
        if let Err(e) = self.release().await {
            tracing::error!(prefix = self.prefix(), error = %e, "release failed");
        }
        Ok(output)
    }

    /// Delete our contender key. The lock file is left for others to prune.
    pub async fn release(&self) -> Result<bool, SemaphoreError> {
        let mut state = self.inner.state.lock().await;
        let id = match state.registered.take() {
            Some(id) => id,
            None => self.inner.session.require_id()?,
        };
        let key = self.inner.layout.contender_key(&id);
        let deleted = self.inner.store.kv_delete(&key, None).await?;
        self.set_locked(false);
        tracing::info!(key = %key, "released contender key");
        Ok(deleted)
    }

    /// Wait until the last acquisition attempt held a slot
    pub async fn wait_until_locked(&self) {
        let mut locked = self.inner.locked.subscribe();
        // The sender lives as long as `self`
        let _ = locked.wait_for(|held| *held).await;
    }

    /// Outcome of the last acquisition attempt
    pub fn is_locked(&self) -> bool {
        *self.inner.locked.borrow()
    }

    pub async fn members(&self) -> BTreeSet<SessionId> {
        self.inner.state.lock().await.members.clone()
    }

    pub async fn holders(&self) -> BTreeSet<SessionId> {
        self.inner.state.lock().await.holders.clone()
    }

    pub async fn limit(&self) -> u32 {
        self.inner.state.lock().await.limit
    }

    pub async fn lock_content(&self) -> Option<LockFile> {
        self.inner.state.lock().await.lock_content.clone()
    }

    pub async fn lock_modify_index(&self) -> Option<u64> {
        self.inner.state.lock().await.lock_modify_index
    }

    pub async fn lock_exists(&self) -> bool {
        self.inner.state.lock().await.lock_content.is_some()
    }

    pub fn last_index(&self) -> u64 {
        self.inner.last_index.load(Ordering::Acquire)
    }

    pub fn prefix(&self) -> &str {
        self.inner.layout.prefix()
    }

    pub fn lock_key(&self) -> &str {
        self.inner.layout.lock_key()
    }

    pub fn session(&self) -> &Session<S> {
        &self.inner.session
    }

    pub fn config(&self) -> &SemaphoreConfig {
        &self.inner.config
    }

    /// Long-poll the prefix from the last read index
    pub(crate) async fn watch(&self) -> Result<bool, StoreError> {
        let index = self.last_index();
        let query = KvQuery::prefix().wait(index, self.inner.config.wait_timeout);
        let response = self.inner.store.kv_get(self.prefix(), &query).await?;
        let changed = response.index != index;
        if changed {
            self.inner.last_index.store(response.index, Ordering::Release);
        }
        Ok(changed)
    }

    /// Re-run the acquisition after the group changed.
    ///
    /// Re-registers the contender key first if the session came back under a
    /// new lease id. Does nothing once the contender key has been released.
    pub(crate) async fn refresh(&self) -> Result<bool, SemaphoreError> {
        let mut state = self.inner.state.lock().await;
        let Some(registered) = state.registered.clone() else {
            return Ok(false);
        };
        let id = self.inner.session.require_id()?;
        if registered != id {
            tracing::warn!(old = %registered, new = %id, "session changed, re-registering contender");
            let stale = self.inner.layout.contender_key(&registered);
            if let Err(e) = self.inner.store.kv_delete(&stale, None).await {
                tracing::warn!(key = %stale, error = %e, "failed to remove stale contender key");
            }
            self.register(&mut state, &self.inner.config.contender_value)
                .await?;
        }
        self.read_state(&mut state).await?;
        self.try_lock_with(&mut state).await
    }

    /// Whether the contender key was written under a lease id the session
    /// no longer has
    pub(crate) async fn session_changed(&self) -> bool {
        let state = self.inner.state.lock().await;
        match (&state.registered, self.inner.session.id()) {
            (Some(registered), Some(current)) => *registered != current,
            _ => false,
        }
    }

    async fn register(&self, state: &mut GroupState, value: &str) -> Result<bool, SemaphoreError> {
        if value.is_empty() {
            return Err(SemaphoreError::InvalidArgument(
                "contender value cannot be empty".to_string(),
            ));
        }
        let id = self.inner.session.require_id()?;
        let key = self.inner.layout.contender_key(&id);
        let store = &self.inner.store;
        let acquired = self
            .inner
            .config
            .retry
            .run(StoreError::is_transient, || {
                store.lock_acquire(&key, &id, value.as_bytes())
            })
            .await?;

        if acquired {
            tracing::debug!(key = %key, "registered contender");
        } else {
            tracing::warn!(key = %key, "contender key is held elsewhere");
        }
        state.registered = Some(id);
        Ok(acquired)
    }

    async fn read_state(&self, state: &mut GroupState) -> Result<Vec<KvEntry>, SemaphoreError> {
        let lock_key = self.lock_key();
        let response = self
            .inner
            .store
            .kv_get(self.prefix(), &KvQuery::prefix())
            .await?;
        self.inner
            .last_index
            .store(response.index, Ordering::Release);

        let mut lock_entry = response.entries.iter().find(|e| e.key == lock_key).cloned();
        if lock_entry.is_none() && !lock_key.starts_with(self.prefix()) {
            let outside = self
                .inner
                .store
                .kv_get(lock_key, &KvQuery::key())
                .await?;
            lock_entry = outside.entries.into_iter().next();
        }

        state.members = response
            .entries
            .iter()
            .filter(|e| e.key != lock_key && e.session.is_some())
            .filter_map(|e| KeyLayout::member_of(&e.key))
            .map(SessionId::from)
            .collect();

        match lock_entry {
            Some(entry) => {
                let lock = LockFile::decode(&entry.value)?;
                state.holders = lock.holders.clone();
                state.lock_content = Some(lock);
                state.lock_modify_index = Some(entry.modify_index);
            }
            None => {
                state.holders.clear();
                state.lock_content = None;
                state.lock_modify_index = None;
            }
        }

        tracing::debug!(
            prefix = self.prefix(),
            index = response.index,
            members = state.members.len(),
            holders = state.holders.len(),
            "read semaphore state"
        );
        Ok(response.entries)
    }

    fn apply_limit(&self, state: &mut GroupState, requested: u32) -> u32 {
        let limit = agreed_limit(state.lock_content.as_ref(), requested);
        if limit != requested {
            tracing::warn!(
                requested,
                limit,
                lock_key = self.lock_key(),
                "limit differs from the group's lock file, using the lock file"
            );
        }
        state.limit = limit;
        limit
    }

    async fn try_lock_with(&self, state: &mut GroupState) -> Result<bool, SemaphoreError> {
        let me = self.inner.session.require_id()?;
        // A lock file written by a faster peer since our last settle wins
        let requested = state.limit;
        self.apply_limit(state, requested);
        let plan = plan_acquire(state.lock_content.as_ref(), &state.members, &me, state.limit);
        if !plan.pruned.is_empty() {
            tracing::info!(pruned = ?plan.pruned, "pruning departed holders");
        }

        let held = if plan.unchanged {
            state.holders = plan.lock_file.holders.clone();
            plan.held
        } else {
            let body = plan.lock_file.encode()?;
            let store = &self.inner.store;
            let lock_key = self.lock_key();
            let written = match state.lock_modify_index {
                // Nobody left to keep; start over from an absent key
                Some(index) if plan.reset => {
                    store.kv_delete(lock_key, Some(index)).await?
                        && store
                            .kv_put(lock_key, &body, &PutOptions::cas(0))
                            .await?
                }
                Some(index) => {
                    store
                        .kv_put(lock_key, &body, &PutOptions::cas(index))
                        .await?
                }
                None => {
                    store
                        .kv_put(lock_key, &body, &PutOptions::cas(0))
                        .await?
                }
            };

            if written {
                tracing::debug!(
                    holders = plan.lock_file.holders.len(),
                    limit = plan.lock_file.limit,
                    "wrote lock file"
                );
                state.holders = plan.lock_file.holders.clone();
                state.lock_content = Some(plan.lock_file);
                plan.held
            } else {
                tracing::debug!(lock_key, "lock file changed concurrently");
                false
            }
        };

        self.set_locked(held);
        Ok(held)
    }

    fn set_locked(&self, held: bool) {
        let was = self.inner.locked.send_replace(held);
        if was != held {
            if held {
                tracing::info!(prefix = self.prefix(), "acquired semaphore slot");
            } else {
                tracing::info!(prefix = self.prefix(), "no longer holding semaphore slot");
            }
        }
    }
}

#[cfg(test)]
#[path = "semaphore_tests.rs"]
mod tests;

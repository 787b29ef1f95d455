// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process coordination store
//!
//! Implements the full store contract in memory: a global index advanced on
//! every write, per-key modify indexes, CAS writes, session-owned keys with
//! lock delay, TTL expiry and blocking queries. Workers sharing one process
//! can coordinate through it directly.

use super::{KvEntry, KvQuery, KvResponse, PutOptions, SessionInfo, StoreAdapter, StoreError};
use async_trait::async_trait;
use dr_core::{Behavior, SessionId, SessionSpec};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Longest blocking query the store honors
pub const MAX_WAIT: Duration = Duration::from_secs(600);

/// Tombstones kept before the oldest half is compacted away
pub const MAX_TOMBSTONES: usize = 1024;

/// In-memory store shared by every clone
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    /// Latest global index, for waking blocking queries
    changes: watch::Sender<u64>,
}

#[derive(Default)]
struct State {
    index: u64,
    entries: BTreeMap<String, StoredEntry>,
    /// Index at which each deleted key disappeared
    tombstones: BTreeMap<String, u64>,
    /// Highest index among compacted tombstones; no read reports less
    compacted: u64,
    sessions: HashMap<SessionId, StoredSession>,
    /// Keys released by an invalidated session, unacquirable until the instant
    lock_delays: HashMap<String, Instant>,
}

struct StoredEntry {
    value: Vec<u8>,
    create_index: u64,
    modify_index: u64,
    lock_index: u64,
    session: Option<SessionId>,
}

struct StoredSession {
    spec: SessionSpec,
    create_index: u64,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(index: u64) -> Self {
        Self {
            value: Vec::new(),
            create_index: index,
            modify_index: index,
            lock_index: 0,
            session: None,
        }
    }

    fn to_entry(&self, key: &str) -> KvEntry {
        KvEntry {
            key: key.to_string(),
            value: self.value.clone(),
            create_index: self.create_index,
            modify_index: self.modify_index,
            lock_index: self.lock_index,
            session: self.session.clone(),
        }
    }
}

impl State {
    fn bump(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    /// Invalidate every session whose TTL has run out and forget lock delays
    /// that have passed
    fn reap(&mut self, now: Instant) {
        self.lock_delays.retain(|_, until| *until > now);

        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            tracing::debug!(session = %id, "session ttl expired");
            self.invalidate(&id, now);
        }
    }

    /// Remove a session and apply its behavior to the keys it holds
    fn invalidate(&mut self, id: &SessionId, now: Instant) -> bool {
        let Some(session) = self.sessions.remove(id) else {
            return false;
        };

        let held: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.session.as_ref() == Some(id))
            .map(|(key, _)| key.clone())
            .collect();

        for key in held {
            if !session.spec.lock_delay.is_zero() {
                self.lock_delays
                    .insert(key.clone(), now + session.spec.lock_delay);
            }
            let index = self.bump();
            match session.spec.behavior {
                Behavior::Delete => {
                    self.entries.remove(&key);
                    self.bury(key, index);
                }
                Behavior::Release => {
                    if let Some(entry) = self.entries.get_mut(&key) {
                        entry.session = None;
                        entry.modify_index = index;
                    }
                }
            }
        }
        true
    }

    fn bury(&mut self, key: String, index: u64) {
        self.tombstones.insert(key, index);
        if self.tombstones.len() <= MAX_TOMBSTONES {
            return;
        }
        let mut indexes: Vec<u64> = self.tombstones.values().copied().collect();
        indexes.sort_unstable();
        let cutoff = indexes[indexes.len() / 2];
        self.tombstones.retain(|_, i| *i > cutoff);
        self.compacted = self.compacted.max(cutoff);
        tracing::debug!(
            cutoff,
            remaining = self.tombstones.len(),
            "compacted tombstones"
        );
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.sessions.values().map(|s| s.expires_at).min()
    }

    fn read(&self, key: &str, recurse: bool) -> KvResponse {
        if !recurse {
            let entry = self.entries.get(key);
            let index = entry
                .map(|e| e.modify_index)
                .or_else(|| self.tombstones.get(key).copied())
                .unwrap_or(0)
                .max(self.compacted);
            return KvResponse {
                entries: entry.map(|e| e.to_entry(key)).into_iter().collect(),
                index,
            };
        }

        let entries: Vec<KvEntry> = self
            .entries
            .range(key.to_string()..)
            .take_while(|(k, _)| k.starts_with(key))
            .map(|(k, e)| e.to_entry(k))
            .collect();
        let deleted = self
            .tombstones
            .range(key.to_string()..)
            .take_while(|(k, _)| k.starts_with(key))
            .map(|(_, index)| *index);
        let index = entries
            .iter()
            .map(|e| e.modify_index)
            .chain(deleted)
            .max()
            .unwrap_or(0)
            .max(self.compacted);
        KvResponse { entries, index }
    }

    fn current_index(&self, key: &str) -> u64 {
        self.entries.get(key).map_or(0, |e| e.modify_index)
    }

    fn put(
        &mut self,
        key: &str,
        value: &[u8],
        opts: &PutOptions,
        now: Instant,
    ) -> Result<bool, StoreError> {
        if let Some(cas) = opts.cas {
            if self.current_index(key) != cas {
                return Ok(false);
            }
        }

        if let Some(session) = &opts.acquire {
            if !self.sessions.contains_key(session) {
                return Err(StoreError::SessionNotFound(session.clone()));
            }
            match self.entries.get(key).and_then(|e| e.session.as_ref()) {
                Some(holder) if holder != session => return Ok(false),
                Some(_) => {}
                None => {
                    if self.lock_delays.get(key).is_some_and(|until| *until > now) {
                        return Ok(false);
                    }
                }
            }
            let index = self.bump();
            let entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| StoredEntry::new(index));
            if entry.session.is_none() {
                entry.lock_index += 1;
                entry.session = Some(session.clone());
            }
            entry.value = value.to_vec();
            entry.modify_index = index;
            return Ok(true);
        }

        if let Some(session) = &opts.release {
            let held = self
                .entries
                .get(key)
                .is_some_and(|e| e.session.as_ref() == Some(session));
            if !held {
                return Ok(false);
            }
            let index = self.bump();
            if let Some(entry) = self.entries.get_mut(key) {
                entry.session = None;
                entry.modify_index = index;
            }
            return Ok(true);
        }

        let index = self.bump();
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredEntry::new(index));
        entry.value = value.to_vec();
        entry.modify_index = index;
        Ok(true)
    }

    fn delete(&mut self, key: &str, cas: Option<u64>) -> bool {
        if let Some(cas) = cas {
            if self.current_index(key) != cas {
                return false;
            }
        }
        if !self.entries.contains_key(key) {
            return true;
        }
        let index = self.bump();
        self.entries.remove(key);
        self.bury(key.to_string(), index);
        true
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                changes,
            }),
        }
    }

    /// Lock the state, expire sessions, run `f` and wake waiters on change
    fn with_state<R>(&self, f: impl FnOnce(&mut State, Instant) -> R) -> R {
        let now = Instant::now();
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.index;
        state.reap(now);
        let result = f(&mut state, now);
        if state.index != before {
            self.inner.changes.send_replace(state.index);
        }
        result
    }

    /// Invalidate a session as if its TTL ran out
    pub fn invalidate_session(&self, id: &SessionId) -> bool {
        self.with_state(|state, now| state.invalidate(id, now))
    }

    /// Current global index
    pub fn index(&self) -> u64 {
        self.with_state(|state, _| state.index)
    }

    /// Snapshot of a single key
    pub fn entry(&self, key: &str) -> Option<KvEntry> {
        self.with_state(|state, _| state.entries.get(key).map(|e| e.to_entry(key)))
    }

    pub fn has_session(&self, id: &SessionId) -> bool {
        self.with_state(|state, _| state.sessions.contains_key(id))
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn create_session(&self, spec: &SessionSpec) -> Result<SessionId, StoreError> {
        if spec.ttl.is_zero() {
            return Err(StoreError::InvalidRequest(format!(
                "session {} has a zero ttl",
                spec.name
            )));
        }
        let id = SessionId(uuid::Uuid::new_v4().to_string());
        self.with_state(|state, now| {
            let create_index = state.bump();
            state.sessions.insert(
                id.clone(),
                StoredSession {
                    spec: spec.clone(),
                    create_index,
                    expires_at: now + spec.ttl,
                },
            );
        });
        Ok(id)
    }

    async fn renew_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.with_state(|state, now| match state.sessions.get_mut(id) {
            Some(session) => {
                session.expires_at = now + session.spec.ttl;
                Ok(())
            }
            None => Err(StoreError::SessionNotFound(id.clone())),
        })
    }

    async fn destroy_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.with_state(|state, now| state.invalidate(id, now));
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, StoreError> {
        Ok(self.with_state(|state, _| {
            let mut sessions: Vec<SessionInfo> = state
                .sessions
                .iter()
                .map(|(id, s)| SessionInfo {
                    id: id.clone(),
                    name: s.spec.name.clone(),
                    ttl: s.spec.ttl,
                    lock_delay: s.spec.lock_delay,
                    behavior: s.spec.behavior,
                    create_index: s.create_index,
                })
                .collect();
            sessions.sort_by_key(|s| s.create_index);
            sessions
        }))
    }

    async fn kv_get(&self, key: &str, query: &KvQuery) -> Result<KvResponse, StoreError> {
        let Some(wait) = query.wait else {
            return Ok(self.with_state(|state, _| state.read(key, query.recurse)));
        };

        let deadline = Instant::now() + wait.timeout.min(MAX_WAIT);
        let mut changes = self.inner.changes.subscribe();
        loop {
            changes.borrow_and_update();
            let (response, next_expiry) = self.with_state(|state, _| {
                (state.read(key, query.recurse), state.next_expiry())
            });
            if response.index > wait.index || Instant::now() >= deadline {
                return Ok(response);
            }

            // Expiring sessions change keys without a write, so wake for them too
            let wake = next_expiry.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Ok(response);
                    }
                }
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn kv_put(
        &self,
        key: &str,
        value: &[u8],
        opts: &PutOptions,
    ) -> Result<bool, StoreError> {
        self.with_state(|state, now| state.put(key, value, opts, now))
    }

    async fn kv_delete(&self, key: &str, cas: Option<u64>) -> Result<bool, StoreError> {
        Ok(self.with_state(|state, _| state.delete(key, cas)))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

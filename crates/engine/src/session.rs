// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease with self-healing background renewal
//!
//! A [`Session`] owns one store lease. After [`Session::start`] a background
//! task renews it every `ttl / 2`; if the store reports the lease gone, the
//! task creates a fresh one and the session continues under the new id.
//! Handles are cheap to clone; the renewal task stops when the last handle is
//! dropped or [`Session::destroy`] is called.

use crate::error::SessionError;
use dr_adapters::{StoreAdapter, StoreError};
use dr_core::{Behavior, LeaseState, SessionConfig, SessionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared handle to a lease
pub struct Session<S> {
    inner: Arc<SessionInner<S>>,
}

impl<S> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<S> {
    store: S,
    config: SessionConfig,
    id: RwLock<Option<SessionId>>,
    destroyed: AtomicBool,
    renewal: Mutex<Option<Renewal>>,
}

struct Renewal {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<S> Drop for SessionInner<S> {
    fn drop(&mut self) {
        let renewal = self.renewal.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(renewal) = renewal.take() {
            renewal.cancel.cancel();
        }
    }
}

impl<S: StoreAdapter> SessionInner<S> {
    fn id(&self) -> Option<SessionId> {
        self.id.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn create(&self) -> Result<SessionId, StoreError> {
        let id = self.store.create_session(&self.config.spec()).await?;
        *self.id.write().unwrap_or_else(|e| e.into_inner()) = Some(id.clone());
        tracing::info!(session = %id, name = %self.config.name, "initialized session");
        Ok(id)
    }

    async fn renew_once(&self) {
        let Some(id) = self.id() else {
            return;
        };
        match self.store.renew_session(&id).await {
            Ok(()) => tracing::debug!(session = %id, "renewed session"),
            Err(e) if e.is_session_not_found() => {
                tracing::warn!(session = %id, "session has expired, reinitializing");
                if let Err(e) = self.create().await {
                    tracing::error!(name = %self.config.name, error = %e, "reinitialize failed");
                }
            }
            Err(e) => tracing::error!(session = %id, error = %e, "renew failed"),
        }
    }
}

/// Renew every `interval` until cancelled or every handle is gone
async fn renewal_loop<S: StoreAdapter>(
    inner: Weak<SessionInner<S>>,
    cancel: CancellationToken,
    interval: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.renew_once().await;
    }
    tracing::debug!("renewal stopped");
}

impl<S: StoreAdapter> Session<S> {
    /// Build a session without creating a lease
    pub fn new(store: S, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                store,
                config,
                id: RwLock::new(None),
                destroyed: AtomicBool::new(false),
                renewal: Mutex::new(None),
            }),
        }
    }

    /// Create a lease (retrying transient failures), start renewal and
    /// confirm the store lists the lease
    pub async fn start(store: S, config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let session = Self::new(store, config);
        let inner = &session.inner;
        inner
            .config
            .retry
            .run(StoreError::is_transient, || inner.create())
            .await
            .map_err(SessionError::Create)?;
        session.renew();
        session.verify(inner.config.verify_attempts).await?;
        Ok(session)
    }

    /// Create a new lease and adopt its id
    pub async fn init(&self) -> Result<SessionId, SessionError> {
        self.inner.create().await.map_err(SessionError::Create)
    }

    /// Check that the store lists the lease, polling up to `attempts` times.
    ///
    /// A lease that never shows up is replaced with a fresh one.
    pub async fn verify(&self, attempts: u32) -> Result<(), SessionError> {
        let id = self.require_id()?;
        tracing::info!(session = %id, "waiting until session exists");

        for attempt in 1..=attempts {
            match self.inner.store.list_sessions().await {
                Ok(sessions) if sessions.iter().any(|s| s.id == id) => {
                    tracing::info!(session = %id, "found session");
                    return Ok(());
                }
                Ok(_) => tracing::debug!(session = %id, attempt, "session not listed yet"),
                Err(e) => tracing::warn!(session = %id, attempt, error = %e, "listing sessions failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.inner.config.verify_interval).await;
            }
        }

        tracing::warn!(session = %id, "session not confirmed, reinitializing");
        self.init().await?;
        Ok(())
    }

    /// Start the renewal task if it is not already running
    pub fn renew(&self) {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return;
        }
        let mut renewal = self.inner.renewal.lock().unwrap_or_else(|e| e.into_inner());
        if renewal.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(renewal_loop(
            Arc::downgrade(&self.inner),
            cancel.clone(),
            self.inner.config.renew_interval(),
        ));
        *renewal = Some(Renewal { cancel, task });
        tracing::debug!(
            name = %self.inner.config.name,
            interval_ms = self.inner.config.renew_interval().as_millis() as u64,
            "started renewal"
        );
    }

    /// Whether the renewal task is running
    pub fn is_renewing(&self) -> bool {
        self.inner
            .renewal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Stop renewal and remove the lease
    pub async fn destroy(&self) -> Result<(), SessionError> {
        self.inner.destroyed.store(true, Ordering::Release);
        let renewal = self
            .inner
            .renewal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(renewal) = renewal {
            renewal.cancel.cancel();
            if let Err(e) = renewal.task.await {
                tracing::warn!(error = %e, "renewal task failed");
            }
        }

        let id = self.inner.id.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(id) = id {
            self.inner.store.destroy_session(&id).await?;
            tracing::info!(session = %id, "destroyed session");
        }
        Ok(())
    }

    /// Block until the lock at `path` is held by this lease
    pub async fn lock(&self, path: &str) -> Result<bool, SessionError> {
        let id = self.require_id()?;
        Ok(self.inner.store.lock_wait_to_acquire(path, &id, &[]).await?)
    }

    /// Release the lock at `path` held by this lease
    pub async fn release(&self, path: &str) -> Result<bool, SessionError> {
        let id = self.require_id()?;
        Ok(self.inner.store.lock_release(path, &id).await?)
    }

    /// Current lease id
    pub fn id(&self) -> Option<SessionId> {
        self.inner.id()
    }

    pub(crate) fn require_id(&self) -> Result<SessionId, SessionError> {
        self.id()
            .ok_or_else(|| SessionError::NotActive(self.inner.config.name.clone()))
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn ttl(&self) -> Duration {
        self.inner.config.ttl
    }

    pub fn lock_delay(&self) -> Duration {
        self.inner.config.lock_delay
    }

    pub fn behavior(&self) -> Behavior {
        self.inner.config.behavior
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> LeaseState {
        if self.inner.destroyed.load(Ordering::Acquire) {
            LeaseState::Destroyed
        } else if self.id().is_some() {
            LeaseState::Active
        } else {
            LeaseState::Uninitialized
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

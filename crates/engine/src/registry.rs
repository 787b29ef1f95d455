// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide registry of sessions and semaphores keyed by name

use crate::error::{SemaphoreError, SessionError};
use crate::semaphore::Semaphore;
use crate::session::Session;
use dr_adapters::StoreAdapter;
use dr_core::{SemaphoreConfig, SessionConfig};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Shares one session and one semaphore per name across a process
pub struct Registry<S> {
    store: S,
    sessions: Mutex<HashMap<String, Session<S>>>,
    semaphores: Mutex<HashMap<String, Semaphore<S>>>,
}

impl<S: StoreAdapter> Registry<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    /// The session registered under `config.name`, started on first use
    pub async fn session(&self, config: SessionConfig) -> Result<Session<S>, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&config.name) {
            return Ok(session.clone());
        }
        let name = config.name.clone();
        let session = Session::start(self.store.clone(), config).await?;
        sessions.insert(name, session.clone());
        Ok(session)
    }

    /// The semaphore registered under `config.name`, created on first use
    /// with the session registered under `session_config.name`
    pub async fn semaphore(
        &self,
        session_config: SessionConfig,
        config: SemaphoreConfig,
    ) -> Result<Semaphore<S>, SemaphoreError> {
        let mut semaphores = self.semaphores.lock().await;
        if let Some(semaphore) = semaphores.get(&config.name) {
            return Ok(semaphore.clone());
        }
        let session = self.session(session_config).await?;
        let name = config.name.clone();
        let semaphore = Semaphore::new(self.store.clone(), session, config)?;
        semaphores.insert(name, semaphore.clone());
        Ok(semaphore)
    }

    /// Forget every semaphore and destroy every session
    pub async fn shutdown(&self) {
        self.semaphores.lock().await.clear();
        let sessions: Vec<_> = self.sessions.lock().await.drain().collect();
        for (name, session) in sessions {
            if let Err(e) = session.destroy().await {
                tracing::warn!(name = %name, error = %e, "failed to destroy session");
            }
        }
        tracing::info!("registry shut down");
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background task that keeps a semaphore participant competing
//!
//! The task long-polls the group prefix. Whenever the group changes, or the
//! session has moved to a new lease, it re-reads the state and retries the
//! acquisition. Store errors are logged
//! and followed by a pause so a failing store is not hammered.

use crate::semaphore::Semaphore;
use dr_adapters::StoreAdapter;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a running maintenance task; dropping it cancels the task
pub struct MaintenanceHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Ask the task to stop without waiting for it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the task and wait for it to finish
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "maintenance task failed");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub(crate) fn spawn<S: StoreAdapter>(
    semaphore: Semaphore<S>,
    error_backoff: Duration,
) -> MaintenanceHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(semaphore, cancel.clone(), error_backoff));
    MaintenanceHandle {
        cancel,
        task: Some(task),
    }
}

async fn run<S: StoreAdapter>(
    semaphore: Semaphore<S>,
    cancel: CancellationToken,
    error_backoff: Duration,
) {
    tracing::debug!(prefix = semaphore.prefix(), "maintenance started");
    loop {
        // A pending long-poll has no side effects, so it is safe to abandon
        let changed = tokio::select! {
            _ = cancel.cancelled() => break,
            changed = semaphore.watch() => changed,
        };

        // A new lease id does not touch the prefix, so check for it on quiet polls too
        let changed = match changed {
            Ok(false) => Ok(semaphore.session_changed().await),
            other => other,
        };

        let failed = match changed {
            Ok(false) => false,
            Ok(true) => match semaphore.refresh().await {
                Ok(held) => {
                    tracing::debug!(prefix = semaphore.prefix(), held, "refreshed semaphore");
                    false
                }
                Err(e) => {
                    tracing::error!(prefix = semaphore.prefix(), error = %e, "refresh failed");
                    true
                }
            },
            Err(e) => {
                tracing::warn!(prefix = semaphore.prefix(), error = %e, "watch failed");
                true
            }
        };

        if failed {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(error_backoff) => {}
            }
        }
    }
    tracing::debug!(prefix = semaphore.prefix(), "maintenance stopped");
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrapper for consistent observability

use crate::store::{
    KvQuery, KvResponse, PutOptions, SessionInfo, StoreAdapter, StoreError,
};
use async_trait::async_trait;
use dr_core::{SessionId, SessionSpec};
use tracing::Instrument;

/// Wrapper that adds tracing to any StoreAdapter
#[derive(Clone)]
pub struct TracedStoreAdapter<S> {
    inner: S,
}

impl<S> TracedStoreAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: StoreAdapter> StoreAdapter for TracedStoreAdapter<S> {
    async fn create_session(&self, spec: &SessionSpec) -> Result<SessionId, StoreError> {
        let span = tracing::info_span!("store.create_session", name = %spec.name);
        async {
            tracing::info!(
                ttl_ms = spec.ttl.as_millis() as u64,
                lock_delay_ms = spec.lock_delay.as_millis() as u64,
                behavior = %spec.behavior,
                "creating"
            );

            let start = std::time::Instant::now();
            let result = self.inner.create_session(spec).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(id) => tracing::info!(
                    session = %id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "session created"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "create failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn renew_session(&self, id: &SessionId) -> Result<(), StoreError> {
        let result = self.inner.renew_session(id).await;
        match &result {
            Ok(()) => tracing::trace!(session = %id, "renewed"),
            // Lost leases are handled by the caller
            Err(e) if e.is_session_not_found() => {
                tracing::warn!(session = %id, "renew found no session")
            }
            Err(e) => tracing::error!(session = %id, error = %e, "renew failed"),
        }
        result
    }

    async fn destroy_session(&self, id: &SessionId) -> Result<(), StoreError> {
        let span = tracing::info_span!("store.destroy_session", session = %id);
        async {
            let result = self.inner.destroy_session(id).await;
            match &result {
                Ok(()) => tracing::info!("destroyed"),
                Err(e) => tracing::warn!(error = %e, "destroy failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, StoreError> {
        let result = self.inner.list_sessions().await;
        tracing::trace!(count = result.as_ref().map(|s| s.len()).ok(), "listed sessions");
        result
    }

    async fn kv_get(&self, key: &str, query: &KvQuery) -> Result<KvResponse, StoreError> {
        let Some(wait) = query.wait else {
            let result = self.inner.kv_get(key, query).await;
            tracing::trace!(
                key,
                recurse = query.recurse,
                entries = result.as_ref().map(|r| r.entries.len()).ok(),
                "read"
            );
            return result;
        };

        let span = tracing::debug_span!(
            "store.watch",
            key,
            recurse = query.recurse,
            index = wait.index
        );
        async {
            let start = std::time::Instant::now();
            let result = self.inner.kv_get(key, query).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(response) => tracing::debug!(
                    new_index = response.index,
                    changed = response.index != wait.index,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "watch returned"
                ),
                Err(e) => tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "watch failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn kv_put(
        &self,
        key: &str,
        value: &[u8],
        opts: &PutOptions,
    ) -> Result<bool, StoreError> {
        let span = tracing::debug_span!(
            "store.put",
            key,
            cas = ?opts.cas,
            acquire = ?opts.acquire.as_ref().map(SessionId::as_str),
            release = ?opts.release.as_ref().map(SessionId::as_str)
        );
        async {
            tracing::debug!(value_len = value.len(), "writing");
            let result = self.inner.kv_put(key, value, opts).await;

            match &result {
                Ok(true) => tracing::debug!("written"),
                Ok(false) => tracing::debug!("precondition failed"),
                Err(e) => tracing::error!(error = %e, "put failed"),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn kv_delete(&self, key: &str, cas: Option<u64>) -> Result<bool, StoreError> {
        let span = tracing::debug_span!("store.delete", key, cas = ?cas);
        async {
            let result = self.inner.kv_delete(key, cas).await;
            match &result {
                Ok(true) => tracing::debug!("deleted"),
                Ok(false) => tracing::debug!("precondition failed"),
                Err(e) => tracing::error!(error = %e, "delete failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;

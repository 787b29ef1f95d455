// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::MemoryStore;
use dr_core::Behavior;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// A writer that captures log output for testing
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn new() -> Self {
        Self::default()
    }

    fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run a test with captured tracing output
fn with_tracing<F, Fut>(f: F) -> (String, Fut::Output)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future,
{
    let logs = CapturedLogs::new();
    let logs_clone = logs.clone();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(logs_clone)
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });

    (logs.contents(), result)
}

fn spec(name: &str) -> SessionSpec {
    SessionSpec {
        name: name.to_string(),
        ttl: Duration::from_secs(15),
        lock_delay: Duration::ZERO,
        behavior: Behavior::Delete,
    }
}

#[tokio::test]
async fn traced_store_passes_results_through() {
    let traced = TracedStoreAdapter::new(MemoryStore::new());
    let id = traced.create_session(&spec("worker")).await.unwrap();

    assert!(traced.lock_acquire("svc/a", &id, b"none").await.unwrap());
    assert!(!traced.kv_put("svc/a", b"x", &PutOptions::cas(0)).await.unwrap());

    let response = traced.kv_get("svc/", &KvQuery::prefix()).await.unwrap();
    assert_eq!(response.entries.len(), 1);
    assert_eq!(traced.inner().entry("svc/a").unwrap().session, Some(id));
}

#[test]
fn traced_create_session_logs_entry_and_completion() {
    let (logs, result) = with_tracing(|| async {
        let traced = TracedStoreAdapter::new(MemoryStore::new());
        traced.create_session(&spec("job-runner")).await
    });

    assert!(result.is_ok(), "create should succeed: {:?}", result);
    assert!(
        logs.contains("store.create_session"),
        "Should log span name. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("job-runner"),
        "Should log session name. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("session created"),
        "Should log completion. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("elapsed_ms"),
        "Should log timing. Logs:\n{}",
        logs
    );
}

#[test]
fn traced_create_session_logs_failure() {
    let (logs, result) = with_tracing(|| async {
        let traced = TracedStoreAdapter::new(MemoryStore::new());
        let mut bad = spec("bad");
        bad.ttl = Duration::ZERO;
        traced.create_session(&bad).await
    });

    assert!(result.is_err());
    assert!(
        logs.contains("create failed"),
        "Should log failure. Logs:\n{}",
        logs
    );
    assert!(logs.contains("zero ttl"), "Should log error. Logs:\n{}", logs);
}

#[test]
fn traced_put_logs_precondition_failure() {
    let (logs, result) = with_tracing(|| async {
        let traced = TracedStoreAdapter::new(MemoryStore::new());
        traced
            .kv_put("svc/.lock", b"{}", &PutOptions::default())
            .await
            .unwrap();
        traced
            .kv_put("svc/.lock", b"{}", &PutOptions::cas(0))
            .await
    });

    assert_eq!(result, Ok(false));
    assert!(
        logs.contains("store.put"),
        "Should log span name. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("precondition failed"),
        "Should log rejected write. Logs:\n{}",
        logs
    );
}

#[test]
fn traced_renew_warns_on_lost_session() {
    let (logs, result) = with_tracing(|| async {
        let traced = TracedStoreAdapter::new(MemoryStore::new());
        traced.renew_session(&SessionId::new("gone")).await
    });

    assert!(result.unwrap_err().is_session_not_found());
    assert!(
        logs.contains("renew found no session"),
        "Should warn about lost session. Logs:\n{}",
        logs
    );
    assert!(logs.contains("WARN"), "Should log at warn. Logs:\n{}", logs);
}

#[test]
fn traced_watch_logs_returned_index() {
    let (logs, result) = with_tracing(|| async {
        let traced = TracedStoreAdapter::new(MemoryStore::new());
        traced
            .kv_put("svc/a", b"1", &PutOptions::default())
            .await
            .unwrap();
        traced
            .kv_get("svc/", &KvQuery::prefix().wait(0, Duration::from_secs(1)))
            .await
    });

    assert!(result.is_ok());
    assert!(
        logs.contains("store.watch"),
        "Should log span name. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("watch returned"),
        "Should log completion. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("changed=true"),
        "Should log change flag. Logs:\n{}",
        logs
    );
}

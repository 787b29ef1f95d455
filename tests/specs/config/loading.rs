//! Configuration specs
//!
//! Verify that a TOML file drives a worker end to end.

use crate::prelude::*;
use similar_asserts::assert_eq;
use std::io::Write;

#[tokio::test(start_paused = true)]
async fn toml_config_drives_a_worker() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[session]
name = "reports"
ttl = "20s"
lock_delay = "0s"
behavior = "delete"

[semaphore]
name = "reports"
prefix = "batch/reports"
limit = 2
"#
    )
    .unwrap();

    let config = RunnerConfig::load(file.path()).unwrap();
    let store = store();
    let semaphore = Semaphore::start(store.clone(), config.session, config.semaphore.clone())
        .await
        .unwrap();
    let _handle = semaphore.lock(config.semaphore.limit).await.unwrap();

    assert_eq!(semaphore.prefix(), "batch/reports/");
    assert_eq!(semaphore.lock_key(), "batch/reports/.lock");
    assert_eq!(semaphore.session().ttl(), Duration::from_secs(20));
    assert_eq!(semaphore.session().behavior(), Behavior::Delete);
    assert!(semaphore.is_locked());

    let stored = store.inner().entry("batch/reports/.lock").unwrap();
    assert_eq!(
        LockFile::decode(&stored.value).unwrap(),
        LockFile::new(2, [semaphore.session().id().unwrap()])
    );
}

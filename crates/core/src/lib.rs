// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dr-core: Core types for daemon-runner coordination
//!
//! This crate provides:
//! - Lease types shared by the store adapters and the session runtime
//! - The KV key layout used by a semaphore group
//! - The lock-file codec and the pure slot acquisition planner
//! - Retry policy with exponential backoff
//! - Serde-based configuration

pub mod config;
pub mod layout;
pub mod lease;
pub mod lock_file;
pub mod retry;

pub use config::{ConfigError, RunnerConfig, SemaphoreConfig, SessionConfig};
pub use layout::KeyLayout;
pub use lease::{Behavior, LeaseState, SessionId, SessionSpec};
pub use lock_file::{plan_acquire, AcquirePlan, LockFile, LockFileError};
pub use retry::RetryPolicy;

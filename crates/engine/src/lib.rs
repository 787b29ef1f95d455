// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Session runtime and distributed counting semaphore

mod error;
mod maintenance;
mod registry;
mod semaphore;
mod session;

pub use error::{SemaphoreError, SessionError};
pub use maintenance::MaintenanceHandle;
pub use registry::Registry;
pub use semaphore::Semaphore;
pub use session::Session;

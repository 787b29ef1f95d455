// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for sessions and semaphores

use dr_adapters::StoreError;
use dr_core::{ConfigError, LockFileError};
use thiserror::Error;

/// Errors from managing a lease
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to create session: {0}")]
    Create(#[source] StoreError),
    #[error("session {0} has no active lease")]
    NotActive(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from semaphore operations
#[derive(Debug, Error)]
pub enum SemaphoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    LockFile(#[from] LockFileError),
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease (session) types shared between store adapters and the runtime

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque lease identifier assigned by the store
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// What happens to the keys a session holds when the session is invalidated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// Keys stay, ownership is cleared
    #[default]
    Release,
    /// Keys are removed
    Delete,
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Behavior::Release => write!(f, "release"),
            Behavior::Delete => write!(f, "delete"),
        }
    }
}

/// Parameters sent to the store when creating a lease
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSpec {
    pub name: String,
    pub ttl: Duration,
    /// How long keys released by an invalidated session stay unacquirable
    pub lock_delay: Duration,
    pub behavior: Behavior,
}

/// Observable lifecycle of a session handle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseState {
    /// No lease has been created yet
    Uninitialized,
    /// A lease id is held (renewal and re-initialization happen in place)
    Active,
    /// `destroy` was called; the lease is gone
    Destroyed,
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;

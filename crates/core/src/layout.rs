// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! KV key layout of a semaphore group
//!
//! ```text
//! service/<name>/lock/<sessionId>      # contender key
//! service/<name>/lock/.lock            # lock file
//! ```

use crate::lease::SessionId;

/// Name of the lock file under the prefix when no explicit key is given
pub const LOCK_FILE_NAME: &str = ".lock";

/// Resolved key names for one semaphore group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
    lock_key: String,
}

impl KeyLayout {
    /// Resolve the layout for `name`.
    ///
    /// The prefix defaults to `service/<name>/lock/` and always ends with `/`.
    /// The lock key defaults to `<prefix>.lock`.
    pub fn new(name: &str, prefix: Option<&str>, lock_key: Option<&str>) -> Self {
        let mut prefix = match prefix {
            Some(p) => p.to_string(),
            None => format!("service/{}/lock/", name),
        };
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        let lock_key = match lock_key {
            Some(k) => k.to_string(),
            None => format!("{}{}", prefix, LOCK_FILE_NAME),
        };
        Self { prefix, lock_key }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn lock_key(&self) -> &str {
        &self.lock_key
    }

    /// Key a participant writes to announce itself
    pub fn contender_key(&self, session: &SessionId) -> String {
        format!("{}{}", self.prefix, session)
    }

    /// Session id encoded in a contender key (its trailing path segment)
    pub fn member_of(key: &str) -> Option<&str> {
        key.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Semaphore lock file and slot acquisition planning
//!
//! The lock file is the single KV entry recording a group's capacity and the
//! sessions currently holding a slot:
//!
//! ```json
//! {"Limit": 3, "Holders": {"<sessionId-A>": true, "<sessionId-B>": true}}
//! ```
//!
//! Holders are kept in an ordered set so the encoded form is canonical and an
//! unchanged holder set can be detected without touching the store.

use crate::lease::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors from lock file encoding and decoding
#[derive(Debug, Error)]
pub enum LockFileError {
    #[error("malformed lock file: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode lock file: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decoded lock file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawLockFile", into = "RawLockFile")]
pub struct LockFile {
    pub limit: u32,
    pub holders: BTreeSet<SessionId>,
}

/// Wire shape of the lock file
#[derive(Serialize, Deserialize)]
struct RawLockFile {
    #[serde(rename = "Limit")]
    limit: u32,
    #[serde(rename = "Holders", default)]
    holders: Option<BTreeMap<String, bool>>,
}

impl From<RawLockFile> for LockFile {
    fn from(raw: RawLockFile) -> Self {
        let holders = raw
            .holders
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, held)| *held)
            .map(|(id, _)| SessionId(id))
            .collect();
        Self {
            limit: raw.limit,
            holders,
        }
    }
}

impl From<LockFile> for RawLockFile {
    fn from(lock: LockFile) -> Self {
        Self {
            limit: lock.limit,
            holders: Some(lock.holders.into_iter().map(|id| (id.0, true)).collect()),
        }
    }
}

impl LockFile {
    pub fn new(limit: u32, holders: impl IntoIterator<Item = SessionId>) -> Self {
        Self {
            limit,
            holders: holders.into_iter().collect(),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LockFileError> {
        serde_json::from_slice(bytes).map_err(LockFileError::Decode)
    }

    /// Canonical encoding (holder ids sorted)
    pub fn encode(&self) -> Result<Vec<u8>, LockFileError> {
        serde_json::to_vec(self).map_err(LockFileError::Encode)
    }

    pub fn is_held_by(&self, session: &SessionId) -> bool {
        self.holders.contains(session)
    }
}

/// The limit a participant should use.
///
/// Once a lock file exists its `Limit` belongs to the group and wins over the
/// locally requested value, even after every holder has gone away.
pub fn agreed_limit(existing: Option<&LockFile>, requested: u32) -> u32 {
    existing.map_or(requested, |lock| lock.limit)
}

/// Outcome of planning one acquisition step
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquirePlan {
    /// Desired lock file content
    pub lock_file: LockFile,
    /// Whether `me` is a holder in `lock_file`
    pub held: bool,
    /// The pruned holder set was empty, so the stored file is not a useful CAS base
    pub reset: bool,
    /// `lock_file` equals what is stored; no write is needed
    pub unchanged: bool,
    /// Holders dropped because their contender keys are gone
    pub pruned: Vec<SessionId>,
}

/// Plan a `try_lock` step.
///
/// 1. Prune stored holders to those still present in `members`.
/// 2. Flag a reset when nothing survives the prune.
/// 3. Add `me` if it is a live member, not already a holder, and there is
///    room under the agreed limit.
/// 4. Compare the result with the stored file to detect a no-op.
///
/// `requested` only applies when nothing is stored yet; see [`agreed_limit`].
pub fn plan_acquire(
    stored: Option<&LockFile>,
    members: &BTreeSet<SessionId>,
    me: &SessionId,
    requested: u32,
) -> AcquirePlan {
    let limit = agreed_limit(stored, requested);
    let previous = stored.map(|lock| &lock.holders);

    let mut holders: BTreeSet<SessionId> = previous
        .map(|held| held.intersection(members).cloned().collect())
        .unwrap_or_default();
    let pruned = previous
        .map(|held| held.difference(members).cloned().collect())
        .unwrap_or_default();

    let reset = holders.is_empty();

    if members.contains(me) && !holders.contains(me) && holders.len() < limit as usize {
        holders.insert(me.clone());
    }

    let lock_file = LockFile { limit, holders };
    AcquirePlan {
        held: lock_file.is_held_by(me),
        unchanged: stored == Some(&lock_file),
        lock_file,
        reset,
        pruned,
    }
}

#[cfg(test)]
#[path = "lock_file_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and semaphore configuration
//!
//! Durations are written in humantime form (`"15s"`, `"5m"`) when loaded from
//! TOML:
//!
//! ```toml
//! [session]
//! name = "myservice"
//! ttl = "15s"
//! behavior = "delete"
//!
//! [semaphore]
//! name = "myservice"
//! limit = 3
//! ```

use crate::layout::KeyLayout;
use crate::lease::{Behavior, SessionSpec};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_ttl() -> Duration {
    Duration::from_secs(15)
}

fn default_lock_delay() -> Duration {
    Duration::from_secs(15)
}

fn default_verify_attempts() -> u32 {
    2
}

fn default_verify_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_limit() -> u32 {
    3
}

fn default_contender_value() -> String {
    "none".to_string()
}

fn default_wait_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_error_backoff() -> Duration {
    Duration::from_secs(1)
}

/// Lease configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session name recorded by the store
    pub name: String,
    /// Lease time-to-live; renewed every `ttl / 2`
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub ttl: Duration,
    /// How long released keys stay unacquirable after the lease is invalidated
    #[serde(default = "default_lock_delay", with = "humantime_serde")]
    pub lock_delay: Duration,
    #[serde(default)]
    pub behavior: Behavior,
    /// Times to look for a freshly created lease in the session list
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,
    #[serde(default = "default_verify_interval", with = "humantime_serde")]
    pub verify_interval: Duration,
    /// Retry policy for lease creation
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ttl: default_ttl(),
            lock_delay: default_lock_delay(),
            behavior: Behavior::default(),
            verify_attempts: default_verify_attempts(),
            verify_interval: default_verify_interval(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_lock_delay(mut self, delay: Duration) -> Self {
        self.lock_delay = delay;
        self
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_verify(mut self, attempts: u32, interval: Duration) -> Self {
        self.verify_attempts = attempts;
        self.verify_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Interval between renewals
    pub fn renew_interval(&self) -> Duration {
        self.ttl / 2
    }

    /// Lease parameters sent to the store
    pub fn spec(&self) -> SessionSpec {
        SessionSpec {
            name: self.name.clone(),
            ttl: self.ttl,
            lock_delay: self.lock_delay,
            behavior: self.behavior,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("session name is empty".to_string()));
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "session {} has a zero ttl",
                self.name
            )));
        }
        if self.renew_interval().is_zero() {
            return Err(ConfigError::Invalid(format!(
                "session {} ttl {:?} is too short to renew",
                self.name, self.ttl
            )));
        }
        Ok(())
    }
}

/// Semaphore configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemaphoreConfig {
    /// Group name; also the default prefix component
    pub name: String,
    /// KV prefix; defaults to `service/<name>/lock/`
    #[serde(default)]
    pub prefix: Option<String>,
    /// Lock file key; defaults to `<prefix>.lock`
    #[serde(default)]
    pub lock_key: Option<String>,
    /// Requested slot count (an existing lock file's limit wins)
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Value written to the contender key
    #[serde(default = "default_contender_value")]
    pub contender_value: String,
    /// Long-poll wait requested from the store
    #[serde(default = "default_wait_timeout", with = "humantime_serde")]
    pub wait_timeout: Duration,
    /// Pause after a failed long-poll before polling again
    #[serde(default = "default_error_backoff", with = "humantime_serde")]
    pub error_backoff: Duration,
    /// Retry policy for contender registration
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl SemaphoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            lock_key: None,
            limit: default_limit(),
            contender_value: default_contender_value(),
            wait_timeout: default_wait_timeout(),
            error_backoff: default_error_backoff(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_lock_key(mut self, key: impl Into<String>) -> Self {
        self.lock_key = Some(key.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn layout(&self) -> KeyLayout {
        KeyLayout::new(&self.name, self.prefix.as_deref(), self.lock_key.as_deref())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("semaphore name is empty".to_string()));
        }
        if self.contender_value.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "semaphore {} has an empty contender value",
                self.name
            )));
        }
        Ok(())
    }
}

/// Complete configuration for a worker process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub session: SessionConfig,
    pub semaphore: SemaphoreConfig,
}

impl RunnerConfig {
    /// Session and semaphore configuration sharing one name
    pub fn new(name: &str) -> Self {
        Self {
            session: SessionConfig::new(name),
            semaphore: SemaphoreConfig::new(name),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.session.validate()?;
        config.semaphore.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

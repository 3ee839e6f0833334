//! Per-job lock: one key per job, value is the run token of the invocation
//! currently allowed to run it.
use std::{fmt, sync::Arc, time::Duration};

use tracing::{debug, warn};

use cronha_model::{CoordinationConfig, RunToken};
use cronha_store::LockStore;

use crate::error::CoreError;

/// Handle on one job's lock key, bound to one run token.
///
/// Acquiring does not start anything; the supervisor decides what to do with
/// the answer.
#[derive(Clone)]
pub struct CommandLockGuard {
    store: Arc<dyn LockStore>,
    key: String,
    token: RunToken,
    ttl: Duration,
}

impl CommandLockGuard {
    pub fn new(
        store: Arc<dyn LockStore>,
        key: impl Into<String>,
        token: RunToken,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            token,
            ttl,
        }
    }

    /// Guard for `job_key` under the configured prefix and lock timeout.
    pub fn for_job(
        store: Arc<dyn LockStore>,
        cfg: &CoordinationConfig,
        job_key: &str,
        token: RunToken,
    ) -> Self {
        Self::new(store, cfg.job_lock_key(job_key), token, cfg.lock_ttl())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &RunToken {
        &self.token
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `true` iff the job slot was free and is now ours.
    pub async fn acquire(&self) -> Result<bool, CoreError> {
        let acquired = self
            .store
            .try_acquire(&self.key, self.token.as_str(), self.ttl)
            .await?;
        debug!(key = %self.key, token = %self.token, acquired, "job lock acquire");
        Ok(acquired)
    }

    /// Take the job slot regardless of the current holder.
    ///
    /// Only for an explicit administrator override; a forced primary
    /// takeover never implies it.
    pub async fn force_acquire(&self) -> Result<(), CoreError> {
        self.store
            .force_acquire(&self.key, self.token.as_str(), self.ttl)
            .await?;
        warn!(key = %self.key, token = %self.token, "job lock taken over by force");
        Ok(())
    }

    /// `false` when the lock expired or now belongs to someone else.
    pub async fn renew(&self) -> Result<bool, CoreError> {
        let renewed = self
            .store
            .try_renew(&self.key, self.token.as_str(), self.ttl)
            .await?;
        Ok(renewed)
    }

    /// Delete the lock if it is still ours.
    ///
    /// Returns [`CoreError::LockNotHeld`] when it is not; callers treat that
    /// as a no-op.
    pub async fn release(&self) -> Result<(), CoreError> {
        if self.store.release(&self.key, self.token.as_str()).await? {
            debug!(key = %self.key, token = %self.token, "job lock released");
            Ok(())
        } else {
            Err(CoreError::LockNotHeld {
                key: self.key.clone(),
            })
        }
    }
}

impl fmt::Debug for CommandLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandLockGuard")
            .field("store", &self.store.name())
            .field("key", &self.key)
            .field("token", &self.token)
            .field("ttl", &self.ttl)
            .finish()
    }
}

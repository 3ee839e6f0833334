use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    Endpoint,
    error::{ModelError, ModelResult},
};

pub const DEFAULT_GROUP_NAME: &str = "mymaster";
pub const DEFAULT_LOCK_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_PRIMARY_LOCK_KEY: &str = "cron:server_name";
pub const DEFAULT_JOB_LOCK_PREFIX: &str = "cron:lock:";
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 200;

/// Coordination settings shared by the election daemon and job invocations.
///
/// Every field has a default, so an empty document is a valid configuration
/// pointing at a local store. Key names of the older `cron-ha.yml` layout
/// (`sentinels`, `redis`, `timeout_sec`, ...) are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Discovery nodes asked for the current writable store endpoint.
    /// Empty means `direct_endpoint` is used as is.
    #[serde(alias = "sentinels")]
    pub discovery_endpoints: Vec<Endpoint>,

    /// Store endpoint used when no discovery nodes are configured.
    #[serde(alias = "redis")]
    pub direct_endpoint: Endpoint,

    /// Name of the replicated store group the discovery nodes watch.
    #[serde(alias = "sentinel_master_name")]
    pub coordination_group_name: String,

    /// Logical database inside the store.
    #[serde(alias = "redis_db_num")]
    pub logical_database_index: i64,

    /// Expiry of every lock written by this program.
    #[serde(alias = "timeout_sec")]
    pub lock_timeout_seconds: u64,

    #[serde(alias = "server_key_name")]
    pub primary_lock_key: String,

    #[serde(alias = "lock_key_prefix")]
    pub job_lock_key_prefix: String,

    /// Marker file for external health checks. `None` disables it.
    pub primary_flag_file_path: Option<PathBuf>,

    /// Overrides the host name as this server's identity.
    pub server_id: Option<String>,

    /// Upper bound for a single store call, connection included.
    pub store_timeout_ms: u64,

    /// Upper bound for asking one discovery node.
    pub discovery_timeout_ms: u64,

    /// How long a running job tolerates an unreachable store before the
    /// job lock counts as lost. Defaults to the lock timeout.
    pub store_grace_seconds: Option<u64>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            discovery_endpoints: Vec::new(),
            direct_endpoint: Endpoint::default(),
            coordination_group_name: DEFAULT_GROUP_NAME.to_string(),
            logical_database_index: 0,
            lock_timeout_seconds: DEFAULT_LOCK_TIMEOUT_SECONDS,
            primary_lock_key: DEFAULT_PRIMARY_LOCK_KEY.to_string(),
            job_lock_key_prefix: DEFAULT_JOB_LOCK_PREFIX.to_string(),
            primary_flag_file_path: None,
            server_id: None,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            store_grace_seconds: None,
        }
    }
}

impl CoordinationConfig {
    /// Validate the configuration before connecting to anything.
    ///
    /// Rules:
    /// - lock timeout is positive;
    /// - lock keys and the job prefix are not empty;
    /// - a store call times out strictly before a lock would expire;
    /// - an explicit store grace lies within `1..=lock_timeout_seconds`;
    /// - discovery needs a group name.
    pub fn validate(&self) -> ModelResult<()> {
        if self.lock_timeout_seconds == 0 {
            return Err(ModelError::InvalidConfig(
                "lock_timeout_seconds cannot be zero".into(),
            ));
        }
        if self.primary_lock_key.trim().is_empty() {
            return Err(ModelError::InvalidConfig(
                "primary_lock_key cannot be empty".into(),
            ));
        }
        if self.job_lock_key_prefix.is_empty() {
            return Err(ModelError::InvalidConfig(
                "job_lock_key_prefix cannot be empty".into(),
            ));
        }
        if self.store_timeout_ms == 0 || self.store_timeout() >= self.lock_ttl() {
            return Err(ModelError::InvalidConfig(format!(
                "store_timeout_ms ({}) must be positive and shorter than the lock timeout ({}s)",
                self.store_timeout_ms, self.lock_timeout_seconds
            )));
        }
        let grace_range = 1..=self.lock_timeout_seconds;
        if let Some(grace) = self.store_grace_seconds.filter(|g| !grace_range.contains(g)) {
            return Err(ModelError::InvalidConfig(format!(
                "store_grace_seconds ({grace}) must be between 1 and the lock timeout ({}s)",
                self.lock_timeout_seconds
            )));
        }
        if !self.discovery_endpoints.is_empty() && self.coordination_group_name.trim().is_empty() {
            return Err(ModelError::InvalidConfig(
                "coordination_group_name is required with discovery_endpoints".into(),
            ));
        }
        Ok(())
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    /// Cadence of the election loop: half the lock ttl.
    pub fn election_period(&self) -> Duration {
        self.lock_ttl() / 2
    }

    /// Cadence of job lock renewal: strictly below half the lock ttl.
    pub fn renew_period(&self) -> Duration {
        self.lock_ttl() / 3
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn store_grace(&self) -> Duration {
        self.store_grace_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.lock_ttl())
    }

    /// Store key guarding one job.
    pub fn job_lock_key(&self, job_key: &str) -> String {
        format!("{}{}", self.job_lock_key_prefix, job_key)
    }
}

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::error::{ModelError, ModelResult};

/// Per-process sequence mixed into run tokens.
static TOKEN_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity written as the value of the primary lock.
///
/// Stable across processes on the same server: the election daemon and every
/// job invocation must compute the same value to agree on who is primary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerIdentity(String);

impl ServerIdentity {
    /// Use an explicit identity (e.g. `server_id` from the config file).
    pub fn new(id: impl Into<String>) -> ModelResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ModelError::Identity("identity is empty".into()));
        }
        Ok(Self(id))
    }

    /// Derive the identity from the host name.
    pub fn from_hostname() -> ModelResult<Self> {
        let name = hostname::get().map_err(|e| ModelError::Identity(e.to_string()))?;
        let name = name
            .into_string()
            .map_err(|raw| ModelError::Identity(format!("host name is not UTF-8: {raw:?}")))?;
        Self::new(name)
    }

    /// Explicit identity if configured, host name otherwise.
    pub fn resolve(configured: Option<&str>) -> ModelResult<Self> {
        match configured {
            Some(id) => Self::new(id),
            None => Self::from_hostname(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value stored in a job lock.
///
/// Format: `{identity}:{pid}:{nonce:x}`.
/// - `identity`: [`ServerIdentity`] of the server running the job
/// - `pid`: supervisor process id (the job runs in its process tree)
/// - `nonce`: start time mixed with a per-process sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunToken(String);

impl RunToken {
    pub fn new(identity: &ServerIdentity, pid: u32, nonce: u64) -> Self {
        Self(format!("{identity}:{pid}:{nonce:x}"))
    }

    /// Build a token for the current process.
    pub fn generate(identity: &ServerIdentity) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let nonce = nanos ^ TOKEN_SEQ.fetch_add(1, Ordering::Relaxed);
        Self::new(identity, std::process::id(), nonce)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

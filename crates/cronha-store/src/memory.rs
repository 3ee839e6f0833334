use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{LockStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store with the same lock semantics as the Redis backend.
///
/// Expiry follows the tokio clock, so tests running with paused time can
/// advance past a ttl deterministically. Outages are simulated with
/// [`MemoryStore::set_available`].
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated reachability. While unavailable every call fails
    /// with [`StoreError::Unavailable`] and stored keys keep expiring.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Live (non-expired) keys, for assertions.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock the map after checking availability and dropping the key if expired.
    fn live(&self, key: &str) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        let mut entries = self.entries();
        if entries
            .get(key)
            .is_some_and(|e| e.expires_at <= Instant::now())
        {
            entries.remove(key);
        }
        Ok(entries)
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.live(key)?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn try_renew(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.live(key)?;
        match entries.get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn force_acquire(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.live(key)?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.live(key)?;
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn release(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut entries = self.live(key)?;
        if entries.get(key).is_some_and(|e| e.value == expected) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

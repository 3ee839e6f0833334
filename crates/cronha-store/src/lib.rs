//! Lock primitives over a replicated key-value store.
//!
//! Every lock in cron-ha is a single key whose value names its owner and whose
//! expiry recovers from owners that disappear. [`LockStore`] is the seam the
//! election and job layers talk to; [`RedisStore`] is the production backend,
//! [`MemoryStore`] keeps the same semantics in-process.
mod error;
pub use error::{StoreError, StoreResult};

mod memory;
pub use memory::MemoryStore;

mod redis_store;
pub use redis_store::{Discovery, RedisStore};

use std::time::Duration;

use async_trait::async_trait;

/// Atomic single-key lock operations.
///
/// Implementations must:
/// - make each call a single round trip with no session state between calls;
/// - report resolution, transport and timeout failures as [`StoreError::Unavailable`]
///   instead of blocking;
/// - never retry `try_acquire` / `force_acquire` blindly after an ambiguous failure.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &'static str;

    /// Set `key = value` with expiry if the key is absent.
    ///
    /// Returns `true` iff this call created the key.
    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Refresh the expiry if the key currently holds `expected`.
    ///
    /// Returns `false` if the key is absent or owned by another value.
    async fn try_renew(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool>;

    /// Overwrite the key regardless of the current holder.
    async fn force_acquire(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Current value of the key, `None` when absent.
    async fn read(&self, key: &str) -> StoreResult<Option<String>>;

    /// Delete the key if it currently holds `expected`.
    ///
    /// Returns `false` when nothing was deleted (absent or foreign owner).
    async fn release(&self, key: &str, expected: &str) -> StoreResult<bool>;
}

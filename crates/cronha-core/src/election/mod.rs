//! Primary-role election over a single lock key.
//!
//! The elector keeps a local belief (`Role`) that changes only on explicit
//! store answers: a successful acquire promotes, a rejected renewal demotes.
//! An unreachable store leaves the belief untouched so transient blips never
//! make the role flap.
use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use cronha_model::{CoordinationConfig, Role, ServerIdentity};
use cronha_store::{LockStore, StoreResult};

use crate::{error::CoreError, flag::FlagFile};

/// Owner of this server's primary role.
pub struct LeaderElector {
    store: Arc<dyn LockStore>,
    identity: ServerIdentity,
    key: String,
    ttl: Duration,
    period: Duration,
    flag: Option<FlagFile>,
    role: watch::Sender<Role>,
}

impl LeaderElector {
    /// Create an elector in the `NotPrimary` state ticking every `ttl / 2`.
    pub fn new(
        store: Arc<dyn LockStore>,
        identity: ServerIdentity,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let (role, _) = watch::channel(Role::NotPrimary);
        Self {
            store,
            identity,
            key: key.into(),
            ttl,
            period: ttl / 2,
            flag: None,
            role,
        }
    }

    pub fn from_config(
        store: Arc<dyn LockStore>,
        identity: ServerIdentity,
        cfg: &CoordinationConfig,
    ) -> Self {
        let elector = Self::new(store, identity, cfg.primary_lock_key.clone(), cfg.lock_ttl())
            .with_period(cfg.election_period());
        match &cfg.primary_flag_file_path {
            Some(path) => elector.with_flag_file(FlagFile::new(path)),
            None => elector,
        }
    }

    pub fn with_flag_file(mut self, flag: FlagFile) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Cached belief; never touches the store.
    pub fn current_role(&self) -> Role {
        *self.role.borrow()
    }

    /// Receiver notified on every role change.
    pub fn subscribe(&self) -> watch::Receiver<Role> {
        self.role.subscribe()
    }

    /// One election step.
    ///
    /// Returns the role after the step. On a store failure the role is kept
    /// and the error is returned for diagnostics; the flag file is synced
    /// either way.
    pub async fn tick(&self) -> Result<Role, CoreError> {
        let outcome = match self.current_role() {
            Role::NotPrimary => self.acquire().await,
            Role::Primary => {
                self.store
                    .try_renew(&self.key, self.identity.as_str(), self.ttl)
                    .await
            }
        };

        let result = match outcome {
            Ok(true) => {
                self.set_role(Role::Primary);
                Ok(Role::Primary)
            }
            Ok(false) => {
                self.set_role(Role::NotPrimary);
                Ok(Role::NotPrimary)
            }
            Err(e) => Err(CoreError::Store(e)),
        };
        self.sync_flag();
        result
    }

    /// Take the primary lock unconditionally.
    ///
    /// The flag file is left alone; the election loop writes it on its next
    /// tick, so a one-shot takeover never leaves a flag without a loop behind it.
    #[instrument(level = "debug", skip(self), fields(key = %self.key, identity = %self.identity))]
    pub async fn force_become_primary(&self) -> Result<(), CoreError> {
        self.store
            .force_acquire(&self.key, self.identity.as_str(), self.ttl)
            .await?;
        warn!(key = %self.key, identity = %self.identity, "primary lock taken over by force");
        self.set_role(Role::Primary);
        Ok(())
    }

    /// Tick until `cancel` fires, then step down.
    ///
    /// Store failures are logged and never end the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            key = %self.key,
            identity = %self.identity,
            store = self.store.name(),
            period_ms = self.period.as_millis() as u64,
            "election loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, role = %self.current_role(), "election tick failed, keeping last known role");
                    }
                }
            }
        }
        self.step_down().await;
        info!("election loop stopped");
    }

    /// Set-if-absent, then adopt a lock that already carries our identity
    /// (restart within one ttl, or a preceding forced takeover).
    async fn acquire(&self) -> StoreResult<bool> {
        let value = self.identity.as_str();
        if self.store.try_acquire(&self.key, value, self.ttl).await? {
            return Ok(true);
        }
        self.store.try_renew(&self.key, value, self.ttl).await
    }

    /// Release the lock if held so a peer can take over before expiry.
    async fn step_down(&self) {
        if self.current_role().is_primary() {
            match self.store.release(&self.key, self.identity.as_str()).await {
                Ok(true) => info!(key = %self.key, "primary lock released"),
                Ok(false) => debug!(key = %self.key, "primary lock already gone at shutdown"),
                Err(e) => warn!(key = %self.key, error = %e, "primary lock not released, it will expire"),
            }
        }
        self.set_role(Role::NotPrimary);
        self.sync_flag();
    }

    fn set_role(&self, next: Role) {
        let prev = self.role.send_replace(next);
        match (prev, next) {
            (Role::NotPrimary, Role::Primary) => {
                info!(key = %self.key, identity = %self.identity, "became primary")
            }
            (Role::Primary, Role::NotPrimary) => {
                warn!(key = %self.key, identity = %self.identity, "no longer primary")
            }
            _ => {}
        }
    }

    fn sync_flag(&self) {
        if let Some(flag) = &self.flag {
            flag.sync(self.current_role());
        }
    }
}

/// Single-shot role check for processes without an election loop.
///
/// Primary iff the lock currently holds `identity`.
pub async fn probe_role(
    store: &dyn LockStore,
    key: &str,
    identity: &ServerIdentity,
) -> Result<Role, CoreError> {
    let holder = store.read(key).await?;
    debug!(key, holder = ?holder, identity = %identity, "primary lock probed");
    if holder.as_deref() == Some(identity.as_str()) {
        Ok(Role::Primary)
    } else {
        Ok(Role::NotPrimary)
    }
}

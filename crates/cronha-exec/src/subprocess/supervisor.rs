use std::{future, process::ExitStatus, sync::Arc, time::Duration};

use tokio::{
    process::Child,
    signal::unix::{self, SignalKind},
    sync::watch,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, instrument, warn};

use cronha_core::{election::probe_role, error::CoreError, lock::CommandLockGuard};
use cronha_model::{CoordinationConfig, Role, ServerIdentity};
use cronha_store::LockStore;

use crate::{
    ExecError, LockLossPolicy, Signal,
    subprocess::{ChildExit, CommandSpec, RunOutcome, SkipReason},
};

/// How the job lock is taken before the child starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireMode {
    /// Skip the run when another invocation holds the lock.
    #[default]
    Normal,
    /// Overwrite whatever holds the lock.
    Force,
}

/// Source of the "is this server primary" answer.
#[derive(Debug, Clone)]
pub enum PrimaryCheck {
    /// One read of the primary lock key, compared with this server's identity.
    Probe { key: String, identity: ServerIdentity },
    /// Belief of an election loop running in the same process.
    Local(watch::Receiver<Role>),
}

impl PrimaryCheck {
    async fn role(&self, store: &dyn LockStore) -> Result<Role, CoreError> {
        match self {
            PrimaryCheck::Probe { key, identity } => probe_role(store, key, identity).await,
            PrimaryCheck::Local(rx) => Ok(*rx.borrow()),
        }
    }
}

/// Runs one job invocation: primary gate, job lock, child, renewal, release.
pub struct ProcessSupervisor {
    store: Arc<dyn LockStore>,
    primary: PrimaryCheck,
    renew_period: Duration,
    store_grace: Duration,
    policy: LockLossPolicy,
    forward_signals: bool,
}

/// Result of one renewal attempt while the child runs.
enum Renewal {
    Held,
    Unreachable { past_grace: bool },
    Lost,
}

impl ProcessSupervisor {
    pub fn new(
        store: Arc<dyn LockStore>,
        primary: PrimaryCheck,
        renew_period: Duration,
        store_grace: Duration,
    ) -> Self {
        Self {
            store,
            primary,
            renew_period,
            store_grace,
            policy: LockLossPolicy::default(),
            forward_signals: false,
        }
    }

    /// Supervisor for a short-lived invocation that probes the primary key.
    pub fn from_config(
        store: Arc<dyn LockStore>,
        cfg: &CoordinationConfig,
        identity: ServerIdentity,
    ) -> Self {
        let primary = PrimaryCheck::Probe {
            key: cfg.primary_lock_key.clone(),
            identity,
        };
        Self::new(store, primary, cfg.renew_period(), cfg.store_grace())
    }

    pub fn with_policy(mut self, policy: LockLossPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Relay SIGTERM and SIGINT received by this process to the job's group.
    pub fn with_signal_forwarding(mut self, enabled: bool) -> Self {
        self.forward_signals = enabled;
        self
    }

    pub fn policy(&self) -> LockLossPolicy {
        self.policy
    }

    /// Run `spec` under `guard` to completion.
    ///
    /// Store errors before the child starts are returned; once it runs, they
    /// only feed the lock-loss decision.
    #[instrument(level = "info", skip_all, fields(key = %guard.key(), token = %guard.token()))]
    pub async fn run(
        &self,
        guard: &CommandLockGuard,
        spec: &CommandSpec,
        mode: AcquireMode,
    ) -> Result<RunOutcome, ExecError> {
        spec.validate()?;

        let role = self.primary.role(self.store.as_ref()).await?;
        if !role.is_primary() {
            info!("server is not primary; job skipped");
            return Ok(RunOutcome::NotRun(SkipReason::NotPrimary));
        }

        match mode {
            AcquireMode::Normal => {
                if !guard.acquire().await? {
                    info!("job lock held by another run; job skipped");
                    return Ok(RunOutcome::NotRun(SkipReason::LockHeld));
                }
            }
            AcquireMode::Force => guard.force_acquire().await?,
        }
        let acquired_at = Instant::now();

        let child = match spec.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, command = %spec, "failed to start job");
                self.release(guard).await;
                return Err(e);
            }
        };

        let outcome = self.supervise(guard, child, acquired_at).await;
        self.release(guard).await;
        outcome
    }

    async fn supervise(
        &self,
        guard: &CommandLockGuard,
        mut child: Child,
        acquired_at: Instant,
    ) -> Result<RunOutcome, ExecError> {
        let Some(pgid) = child.id() else {
            return Err(ExecError::Internal("spawned job has no pid".into()));
        };
        info!(pid = pgid, "job started");

        let mut renew = time::interval_at(acquired_at + self.renew_period, self.renew_period);
        renew.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (mut sigterm, mut sigint) = self.signal_listeners();
        let mut last_renewed = acquired_at;
        let mut lock_lost = false;
        let mut kill_at: Option<Instant> = None;

        let status = loop {
            tokio::select! {
                res = child.wait() => break res.map_err(ExecError::Wait)?,

                _ = renew.tick(), if !lock_lost => {
                    match self.renew_once(guard, last_renewed).await {
                        Renewal::Held => last_renewed = Instant::now(),
                        Renewal::Unreachable { past_grace: false } => {}
                        Renewal::Unreachable { past_grace: true } if !self.policy.stops_job() => {
                            warn!(pid = pgid, "store unreachable past grace; job keeps running, still renewing");
                        }
                        Renewal::Unreachable { past_grace: true } | Renewal::Lost => {
                            lock_lost = true;
                            kill_at = self.on_lock_lost(pgid);
                        }
                    }
                }

                _ = wait_deadline(kill_at) => {
                    let status = self.kill(&mut child, pgid).await?;
                    return Ok(RunOutcome::Killed(ChildExit::from_status(status, lock_lost)));
                }

                _ = next_signal(&mut sigterm) => forward(Signal::TERM, pgid),
                _ = next_signal(&mut sigint) => forward(Signal::INT, pgid),
            }
        };

        let exit = ChildExit::from_status(status, lock_lost);
        info!(code = ?exit.code, signal = ?exit.signal, lock_lost, "job exited");
        Ok(RunOutcome::Finished(exit))
    }

    /// One renewal, bounded by the time left on the lock.
    ///
    /// Past the expiry only the store's own call timeout bounds the attempt;
    /// a key that survived the outage is still renewed.
    async fn renew_once(&self, guard: &CommandLockGuard, last_renewed: Instant) -> Renewal {
        let expires_at = last_renewed + guard.ttl();
        let remaining = expires_at.saturating_duration_since(Instant::now());
        let attempt = async {
            if remaining.is_zero() {
                Ok(guard.renew().await)
            } else {
                time::timeout(remaining, guard.renew()).await
            }
        };

        let failure = match attempt.await {
            Ok(Ok(true)) => {
                debug!("job lock renewed");
                return Renewal::Held;
            }
            Ok(Ok(false)) => {
                warn!("job lock lost: renewal rejected");
                return Renewal::Lost;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "renewal outlived the lock ttl".to_string(),
        };

        let unreachable_for = last_renewed.elapsed();
        let past_grace = unreachable_for >= self.store_grace;
        warn!(error = %failure, ?unreachable_for, past_grace, "job lock renewal failed");
        Renewal::Unreachable { past_grace }
    }

    /// Apply the lock-loss policy; returns the kill deadline when stopping.
    fn on_lock_lost(&self, pgid: u32) -> Option<Instant> {
        match self.policy {
            LockLossPolicy::FailOpen => {
                warn!(pid = pgid, "job keeps running without its lock");
                None
            }
            LockLossPolicy::Stop(esc) => {
                warn!(pid = pgid, signal = %esc.stop_signal, timeout = ?esc.stop_timeout, "stopping job");
                if let Err(e) = esc.stop_signal.send_to_group(pgid) {
                    error!(error = %e, "failed to send stop signal");
                }
                Some(Instant::now() + esc.stop_timeout)
            }
        }
    }

    async fn kill(&self, child: &mut Child, pgid: u32) -> Result<ExitStatus, ExecError> {
        let signal = match self.policy {
            LockLossPolicy::Stop(esc) => esc.kill_signal,
            LockLossPolicy::FailOpen => Signal::KILL,
        };
        warn!(pid = pgid, %signal, "job outlived stop timeout; killing");
        if let Err(e) = signal.send_to_group(pgid) {
            error!(error = %e, "failed to send kill signal");
        }
        child.wait().await.map_err(ExecError::Wait)
    }

    async fn release(&self, guard: &CommandLockGuard) {
        match guard.release().await {
            Ok(()) => {}
            Err(CoreError::LockNotHeld { .. }) => debug!("job lock no longer ours; nothing to release"),
            Err(e) => warn!(error = %e, "failed to release job lock; it will expire"),
        }
    }

    fn signal_listeners(&self) -> (Option<unix::Signal>, Option<unix::Signal>) {
        if !self.forward_signals {
            return (None, None);
        }
        let listen = |kind: SignalKind| match unix::signal(kind) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "failed to install signal handler; signals not forwarded");
                None
            }
        };
        (listen(SignalKind::terminate()), listen(SignalKind::interrupt()))
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => future::pending().await,
    }
}

async fn next_signal(listener: &mut Option<unix::Signal>) {
    if let Some(s) = listener {
        if s.recv().await.is_some() {
            return;
        }
    }
    future::pending().await
}

fn forward(signal: Signal, pgid: u32) {
    info!(pid = pgid, %signal, "forwarding signal to job");
    if let Err(e) = signal.send_to_group(pgid) {
        error!(error = %e, "failed to forward signal");
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::StopEscalation;
    use cronha_model::RunToken;
    use cronha_store::MemoryStore;

    const PRIMARY_KEY: &str = "cron:server_name";
    const JOB_KEY: &str = "cron:lock:job";
    const TTL: Duration = Duration::from_secs(2);
    const RENEW: Duration = Duration::from_millis(100);

    fn node() -> ServerIdentity {
        ServerIdentity::new("node-a").unwrap()
    }

    async fn primary_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .try_acquire(PRIMARY_KEY, "node-a", Duration::from_secs(60))
            .await
            .unwrap();
        store
    }

    fn guard(store: &Arc<MemoryStore>, nonce: u64) -> CommandLockGuard {
        CommandLockGuard::new(store.clone(), JOB_KEY, RunToken::new(&node(), 100, nonce), TTL)
    }

    fn supervisor(store: &Arc<MemoryStore>) -> ProcessSupervisor {
        supervisor_with_grace(store, TTL)
    }

    fn supervisor_with_grace(store: &Arc<MemoryStore>, grace: Duration) -> ProcessSupervisor {
        let primary = PrimaryCheck::Probe {
            key: PRIMARY_KEY.into(),
            identity: node(),
        };
        ProcessSupervisor::new(store.clone(), primary, RENEW, grace)
    }

    fn strict(stop_timeout: Duration) -> LockLossPolicy {
        LockLossPolicy::Stop(StopEscalation {
            stop_timeout,
            ..StopEscalation::default()
        })
    }

    fn touch_cmd(marker: &Path) -> CommandSpec {
        CommandSpec::new(format!("touch '{}'", marker.display()))
    }

    async fn steal_after(store: &Arc<MemoryStore>, delay: Duration) {
        time::sleep(delay).await;
        store
            .force_acquire(JOB_KEY, "thief", Duration::from_secs(60))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn not_primary_never_spawns() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");

        let out = supervisor(&store)
            .run(&guard(&store, 1), &touch_cmd(&marker), AcquireMode::Normal)
            .await
            .unwrap();

        assert_eq!(out, RunOutcome::NotRun(SkipReason::NotPrimary));
        assert!(!marker.exists());
        assert_eq!(store.read(JOB_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn held_lock_skips_the_run() {
        let store = primary_store().await;
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        assert!(guard(&store, 1).acquire().await.unwrap());

        let out = supervisor(&store)
            .run(&guard(&store, 2), &touch_cmd(&marker), AcquireMode::Normal)
            .await
            .unwrap();

        assert_eq!(out, RunOutcome::NotRun(SkipReason::LockHeld));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn exit_code_propagates_and_lock_is_released() {
        let store = primary_store().await;

        let out = supervisor(&store)
            .run(&guard(&store, 1), &CommandSpec::new("exit 3"), AcquireMode::Normal)
            .await
            .unwrap();

        let RunOutcome::Finished(exit) = out else {
            panic!("unexpected outcome {out:?}");
        };
        assert_eq!(exit.exit_code(), 3);
        assert!(!exit.lock_lost);
        assert_eq!(store.read(JOB_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn lock_is_renewed_past_its_ttl() {
        let store = primary_store().await;
        let g = CommandLockGuard::new(
            store.clone(),
            JOB_KEY,
            RunToken::new(&node(), 100, 1),
            Duration::from_millis(300),
        );

        let sup = supervisor(&store);
        let spec = CommandSpec::new("sleep 0.8");

        let (out, holder) = tokio::join!(
            sup.run(&g, &spec, AcquireMode::Normal),
            async {
                time::sleep(Duration::from_millis(600)).await;
                store.read(JOB_KEY).await.unwrap()
            }
        );

        assert_eq!(holder.as_deref(), Some(g.token().as_str()));
        assert!(!out.unwrap().child().unwrap().lock_lost);
    }

    #[tokio::test]
    async fn concurrent_invocations_run_once() {
        let store = primary_store().await;
        let sup = supervisor(&store);
        let (a, b) = (guard(&store, 1), guard(&store, 2));
        let spec = CommandSpec::new("sleep 0.3");

        let (ra, rb) = tokio::join!(
            sup.run(&a, &spec, AcquireMode::Normal),
            sup.run(&b, &spec, AcquireMode::Normal)
        );

        let outcomes = [ra.unwrap(), rb.unwrap()];
        let ran = outcomes.iter().filter(|o| o.child().is_some()).count();
        let skipped = outcomes
            .iter()
            .filter(|o| **o == RunOutcome::NotRun(SkipReason::LockHeld))
            .count();
        assert_eq!((ran, skipped), (1, 1));
    }

    #[tokio::test]
    async fn strict_mode_kills_a_child_ignoring_stop_signal() {
        let store = primary_store().await;
        let sup = supervisor(&store).with_policy(strict(Duration::from_millis(200)));
        let g = guard(&store, 1);
        let spec = CommandSpec::new("trap '' TERM; sleep 5");
        let started = Instant::now();

        let (out, _) = tokio::join!(
            sup.run(&g, &spec, AcquireMode::Normal),
            steal_after(&store, Duration::from_millis(150))
        );

        let RunOutcome::Killed(exit) = out.unwrap() else {
            panic!("child was not killed");
        };
        assert_eq!(exit.signal, Some(libc::SIGKILL));
        assert!(exit.lock_lost);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(store.read(JOB_KEY).await.unwrap().as_deref(), Some("thief"));
    }

    #[tokio::test]
    async fn strict_mode_stops_a_cooperative_child() {
        let store = primary_store().await;
        let sup = supervisor(&store).with_policy(strict(Duration::from_secs(5)));
        let g = guard(&store, 1);
        let spec = CommandSpec::new("sleep 5");

        let (out, _) = tokio::join!(
            sup.run(&g, &spec, AcquireMode::Normal),
            steal_after(&store, Duration::from_millis(150))
        );

        let RunOutcome::Finished(exit) = out.unwrap() else {
            panic!("child should exit on the stop signal");
        };
        assert_eq!(exit.signal, Some(libc::SIGTERM));
        assert_eq!(exit.exit_code(), 143);
        assert!(exit.lock_lost);
    }

    #[tokio::test]
    async fn fail_open_keeps_the_child_running() {
        let store = primary_store().await;

        let sup = supervisor(&store);
        let g = guard(&store, 1);
        let spec = CommandSpec::new("sleep 0.5; exit 4");

        let (out, _) = tokio::join!(
            sup.run(&g, &spec, AcquireMode::Normal),
            steal_after(&store, Duration::from_millis(100))
        );

        let RunOutcome::Finished(exit) = out.unwrap() else {
            panic!("fail-open must not stop the child");
        };
        assert_eq!(exit.code, Some(4));
        assert!(exit.lock_lost);
        // release is compare-and-delete: the new holder keeps the key
        assert_eq!(store.read(JOB_KEY).await.unwrap().as_deref(), Some("thief"));
    }

    #[tokio::test]
    async fn outage_past_grace_counts_as_lock_loss() {
        let store = primary_store().await;
        let sup = supervisor_with_grace(&store, Duration::from_millis(250))
            .with_policy(strict(Duration::from_secs(5)));
        let g = guard(&store, 1);
        let spec = CommandSpec::new("sleep 5");

        let (out, _) = tokio::join!(
            sup.run(&g, &spec, AcquireMode::Normal),
            async {
                time::sleep(Duration::from_millis(50)).await;
                store.set_available(false);
            }
        );

        let exit = *out.unwrap().child().unwrap();
        assert!(exit.lock_lost);
        assert_eq!(exit.signal, Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn fail_open_keeps_renewing_through_a_long_outage() {
        let store = primary_store().await;
        let sup = supervisor_with_grace(&store, Duration::from_millis(200));
        let g = CommandLockGuard::new(
            store.clone(),
            JOB_KEY,
            RunToken::new(&node(), 100, 1),
            Duration::from_secs(1),
        );
        let spec = CommandSpec::new("sleep 1.6");

        let (out, holder) = tokio::join!(
            sup.run(&g, &spec, AcquireMode::Normal),
            async {
                time::sleep(Duration::from_millis(50)).await;
                store.set_available(false);
                time::sleep(Duration::from_millis(350)).await;
                store.set_available(true);
                // past the expiry the lock had when the outage began
                time::sleep(Duration::from_millis(900)).await;
                store.read(JOB_KEY).await.unwrap()
            }
        );

        assert_eq!(holder.as_deref(), Some(g.token().as_str()));
        let RunOutcome::Finished(exit) = out.unwrap() else {
            panic!("fail-open must not stop the child");
        };
        assert_eq!(exit.code, Some(0));
        assert!(!exit.lock_lost);
        assert_eq!(store.read(JOB_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn outage_within_grace_is_tolerated() {
        let store = primary_store().await;
        let sup = supervisor(&store).with_policy(strict(Duration::from_secs(5)));
        let g = guard(&store, 1);
        let spec = CommandSpec::new("sleep 0.5");

        let (out, _) = tokio::join!(
            sup.run(&g, &spec, AcquireMode::Normal),
            async {
                time::sleep(Duration::from_millis(50)).await;
                store.set_available(false);
            }
        );

        let RunOutcome::Finished(exit) = out.unwrap() else {
            panic!("short outage must not stop the child");
        };
        assert_eq!(exit.code, Some(0));
        assert!(!exit.lock_lost);
    }

    #[tokio::test]
    async fn spawn_failure_releases_the_lock() {
        let store = primary_store().await;
        let spec = CommandSpec::new("true").with_shell("/nonexistent/shell");

        let res = supervisor(&store)
            .run(&guard(&store, 1), &spec, AcquireMode::Normal)
            .await;

        assert!(matches!(res, Err(ExecError::Spawn(_))));
        assert_eq!(store.read(JOB_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn local_role_gates_the_run() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = watch::channel(Role::NotPrimary);
        let sup = ProcessSupervisor::new(store.clone(), PrimaryCheck::Local(rx), RENEW, TTL);
        let spec = CommandSpec::new("true");

        let skipped = sup.run(&guard(&store, 1), &spec, AcquireMode::Normal).await.unwrap();
        assert_eq!(skipped, RunOutcome::NotRun(SkipReason::NotPrimary));

        tx.send_replace(Role::Primary);
        let ran = sup.run(&guard(&store, 2), &spec, AcquireMode::Normal).await.unwrap();
        assert_eq!(ran.child().unwrap().exit_code(), 0);
    }

    #[tokio::test]
    async fn force_mode_overrides_the_holder() {
        let store = primary_store().await;
        assert!(guard(&store, 1).acquire().await.unwrap());

        let out = supervisor(&store)
            .run(&guard(&store, 2), &CommandSpec::new("true"), AcquireMode::Force)
            .await
            .unwrap();

        assert_eq!(out.child().unwrap().exit_code(), 0);
        assert_eq!(store.read(JOB_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_outage_before_start_is_an_error() {
        let store = primary_store().await;
        store.set_available(false);

        let err = supervisor(&store)
            .run(&guard(&store, 1), &CommandSpec::new("true"), AcquireMode::Normal)
            .await
            .unwrap_err();

        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn empty_command_is_rejected_before_any_store_call() {
        let store = primary_store().await;

        let err = supervisor(&store)
            .run(&guard(&store, 1), &CommandSpec::new(" "), AcquireMode::Normal)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecError::InvalidSpec(_)));
        assert_eq!(store.read(JOB_KEY).await.unwrap(), None);
    }
}

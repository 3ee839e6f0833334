//! The three operating modes of `cron-ha`.
use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tracing::{error, info, warn};

use cronha_core::{election::LeaderElector, error::CoreError, lock::CommandLockGuard};
use cronha_exec::{
    AcquireMode, CommandSpec, LockLossPolicy, ProcessSupervisor, Signal, StopEscalation,
};
use cronha_model::{RunToken, ServerIdentity};
use cronha_store::{LockStore, RedisStore};

use crate::{
    cli::{Command, RunCommandArgs},
    config::AgentConfig,
    exit_codes,
    shutdown::install_shutdown_handler,
};

/// Run `command`; returns the process exit code.
pub async fn dispatch(command: Command, cfg: AgentConfig) -> anyhow::Result<u8> {
    let identity = ServerIdentity::resolve(cfg.coordination.server_id.as_deref())
        .context("cannot determine server identity")?;
    let store: Arc<dyn LockStore> = Arc::new(RedisStore::from_config(&cfg.coordination));

    match command {
        Command::RunElectionLoop => run_election_loop(store, identity, &cfg).await,
        Command::ForceBecomePrimary => force_become_primary(store, identity, &cfg).await,
        Command::RunCommand(args) => run_command(store, identity, &cfg, args).await,
    }
}

async fn run_election_loop(
    store: Arc<dyn LockStore>,
    identity: ServerIdentity,
    cfg: &AgentConfig,
) -> anyhow::Result<u8> {
    let cancel = install_shutdown_handler().context("failed to install signal handlers")?;
    let elector = LeaderElector::from_config(store, identity, &cfg.coordination);

    elector.run(cancel).await;
    Ok(exit_codes::SUCCESS)
}

async fn force_become_primary(
    store: Arc<dyn LockStore>,
    identity: ServerIdentity,
    cfg: &AgentConfig,
) -> anyhow::Result<u8> {
    let elector = LeaderElector::from_config(store, identity, &cfg.coordination);

    match elector.force_become_primary().await {
        Ok(()) => {
            info!(identity = %elector.identity(), "this server is now primary");
            Ok(exit_codes::SUCCESS)
        }
        Err(CoreError::Store(e)) => {
            error!(error = %e, "cannot take over the primary lock");
            Ok(exit_codes::STORE_UNAVAILABLE)
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_command(
    store: Arc<dyn LockStore>,
    identity: ServerIdentity,
    cfg: &AgentConfig,
    args: RunCommandArgs,
) -> anyhow::Result<u8> {
    let policy = lock_loss_policy(&args)?;
    let token = RunToken::generate(&identity);
    let guard = CommandLockGuard::for_job(store.clone(), &cfg.coordination, &args.lock_key, token);
    let supervisor = ProcessSupervisor::from_config(store, &cfg.coordination, identity)
        .with_policy(policy)
        .with_signal_forwarding(true);
    let spec = CommandSpec::new(args.command);
    let mode = if args.force_lock {
        AcquireMode::Force
    } else {
        AcquireMode::Normal
    };

    match supervisor.run(&guard, &spec, mode).await {
        Ok(outcome) => {
            if outcome.child().is_some_and(|exit| exit.lock_lost) {
                warn!(key = %guard.key(), "job finished without holding its lock");
            }
            Ok(exit_codes::for_outcome(&outcome))
        }
        Err(e) => {
            error!(key = %guard.key(), error = %e, "job not run");
            Ok(exit_codes::for_error(&e))
        }
    }
}

fn lock_loss_policy(args: &RunCommandArgs) -> anyhow::Result<LockLossPolicy> {
    if !args.stop_command_on_lock_fail {
        return Ok(LockLossPolicy::FailOpen);
    }
    Ok(LockLossPolicy::Stop(StopEscalation {
        stop_signal: Signal::new(args.stop_signal)?,
        stop_timeout: Duration::from_secs(args.stop_timeout_seconds),
        kill_signal: Signal::new(args.kill_signal)?,
    }))
}

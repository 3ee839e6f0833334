//! Command-line surface of the `cron-ha` binary.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::NonEmptyStringValueParser};

pub const DEFAULT_CONFIG_PATH: &str = "cron-ha.yml";

/// Run cron jobs on exactly one server of a group, coordinated through Redis.
#[derive(Parser, Debug)]
#[command(name = "cron-ha", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file in YAML format.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log at debug level regardless of the configured level.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hold the primary lock for this server, retrying forever.
    ///
    /// Maintains the flag file while primary and releases the lock on
    /// SIGTERM or SIGINT.
    #[command(alias = "hold-primary-lock")]
    RunElectionLoop,

    /// Make this server primary now, whoever holds the lock.
    ///
    /// Jobs still running on the previous primary keep their job locks.
    ForceBecomePrimary,

    /// Run a command if this server is primary and the job is not running
    /// elsewhere. Exits with the command's exit code.
    RunCommand(RunCommandArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunCommandArgs {
    /// Shell command line, run with `/bin/sh -c`.
    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    pub command: String,

    /// Unique name of this job's lock.
    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    pub lock_key: String,

    /// Stop the command when its lock cannot be kept.
    #[arg(long)]
    pub stop_command_on_lock_fail: bool,

    /// Signal sent first when stopping.
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(i32).range(1..=64))]
    pub stop_signal: i32,

    /// Seconds to wait after the stop signal.
    #[arg(long, default_value_t = 10)]
    pub stop_timeout_seconds: u64,

    /// Signal sent when the command outlives the stop timeout.
    #[arg(long, default_value_t = 9, value_parser = clap::value_parser!(i32).range(1..=64))]
    pub kill_signal: i32,

    /// Take the job lock even if another run holds it.
    #[arg(long)]
    pub force_lock: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("cron-ha").chain(args.iter().copied()))
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_command_defaults() {
        let cli = parse(&["run-command", "--command", "backup.sh", "--lock-key", "backup"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!cli.debug);

        let Command::RunCommand(args) = cli.command else {
            panic!("expected run-command");
        };
        assert_eq!(args.command, "backup.sh");
        assert_eq!(args.lock_key, "backup");
        assert!(!args.stop_command_on_lock_fail);
        assert!(!args.force_lock);
        assert_eq!((args.stop_signal, args.stop_timeout_seconds, args.kill_signal), (15, 10, 9));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["hold-primary-lock", "--config", "/etc/cron-ha.yml", "--debug"]).unwrap();
        assert!(matches!(cli.command, Command::RunElectionLoop));
        assert_eq!(cli.config, PathBuf::from("/etc/cron-ha.yml"));
        assert!(cli.debug);
    }

    #[test]
    fn rejects_out_of_range_signals() {
        let base = ["run-command", "--command", "true", "--lock-key", "k"];
        for bad in [["--stop-signal", "0"], ["--kill-signal", "65"]] {
            let args: Vec<&str> = base.iter().copied().chain(bad).collect();
            assert!(parse(&args).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn rejects_empty_lock_key() {
        assert!(parse(&["run-command", "--command", "true", "--lock-key", ""]).is_err());
    }
}

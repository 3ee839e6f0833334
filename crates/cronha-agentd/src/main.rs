mod cli;
mod commands;
mod config;
mod exit_codes;
mod shutdown;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use cronha_observe::{init_local_offset, init_logger};

use crate::{cli::Cli, config::AgentConfig};

fn main() -> ExitCode {
    // before any thread exists
    init_local_offset();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(exit_codes::CONFIG_ERROR)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("cron-ha: {e:#}");
            ExitCode::from(exit_codes::CONFIG_ERROR)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    let cfg = AgentConfig::load(&cli.config)?;
    init_logger(&cfg.log.clone().with_overrides(cli.debug))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(commands::dispatch(cli.command, cfg))
}

//! Process exit codes of `cron-ha`.
//!
//! A job that ran exits with its own status (`128 + n` when killed by
//! signal `n`). Codes from 200 up are reserved for invocations that never ran
//! the job or could not set up. A job that itself exits with a reserved code
//! is reported as a generic failure (`1`), so a reserved code always means
//! the job was not run to completion by this invocation.
use cronha_exec::{ExecError, RunOutcome, SkipReason};

pub const SUCCESS: u8 = 0;
pub const NOT_PRIMARY: u8 = 200;
pub const LOCK_HELD: u8 = 201;
pub const STORE_UNAVAILABLE: u8 = 202;
pub const SPAWN_FAILED: u8 = 203;
pub const CONFIG_ERROR: u8 = 204;

/// Generic failure for errors without a dedicated code.
const FAILURE: u8 = 1;

const RESERVED: std::ops::RangeInclusive<u8> = NOT_PRIMARY..=CONFIG_ERROR;

pub fn for_outcome(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::NotRun(SkipReason::NotPrimary) => NOT_PRIMARY,
        RunOutcome::NotRun(SkipReason::LockHeld) => LOCK_HELD,
        RunOutcome::Finished(exit) | RunOutcome::Killed(exit) => {
            match u8::try_from(exit.exit_code()) {
                Ok(code) if !RESERVED.contains(&code) => code,
                _ => FAILURE,
            }
        }
    }
}

pub fn for_error(err: &ExecError) -> u8 {
    match err {
        e if e.is_store_unavailable() => STORE_UNAVAILABLE,
        ExecError::Spawn(_) => SPAWN_FAILED,
        ExecError::InvalidSpec(_) => CONFIG_ERROR,
        _ => FAILURE,
    }
}

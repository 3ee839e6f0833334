use std::{fmt, os::unix::process::ExitStatusExt, process::ExitStatus};

/// Why a job invocation did not start its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotPrimary,
    LockHeld,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotPrimary => f.write_str("not primary"),
            SkipReason::LockHeld => f.write_str("job lock held elsewhere"),
        }
    }
}

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    /// Exit code for a normal exit.
    pub code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    /// The job lock was lost while the child ran.
    pub lock_lost: bool,
}

impl ChildExit {
    pub fn from_status(status: ExitStatus, lock_lost: bool) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
            lock_lost,
        }
    }

    /// Shell convention: the exit code, or `128 + signal`.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }
}

/// Terminal state of one job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child was never started.
    NotRun(SkipReason),
    /// The child exited, on its own or after the stop signal.
    Finished(ChildExit),
    /// The child outlived the stop timeout and got the kill signal.
    Killed(ChildExit),
}

impl RunOutcome {
    pub fn child(&self) -> Option<&ChildExit> {
        match self {
            RunOutcome::NotRun(_) => None,
            RunOutcome::Finished(exit) | RunOutcome::Killed(exit) => Some(exit),
        }
    }
}

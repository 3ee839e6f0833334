//! Lock-gated job execution.
//!
//! A job runs as `/bin/sh -c <command>` in its own process group, only on the
//! primary, only while its job lock is held by this invocation.
mod command;
pub use command::CommandSpec;

mod outcome;
pub use outcome::{ChildExit, RunOutcome, SkipReason};

mod supervisor;
pub use supervisor::{AcquireMode, PrimaryCheck, ProcessSupervisor};

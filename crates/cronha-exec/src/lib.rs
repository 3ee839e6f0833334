mod error;
pub use error::ExecError;

mod policy;
pub use policy::{LockLossPolicy, StopEscalation};

mod signal;
pub use signal::Signal;

pub mod subprocess;
pub use subprocess::{
    AcquireMode, ChildExit, CommandSpec, PrimaryCheck, ProcessSupervisor, RunOutcome, SkipReason,
};

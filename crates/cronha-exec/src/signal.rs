use std::{fmt, io};

use tracing::debug;

use crate::ExecError;

/// Highest signal number accepted from configuration.
const MAX_SIGNAL: i32 = 64;

/// POSIX signal number delivered to a job's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal(i32);

impl Signal {
    pub const INT: Signal = Signal(libc::SIGINT);
    pub const TERM: Signal = Signal(libc::SIGTERM);
    pub const KILL: Signal = Signal(libc::SIGKILL);

    pub fn new(raw: i32) -> Result<Self, ExecError> {
        if (1..=MAX_SIGNAL).contains(&raw) {
            Ok(Self(raw))
        } else {
            Err(ExecError::InvalidSpec(format!(
                "signal {raw} is outside 1..={MAX_SIGNAL}"
            )))
        }
    }

    pub const fn as_raw(&self) -> i32 {
        self.0
    }

    /// Send the signal to every process in group `pgid`.
    ///
    /// A group that no longer exists counts as delivered: the goal, the job
    /// not running, already holds.
    pub fn send_to_group(&self, pgid: u32) -> Result<(), ExecError> {
        let target = i32::try_from(pgid)
            .map_err(|_| ExecError::Internal(format!("process group {pgid} out of range")))?;

        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(-target, self.0) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!(pgid, signal = self.0, "process group already gone");
            return Ok(());
        }
        Err(ExecError::Signal {
            signal: self.0,
            pgid,
            source: err,
        })
    }
}

impl TryFrom<i32> for Signal {
    type Error = ExecError;
    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_posix_range() {
        assert_eq!(Signal::new(15).unwrap(), Signal::TERM);
        assert_eq!(Signal::try_from(9).unwrap(), Signal::KILL);
        assert!(Signal::new(64).is_ok());
    }

    #[test]
    fn rejects_out_of_range() {
        for raw in [0, -1, 65, 1_000] {
            assert!(Signal::new(raw).is_err(), "signal {raw} accepted");
        }
    }

    #[test]
    fn missing_group_counts_as_delivered() {
        // pid_max on Linux tops out at 2^22
        let unused = 4_194_304 + 17;
        Signal::TERM.send_to_group(unused).unwrap();
    }
}

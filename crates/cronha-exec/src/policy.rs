use std::time::Duration;

use crate::Signal;

/// Default wait between the stop signal and the kill signal.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// What a running job does when its lock cannot be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockLossPolicy {
    /// Keep the job running; losing coordination does not make it unsafe.
    #[default]
    FailOpen,
    /// Stop the job, escalating to a kill after a timeout.
    Stop(StopEscalation),
}

/// Stop signal, wait, kill signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopEscalation {
    pub stop_signal: Signal,
    pub stop_timeout: Duration,
    pub kill_signal: Signal,
}

impl Default for StopEscalation {
    fn default() -> Self {
        Self {
            stop_signal: Signal::TERM,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            kill_signal: Signal::KILL,
        }
    }
}

impl LockLossPolicy {
    pub fn stops_job(&self) -> bool {
        matches!(self, LockLossPolicy::Stop(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fail_open() {
        assert_eq!(LockLossPolicy::default(), LockLossPolicy::FailOpen);
        assert!(!LockLossPolicy::default().stops_job());
    }

    #[test]
    fn default_escalation_is_term_then_kill() {
        let esc = StopEscalation::default();
        assert_eq!(esc.stop_signal, Signal::TERM);
        assert_eq!(esc.kill_signal, Signal::KILL);
        assert_eq!(esc.stop_timeout, Duration::from_secs(10));
        assert!(LockLossPolicy::Stop(esc).stops_job());
    }
}

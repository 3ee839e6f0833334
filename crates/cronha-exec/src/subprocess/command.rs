use std::{
    fmt,
    path::{Path, PathBuf},
};

use tokio::process::{Child, Command};
use tracing::trace;

use crate::ExecError;

pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Shell command line of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    command: String,
    shell: PathBuf,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        if self.command.trim().is_empty() {
            return Err(ExecError::InvalidSpec("job command is empty".into()));
        }
        Ok(())
    }

    /// Start the job as leader of a new process group with inherited stdio.
    pub(crate) fn spawn(&self) -> Result<Child, ExecError> {
        trace!(shell = %self.shell.display(), command = %self.command, "spawning job");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&self.command);
        cmd.process_group(0);
        cmd.kill_on_drop(false);
        cmd.spawn().map_err(ExecError::Spawn)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -c '{}'", self.shell.display(), self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_invalid() {
        assert!(CommandSpec::new("").validate().is_err());
        assert!(CommandSpec::new("  \t").validate().is_err());
        assert!(CommandSpec::new("true").validate().is_ok());
    }

    #[test]
    fn display_shows_shell_invocation() {
        let spec = CommandSpec::new("backup --all");
        assert_eq!(spec.to_string(), "/bin/sh -c 'backup --all'");
    }

    #[tokio::test]
    async fn spawned_job_leads_its_own_group() {
        let mut child = CommandSpec::new("sleep 0.2").spawn().unwrap();
        let pid = child.id().unwrap() as i32;

        // SAFETY: getpgid(2) only reads process state.
        let pgid = unsafe { libc::getpgid(pid) };
        assert_eq!(pgid, pid);
        assert!(child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn missing_shell_fails_to_spawn() {
        let res = CommandSpec::new("true")
            .with_shell("/nonexistent/shell")
            .spawn();
        assert!(matches!(res, Err(ExecError::Spawn(_))));
    }
}

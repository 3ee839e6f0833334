//! Local marker file mirroring the primary role.
//!
//! External infrastructure (load balancer health checks, monitoring) reads
//! the file's existence and modification time; there is no content contract.
//! Failures are logged and never propagate: the marker is a best-effort signal.
use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use filetime::FileTime;
use tracing::{debug, trace, warn};

use cronha_model::Role;

#[derive(Debug, Clone)]
pub struct FlagFile {
    path: PathBuf,
}

impl FlagFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Create the file if absent and refresh its modification time.
    ///
    /// Safe to call on every election tick.
    pub fn on_enter_primary(&self) {
        match self.touch() {
            Ok(()) => trace!(path = %self.path.display(), "flag file touched"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to touch flag file"),
        }
    }

    /// Delete the file; absent is fine.
    pub fn on_enter_not_primary(&self) {
        match self.remove() {
            Ok(true) => debug!(path = %self.path.display(), "flag file removed"),
            Ok(false) => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove flag file"),
        }
    }

    /// Bring the file in line with `role`.
    pub fn sync(&self, role: Role) {
        match role {
            Role::Primary => self.on_enter_primary(),
            Role::NotPrimary => self.on_enter_not_primary(),
        }
    }

    pub fn touch(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        filetime::set_file_mtime(&self.path, FileTime::now())
    }

    /// Returns `true` if a file was deleted.
    pub fn remove(&self) -> io::Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    #[test]
    fn enter_primary_creates_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let flag = FlagFile::new(dir.path().join("run/cron-ha/primary"));

        flag.on_enter_primary();

        assert!(flag.exists());
    }

    #[test]
    fn repeated_touch_refreshes_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let flag = FlagFile::new(dir.path().join("primary"));
        flag.touch().unwrap();

        let old = SystemTime::now() - Duration::from_secs(3_600);
        filetime::set_file_mtime(flag.path(), FileTime::from_system_time(old)).unwrap();

        for _ in 0..3 {
            flag.on_enter_primary();
            assert!(flag.exists());
        }
        let age = SystemTime::now()
            .duration_since(mtime(flag.path()))
            .unwrap_or_default();
        assert!(age < Duration::from_secs(60), "mtime not refreshed: {age:?}");
    }

    #[test]
    fn touch_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary");
        fs::write(&path, "lb-check").unwrap();

        FlagFile::new(&path).touch().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "lb-check");
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let flag = FlagFile::new(dir.path().join("primary"));
        flag.touch().unwrap();

        assert!(flag.remove().unwrap());
        assert!(!flag.remove().unwrap());
        flag.on_enter_not_primary();
        assert!(!flag.exists());
    }

    #[test]
    fn sync_follows_role() {
        let dir = tempfile::tempdir().unwrap();
        let flag = FlagFile::new(dir.path().join("primary"));

        flag.sync(Role::Primary);
        assert!(flag.exists());
        flag.sync(Role::NotPrimary);
        assert!(!flag.exists());
    }

    #[test]
    fn filesystem_errors_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let flag = FlagFile::new(blocker.join("primary"));

        assert!(flag.touch().is_err());
        flag.on_enter_primary();
        flag.on_enter_not_primary();
        assert!(!flag.exists());
    }
}

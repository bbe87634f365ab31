//! core::ops::lock
//!
//! Exclusive repository lock held while a rewrite runs.
//!
//! The rewriter assumes nobody else touches references while it works, so
//! the command-line host takes an OS-level lock at `<common_dir>/reweave/lock`
//! first. Acquisition never blocks: a second `reweave` fails right away.
//! Dropping the guard unlocks.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::ReweavePaths;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("repository is locked by another reweave process")]
    AlreadyLocked,

    #[error("cannot prepare lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot lock {}: {source}", path.display())]
    Os {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Guard for the repository lock.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    file: File,
}

impl RepoLock {
    /// Take the lock, creating `<common_dir>/reweave/` when needed.
    ///
    /// Worktrees of one repository share the lock.
    pub fn acquire(paths: &ReweavePaths) -> Result<Self, LockError> {
        let path = paths.repo_lock_path();
        let io_err = |source: io::Error| LockError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(paths.repo_reweave_dir()).map_err(io_err)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        if let Err(source) = file.try_lock_exclusive() {
            if source.kind() == io::ErrorKind::WouldBlock
                || source.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                return Err(LockError::AlreadyLocked);
            }
            return Err(LockError::Os { path, source });
        }
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(dir: &Path) -> ReweavePaths {
        ReweavePaths::new(dir.to_path_buf(), dir.to_path_buf())
    }

    #[test]
    fn creates_reweave_dir() {
        let temp = TempDir::new().unwrap();
        let paths = paths(temp.path());
        assert!(!paths.repo_reweave_dir().exists());

        let lock = RepoLock::acquire(&paths).unwrap();
        assert_eq!(lock.path(), paths.repo_lock_path());
        assert!(lock.path().is_file());
    }

    #[test]
    fn contention_fails_fast() {
        let temp = TempDir::new().unwrap();
        let paths = paths(temp.path());

        let _held = RepoLock::acquire(&paths).unwrap();
        let err = RepoLock::acquire(&paths).unwrap_err();
        assert!(matches!(err, LockError::AlreadyLocked));
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn unlocked_on_drop() {
        let temp = TempDir::new().unwrap();
        let paths = paths(temp.path());

        drop(RepoLock::acquire(&paths).unwrap());
        assert!(RepoLock::acquire(&paths).is_ok());
    }

    #[test]
    fn unwritable_location_is_io_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        fs::write(&blocker, "").unwrap();

        // `<common_dir>/reweave` cannot be created under a regular file.
        let err = RepoLock::acquire(&paths(&blocker)).unwrap_err();
        assert!(matches!(err, LockError::Io { .. }));
    }

    #[test]
    fn worktrees_share_the_lock() {
        let temp = TempDir::new().unwrap();
        let common = temp.path().to_path_buf();
        let main = ReweavePaths::new(common.clone(), common.clone());
        let worktree = ReweavePaths::new(common.join("worktrees").join("feature"), common);

        let _held = RepoLock::acquire(&main).unwrap();
        assert!(matches!(
            RepoLock::acquire(&worktree),
            Err(LockError::AlreadyLocked)
        ));
    }
}

//! core::paths
//!
//! Path routing for reweave's own storage inside a repository.
//!
//! Files live in `<common_dir>/reweave/` (`config.toml`, `lock`). References
//! are shared by every worktree, and so is the directory. Normal and bare
//! repositories have `common_dir == git_dir`.

use std::path::PathBuf;

use crate::git::RepoInfo;

/// Storage locations for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReweavePaths {
    /// The per-worktree git directory.
    pub git_dir: PathBuf,
    /// The shared git directory (refs, objects, config).
    pub common_dir: PathBuf,
}

impl ReweavePaths {
    pub fn new(git_dir: PathBuf, common_dir: PathBuf) -> Self {
        Self {
            git_dir,
            common_dir,
        }
    }

    /// Build paths from an opened repository.
    pub fn from_repo_info(info: &RepoInfo) -> Self {
        Self {
            git_dir: info.git_dir.clone(),
            common_dir: info.common_dir.clone(),
        }
    }

    /// `<common_dir>/reweave`
    pub fn repo_reweave_dir(&self) -> PathBuf {
        self.common_dir.join("reweave")
    }

    /// `<common_dir>/reweave/config.toml`
    pub fn repo_config_path(&self) -> PathBuf {
        self.repo_reweave_dir().join("config.toml")
    }

    /// `<common_dir>/reweave/lock`
    pub fn repo_lock_path(&self) -> PathBuf {
        self.repo_reweave_dir().join("lock")
    }
}

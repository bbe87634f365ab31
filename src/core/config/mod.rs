//! core::config
//!
//! TOML settings for `reweave`, read from two files.
//!
//! A value set in the repository file (`<common_dir>/reweave/config.toml`)
//! beats the same value in the global file, which beats the built-in
//! default. Command-line flags are applied on top by the caller.
//!
//! The global file is the first that exists of `$REWEAVE_CONFIG`,
//! `$XDG_CONFIG_HOME/reweave/config.toml` and `~/.reweave/config.toml`.
//!
//! ```no_run
//! use reweave::core::config::Config;
//! use reweave::core::paths::ReweavePaths;
//! use std::path::PathBuf;
//!
//! let paths = ReweavePaths::new(PathBuf::from("/repo/.git"), PathBuf::from("/repo/.git"));
//! let config = Config::load(Some(&paths)).unwrap();
//! println!("Backups go under {}", config.backup_namespace());
//! ```

pub mod schema;

pub use schema::{GlobalConfig, RepoConfig, RewriteDefaults};

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::paths::ReweavePaths;
use crate::engine::{DEFAULT_BACKUP_NAMESPACE, DEFAULT_REFLOG_PREFIX};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Both config files, merged on access.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Load the global file and, inside a repository, the repo file.
    pub fn load(paths: Option<&ReweavePaths>) -> Result<Self, ConfigError> {
        let repo_path = paths.map(ReweavePaths::repo_config_path);
        Self::load_from(Self::find_global().as_deref(), repo_path.as_deref())
    }

    /// Load from explicit locations. Files that don't exist are skipped.
    pub fn load_from(global_path: Option<&Path>, repo_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = global_path.filter(|p| p.exists()) {
            let global: GlobalConfig = Self::read(path)?;
            global.validate()?;
            config.global = global;
            config.global_path = Some(path.to_path_buf());
        }

        if let Some(path) = repo_path.filter(|p| p.exists()) {
            let repo: RepoConfig = Self::read(path)?;
            repo.validate()?;
            config.repo = Some(repo);
            config.repo_path = Some(path.to_path_buf());
        }

        Ok(config)
    }

    fn find_global() -> Option<PathBuf> {
        let candidates = [
            std::env::var_os("REWEAVE_CONFIG").map(PathBuf::from),
            std::env::var_os("XDG_CONFIG_HOME")
                .map(|xdg| PathBuf::from(xdg).join("reweave").join("config.toml")),
            dirs::home_dir().map(|home| home.join(".reweave").join("config.toml")),
        ];
        candidates.into_iter().flatten().find(|path| path.exists())
    }

    fn read<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn rewrite_value<T>(&self, field: impl Fn(&RewriteDefaults) -> Option<T>) -> Option<T> {
        self.repo
            .as_ref()
            .and_then(|r| r.rewrite.as_ref())
            .and_then(&field)
            .or_else(|| self.global.rewrite.as_ref().and_then(&field))
    }

    /// Defaults to `refs/original/`.
    pub fn backup_namespace(&self) -> String {
        self.rewrite_value(|r| r.backup_namespace.clone())
            .unwrap_or_else(|| DEFAULT_BACKUP_NAMESPACE.to_string())
    }

    /// Defaults to `filter-branch`.
    pub fn reflog_prefix(&self) -> String {
        self.rewrite_value(|r| r.reflog_prefix.clone())
            .unwrap_or_else(|| DEFAULT_REFLOG_PREFIX.to_string())
    }

    pub fn prune_empty(&self) -> bool {
        self.rewrite_value(|r| r.prune_empty).unwrap_or(false)
    }

    /// `json = true` in the global file makes `--json` the default.
    pub fn json(&self) -> bool {
        self.global.json.unwrap_or(false)
    }

    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

//! core::config::schema
//!
//! Configuration schema types.
//!
//! Both scopes share the `[rewrite]` table; the global scope also carries
//! output preferences. Unknown keys are rejected at parse time and values
//! are validated afterwards.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Defaults for `reweave rewrite`.
///
/// # Example
///
/// ```toml
/// [rewrite]
/// backup_namespace = "refs/original/"
/// reflog_prefix = "filter-branch"
/// prune_empty = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteDefaults {
    /// Namespace backups are written under
    pub backup_namespace: Option<String>,

    /// Prefix of reflog messages
    pub reflog_prefix: Option<String>,

    /// Drop commits that end up empty
    pub prune_empty: Option<bool>,
}

impl RewriteDefaults {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(namespace) = &self.backup_namespace {
            if !namespace.starts_with("refs/") || namespace.trim_end_matches('/') == "refs" {
                return Err(ConfigError::Invalid(format!(
                    "backup_namespace '{}' must be a namespace below refs/",
                    namespace
                )));
            }
        }

        if let Some(prefix) = &self.reflog_prefix {
            if prefix.trim().is_empty() || prefix.contains('\n') {
                return Err(ConfigError::Invalid(
                    "reflog_prefix must be a non-empty single line".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// json = false
///
/// [rewrite]
/// prune_empty = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Emit JSON instead of text by default
    pub json: Option<bool>,

    /// Rewrite defaults
    pub rewrite: Option<RewriteDefaults>,
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rewrite) = &self.rewrite {
            rewrite.validate()?;
        }
        Ok(())
    }
}

/// Repository configuration, stored at `<common_dir>/reweave/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Rewrite defaults for this repository
    pub rewrite: Option<RewriteDefaults>,
}

impl RepoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rewrite) = &self.rewrite {
            rewrite.validate()?;
        }
        Ok(())
    }
}

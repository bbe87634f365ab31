//! engine::options
//!
//! Caller-supplied behaviour for a history rewrite.
//!
//! Every rewriter is optional. With none supplied, a rewrite reproduces the
//! same objects and leaves every reference alone.
//!
//! # Example
//!
//! ```
//! use reweave::engine::options::{CommitHeader, RewriteOptions};
//!
//! let options = RewriteOptions::new()
//!     .with_header_rewriter(|commit| {
//!         let mut header = CommitHeader::from_commit(commit);
//!         header.message = header.message.replace("WIP", "");
//!         Ok(header)
//!     })
//!     .with_tag_name_rewriter(|name, _is_annotation, _target| Ok(format!("{name}_new")))
//!     .with_backup_namespace("refs/backup");
//!
//! assert_eq!(options.normalized_backup_namespace().unwrap(), "refs/backup/");
//! ```

use serde::{Deserialize, Serialize};

use super::rewriter::RewriteError;
use crate::core::types::{Oid, Signature};
use crate::store::{Commit, RefTarget, TreeDefinition};

/// Default namespace under which original references are kept.
pub const DEFAULT_BACKUP_NAMESPACE: &str = "refs/original/";

/// Default prefix of reflog messages written during a rewrite.
pub const DEFAULT_REFLOG_PREFIX: &str = "filter-branch";

/// The rewritable header of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitHeader {
    /// Commit message
    pub message: String,
    /// Author identity and time
    pub author: Signature,
    /// Committer identity and time
    pub committer: Signature,
}

impl CommitHeader {
    /// The header of an existing commit, unchanged.
    pub fn from_commit(commit: &Commit) -> Self {
        Self {
            message: commit.message.clone(),
            author: commit.author.clone(),
            committer: commit.committer.clone(),
        }
    }
}

/// Produces the new header of a targeted commit.
pub type HeaderRewriter<'a> = Box<dyn Fn(&Commit) -> anyhow::Result<CommitHeader> + 'a>;

/// Produces the new tree of a targeted commit.
pub type TreeRewriter<'a> = Box<dyn Fn(&Commit) -> anyhow::Result<TreeDefinition> + 'a>;

/// Produces the parent list of a targeted commit from its already rewritten parents.
pub type ParentsRewriter<'a> = Box<dyn Fn(&Commit, &[Commit]) -> anyhow::Result<Vec<Oid>> + 'a>;

/// Produces a new tag name from `(old name, is annotation, old target)`.
pub type TagNameRewriter<'a> = Box<dyn Fn(&str, bool, &RefTarget) -> anyhow::Result<String> + 'a>;

/// Runs once every reference has been rewritten.
pub type SuccessHook<'a> = Box<dyn Fn() -> anyhow::Result<()> + 'a>;

/// Runs on failure, before references are rolled back.
pub type ErrorHook<'a> = Box<dyn Fn(&RewriteError) -> anyhow::Result<()> + 'a>;

/// Options for [`crate::engine::HistoryRewriter`].
pub struct RewriteOptions<'a> {
    /// Namespace that receives a copy of each reference before it is rewritten
    pub backup_namespace: String,
    /// Prefix of the reflog messages (`<prefix>: backup`, `<prefix>: rewrite`, `<prefix>: abort`)
    pub reflog_prefix: String,
    /// Drop commits that do not change the tree of their first parent
    pub prune_empty_commits: bool,
    pub commit_header_rewriter: Option<HeaderRewriter<'a>>,
    pub commit_tree_rewriter: Option<TreeRewriter<'a>>,
    pub commit_parents_rewriter: Option<ParentsRewriter<'a>>,
    pub tag_name_rewriter: Option<TagNameRewriter<'a>>,
    pub on_succeeding: Option<SuccessHook<'a>>,
    pub on_error: Option<ErrorHook<'a>>,
}

impl Default for RewriteOptions<'_> {
    fn default() -> Self {
        Self {
            backup_namespace: DEFAULT_BACKUP_NAMESPACE.to_string(),
            reflog_prefix: DEFAULT_REFLOG_PREFIX.to_string(),
            prune_empty_commits: false,
            commit_header_rewriter: None,
            commit_tree_rewriter: None,
            commit_parents_rewriter: None,
            tag_name_rewriter: None,
            on_succeeding: None,
            on_error: None,
        }
    }
}

impl std::fmt::Debug for RewriteOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteOptions")
            .field("backup_namespace", &self.backup_namespace)
            .field("reflog_prefix", &self.reflog_prefix)
            .field("prune_empty_commits", &self.prune_empty_commits)
            .field("commit_header_rewriter", &self.commit_header_rewriter.is_some())
            .field("commit_tree_rewriter", &self.commit_tree_rewriter.is_some())
            .field("commit_parents_rewriter", &self.commit_parents_rewriter.is_some())
            .field("tag_name_rewriter", &self.tag_name_rewriter.is_some())
            .field("on_succeeding", &self.on_succeeding.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<'a> RewriteOptions<'a> {
    /// Options with defaults and no rewriters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header_rewriter(
        mut self,
        f: impl Fn(&Commit) -> anyhow::Result<CommitHeader> + 'a,
    ) -> Self {
        self.commit_header_rewriter = Some(Box::new(f));
        self
    }

    pub fn with_tree_rewriter(
        mut self,
        f: impl Fn(&Commit) -> anyhow::Result<TreeDefinition> + 'a,
    ) -> Self {
        self.commit_tree_rewriter = Some(Box::new(f));
        self
    }

    pub fn with_parents_rewriter(
        mut self,
        f: impl Fn(&Commit, &[Commit]) -> anyhow::Result<Vec<Oid>> + 'a,
    ) -> Self {
        self.commit_parents_rewriter = Some(Box::new(f));
        self
    }

    pub fn with_tag_name_rewriter(
        mut self,
        f: impl Fn(&str, bool, &RefTarget) -> anyhow::Result<String> + 'a,
    ) -> Self {
        self.tag_name_rewriter = Some(Box::new(f));
        self
    }

    pub fn on_succeeding(mut self, f: impl Fn() -> anyhow::Result<()> + 'a) -> Self {
        self.on_succeeding = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&RewriteError) -> anyhow::Result<()> + 'a) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn with_backup_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.backup_namespace = namespace.into();
        self
    }

    pub fn with_reflog_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reflog_prefix = prefix.into();
        self
    }

    pub fn with_prune_empty_commits(mut self, prune: bool) -> Self {
        self.prune_empty_commits = prune;
        self
    }

    /// The backup namespace with a trailing `/`.
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError::InvalidOptions`] unless the namespace lies
    /// strictly below `refs/`.
    pub fn normalized_backup_namespace(&self) -> Result<String, RewriteError> {
        let namespace = self.backup_namespace.trim();
        if namespace.is_empty() {
            return Err(RewriteError::InvalidOptions(
                "backup namespace must not be empty".to_string(),
            ));
        }
        let namespace = if namespace.ends_with('/') {
            namespace.to_string()
        } else {
            format!("{namespace}/")
        };
        if !namespace.starts_with("refs/") || namespace == "refs/" {
            return Err(RewriteError::InvalidOptions(format!(
                "backup namespace '{}' must be below refs/",
                self.backup_namespace.trim()
            )));
        }
        Ok(namespace)
    }

    /// Check the options that don't depend on the repository.
    pub fn validate(&self) -> Result<(), RewriteError> {
        self.normalized_backup_namespace()?;
        if self.reflog_prefix.trim().is_empty() || self.reflog_prefix.contains('\n') {
            return Err(RewriteError::InvalidOptions(
                "reflog prefix must be a non-empty single line".to_string(),
            ));
        }
        Ok(())
    }

    /// The reflog message for an action (`backup`, `rewrite`, `abort`).
    pub(crate) fn log_message(&self, action: &str) -> String {
        format!("{}: {}", self.reflog_prefix, action)
    }
}

//! engine::rewriter
//!
//! The history rewriter.
//!
//! # Algorithm
//!
//! 1. Ask the repository for every reference that reaches a targeted commit.
//! 2. Walk all commits reachable from those references, parents first, and
//!    rewrite each one. Targeted commits go through the caller's rewriters;
//!    every other commit is recreated with its parents remapped. A commit
//!    whose header, tree and parents all come out unchanged keeps its id
//!    and is not written again. The same holds for tag annotations.
//! 3. Rewrite the references in ascending symbolic depth, backing each one
//!    up before it is touched.
//! 4. On failure, replay the rollback log so that every reference is back
//!    where it started.
//!
//! # Invariants
//!
//! - Each original object is rewritten at most once. The rewrite map is
//!   consulted before any object is created.
//! - When a commit is rewritten, all of its parents are already in the map.
//!   A parent missing from the map is reported as
//!   [`RewriteError::UnmappedParent`] instead of being silently kept.
//! - An existing backup reference is never overwritten.
//!
//! # Example
//!
//! ```
//! use reweave::core::types::{RefName, Signature};
//! use reweave::engine::{rewrite_history, CommitHeader, RewriteOptions};
//! use reweave::store::memory::MemoryRepo;
//! use reweave::store::{ObjectStore, RefStore, RefTarget};
//!
//! let repo = MemoryRepo::new();
//! let sig = Signature::from_raw("Dev", "dev@example.com", 1_700_000_000, 0).unwrap();
//! let tree = repo.write_tree(&[("README", "hi")]).unwrap();
//! let root = repo.create_commit("root", &sig, &sig, &tree, &[]).unwrap();
//! let main = RefName::new("refs/heads/main").unwrap();
//! repo.create_reference(&main, &RefTarget::Direct(root.clone()), false, "init").unwrap();
//!
//! let options = RewriteOptions::new().with_header_rewriter(|c| {
//!     Ok(CommitHeader { message: "amended".into(), ..CommitHeader::from_commit(c) })
//! });
//! let summary = rewrite_history(&repo, [root.clone()], options).unwrap();
//! assert_eq!(summary.commits_rewritten, 1);
//!
//! let backup = RefName::new("refs/original/heads/main").unwrap();
//! assert_eq!(repo.find_reference(&backup).unwrap().unwrap().target, RefTarget::Direct(root));
//! ```

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::options::{CommitHeader, RewriteOptions};
use super::rollback::{RollbackAction, RollbackError, RollbackLog};
use crate::core::sort::CommitSort;
use crate::core::types::{Oid, RefName, TypeError};
use crate::store::{
    Commit, Object, RefTarget, Reference, Repository, StoreError, TagAnnotation,
    MAX_SYMBOLIC_DEPTH,
};

/// The caller-supplied function that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStage {
    CommitHeader,
    CommitTree,
    CommitParents,
    TagName,
    OnSucceeding,
    OnError,
}

impl std::fmt::Display for CallbackStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallbackStage::CommitHeader => "commit header rewriter",
            CallbackStage::CommitTree => "commit tree rewriter",
            CallbackStage::CommitParents => "commit parents rewriter",
            CallbackStage::TagName => "tag name rewriter",
            CallbackStage::OnSucceeding => "success hook",
            CallbackStage::OnError => "error hook",
        };
        f.write_str(name)
    }
}

/// Errors from a history rewrite.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The options can't be used.
    #[error("invalid rewrite options: {0}")]
    InvalidOptions(String),

    /// A backup reference is already present.
    #[error("can't back up reference '{refname}': '{backup}' already exists")]
    BackupExists {
        /// The reference being rewritten
        refname: String,
        /// The existing backup
        backup: String,
    },

    /// A commit was reached before one of its parents.
    #[error("commit {commit} visited before its parent {parent}")]
    UnmappedParent {
        /// The commit being rewritten
        commit: String,
        /// The parent with no rewrite yet
        parent: String,
    },

    /// A tag annotation (indirectly) targets itself.
    #[error("tag annotation {tag} targets itself")]
    TagCycle {
        /// The annotation that was re-entered
        tag: String,
    },

    /// Symbolic references nest too deeply.
    #[error("symbolic reference chain starting at {refname} is too deep")]
    SymbolicChainTooDeep {
        /// The reference where resolution started
        refname: String,
    },

    /// A required object is missing.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The missing object
        oid: String,
    },

    /// A caller-supplied function returned an error.
    #[error("{stage} failed: {source}")]
    Callback {
        /// Which function failed
        stage: CallbackStage,
        /// Its error
        #[source]
        source: anyhow::Error,
    },

    /// The repository rejected an operation.
    #[error(transparent)]
    Store(StoreError),

    /// The rewrite failed and some references could not be restored.
    #[error("{source}; rollback incomplete, {} reference change(s) not undone", .failed.len())]
    RollbackIncomplete {
        /// The failure that triggered the rollback
        #[source]
        source: Box<RewriteError>,
        /// The inverse actions that failed
        failed: Vec<(RefName, RollbackError)>,
    },
}

impl From<StoreError> for RewriteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ObjectNotFound { oid } => RewriteError::ObjectNotFound { oid },
            StoreError::SymbolicChainTooDeep { refname } => {
                RewriteError::SymbolicChainTooDeep { refname }
            }
            other => RewriteError::Store(other),
        }
    }
}

impl From<TypeError> for RewriteError {
    fn from(err: TypeError) -> Self {
        RewriteError::Store(StoreError::Type(err))
    }
}

impl From<crate::core::sort::SortError> for RewriteError {
    fn from(err: crate::core::sort::SortError) -> Self {
        RewriteError::Store(StoreError::Sort(err))
    }
}

impl RewriteError {
    fn callback(stage: CallbackStage) -> impl FnOnce(anyhow::Error) -> RewriteError {
        move |source| RewriteError::Callback { stage, source }
    }
}

/// What happened to one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefUpdate {
    /// Original name
    pub name: RefName,
    /// Where the original was backed up
    pub backup: RefName,
    /// Original target
    pub old_target: RefTarget,
    /// Name after the rewrite, `None` if the reference was deleted
    pub new_name: Option<RefName>,
    /// Target after the rewrite, `None` if the reference was deleted
    pub new_target: Option<RefTarget>,
}

/// Outcome of a successful rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    /// Commits walked
    pub commits_visited: usize,
    /// Commits whose id changed
    pub commits_rewritten: usize,
    /// Commits dropped or folded into their parent
    pub commits_pruned: usize,
    /// Tag annotations whose id changed
    pub tags_rewritten: usize,
    /// References that were backed up and changed
    pub references: Vec<RefUpdate>,
}

/// Rewrites a repository's history.
///
/// Single-use: [`HistoryRewriter::execute`] consumes it.
pub struct HistoryRewriter<'r, 'a, R: Repository + ?Sized> {
    repo: &'r R,
    targeted: HashSet<Oid>,
    options: RewriteOptions<'a>,
    backup_namespace: String,
    object_map: HashMap<Oid, Option<Oid>>,
    ref_map: HashMap<RefName, Option<Reference>>,
    tags_in_progress: HashSet<Oid>,
    rollback: RollbackLog,
    summary: RewriteSummary,
}

impl<'r, 'a, R: Repository + ?Sized> HistoryRewriter<'r, 'a, R> {
    /// Prepare a rewrite of `commits` (the targeted commits).
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError::InvalidOptions`] if the options fail validation.
    pub fn new(
        repo: &'r R,
        commits: impl IntoIterator<Item = Oid>,
        options: RewriteOptions<'a>,
    ) -> Result<Self, RewriteError> {
        options.validate()?;
        let backup_namespace = options.normalized_backup_namespace()?;
        Ok(Self {
            repo,
            targeted: commits.into_iter().collect(),
            options,
            backup_namespace,
            object_map: HashMap::new(),
            ref_map: HashMap::new(),
            tags_in_progress: HashSet::new(),
            rollback: RollbackLog::new(),
            summary: RewriteSummary::default(),
        })
    }

    /// Run the rewrite.
    ///
    /// On failure every reference change made so far is undone before the
    /// error is returned. Objects created along the way are left in the store.
    pub fn execute(mut self) -> Result<RewriteSummary, RewriteError> {
        if let Err(err) = self.rewrite_all() {
            return Err(self.abort(err, true));
        }

        if let Some(hook) = &self.options.on_succeeding {
            if let Err(source) = hook() {
                let err = RewriteError::Callback {
                    stage: CallbackStage::OnSucceeding,
                    source,
                };
                return Err(self.abort(err, false));
            }
        }

        info!(
            visited = self.summary.commits_visited,
            rewritten = self.summary.commits_rewritten,
            pruned = self.summary.commits_pruned,
            tags = self.summary.tags_rewritten,
            refs = self.summary.references.len(),
            "history rewritten"
        );
        Ok(self.summary)
    }

    fn rewrite_all(&mut self) -> Result<(), RewriteError> {
        let refs = self.repo.reachable_from(&self.targeted)?;
        info!(
            targets = self.targeted.len(),
            refs = refs.len(),
            "rewriting history"
        );

        let mut tips = Vec::with_capacity(refs.len());
        for reference in &refs {
            if let Some(commit) = self.repo.reference_commit(reference)? {
                tips.push(commit);
            }
        }

        let sort = CommitSort::rewrite_order();
        sort.validate_for_rewrite()?;
        for id in self.repo.walk(&tips, sort)? {
            let commit = self.repo.find_commit(&id)?;
            self.rewrite_commit(&commit)?;
        }

        // A symbolic reference must see its target's final name.
        let mut ordered = Vec::with_capacity(refs.len());
        for reference in refs {
            ordered.push((self.repo.reference_depth(&reference)?, reference));
        }
        ordered.sort_by_key(|(depth, _)| *depth);

        for (_, reference) in &ordered {
            self.rewrite_reference(reference, 0)?;
        }
        Ok(())
    }

    fn abort(&mut self, err: RewriteError, notify: bool) -> RewriteError {
        let mut err = err;
        if notify {
            if let Some(hook) = &self.options.on_error {
                if let Err(source) = hook(&err) {
                    err = RewriteError::Callback {
                        stage: CallbackStage::OnError,
                        source,
                    };
                }
            }
        }

        warn!(error = %err, changes = self.rollback.len(), "rewrite failed, rolling back");
        let result = self
            .rollback
            .replay(self.repo, &self.options.log_message("abort"));
        if result.is_complete() {
            err
        } else {
            warn!("{result}");
            RewriteError::RollbackIncomplete {
                source: Box::new(err),
                failed: result.failures,
            }
        }
    }

    fn rewrite_commit(&mut self, commit: &Commit) -> Result<Option<Oid>, RewriteError> {
        if let Some(mapped) = self.object_map.get(&commit.id) {
            return Ok(mapped.clone());
        }
        self.summary.commits_visited += 1;

        let mut parents = Vec::with_capacity(commit.parents.len());
        for parent in &commit.parents {
            match self.object_map.get(parent) {
                Some(Some(new_parent)) => parents.push(new_parent.clone()),
                Some(None) => {}
                None => {
                    return Err(RewriteError::UnmappedParent {
                        commit: commit.id.to_string(),
                        parent: parent.to_string(),
                    })
                }
            }
        }

        let mut header = CommitHeader::from_commit(commit);
        let mut tree = commit.tree.clone();

        if self.targeted.contains(&commit.id) {
            if let Some(rewrite) = &self.options.commit_header_rewriter {
                header = rewrite(commit).map_err(RewriteError::callback(CallbackStage::CommitHeader))?;
            }

            if let Some(rewrite) = &self.options.commit_tree_rewriter {
                let definition =
                    rewrite(commit).map_err(RewriteError::callback(CallbackStage::CommitTree))?;
                tree = self.repo.create_tree(&definition)?;
            }

            if let Some(rewrite) = &self.options.commit_parents_rewriter {
                let new_parents = parents
                    .iter()
                    .map(|id| self.repo.find_commit(id))
                    .collect::<Result<Vec<_>, _>>()?;
                let chosen = rewrite(commit, &new_parents)
                    .map_err(RewriteError::callback(CallbackStage::CommitParents))?;
                // Original ids are accepted too; they go through the map.
                parents = chosen
                    .into_iter()
                    .filter_map(|id| match self.object_map.get(&id) {
                        Some(mapped) => mapped.clone(),
                        None => Some(id),
                    })
                    .collect();
            }
        }

        if self.options.prune_empty_commits {
            if let Some(replacement) = self.prune_target(&parents, &tree)? {
                debug!(commit = %commit.id, into = ?replacement, "pruned empty commit");
                self.summary.commits_pruned += 1;
                self.object_map.insert(commit.id.clone(), replacement.clone());
                return Ok(replacement);
            }
        }

        let unchanged_header = header == CommitHeader::from_commit(commit);
        if unchanged_header && tree == commit.tree && parents == commit.parents {
            // Untouched: the original object stays, signatures included.
            self.object_map
                .insert(commit.id.clone(), Some(commit.id.clone()));
            return Ok(Some(commit.id.clone()));
        }

        // An untouched message keeps its original bytes and encoding.
        let (message, encoding) = if header.message == commit.message {
            (commit.raw_message.as_slice(), commit.encoding.as_deref())
        } else {
            (header.message.as_bytes(), None)
        };
        let new_id = self.repo.create_commit_raw(
            message,
            encoding,
            &header.author,
            &header.committer,
            &tree,
            &parents,
        )?;
        if new_id != commit.id {
            debug!(old = %commit.id, new = %new_id, "rewrote commit");
            self.summary.commits_rewritten += 1;
        }
        self.object_map.insert(commit.id.clone(), Some(new_id.clone()));
        Ok(Some(new_id))
    }

    /// Where an empty commit folds to: its first parent, or nothing for an empty root.
    fn prune_target(&self, parents: &[Oid], tree: &Oid) -> Result<Option<Option<Oid>>, RewriteError> {
        match parents.first() {
            None => {
                if self.repo.tree_entries(tree)?.is_empty() {
                    return Ok(Some(None));
                }
            }
            Some(parent) => {
                if &self.repo.find_commit(parent)?.tree == tree {
                    return Ok(Some(Some(parent.clone())));
                }
            }
        }
        Ok(None)
    }

    fn rewrite_target(&mut self, target: &Oid) -> Result<Option<Oid>, RewriteError> {
        if let Some(mapped) = self.object_map.get(target) {
            return Ok(mapped.clone());
        }

        match self.repo.lookup(target)? {
            Some(Object::Commit(commit)) => self.rewrite_commit(&commit),
            Some(Object::Tag(annotation)) => self.rewrite_annotation(&annotation),
            // Trees and blobs referenced directly are passed through.
            Some(Object::Tree(_)) | Some(Object::Blob(_)) => Ok(Some(target.clone())),
            None => Err(RewriteError::ObjectNotFound {
                oid: target.to_string(),
            }),
        }
    }

    fn rewrite_annotation(&mut self, annotation: &TagAnnotation) -> Result<Option<Oid>, RewriteError> {
        if !self.tags_in_progress.insert(annotation.id.clone()) {
            return Err(RewriteError::TagCycle {
                tag: annotation.id.to_string(),
            });
        }
        let inner = self.rewrite_target(&annotation.target);
        self.tags_in_progress.remove(&annotation.id);

        let Some(new_target) = inner? else {
            debug!(tag = %annotation.name, "dropping annotation whose target was pruned");
            self.object_map.insert(annotation.id.clone(), None);
            return Ok(None);
        };

        let name = match &self.options.tag_name_rewriter {
            Some(rewrite) => rewrite(
                &annotation.name,
                true,
                &RefTarget::Direct(annotation.target.clone()),
            )
            .map_err(RewriteError::callback(CallbackStage::TagName))?,
            None => annotation.name.clone(),
        };

        if new_target == annotation.target && name == annotation.name {
            self.object_map
                .insert(annotation.id.clone(), Some(annotation.id.clone()));
            return Ok(Some(annotation.id.clone()));
        }

        let new_id = self.repo.create_tag(
            &name,
            &new_target,
            annotation.tagger.as_ref(),
            &annotation.message,
        )?;
        if new_id != annotation.id {
            debug!(old = %annotation.id, new = %new_id, name = %name, "rewrote annotation");
            self.summary.tags_rewritten += 1;
        }
        self.object_map
            .insert(annotation.id.clone(), Some(new_id.clone()));
        Ok(Some(new_id))
    }

    fn rewritten_ref_name(&self, reference: &Reference) -> Result<RefName, RewriteError> {
        match (&self.options.tag_name_rewriter, reference.name.tag_name()) {
            (Some(rewrite), Some(tag)) => {
                let new_tag = rewrite(tag, false, &reference.target)
                    .map_err(RewriteError::callback(CallbackStage::TagName))?;
                Ok(RefName::for_tag(&new_tag)?)
            }
            _ => Ok(reference.name.clone()),
        }
    }

    fn rewrite_reference(
        &mut self,
        reference: &Reference,
        depth: usize,
    ) -> Result<Option<Reference>, RewriteError> {
        if let Some(done) = self.ref_map.get(&reference.name) {
            return Ok(done.clone());
        }
        if depth >= MAX_SYMBOLIC_DEPTH {
            return Err(RewriteError::SymbolicChainTooDeep {
                refname: reference.name.to_string(),
            });
        }

        let new_name = self.rewritten_ref_name(reference)?;
        let new_target = match &reference.target {
            RefTarget::Direct(oid) => self.rewrite_target(oid)?.map(RefTarget::Direct),
            RefTarget::Symbolic(name) => {
                // The target may already have been renamed away from `name`.
                let rewritten = match self.ref_map.get(name).cloned() {
                    Some(done) => Some(done),
                    None => match self.repo.find_reference(name)? {
                        Some(target) => Some(self.rewrite_reference(&target, depth + 1)?),
                        None => None,
                    },
                };
                match rewritten {
                    Some(done) => done.map(|r| RefTarget::Symbolic(r.name)),
                    // Dangling symbolic references are kept as they are.
                    None => Some(reference.target.clone()),
                }
            }
        };

        if new_target.as_ref() == Some(&reference.target) && new_name == reference.name {
            debug!(refname = %reference.name, "reference unchanged");
            self.ref_map
                .insert(reference.name.clone(), Some(reference.clone()));
            return Ok(Some(reference.clone()));
        }

        let backup = reference.name.backup_name(&self.backup_namespace)?;
        if self.repo.find_reference(&backup)?.is_some() {
            return Err(RewriteError::BackupExists {
                refname: reference.name.to_string(),
                backup: backup.to_string(),
            });
        }

        self.repo.create_reference(
            &backup,
            &reference.target,
            false,
            &self.options.log_message("backup"),
        )?;
        self.rollback.push(RollbackAction::DeleteBackup {
            name: backup.clone(),
        });

        let Some(target) = new_target else {
            self.repo.delete_reference(&reference.name)?;
            self.rollback.push(RollbackAction::Recreate {
                reference: reference.clone(),
            });
            debug!(refname = %reference.name, "deleted reference whose target was pruned");
            self.record(reference, backup, None);
            return Ok(None);
        };

        let updated =
            self.repo
                .update_target(reference, &target, &self.options.log_message("rewrite"))?;
        self.rollback.push(RollbackAction::RestoreTarget {
            name: reference.name.clone(),
            target: reference.target.clone(),
        });

        let rewritten = if updated.name == new_name {
            updated
        } else {
            let moved = self.repo.rename_reference(
                &updated,
                &new_name,
                &self.options.log_message("rewrite"),
            )?;
            self.rollback.push(RollbackAction::RenameBack {
                current: new_name.clone(),
                original: reference.name.clone(),
            });
            moved
        };

        debug!(
            refname = %reference.name,
            new_name = %rewritten.name,
            target = %rewritten.target,
            "rewrote reference"
        );
        self.record(reference, backup, Some(rewritten.clone()));
        Ok(Some(rewritten))
    }

    fn record(&mut self, reference: &Reference, backup: RefName, rewritten: Option<Reference>) {
        self.summary.references.push(RefUpdate {
            name: reference.name.clone(),
            backup,
            old_target: reference.target.clone(),
            new_name: rewritten.as_ref().map(|r| r.name.clone()),
            new_target: rewritten.as_ref().map(|r| r.target.clone()),
        });
        self.ref_map.insert(reference.name.clone(), rewritten);
    }
}

/// Rewrite the history of `repo`, targeting `commits`.
///
/// Shorthand for [`HistoryRewriter::new`] followed by [`HistoryRewriter::execute`].
pub fn rewrite_history<R: Repository + ?Sized>(
    repo: &R,
    commits: impl IntoIterator<Item = Oid>,
    options: RewriteOptions<'_>,
) -> Result<RewriteSummary, RewriteError> {
    HistoryRewriter::new(repo, commits, options)?.execute()
}

//! git::interface
//!
//! Git interface implementation using git2.
//!
//! [`Git`] implements [`ObjectStore`] and [`RefStore`] on top of libgit2, so
//! the history rewriter can run against a real repository. It also provides
//! the few repository queries the command-line host needs: revision parsing,
//! reflog reading and repository paths.
//!
//! # Error Handling
//!
//! Store operations return [`StoreError`]; git2 failures are mapped with
//! [`store_error`], which keeps "not found" and "already exists" distinct so
//! the rewriter can tell a missing object from a naming conflict. Everything
//! else the host calls returns [`GitError`].
//!
//! # Recreated objects
//!
//! A commit that keeps its header, tree and parents is never rewritten, so
//! its signature and extra headers survive. A recreated commit keeps its raw
//! message bytes and `encoding` header when the message is untouched. It loses
//! `gpgsig`, `mergetag` and any other extra header, as those no longer match
//! the new content. Annotations without a tagger get the repository's
//! configured identity when their target moves.
//!
//! # Reflogs
//!
//! libgit2 only writes a reflog for branches, remote-tracking refs and
//! `HEAD` unless `core.logAllRefUpdates` is `always`. Backup references in
//! other namespaces therefore have no reflog by default.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::core::sort::CommitSort;
use crate::core::types::{ObjectKind, Oid, RefName, Signature, TypeError};
use crate::store::{
    Commit, DefinitionEntry, EntryMode, Object, ObjectStore, RefStore, RefTarget, Reference,
    StoreError, TagAnnotation, TreeDefinition, TreeEntry,
};

/// Errors from Git operations outside the store traits.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// A revision could not be resolved to a commit.
    #[error("unknown revision: {spec}")]
    RevisionNotFound {
        /// The revision as given
        spec: String,
    },

    /// Store-level failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound | git2::ErrorCode::InvalidSpec | git2::ErrorCode::Ambiguous => {
                GitError::RevisionNotFound {
                    spec: context.to_string(),
                }
            }
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        GitError::Store(StoreError::Type(err))
    }
}

/// Map a git2 failure onto the store taxonomy.
///
/// `context` is the reference name or object id the operation was about.
pub fn store_error(err: git2::Error, context: &str) -> StoreError {
    match err.code() {
        git2::ErrorCode::NotFound if context.starts_with("refs/") || context == "HEAD" => {
            StoreError::RefNotFound {
                refname: context.to_string(),
            }
        }
        git2::ErrorCode::NotFound => StoreError::ObjectNotFound {
            oid: context.to_string(),
        },
        git2::ErrorCode::Exists => StoreError::RefExists {
            refname: context.to_string(),
        },
        _ => StoreError::Backend {
            message: format!("{}: {}", context, err.message()),
        },
    }
}

/// Information about a Git repository.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    /// Path to .git directory
    pub git_dir: PathBuf,
    /// Shared git directory; differs from `git_dir` in linked worktrees
    pub common_dir: PathBuf,
    /// Path to working directory, `None` for bare repositories
    pub work_dir: Option<PathBuf>,
}

/// The Git interface.
///
/// The only type in the crate that talks to libgit2.
///
/// # Example
///
/// ```ignore
/// use reweave::git::Git;
/// use reweave::engine::{rewrite_history, RewriteOptions};
///
/// let git = Git::open(Path::new("."))?;
/// let targets = git.revision_commits(&["HEAD~3..HEAD".to_string()])?;
/// rewrite_history(&git, targets, RewriteOptions::new())?;
/// ```
pub struct Git {
    /// The underlying git2 repository
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

fn raw(oid: &Oid) -> Result<git2::Oid, StoreError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| store_error(e, oid.as_str()))
}

fn typed(oid: git2::Oid) -> Result<Oid, StoreError> {
    Ok(Oid::new(oid.to_string())?)
}

fn object_kind(kind: Option<git2::ObjectType>, id: &str) -> Result<ObjectKind, StoreError> {
    match kind {
        Some(git2::ObjectType::Commit) => Ok(ObjectKind::Commit),
        Some(git2::ObjectType::Tree) => Ok(ObjectKind::Tree),
        Some(git2::ObjectType::Blob) => Ok(ObjectKind::Blob),
        Some(git2::ObjectType::Tag) => Ok(ObjectKind::Tag),
        _ => Err(StoreError::Backend {
            message: format!("object {id} has an unknown type"),
        }),
    }
}

fn signature(sig: &git2::Signature<'_>) -> Result<Signature, StoreError> {
    let when = sig.when();
    Ok(Signature::from_raw(
        String::from_utf8_lossy(sig.name_bytes()),
        String::from_utf8_lossy(sig.email_bytes()),
        when.seconds(),
        when.offset_minutes(),
    )?)
}

/// Append a `<header> name <email> seconds +hhmm` line.
fn push_signature(buffer: &mut Vec<u8>, header: &str, sig: &git2::Signature<'_>) {
    let when = sig.when();
    let offset = when.offset_minutes();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();

    buffer.extend_from_slice(header.as_bytes());
    buffer.push(b' ');
    buffer.extend_from_slice(sig.name_bytes());
    buffer.extend_from_slice(b" <");
    buffer.extend_from_slice(sig.email_bytes());
    buffer.extend_from_slice(
        format!("> {} {}{:02}{:02}\n", when.seconds(), sign, offset / 60, offset % 60).as_bytes(),
    );
}

fn git_signature(sig: &Signature) -> Result<git2::Signature<'static>, StoreError> {
    let time = git2::Time::new(sig.seconds(), sig.offset_minutes());
    git2::Signature::new(&sig.name, &sig.email, &time).map_err(|e| store_error(e, &sig.to_string()))
}

fn sort_flags(sort: CommitSort) -> git2::Sort {
    let mut flags = git2::Sort::NONE;
    if sort.topological {
        flags |= git2::Sort::TOPOLOGICAL;
    }
    if sort.time {
        flags |= git2::Sort::TIME;
    }
    if sort.reverse {
        flags |= git2::Sort::REVERSE;
    }
    flags
}

impl Git {
    /// Open a repository at the given path.
    ///
    /// Uses `git2::Repository::discover` to find the repository root,
    /// so `path` can be any directory within the repository. Bare
    /// repositories are accepted.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self { repo })
    }

    /// Get repository information (git_dir and work_dir paths).
    pub fn info(&self) -> RepoInfo {
        RepoInfo {
            git_dir: self.repo.path().to_path_buf(),
            common_dir: self.repo.commondir().to_path_buf(),
            work_dir: self.repo.workdir().map(Path::to_path_buf),
        }
    }

    /// Get direct access to the .git directory path.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Resolve a single revision (anything `git rev-parse` accepts) to a commit.
    pub fn resolve_commit(&self, spec: &str) -> Result<Oid, GitError> {
        let object = self
            .repo
            .revparse_single(spec)
            .map_err(|e| GitError::from_git2(e, spec))?;
        let commit = object
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, spec))?;
        Ok(typed(commit.id())?)
    }

    /// Collect the commits selected by a list of revisions.
    ///
    /// Accepts `rev` (everything reachable from it), `^rev` (exclude what is
    /// reachable from it) and `a..b` ranges, like `git rev-list`.
    pub fn revision_commits(&self, specs: &[String]) -> Result<Vec<Oid>, GitError> {
        let mut walk = self
            .repo
            .revwalk()
            .map_err(|e| GitError::from_git2(e, "revwalk"))?;

        for spec in specs {
            if let Some(excluded) = spec.strip_prefix('^') {
                walk.hide(raw(&self.resolve_commit(excluded)?)?)
                    .map_err(|e| GitError::from_git2(e, spec))?;
            } else if spec.contains("..") {
                walk.push_range(spec)
                    .map_err(|e| GitError::from_git2(e, spec))?;
            } else {
                walk.push(raw(&self.resolve_commit(spec)?)?)
                    .map_err(|e| GitError::from_git2(e, spec))?;
            }
        }

        let mut commits = Vec::new();
        for id in walk {
            let id = id.map_err(|e| GitError::from_git2(e, "revwalk"))?;
            commits.push(typed(id)?);
        }
        debug!(specs = ?specs, commits = commits.len(), "resolved revisions");
        Ok(commits)
    }

    /// Reflog messages of a reference, oldest first.
    ///
    /// Returns an empty list when the reference has no reflog.
    pub fn reflog_messages(&self, name: &RefName) -> Result<Vec<String>, GitError> {
        let reflog = self
            .repo
            .reflog(name.as_str())
            .map_err(|e| GitError::from_git2(e, name.as_str()))?;
        let mut messages: Vec<String> = reflog
            .iter()
            .map(|entry| entry.message().unwrap_or_default().to_string())
            .collect();
        messages.reverse();
        Ok(messages)
    }

    /// References whose name starts with `prefix`, sorted by name.
    pub fn references_with_prefix(&self, prefix: &str) -> Result<Vec<Reference>, StoreError> {
        let mut refs: Vec<Reference> = self
            .references()?
            .into_iter()
            .filter(|r| r.name.as_str().starts_with(prefix))
            .collect();
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(refs)
    }

    fn find_git_reference(&self, name: &RefName) -> Result<git2::Reference<'_>, StoreError> {
        self.repo
            .find_reference(name.as_str())
            .map_err(|e| store_error(e, name.as_str()))
    }

    fn convert_reference(reference: &git2::Reference<'_>) -> Result<Option<Reference>, StoreError> {
        let Some(name) = reference.name() else {
            return Ok(None);
        };
        let Ok(name) = RefName::new(name) else {
            debug!(refname = name, "skipping reference with unsupported name");
            return Ok(None);
        };

        let target = match reference.kind() {
            Some(git2::ReferenceType::Symbolic) => match reference.symbolic_target() {
                Some(target) => RefTarget::Symbolic(RefName::new(target)?),
                None => return Ok(None),
            },
            _ => match reference.target() {
                Some(oid) => RefTarget::Direct(typed(oid)?),
                None => return Ok(None),
            },
        };
        Ok(Some(Reference { name, target }))
    }

    fn write_definition(&self, definition: &TreeDefinition) -> Result<Option<git2::Oid>, StoreError> {
        let mut builder = self
            .repo
            .treebuilder(None)
            .map_err(|e| store_error(e, "treebuilder"))?;

        for (name, node) in definition.entries() {
            let (id, mode) = match node {
                DefinitionEntry::Leaf(entry) => (raw(&entry.target)?, entry.mode.filemode()),
                DefinitionEntry::Tree(sub) => match self.write_definition(sub)? {
                    Some(id) => (id, EntryMode::Tree.filemode()),
                    None => continue,
                },
            };
            builder
                .insert(name, id, mode)
                .map_err(|e| store_error(e, &id.to_string()))?;
        }

        if builder.is_empty() && !definition.keeps_empty() {
            return Ok(None);
        }
        let id = builder.write().map_err(|e| store_error(e, "tree"))?;
        Ok(Some(id))
    }
}

impl ObjectStore for Git {
    fn lookup(&self, id: &Oid) -> Result<Option<Object>, StoreError> {
        let object = match self.repo.find_object(raw(id)?, None) {
            Ok(object) => object,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(store_error(e, id.as_str())),
        };

        let object = match object_kind(object.kind(), id.as_str())? {
            ObjectKind::Commit => {
                let commit = object
                    .as_commit()
                    .ok_or_else(|| StoreError::Backend {
                        message: format!("{id} is not a commit"),
                    })?;
                Object::Commit(Commit {
                    id: id.clone(),
                    tree: typed(commit.tree_id())?,
                    parents: commit.parent_ids().map(typed).collect::<Result<_, _>>()?,
                    author: signature(&commit.author())?,
                    committer: signature(&commit.committer())?,
                    message: String::from_utf8_lossy(commit.message_raw_bytes()).into_owned(),
                    raw_message: commit.message_raw_bytes().to_vec(),
                    encoding: commit.message_encoding().map(str::to_string),
                })
            }
            ObjectKind::Tag => {
                let tag = object.as_tag().ok_or_else(|| StoreError::Backend {
                    message: format!("{id} is not a tag"),
                })?;
                let target = typed(tag.target_id())?;
                Object::Tag(TagAnnotation {
                    id: id.clone(),
                    name: String::from_utf8_lossy(tag.name_bytes()).into_owned(),
                    target_kind: object_kind(tag.target_type(), target.as_str())?,
                    target,
                    tagger: tag.tagger().as_ref().map(signature).transpose()?,
                    message: tag
                        .message_bytes()
                        .map(|m| String::from_utf8_lossy(m).into_owned())
                        .unwrap_or_default(),
                })
            }
            ObjectKind::Tree => Object::Tree(id.clone()),
            ObjectKind::Blob => Object::Blob(id.clone()),
        };
        Ok(Some(object))
    }

    fn tree_entries(&self, tree: &Oid) -> Result<Vec<(String, TreeEntry)>, StoreError> {
        let found = self
            .repo
            .find_tree(raw(tree)?)
            .map_err(|e| store_error(e, tree.as_str()))?;

        let mut entries = Vec::with_capacity(found.len());
        for entry in found.iter() {
            let name = String::from_utf8_lossy(entry.name_bytes()).into_owned();
            let mode = EntryMode::from_filemode(entry.filemode()).ok_or_else(|| {
                StoreError::Backend {
                    message: format!("unsupported file mode {:o} for '{name}'", entry.filemode()),
                }
            })?;
            entries.push((name, TreeEntry::new(typed(entry.id())?, mode)));
        }
        Ok(entries)
    }

    fn create_commit(
        &self,
        message: &str,
        author: &Signature,
        committer: &Signature,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, StoreError> {
        let tree = self
            .repo
            .find_tree(raw(tree)?)
            .map_err(|e| store_error(e, tree.as_str()))?;
        let parents = parents
            .iter()
            .map(|p| {
                self.repo
                    .find_commit(raw(p)?)
                    .map_err(|e| store_error(e, p.as_str()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let id = self
            .repo
            .commit(
                None,
                &git_signature(author)?,
                &git_signature(committer)?,
                message,
                &tree,
                &parent_refs,
            )
            .map_err(|e| store_error(e, "commit"))?;
        typed(id)
    }

    fn create_commit_raw(
        &self,
        message: &[u8],
        encoding: Option<&str>,
        author: &Signature,
        committer: &Signature,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, StoreError> {
        let tree = self
            .repo
            .find_tree(raw(tree)?)
            .map_err(|e| store_error(e, tree.as_str()))?;
        let mut buffer = format!("tree {}\n", tree.id()).into_bytes();
        for parent in parents {
            let found = self
                .repo
                .find_commit(raw(parent)?)
                .map_err(|e| store_error(e, parent.as_str()))?;
            buffer.extend_from_slice(format!("parent {}\n", found.id()).as_bytes());
        }
        push_signature(&mut buffer, "author", &git_signature(author)?);
        push_signature(&mut buffer, "committer", &git_signature(committer)?);
        if let Some(encoding) = encoding {
            if encoding.contains('\n') {
                return Err(StoreError::Backend {
                    message: format!("invalid commit encoding {encoding:?}"),
                });
            }
            buffer.extend_from_slice(format!("encoding {encoding}\n").as_bytes());
        }
        buffer.push(b'\n');
        buffer.extend_from_slice(message);

        let id = self
            .repo
            .odb()
            .and_then(|odb| odb.write(git2::ObjectType::Commit, &buffer))
            .map_err(|e| store_error(e, "commit"))?;
        typed(id)
    }

    fn create_tree(&self, definition: &TreeDefinition) -> Result<Oid, StoreError> {
        let id = match self.write_definition(definition)? {
            Some(id) => id,
            None => self
                .repo
                .treebuilder(None)
                .and_then(|builder| builder.write())
                .map_err(|e| store_error(e, "tree"))?,
        };
        typed(id)
    }

    fn create_tag(
        &self,
        name: &str,
        target: &Oid,
        tagger: Option<&Signature>,
        message: &str,
    ) -> Result<Oid, StoreError> {
        let object = self
            .repo
            .find_object(raw(target)?, None)
            .map_err(|e| store_error(e, target.as_str()))?;
        let tagger = match tagger {
            Some(sig) => git_signature(sig)?,
            // libgit2 can't write an annotation without a tagger.
            None => self.repo.signature().map_err(|e| store_error(e, "user.name"))?,
        };

        let id = self
            .repo
            .tag_annotation_create(name, &object, &tagger, message)
            .map_err(|e| store_error(e, name))?;
        typed(id)
    }

    fn walk(&self, tips: &[Oid], sort: CommitSort) -> Result<Vec<Oid>, StoreError> {
        let mut walk = self.repo.revwalk().map_err(|e| store_error(e, "revwalk"))?;
        walk.set_sorting(sort_flags(sort))
            .map_err(|e| store_error(e, "revwalk"))?;
        for tip in tips {
            walk.push(raw(tip)?).map_err(|e| store_error(e, tip.as_str()))?;
        }

        let mut commits = Vec::new();
        for id in walk {
            commits.push(typed(id.map_err(|e| store_error(e, "revwalk"))?)?);
        }
        Ok(commits)
    }

    fn is_descendant_of(&self, commit: &Oid, ancestor: &Oid) -> Result<bool, StoreError> {
        self.repo
            .graph_descendant_of(raw(commit)?, raw(ancestor)?)
            .map_err(|e| store_error(e, commit.as_str()))
    }
}

impl RefStore for Git {
    fn references(&self) -> Result<Vec<Reference>, StoreError> {
        let iter = self
            .repo
            .references()
            .map_err(|e| store_error(e, "references"))?;

        let mut refs = Vec::new();
        for reference in iter {
            let reference = reference.map_err(|e| store_error(e, "references"))?;
            if let Some(converted) = Self::convert_reference(&reference)? {
                refs.push(converted);
            }
        }
        Ok(refs)
    }

    fn find_reference(&self, name: &RefName) -> Result<Option<Reference>, StoreError> {
        match self.repo.find_reference(name.as_str()) {
            Ok(reference) => Self::convert_reference(&reference),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(store_error(e, name.as_str())),
        }
    }

    fn create_reference(
        &self,
        name: &RefName,
        target: &RefTarget,
        force: bool,
        log_message: &str,
    ) -> Result<Reference, StoreError> {
        let created = match target {
            RefTarget::Direct(oid) => {
                self.repo
                    .reference(name.as_str(), raw(oid)?, force, log_message)
            }
            RefTarget::Symbolic(target) => self.repo.reference_symbolic(
                name.as_str(),
                target.as_str(),
                force,
                log_message,
            ),
        }
        .map_err(|e| store_error(e, name.as_str()))?;

        Self::convert_reference(&created)?.ok_or_else(|| StoreError::RefNotFound {
            refname: name.to_string(),
        })
    }

    fn update_target(
        &self,
        reference: &Reference,
        target: &RefTarget,
        log_message: &str,
    ) -> Result<Reference, StoreError> {
        let mut current = self.find_git_reference(&reference.name)?;
        let is_symbolic = current.kind() == Some(git2::ReferenceType::Symbolic);
        let name = reference.name.as_str();

        let updated = match (target, is_symbolic) {
            (RefTarget::Direct(oid), false) => current.set_target(raw(oid)?, log_message),
            (RefTarget::Symbolic(to), true) => current.symbolic_set_target(to.as_str(), log_message),
            (RefTarget::Direct(oid), true) => self.repo.reference(name, raw(oid)?, true, log_message),
            (RefTarget::Symbolic(to), false) => {
                self.repo
                    .reference_symbolic(name, to.as_str(), true, log_message)
            }
        }
        .map_err(|e| store_error(e, name))?;

        Self::convert_reference(&updated)?.ok_or_else(|| StoreError::RefNotFound {
            refname: name.to_string(),
        })
    }

    fn rename_reference(
        &self,
        reference: &Reference,
        new_name: &RefName,
        log_message: &str,
    ) -> Result<Reference, StoreError> {
        let mut current = self.find_git_reference(&reference.name)?;
        let renamed = current
            .rename(new_name.as_str(), false, log_message)
            .map_err(|e| store_error(e, new_name.as_str()))?;

        Self::convert_reference(&renamed)?.ok_or_else(|| StoreError::RefNotFound {
            refname: new_name.to_string(),
        })
    }

    fn delete_reference(&self, name: &RefName) -> Result<(), StoreError> {
        self.find_git_reference(name)?
            .delete()
            .map_err(|e| store_error(e, name.as_str()))
    }
}

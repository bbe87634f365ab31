//! store::traits
//!
//! Collaborator contracts consumed by the history rewriter.
//!
//! # Design
//!
//! The rewriter never talks to a concrete repository. It consumes:
//!
//! - [`ObjectStore`] - object lookup and creation (content-addressed)
//! - [`RefStore`] - reference enumeration and mutation
//! - [`Repository`] - both of the above, plus derived queries such as the
//!   reachability oracle ([`Repository::reachable_from`])
//!
//! Methods take `&self`. Implementations that mutate state use interior
//! mutability, which lets rewrite callbacks hold their own handle to the
//! repository while a rewrite is running.
//!
//! Two implementations ship with the crate: [`crate::git::Git`] (libgit2) and
//! [`crate::store::memory::MemoryRepo`] (in-memory, for tests).

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use super::tree::{TreeDefinition, TreeEntry};
use crate::core::sort::{CommitSort, SortError};
use crate::core::types::{ObjectKind, Oid, RefName, Signature, TypeError};

/// Maximum number of symbolic hops followed before giving up.
pub const MAX_SYMBOLIC_DEPTH: usize = 10;

/// Errors from object and reference stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The missing object id
        oid: String,
    },

    /// Reference does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The missing reference
        refname: String,
    },

    /// Reference already exists and overwriting was not requested.
    #[error("ref already exists: {refname}")]
    RefExists {
        /// The conflicting reference
        refname: String,
    },

    /// Object exists but is not of the expected kind.
    #[error("object {oid} is a {actual}, expected a {expected}")]
    WrongKind {
        /// The object id
        oid: String,
        /// The kind that was required
        expected: ObjectKind,
        /// The kind that was found
        actual: ObjectKind,
    },

    /// A tree path could not be used.
    #[error("invalid tree path '{path}': {reason}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Symbolic references nest too deeply (or form a loop).
    #[error("symbolic ref chain starting at {refname} is too deep")]
    SymbolicChainTooDeep {
        /// The reference where resolution started
        refname: String,
    },

    /// Commit walk requested with an unsupported ordering.
    #[error(transparent)]
    Sort(#[from] SortError),

    /// Value failed validation.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Any other backend failure.
    #[error("store error: {message}")]
    Backend {
        /// The backend's message
        message: String,
    },
}

/// A commit, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Commit {
    /// The commit id
    pub id: Oid,
    /// Root tree
    pub tree: Oid,
    /// Parent ids, in order
    pub parents: Vec<Oid>,
    /// Author identity and time
    pub author: Signature,
    /// Committer identity and time
    pub committer: Signature,
    /// Full message, decoded lossily as UTF-8
    pub message: String,
    /// The message exactly as stored
    #[serde(skip)]
    pub raw_message: Vec<u8>,
    /// The `encoding` header, if any
    pub encoding: Option<String>,
}

/// An annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TagAnnotation {
    /// The annotation's own id
    pub id: Oid,
    /// Tag name recorded in the annotation
    pub name: String,
    /// Tagged object
    pub target: Oid,
    /// Kind of the tagged object
    pub target_kind: ObjectKind,
    /// Tagger, absent on some very old tags
    pub tagger: Option<Signature>,
    /// Annotation message
    pub message: String,
}

/// Any object in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Commit(Commit),
    Tree(Oid),
    Blob(Oid),
    Tag(TagAnnotation),
}

impl Object {
    /// The object's id.
    pub fn id(&self) -> &Oid {
        match self {
            Object::Commit(c) => &c.id,
            Object::Tree(id) | Object::Blob(id) => id,
            Object::Tag(t) => &t.id,
        }
    }

    /// The object's kind.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Commit(_) => ObjectKind::Commit,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Blob(_) => ObjectKind::Blob,
            Object::Tag(_) => ObjectKind::Tag,
        }
    }
}

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "target", rename_all = "lowercase")]
pub enum RefTarget {
    /// Directly at an object
    Direct(Oid),
    /// At another reference, by name
    Symbolic(RefName),
}

impl std::fmt::Display for RefTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefTarget::Direct(oid) => write!(f, "{}", oid),
            RefTarget::Symbolic(name) => write!(f, "{}", name),
        }
    }
}

/// A named reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Reference {
    /// Full reference name
    pub name: RefName,
    /// Target
    pub target: RefTarget,
}

impl Reference {
    /// Create a direct reference.
    pub fn direct(name: RefName, target: Oid) -> Self {
        Self {
            name,
            target: RefTarget::Direct(target),
        }
    }

    /// Create a symbolic reference.
    pub fn symbolic(name: RefName, target: RefName) -> Self {
        Self {
            name,
            target: RefTarget::Symbolic(target),
        }
    }
}

/// Object lookup and creation.
pub trait ObjectStore {
    /// Look up any object. Returns `Ok(None)` if it doesn't exist.
    fn lookup(&self, id: &Oid) -> Result<Option<Object>, StoreError>;

    /// Read a tree's direct entries in name order.
    fn tree_entries(&self, tree: &Oid) -> Result<Vec<(String, TreeEntry)>, StoreError>;

    /// Write a commit. Same inputs yield the same id.
    fn create_commit(
        &self,
        message: &str,
        author: &Signature,
        committer: &Signature,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, StoreError>;

    /// Write a commit from raw message bytes, with an optional `encoding` header.
    ///
    /// Stores that only hold UTF-8 messages can keep this default, which
    /// decodes the bytes lossily and drops the encoding.
    fn create_commit_raw(
        &self,
        message: &[u8],
        _encoding: Option<&str>,
        author: &Signature,
        committer: &Signature,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, StoreError> {
        self.create_commit(&String::from_utf8_lossy(message), author, committer, tree, parents)
    }

    /// Write a tree (and any nested trees) from a definition.
    fn create_tree(&self, definition: &TreeDefinition) -> Result<Oid, StoreError>;

    /// Write an annotated tag object. Does not create a reference.
    fn create_tag(
        &self,
        name: &str,
        target: &Oid,
        tagger: Option<&Signature>,
        message: &str,
    ) -> Result<Oid, StoreError>;

    /// List every commit reachable from `tips` in the requested order.
    fn walk(&self, tips: &[Oid], sort: CommitSort) -> Result<Vec<Oid>, StoreError>;

    /// Whether `commit` has `ancestor` in its history (strictly).
    fn is_descendant_of(&self, commit: &Oid, ancestor: &Oid) -> Result<bool, StoreError>;
}

/// Reference enumeration and mutation.
pub trait RefStore {
    /// List all references (excluding `HEAD`).
    fn references(&self) -> Result<Vec<Reference>, StoreError>;

    /// Find a reference by name without following it.
    fn find_reference(&self, name: &RefName) -> Result<Option<Reference>, StoreError>;

    /// Create a reference. Fails with [`StoreError::RefExists`] unless `force`.
    fn create_reference(
        &self,
        name: &RefName,
        target: &RefTarget,
        force: bool,
        log_message: &str,
    ) -> Result<Reference, StoreError>;

    /// Point an existing reference somewhere else, returning the updated reference.
    fn update_target(
        &self,
        reference: &Reference,
        target: &RefTarget,
        log_message: &str,
    ) -> Result<Reference, StoreError>;

    /// Rename a reference in place. Fails if `new_name` exists.
    fn rename_reference(
        &self,
        reference: &Reference,
        new_name: &RefName,
        log_message: &str,
    ) -> Result<Reference, StoreError>;

    /// Delete a reference.
    fn delete_reference(&self, name: &RefName) -> Result<(), StoreError>;
}

/// A full repository: objects, references and derived queries.
pub trait Repository: ObjectStore + RefStore {
    /// Look up a commit, failing if the id is missing or not a commit.
    fn find_commit(&self, id: &Oid) -> Result<Commit, StoreError> {
        match self.lookup(id)? {
            Some(Object::Commit(commit)) => Ok(commit),
            Some(other) => Err(StoreError::WrongKind {
                oid: id.to_string(),
                expected: ObjectKind::Commit,
                actual: other.kind(),
            }),
            None => Err(StoreError::ObjectNotFound {
                oid: id.to_string(),
            }),
        }
    }

    /// Follow symbolic references down to a direct one.
    ///
    /// Returns `Ok(None)` when the chain ends at a reference that doesn't exist.
    fn resolve_to_direct(&self, reference: &Reference) -> Result<Option<Reference>, StoreError> {
        let mut current = reference.clone();
        for _ in 0..MAX_SYMBOLIC_DEPTH {
            match &current.target {
                RefTarget::Direct(_) => return Ok(Some(current)),
                RefTarget::Symbolic(name) => match self.find_reference(name)? {
                    Some(next) => current = next,
                    None => return Ok(None),
                },
            }
        }
        Err(StoreError::SymbolicChainTooDeep {
            refname: reference.name.to_string(),
        })
    }

    /// Length of the symbolic chain before a direct reference (a direct reference is 1).
    ///
    /// A symbolic reference to a missing reference has depth 2.
    fn reference_depth(&self, reference: &Reference) -> Result<usize, StoreError> {
        let mut depth = 1;
        let mut current = reference.clone();
        while let RefTarget::Symbolic(name) = &current.target {
            depth += 1;
            if depth > MAX_SYMBOLIC_DEPTH {
                return Err(StoreError::SymbolicChainTooDeep {
                    refname: reference.name.to_string(),
                });
            }
            match self.find_reference(name)? {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(depth)
    }

    /// Peel an object through tag annotations down to a commit.
    ///
    /// Returns `Ok(None)` if the chain ends at a tree or blob, or at a missing object.
    fn peel_to_commit(&self, id: &Oid) -> Result<Option<Oid>, StoreError> {
        let mut current = id.clone();
        let mut seen = HashSet::new();
        while seen.insert(current.clone()) {
            match self.lookup(&current)? {
                Some(Object::Commit(commit)) => return Ok(Some(commit.id)),
                Some(Object::Tag(tag)) => current = tag.target,
                Some(Object::Tree(_)) | Some(Object::Blob(_)) | None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// The commit a reference ultimately designates, if any.
    fn reference_commit(&self, reference: &Reference) -> Result<Option<Oid>, StoreError> {
        match self.resolve_to_direct(reference)? {
            Some(Reference {
                target: RefTarget::Direct(oid),
                ..
            }) => self.peel_to_commit(&oid),
            _ => Ok(None),
        }
    }

    /// Every reference that can reach at least one of `targets`.
    ///
    /// A reference reaches a target when the commit it designates is the
    /// target or one of its descendants. References that don't designate a
    /// commit are never included.
    fn reachable_from(&self, targets: &HashSet<Oid>) -> Result<Vec<Reference>, StoreError> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = Vec::new();
        for reference in self.references()? {
            let Some(commit) = self.reference_commit(&reference)? else {
                continue;
            };

            let mut reaches = targets.contains(&commit);
            if !reaches {
                for target in targets {
                    if self.is_descendant_of(&commit, target)? {
                        reaches = true;
                        break;
                    }
                }
            }

            if reaches {
                result.push(reference);
            }
        }
        Ok(result)
    }
}

impl<T: ObjectStore + RefStore + ?Sized> Repository for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_and_kind() {
        let id = Oid::new("a".repeat(40)).unwrap();
        let tree = Object::Tree(id.clone());
        assert_eq!(tree.id(), &id);
        assert_eq!(tree.kind(), ObjectKind::Tree);
        assert_eq!(Object::Blob(id).kind(), ObjectKind::Blob);
    }

    #[test]
    fn ref_target_display() {
        let direct = RefTarget::Direct(Oid::new("b".repeat(40)).unwrap());
        assert_eq!(direct.to_string(), "b".repeat(40));
        let symbolic = RefTarget::Symbolic(RefName::new("refs/heads/main").unwrap());
        assert_eq!(symbolic.to_string(), "refs/heads/main");
    }

    #[test]
    fn error_display_formatting() {
        let err = StoreError::WrongKind {
            oid: "abc".to_string(),
            expected: ObjectKind::Commit,
            actual: ObjectKind::Blob,
        };
        assert_eq!(err.to_string(), "object abc is a blob, expected a commit");

        let err = StoreError::RefExists {
            refname: "refs/tags/v1".to_string(),
        };
        assert!(err.to_string().contains("refs/tags/v1"));
    }
}

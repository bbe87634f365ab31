//! store::tree
//!
//! Mutable description of a tree, used to build new trees while rewriting.
//!
//! A [`TreeDefinition`] is a nested map from entry name to either a leaf
//! ([`TreeEntry`]: blob, symlink, gitlink, or an existing subtree kept by id)
//! or a nested definition. [`TreeDefinition::from_tree`] expands an existing
//! tree fully so that any path can be added or removed.
//!
//! Nested definitions without entries are not written, so removing the last
//! file of a directory removes the directory. Subtrees that were already empty
//! in the tree a definition was read from are the exception: they are kept,
//! so an unmodified definition writes back the tree it came from.
//!
//! # Example
//!
//! ```
//! use reweave::store::memory::MemoryRepo;
//! use reweave::store::tree::{EntryMode, TreeDefinition, TreeEntry};
//! use reweave::store::ObjectStore;
//!
//! let repo = MemoryRepo::new();
//! let blob = repo.write_blob(b"hello");
//!
//! let mut def = TreeDefinition::new();
//! def.add("docs/README", TreeEntry::new(blob.clone(), EntryMode::Blob)).unwrap();
//! assert!(def.get("docs/README").is_some());
//!
//! let tree = repo.create_tree(&def).unwrap();
//! let mut copy = TreeDefinition::from_tree(&repo, &tree).unwrap();
//! assert!(copy.remove("docs/README"));
//! assert!(copy.is_empty());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::traits::{ObjectStore, StoreError};
use crate::core::types::{ObjectKind, Oid};

/// File mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Regular file
    Blob,
    /// Executable file
    BlobExecutable,
    /// Symbolic link
    Link,
    /// Subdirectory
    Tree,
    /// Submodule commit
    Gitlink,
}

impl EntryMode {
    /// The numeric mode Git stores for this entry kind.
    pub fn filemode(self) -> i32 {
        match self {
            EntryMode::Blob => 0o100644,
            EntryMode::BlobExecutable => 0o100755,
            EntryMode::Link => 0o120000,
            EntryMode::Tree => 0o040000,
            EntryMode::Gitlink => 0o160000,
        }
    }

    /// Map a numeric Git file mode back to an entry kind.
    ///
    /// The legacy group-writable blob mode (`100664`) is read as a plain blob.
    pub fn from_filemode(mode: i32) -> Option<Self> {
        match mode {
            0o100644 | 0o100664 => Some(EntryMode::Blob),
            0o100755 => Some(EntryMode::BlobExecutable),
            0o120000 => Some(EntryMode::Link),
            0o040000 => Some(EntryMode::Tree),
            0o160000 => Some(EntryMode::Gitlink),
            _ => None,
        }
    }

    /// The kind of object an entry with this mode points at.
    pub fn object_kind(self) -> ObjectKind {
        match self {
            EntryMode::Blob | EntryMode::BlobExecutable | EntryMode::Link => ObjectKind::Blob,
            EntryMode::Tree => ObjectKind::Tree,
            EntryMode::Gitlink => ObjectKind::Commit,
        }
    }
}

/// A single tree entry: target object plus mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeEntry {
    /// The object the entry points at
    pub target: Oid,
    /// The entry mode
    pub mode: EntryMode,
}

impl TreeEntry {
    /// Create a tree entry.
    pub fn new(target: Oid, mode: EntryMode) -> Self {
        Self { target, mode }
    }
}

/// A node of a [`TreeDefinition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionEntry {
    /// An entry written as-is
    Leaf(TreeEntry),
    /// A subdirectory that is built from its own definition
    Tree(TreeDefinition),
}

/// Mutable description of a tree's entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDefinition {
    entries: BTreeMap<String, DefinitionEntry>,
    /// Written even without entries
    keep_empty: bool,
}

impl TreeDefinition {
    /// Create an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a definition mirroring an existing tree, expanding every subtree.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the tree or one of its subtrees cannot be read.
    pub fn from_tree<S: ObjectStore + ?Sized>(store: &S, tree: &Oid) -> Result<Self, StoreError> {
        let mut def = TreeDefinition::new();
        for (name, entry) in store.tree_entries(tree)? {
            let node = match entry.mode {
                EntryMode::Tree => {
                    let mut sub = Self::from_tree(store, &entry.target)?;
                    sub.keep_empty = sub.entries.is_empty();
                    DefinitionEntry::Tree(sub)
                }
                _ => DefinitionEntry::Leaf(entry),
            };
            def.entries.insert(name, node);
        }
        Ok(def)
    }

    /// Add (or replace) the entry at `path`, creating intermediate directories.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::InvalidPath`] for empty path components, or when
    /// an intermediate component is a leaf that cannot be descended into.
    pub fn add(&mut self, path: &str, entry: TreeEntry) -> Result<(), StoreError> {
        let (dirs, name) = split_path(path)?;
        let mut current = self;
        for dir in dirs {
            let node = current
                .entries
                .entry(dir.to_string())
                .or_insert_with(|| DefinitionEntry::Tree(TreeDefinition::new()));
            current = match node {
                DefinitionEntry::Tree(def) => def,
                DefinitionEntry::Leaf(_) => {
                    return Err(StoreError::InvalidPath {
                        path: path.to_string(),
                        reason: format!("'{dir}' is not an expanded directory"),
                    })
                }
            };
        }
        current
            .entries
            .insert(name.to_string(), DefinitionEntry::Leaf(entry));
        Ok(())
    }

    /// Remove the entry at `path`. Returns whether anything was removed.
    ///
    /// Directories left empty stay in the definition but are not written.
    pub fn remove(&mut self, path: &str) -> bool {
        let Ok((dirs, name)) = split_path(path) else {
            return false;
        };
        let mut current = self;
        for dir in dirs {
            current = match current.entries.get_mut(dir) {
                Some(DefinitionEntry::Tree(def)) => def,
                _ => return false,
            };
        }
        current.entries.remove(name).is_some()
    }

    /// Look up the node at `path`.
    pub fn get(&self, path: &str) -> Option<&DefinitionEntry> {
        let (dirs, name) = split_path(path).ok()?;
        let mut current = self;
        for dir in dirs {
            current = match current.entries.get(dir) {
                Some(DefinitionEntry::Tree(def)) => def,
                _ => return None,
            };
        }
        current.entries.get(name)
    }

    /// Number of direct entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the definition would produce an empty tree.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|node| match node {
            DefinitionEntry::Leaf(_) => false,
            DefinitionEntry::Tree(def) => !def.keep_empty && def.is_empty(),
        })
    }

    /// Whether this definition is written even when it has no entries.
    pub fn keeps_empty(&self) -> bool {
        self.keep_empty
    }

    /// Iterate direct entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DefinitionEntry)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }
}

fn split_path(path: &str) -> Result<(Vec<&str>, &str), StoreError> {
    let mut parts: Vec<&str> = path.split('/').collect();
    if parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: "empty or relative path component".to_string(),
        });
    }
    // split always yields at least one element
    let name = parts.pop().unwrap_or_default();
    Ok((parts, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(c: char) -> Oid {
        Oid::new(c.to_string().repeat(40)).unwrap()
    }

    mod entry_mode {
        use super::*;

        #[test]
        fn filemode_roundtrip() {
            for mode in [
                EntryMode::Blob,
                EntryMode::BlobExecutable,
                EntryMode::Link,
                EntryMode::Tree,
                EntryMode::Gitlink,
            ] {
                assert_eq!(EntryMode::from_filemode(mode.filemode()), Some(mode));
            }
        }

        #[test]
        fn group_writable_is_blob() {
            assert_eq!(EntryMode::from_filemode(0o100664), Some(EntryMode::Blob));
        }

        #[test]
        fn unknown_mode() {
            assert_eq!(EntryMode::from_filemode(0o777), None);
        }

        #[test]
        fn gitlink_points_at_commit() {
            assert_eq!(EntryMode::Gitlink.object_kind(), ObjectKind::Commit);
        }
    }

    mod definition {
        use super::*;

        #[test]
        fn add_creates_intermediate_dirs() {
            let mut def = TreeDefinition::new();
            def.add("a/b/c.txt", TreeEntry::new(oid('1'), EntryMode::Blob))
                .unwrap();

            assert_eq!(def.len(), 1);
            assert!(matches!(def.get("a"), Some(DefinitionEntry::Tree(_))));
            assert!(matches!(
                def.get("a/b/c.txt"),
                Some(DefinitionEntry::Leaf(e)) if e.target == oid('1')
            ));
        }

        #[test]
        fn add_replaces_existing() {
            let mut def = TreeDefinition::new();
            def.add("f", TreeEntry::new(oid('1'), EntryMode::Blob)).unwrap();
            def.add("f", TreeEntry::new(oid('2'), EntryMode::BlobExecutable))
                .unwrap();
            assert!(matches!(
                def.get("f"),
                Some(DefinitionEntry::Leaf(e)) if e.mode == EntryMode::BlobExecutable
            ));
        }

        #[test]
        fn add_through_leaf_fails() {
            let mut def = TreeDefinition::new();
            def.add("f", TreeEntry::new(oid('1'), EntryMode::Blob)).unwrap();
            let err = def
                .add("f/g", TreeEntry::new(oid('2'), EntryMode::Blob))
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidPath { .. }));
        }

        #[test]
        fn invalid_paths_rejected() {
            let mut def = TreeDefinition::new();
            let entry = TreeEntry::new(oid('1'), EntryMode::Blob);
            assert!(def.add("", entry.clone()).is_err());
            assert!(def.add("a//b", entry.clone()).is_err());
            assert!(def.add("../x", entry).is_err());
        }

        #[test]
        fn remove_nested() {
            let mut def = TreeDefinition::new();
            def.add("a/b", TreeEntry::new(oid('1'), EntryMode::Blob)).unwrap();
            assert!(def.remove("a/b"));
            assert!(!def.remove("a/b"));
            assert!(!def.remove("missing/path"));
            assert!(def.is_empty());
            assert_eq!(def.len(), 1);
        }

        #[test]
        fn empty_when_only_empty_dirs() {
            let mut def = TreeDefinition::new();
            assert!(def.is_empty());
            def.add("a/b", TreeEntry::new(oid('1'), EntryMode::Blob)).unwrap();
            assert!(!def.is_empty());
        }
    }
}

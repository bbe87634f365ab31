//! store::memory
//!
//! In-memory repository for deterministic testing.
//!
//! # Design
//!
//! `MemoryRepo` implements [`ObjectStore`] and [`RefStore`] entirely in
//! memory. Objects are content-addressed: ids are the SHA-256 of a canonical
//! serialization, so writing the same commit twice yields the same id, just
//! as it does in Git.
//!
//! Like a real repository it records a reflog line per reference mutation.
//! It also records every mutating call (see [`MockOperation`]) and can be
//! told to fail specific calls (see [`FailOn`]) to exercise error paths.
//!
//! # Example
//!
//! ```
//! use reweave::core::types::{RefName, Signature};
//! use reweave::store::memory::MemoryRepo;
//! use reweave::store::{ObjectStore, RefStore, RefTarget};
//!
//! let repo = MemoryRepo::new();
//! let sig = Signature::from_raw("Test", "test@example.com", 1_700_000_000, 0).unwrap();
//! let tree = repo.write_tree(&[("README", "hello")]).unwrap();
//! let root = repo.create_commit("root\n", &sig, &sig, &tree, &[]).unwrap();
//!
//! let main = RefName::new("refs/heads/main").unwrap();
//! repo.create_reference(&main, &RefTarget::Direct(root.clone()), false, "init").unwrap();
//! assert_eq!(repo.reflog(&main), vec!["init".to_string()]);
//! ```

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};

use super::traits::{
    Commit, Object, ObjectStore, RefStore, RefTarget, Reference, StoreError, TagAnnotation,
};
use super::tree::{DefinitionEntry, EntryMode, TreeDefinition, TreeEntry};
use crate::core::sort::CommitSort;
use crate::core::types::{ObjectKind, Oid, RefName, Signature};

/// In-memory repository.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepo {
    inner: Arc<Mutex<MemoryRepoInner>>,
}

#[derive(Debug, Default)]
struct MemoryRepoInner {
    objects: HashMap<Oid, StoredObject>,
    refs: BTreeMap<RefName, RefTarget>,
    head: Option<RefTarget>,
    reflogs: HashMap<RefName, Vec<String>>,
    fail_on: Vec<FailOn>,
    operations: Vec<MockOperation>,
}

#[derive(Debug, Clone)]
enum StoredObject {
    Commit(Commit),
    Tree(Vec<(String, TreeEntry)>),
    Blob(Vec<u8>),
    Tag(TagAnnotation),
}

/// A call that should fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    /// Every `create_commit`
    CreateCommit,
    /// Every `create_tag`
    CreateTag,
    /// `create_reference` for this name
    CreateRef(RefName),
    /// `update_target` for this name
    UpdateRef(RefName),
    /// `rename_reference` of this name
    RenameRef(RefName),
    /// `delete_reference` of this name
    DeleteRef(RefName),
}

/// Recorded mutating call, for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    CreateCommit { id: Oid },
    CreateTree { id: Oid },
    CreateTag { id: Oid, name: String },
    CreateRef { name: RefName, log_message: String },
    UpdateRef { name: RefName, log_message: String },
    RenameRef { from: RefName, to: RefName },
    DeleteRef { name: RefName },
}

impl MemoryRepo {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryRepoInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configure an additional call to fail.
    pub fn fail_on(&self, fail_on: FailOn) {
        self.state().fail_on.push(fail_on);
    }

    /// Clear all failure configuration.
    pub fn clear_fail_on(&self) {
        self.state().fail_on.clear();
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.state().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Reflog messages of a reference, oldest first.
    pub fn reflog(&self, name: &RefName) -> Vec<String> {
        self.state().reflogs.get(name).cloned().unwrap_or_default()
    }

    /// Snapshot of every reference (excluding `HEAD`), sorted by name.
    pub fn snapshot(&self) -> Vec<Reference> {
        self.state()
            .refs
            .iter()
            .map(|(name, target)| Reference {
                name: name.clone(),
                target: target.clone(),
            })
            .collect()
    }

    /// Point `HEAD` at a branch (symbolic) or an object (detached).
    pub fn set_head(&self, target: RefTarget) {
        self.state().head = Some(target);
    }

    /// The commit `HEAD` designates, following symbolic refs and tags.
    pub fn head_commit(&self) -> Result<Option<Oid>, StoreError> {
        use super::traits::Repository;

        let head = self.state().head.clone();
        match head {
            None => Ok(None),
            Some(target) => {
                let head_ref = Reference {
                    name: RefName::new("HEAD")?,
                    target,
                };
                self.reference_commit(&head_ref)
            }
        }
    }

    /// Store a blob.
    pub fn write_blob(&self, content: &[u8]) -> Oid {
        let mut hasher = Sha256::new();
        hasher.update(b"blob\n");
        hasher.update(content);
        let id = digest_oid(hasher);
        self.state()
            .objects
            .entry(id.clone())
            .or_insert_with(|| StoredObject::Blob(content.to_vec()));
        id
    }

    /// Read a blob's content.
    pub fn read_blob(&self, id: &Oid) -> Option<Vec<u8>> {
        match self.state().objects.get(id) {
            Some(StoredObject::Blob(content)) => Some(content.clone()),
            _ => None,
        }
    }

    /// Build a tree from `(path, content)` pairs.
    pub fn write_tree(&self, files: &[(&str, &str)]) -> Result<Oid, StoreError> {
        let mut def = TreeDefinition::new();
        for (path, content) in files {
            let blob = self.write_blob(content.as_bytes());
            def.add(path, TreeEntry::new(blob, EntryMode::Blob))?;
        }
        self.create_tree(&def)
    }

    fn check_fail(inner: &MemoryRepoInner, call: &FailOn, what: &str) -> Result<(), StoreError> {
        if inner.fail_on.contains(call) {
            return Err(StoreError::Backend {
                message: format!("injected failure: {what}"),
            });
        }
        Ok(())
    }

    fn log(inner: &mut MemoryRepoInner, name: &RefName, message: &str) {
        inner
            .reflogs
            .entry(name.clone())
            .or_default()
            .push(message.to_string());
    }

    fn write_tree_def(
        inner: &mut MemoryRepoInner,
        definition: &TreeDefinition,
    ) -> Result<Option<Oid>, StoreError> {
        let mut entries = Vec::new();
        for (name, node) in definition.entries() {
            let entry = match node {
                DefinitionEntry::Leaf(entry) => {
                    if entry.mode != EntryMode::Gitlink {
                        let found = inner.objects.get(&entry.target).map(stored_kind);
                        if found != Some(entry.mode.object_kind()) {
                            return Err(StoreError::ObjectNotFound {
                                oid: entry.target.to_string(),
                            });
                        }
                    }
                    entry.clone()
                }
                DefinitionEntry::Tree(sub) => match Self::write_tree_def(inner, sub)? {
                    Some(id) => TreeEntry::new(id, EntryMode::Tree),
                    None => continue,
                },
            };
            entries.push((name.to_string(), entry));
        }

        if entries.is_empty() && !definition.keeps_empty() {
            return Ok(None);
        }

        let mut hasher = Sha256::new();
        hasher.update(b"tree\n");
        for (name, entry) in &entries {
            hasher.update(format!("{:o} {}\0{}\n", entry.mode.filemode(), name, entry.target));
        }
        let id = digest_oid(hasher);
        inner
            .objects
            .entry(id.clone())
            .or_insert_with(|| StoredObject::Tree(entries.clone()));
        inner.operations.push(MockOperation::CreateTree { id: id.clone() });
        Ok(Some(id))
    }
}

fn stored_kind(object: &StoredObject) -> ObjectKind {
    match object {
        StoredObject::Commit(_) => ObjectKind::Commit,
        StoredObject::Tree(_) => ObjectKind::Tree,
        StoredObject::Blob(_) => ObjectKind::Blob,
        StoredObject::Tag(_) => ObjectKind::Tag,
    }
}

fn digest_oid(hasher: Sha256) -> Oid {
    Oid::new(hex::encode(hasher.finalize())).unwrap_or_else(|_| unreachable!("sha256 is 64 hex"))
}

fn signature_line(sig: &Signature) -> String {
    format!(
        "{} <{}> {} {}",
        sig.name,
        sig.email,
        sig.seconds(),
        sig.offset_minutes()
    )
}

impl ObjectStore for MemoryRepo {
    fn lookup(&self, id: &Oid) -> Result<Option<Object>, StoreError> {
        Ok(self.state().objects.get(id).map(|object| match object {
            StoredObject::Commit(commit) => Object::Commit(commit.clone()),
            StoredObject::Tree(_) => Object::Tree(id.clone()),
            StoredObject::Blob(_) => Object::Blob(id.clone()),
            StoredObject::Tag(tag) => Object::Tag(tag.clone()),
        }))
    }

    fn tree_entries(&self, tree: &Oid) -> Result<Vec<(String, TreeEntry)>, StoreError> {
        match self.state().objects.get(tree) {
            Some(StoredObject::Tree(entries)) => Ok(entries.clone()),
            Some(other) => Err(StoreError::WrongKind {
                oid: tree.to_string(),
                expected: ObjectKind::Tree,
                actual: stored_kind(other),
            }),
            None => Err(StoreError::ObjectNotFound {
                oid: tree.to_string(),
            }),
        }
    }

    fn create_commit(
        &self,
        message: &str,
        author: &Signature,
        committer: &Signature,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, StoreError> {
        self.create_commit_raw(message.as_bytes(), None, author, committer, tree, parents)
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
        let mut inner = self.state();
        Self::check_fail(&inner, &FailOn::CreateCommit, "create_commit")?;

        for (id, expected) in std::iter::once((tree, ObjectKind::Tree))
            .chain(parents.iter().map(|p| (p, ObjectKind::Commit)))
        {
            match inner.objects.get(id).map(stored_kind) {
                Some(kind) if kind == expected => {}
                Some(actual) => {
                    return Err(StoreError::WrongKind {
                        oid: id.to_string(),
                        expected,
                        actual,
                    })
                }
                None => {
                    return Err(StoreError::ObjectNotFound {
                        oid: id.to_string(),
                    })
                }
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(format!("commit\ntree {}\n", tree));
        for parent in parents {
            hasher.update(format!("parent {}\n", parent));
        }
        hasher.update(format!(
            "author {}\ncommitter {}\n",
            signature_line(author),
            signature_line(committer),
        ));
        if let Some(encoding) = encoding {
            hasher.update(format!("encoding {}\n", encoding));
        }
        hasher.update(b"\n");
        hasher.update(message);
        let id = digest_oid(hasher);

        inner.objects.entry(id.clone()).or_insert_with(|| {
            StoredObject::Commit(Commit {
                id: id.clone(),
                tree: tree.clone(),
                parents: parents.to_vec(),
                author: author.clone(),
                committer: committer.clone(),
                message: String::from_utf8_lossy(message).into_owned(),
                raw_message: message.to_vec(),
                encoding: encoding.map(str::to_string),
            })
        });
        inner
            .operations
            .push(MockOperation::CreateCommit { id: id.clone() });
        Ok(id)
    }

    fn create_tree(&self, definition: &TreeDefinition) -> Result<Oid, StoreError> {
        let mut inner = self.state();
        match Self::write_tree_def(&mut inner, definition)? {
            Some(id) => Ok(id),
            None => {
                // The empty tree is a valid object on its own.
                let mut hasher = Sha256::new();
                hasher.update(b"tree\n");
                let id = digest_oid(hasher);
                inner
                    .objects
                    .entry(id.clone())
                    .or_insert_with(|| StoredObject::Tree(Vec::new()));
                Ok(id)
            }
        }
    }

    fn create_tag(
        &self,
        name: &str,
        target: &Oid,
        tagger: Option<&Signature>,
        message: &str,
    ) -> Result<Oid, StoreError> {
        let mut inner = self.state();
        Self::check_fail(&inner, &FailOn::CreateTag, "create_tag")?;
        RefName::for_tag(name)?;

        let target_kind = inner
            .objects
            .get(target)
            .map(stored_kind)
            .ok_or_else(|| StoreError::ObjectNotFound {
                oid: target.to_string(),
            })?;

        let mut hasher = Sha256::new();
        hasher.update(format!(
            "tag\nobject {}\ntype {}\ntag {}\n",
            target, target_kind, name
        ));
        if let Some(tagger) = tagger {
            hasher.update(format!("tagger {}\n", signature_line(tagger)));
        }
        hasher.update(format!("\n{}", message));
        let id = digest_oid(hasher);

        inner.objects.entry(id.clone()).or_insert_with(|| {
            StoredObject::Tag(TagAnnotation {
                id: id.clone(),
                name: name.to_string(),
                target: target.clone(),
                target_kind,
                tagger: tagger.cloned(),
                message: message.to_string(),
            })
        });
        inner.operations.push(MockOperation::CreateTag {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    fn walk(&self, tips: &[Oid], sort: CommitSort) -> Result<Vec<Oid>, StoreError> {
        let inner = self.state();
        let commit = |id: &Oid| -> Result<Commit, StoreError> {
            match inner.objects.get(id) {
                Some(StoredObject::Commit(c)) => Ok(c.clone()),
                _ => Err(StoreError::ObjectNotFound {
                    oid: id.to_string(),
                }),
            }
        };

        // Discover every reachable commit, remembering discovery order.
        let mut order: Vec<Commit> = Vec::new();
        let mut index: HashMap<Oid, usize> = HashMap::new();
        let mut stack: Vec<Oid> = tips.iter().rev().cloned().collect();
        while let Some(id) = stack.pop() {
            if index.contains_key(&id) {
                continue;
            }
            let c = commit(&id)?;
            index.insert(id, order.len());
            stack.extend(c.parents.iter().rev().cloned());
            order.push(c);
        }

        let key = |i: usize| -> (i64, usize) {
            let time = if sort.time {
                order[i].committer.seconds()
            } else {
                0
            };
            (time, i)
        };

        let mut result: Vec<Oid> = if sort.topological {
            // Kahn's algorithm, parents first.
            let mut pending: Vec<usize> = order
                .iter()
                .map(|c| c.parents.iter().collect::<HashSet<_>>().len())
                .collect();
            let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
            for (i, c) in order.iter().enumerate() {
                for parent in c.parents.iter().collect::<HashSet<_>>() {
                    children.entry(index[parent]).or_default().push(i);
                }
            }

            let mut ready: BinaryHeap<Reverse<(i64, usize)>> = (0..order.len())
                .filter(|&i| pending[i] == 0)
                .map(|i| Reverse(key(i)))
                .collect();
            let mut out = Vec::with_capacity(order.len());
            while let Some(Reverse((_, i))) = ready.pop() {
                out.push(order[i].id.clone());
                for &child in children.get(&i).map(Vec::as_slice).unwrap_or_default() {
                    pending[child] -= 1;
                    if pending[child] == 0 {
                        ready.push(Reverse(key(child)));
                    }
                }
            }
            // Parents-first; flip to match the default children-first walk.
            out.reverse();
            out
        } else {
            let mut idx: Vec<usize> = (0..order.len()).collect();
            if sort.time {
                idx.sort_by_key(|&i| Reverse(key(i)));
            }
            idx.into_iter().map(|i| order[i].id.clone()).collect()
        };

        if sort.reverse {
            result.reverse();
        }
        Ok(result)
    }

    fn is_descendant_of(&self, commit: &Oid, ancestor: &Oid) -> Result<bool, StoreError> {
        let inner = self.state();
        let mut seen = HashSet::new();
        let mut stack = match inner.objects.get(commit) {
            Some(StoredObject::Commit(c)) => c.parents.clone(),
            _ => {
                return Err(StoreError::ObjectNotFound {
                    oid: commit.to_string(),
                })
            }
        };
        while let Some(id) = stack.pop() {
            if &id == ancestor {
                return Ok(true);
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(StoredObject::Commit(c)) = inner.objects.get(&id) {
                stack.extend(c.parents.iter().cloned());
            }
        }
        Ok(false)
    }
}

impl RefStore for MemoryRepo {
    fn references(&self) -> Result<Vec<Reference>, StoreError> {
        Ok(self.snapshot())
    }

    fn find_reference(&self, name: &RefName) -> Result<Option<Reference>, StoreError> {
        let inner = self.state();
        if name.as_str() == "HEAD" {
            return Ok(inner.head.clone().map(|target| Reference {
                name: name.clone(),
                target,
            }));
        }
        Ok(inner.refs.get(name).map(|target| Reference {
            name: name.clone(),
            target: target.clone(),
        }))
    }

    fn create_reference(
        &self,
        name: &RefName,
        target: &RefTarget,
        force: bool,
        log_message: &str,
    ) -> Result<Reference, StoreError> {
        let mut inner = self.state();
        Self::check_fail(&inner, &FailOn::CreateRef(name.clone()), "create_reference")?;
        if !force && inner.refs.contains_key(name) {
            return Err(StoreError::RefExists {
                refname: name.to_string(),
            });
        }
        if let RefTarget::Direct(oid) = target {
            if !inner.objects.contains_key(oid) {
                return Err(StoreError::ObjectNotFound {
                    oid: oid.to_string(),
                });
            }
        }

        inner.refs.insert(name.clone(), target.clone());
        Self::log(&mut inner, name, log_message);
        inner.operations.push(MockOperation::CreateRef {
            name: name.clone(),
            log_message: log_message.to_string(),
        });
        Ok(Reference {
            name: name.clone(),
            target: target.clone(),
        })
    }

    fn update_target(
        &self,
        reference: &Reference,
        target: &RefTarget,
        log_message: &str,
    ) -> Result<Reference, StoreError> {
        let mut inner = self.state();
        let name = &reference.name;
        Self::check_fail(&inner, &FailOn::UpdateRef(name.clone()), "update_target")?;
        if !inner.refs.contains_key(name) {
            return Err(StoreError::RefNotFound {
                refname: name.to_string(),
            });
        }
        if let RefTarget::Direct(oid) = target {
            if !inner.objects.contains_key(oid) {
                return Err(StoreError::ObjectNotFound {
                    oid: oid.to_string(),
                });
            }
        }

        inner.refs.insert(name.clone(), target.clone());
        Self::log(&mut inner, name, log_message);
        inner.operations.push(MockOperation::UpdateRef {
            name: name.clone(),
            log_message: log_message.to_string(),
        });
        Ok(Reference {
            name: name.clone(),
            target: target.clone(),
        })
    }

    fn rename_reference(
        &self,
        reference: &Reference,
        new_name: &RefName,
        log_message: &str,
    ) -> Result<Reference, StoreError> {
        let mut inner = self.state();
        let name = &reference.name;
        Self::check_fail(&inner, &FailOn::RenameRef(name.clone()), "rename_reference")?;
        if inner.refs.contains_key(new_name) {
            return Err(StoreError::RefExists {
                refname: new_name.to_string(),
            });
        }
        let target = inner
            .refs
            .remove(name)
            .ok_or_else(|| StoreError::RefNotFound {
                refname: name.to_string(),
            })?;

        inner.refs.insert(new_name.clone(), target.clone());
        let mut log = inner.reflogs.remove(name).unwrap_or_default();
        log.push(log_message.to_string());
        inner.reflogs.insert(new_name.clone(), log);
        inner.operations.push(MockOperation::RenameRef {
            from: name.clone(),
            to: new_name.clone(),
        });
        Ok(Reference {
            name: new_name.clone(),
            target,
        })
    }

    fn delete_reference(&self, name: &RefName) -> Result<(), StoreError> {
        let mut inner = self.state();
        Self::check_fail(&inner, &FailOn::DeleteRef(name.clone()), "delete_reference")?;
        if inner.refs.remove(name).is_none() {
            return Err(StoreError::RefNotFound {
                refname: name.to_string(),
            });
        }
        inner.reflogs.remove(name);
        inner
            .operations
            .push(MockOperation::DeleteRef { name: name.clone() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::traits::Repository;

    fn sig(seconds: i64) -> Signature {
        Signature::from_raw("Test", "test@example.com", seconds, 0).unwrap()
    }

    fn refname(name: &str) -> RefName {
        RefName::new(name).unwrap()
    }

    /// root <- a <- b, plus root <- c, merge m = (b, c)
    fn diamond(repo: &MemoryRepo) -> (Oid, Oid, Oid, Oid, Oid) {
        let tree = repo.write_tree(&[("f", "x")]).unwrap();
        let root = repo.create_commit("root", &sig(1), &sig(1), &tree, &[]).unwrap();
        let a = repo
            .create_commit("a", &sig(2), &sig(2), &tree, &[root.clone()])
            .unwrap();
        let b = repo
            .create_commit("b", &sig(3), &sig(3), &tree, &[a.clone()])
            .unwrap();
        let c = repo
            .create_commit("c", &sig(4), &sig(4), &tree, &[root.clone()])
            .unwrap();
        let m = repo
            .create_commit("m", &sig(5), &sig(5), &tree, &[b.clone(), c.clone()])
            .unwrap();
        (root, a, b, c, m)
    }

    mod objects {
        use super::*;

        #[test]
        fn commits_are_content_addressed() {
            let repo = MemoryRepo::new();
            let tree = repo.write_tree(&[("f", "x")]).unwrap();
            let one = repo.create_commit("msg", &sig(1), &sig(1), &tree, &[]).unwrap();
            let two = repo.create_commit("msg", &sig(1), &sig(1), &tree, &[]).unwrap();
            let other = repo.create_commit("msg2", &sig(1), &sig(1), &tree, &[]).unwrap();
            assert_eq!(one, two);
            assert_ne!(one, other);
        }

        #[test]
        fn raw_commits_keep_bytes_and_encoding() {
            let repo = MemoryRepo::new();
            let tree = repo.write_tree(&[("f", "x")]).unwrap();
            let latin1 = b"caf\xe9\n";
            let id = repo
                .create_commit_raw(latin1, Some("ISO-8859-1"), &sig(1), &sig(1), &tree, &[])
                .unwrap();
            let commit = repo.find_commit(&id).unwrap();
            assert_eq!(commit.raw_message, latin1.to_vec());
            assert_eq!(commit.encoding.as_deref(), Some("ISO-8859-1"));
            assert_eq!(commit.message, "caf\u{fffd}\n");

            let plain = repo
                .create_commit_raw(latin1, None, &sig(1), &sig(1), &tree, &[])
                .unwrap();
            assert_ne!(id, plain);
        }

        #[test]
        fn commit_with_missing_parent_fails() {
            let repo = MemoryRepo::new();
            let tree = repo.write_tree(&[("f", "x")]).unwrap();
            let ghost = Oid::new("1".repeat(40)).unwrap();
            let err = repo
                .create_commit("msg", &sig(1), &sig(1), &tree, &[ghost])
                .unwrap_err();
            assert!(matches!(err, StoreError::ObjectNotFound { .. }));
        }

        #[test]
        fn tree_roundtrip_through_definition() {
            let repo = MemoryRepo::new();
            let tree = repo
                .write_tree(&[("README", "hi"), ("src/lib.rs", "fn main() {}")])
                .unwrap();
            let def = TreeDefinition::from_tree(&repo, &tree).unwrap();
            assert_eq!(repo.create_tree(&def).unwrap(), tree);
        }

        #[test]
        fn empty_subtrees_are_not_written() {
            let repo = MemoryRepo::new();
            let with_dir = repo.write_tree(&[("README", "hi"), ("dir/file", "x")]).unwrap();
            let without = repo.write_tree(&[("README", "hi")]).unwrap();

            let mut def = TreeDefinition::from_tree(&repo, &with_dir).unwrap();
            assert!(def.remove("dir/file"));
            assert_eq!(repo.create_tree(&def).unwrap(), without);
        }

        #[test]
        fn existing_empty_subtrees_survive_roundtrip() {
            let repo = MemoryRepo::new();
            let empty = repo.create_tree(&TreeDefinition::new()).unwrap();
            let mut def = TreeDefinition::new();
            def.add("README", TreeEntry::new(repo.write_blob(b"hi"), EntryMode::Blob))
                .unwrap();
            def.add("empty", TreeEntry::new(empty, EntryMode::Tree)).unwrap();
            let tree = repo.create_tree(&def).unwrap();

            let copy = TreeDefinition::from_tree(&repo, &tree).unwrap();
            assert!(!copy.is_empty());
            assert_eq!(repo.create_tree(&copy).unwrap(), tree);
        }

        #[test]
        fn empty_definition_yields_empty_tree() {
            let repo = MemoryRepo::new();
            let empty = repo.create_tree(&TreeDefinition::new()).unwrap();
            assert!(repo.tree_entries(&empty).unwrap().is_empty());
        }

        #[test]
        fn tags_record_target_kind() {
            let repo = MemoryRepo::new();
            let (root, ..) = diamond(&repo);
            let tag = repo.create_tag("v1", &root, Some(&sig(9)), "release").unwrap();
            match repo.lookup(&tag).unwrap() {
                Some(Object::Tag(annotation)) => {
                    assert_eq!(annotation.target, root);
                    assert_eq!(annotation.target_kind, ObjectKind::Commit);
                    assert_eq!(annotation.name, "v1");
                }
                other => panic!("expected tag, got {:?}", other),
            }
        }

        #[test]
        fn lookup_missing_is_none() {
            let repo = MemoryRepo::new();
            let ghost = Oid::new("2".repeat(40)).unwrap();
            assert!(repo.lookup(&ghost).unwrap().is_none());
        }
    }

    mod walk {
        use super::*;

        fn position(order: &[Oid], id: &Oid) -> usize {
            order.iter().position(|o| o == id).unwrap()
        }

        #[test]
        fn rewrite_order_puts_parents_first() {
            let repo = MemoryRepo::new();
            let (root, a, b, c, m) = diamond(&repo);
            let order = repo.walk(&[m.clone()], CommitSort::rewrite_order()).unwrap();

            assert_eq!(order.len(), 5);
            assert_eq!(order[0], root);
            assert!(position(&order, &a) < position(&order, &b));
            assert!(position(&order, &b) < position(&order, &m));
            assert!(position(&order, &c) < position(&order, &m));
        }

        #[test]
        fn topological_puts_children_first() {
            let repo = MemoryRepo::new();
            let (root, _, _, _, m) = diamond(&repo);
            let order = repo.walk(&[m.clone()], CommitSort::TOPOLOGICAL).unwrap();
            assert_eq!(order[0], m);
            assert_eq!(order[order.len() - 1], root);
        }

        #[test]
        fn multiple_tips_are_deduplicated() {
            let repo = MemoryRepo::new();
            let (_, a, b, _, m) = diamond(&repo);
            let order = repo
                .walk(&[m, b, a], CommitSort::rewrite_order())
                .unwrap();
            assert_eq!(order.len(), 5);
        }

        #[test]
        fn descendant_queries() {
            let repo = MemoryRepo::new();
            let (root, a, b, c, m) = diamond(&repo);
            assert!(repo.is_descendant_of(&m, &root).unwrap());
            assert!(repo.is_descendant_of(&b, &a).unwrap());
            assert!(!repo.is_descendant_of(&b, &c).unwrap());
            assert!(!repo.is_descendant_of(&a, &a).unwrap());
        }
    }

    mod refs {
        use super::*;

        #[test]
        fn create_refuses_overwrite_without_force() {
            let repo = MemoryRepo::new();
            let (root, a, ..) = diamond(&repo);
            let main = refname("refs/heads/main");
            repo.create_reference(&main, &RefTarget::Direct(root), false, "one")
                .unwrap();
            let err = repo
                .create_reference(&main, &RefTarget::Direct(a.clone()), false, "two")
                .unwrap_err();
            assert!(matches!(err, StoreError::RefExists { .. }));

            repo.create_reference(&main, &RefTarget::Direct(a.clone()), true, "three")
                .unwrap();
            assert_eq!(
                repo.find_reference(&main).unwrap().unwrap().target,
                RefTarget::Direct(a)
            );
        }

        #[test]
        fn rename_moves_reflog() {
            let repo = MemoryRepo::new();
            let (root, ..) = diamond(&repo);
            let old = refname("refs/tags/v1");
            let new = refname("refs/tags/v1_new");
            let reference = repo
                .create_reference(&old, &RefTarget::Direct(root), false, "create")
                .unwrap();
            repo.rename_reference(&reference, &new, "rename").unwrap();

            assert!(repo.find_reference(&old).unwrap().is_none());
            assert_eq!(repo.reflog(&new), vec!["create", "rename"]);
        }

        #[test]
        fn injected_failures() {
            let repo = MemoryRepo::new();
            let (root, a, ..) = diamond(&repo);
            let main = refname("refs/heads/main");
            let reference = repo
                .create_reference(&main, &RefTarget::Direct(root), false, "create")
                .unwrap();
            repo.fail_on(FailOn::UpdateRef(main.clone()));
            assert!(repo
                .update_target(&reference, &RefTarget::Direct(a.clone()), "x")
                .is_err());
            repo.clear_fail_on();
            assert!(repo
                .update_target(&reference, &RefTarget::Direct(a), "x")
                .is_ok());
        }

        #[test]
        fn reachability_oracle() {
            let repo = MemoryRepo::new();
            let (root, a, b, c, _) = diamond(&repo);
            repo.create_reference(&refname("refs/heads/b"), &RefTarget::Direct(b), false, "")
                .unwrap();
            repo.create_reference(&refname("refs/heads/c"), &RefTarget::Direct(c), false, "")
                .unwrap();
            repo.create_reference(
                &refname("refs/heads/alias"),
                &RefTarget::Symbolic(refname("refs/heads/b")),
                false,
                "",
            )
            .unwrap();

            let targets: HashSet<Oid> = [a].into_iter().collect();
            let names: Vec<String> = repo
                .reachable_from(&targets)
                .unwrap()
                .into_iter()
                .map(|r| r.name.to_string())
                .collect();
            assert_eq!(names, vec!["refs/heads/alias", "refs/heads/b"]);

            let targets: HashSet<Oid> = [root].into_iter().collect();
            assert_eq!(repo.reachable_from(&targets).unwrap().len(), 3);
            assert!(repo.reachable_from(&HashSet::new()).unwrap().is_empty());
        }

        #[test]
        fn reference_depth_counts_symbolic_hops() {
            let repo = MemoryRepo::new();
            let (root, ..) = diamond(&repo);
            let main = repo
                .create_reference(&refname("refs/heads/main"), &RefTarget::Direct(root), false, "")
                .unwrap();
            let one = repo
                .create_reference(
                    &refname("refs/sym/one"),
                    &RefTarget::Symbolic(main.name.clone()),
                    false,
                    "",
                )
                .unwrap();
            let two = repo
                .create_reference(
                    &refname("refs/sym/two"),
                    &RefTarget::Symbolic(one.name.clone()),
                    false,
                    "",
                )
                .unwrap();
            let dangling = Reference::symbolic(refname("refs/sym/x"), refname("refs/heads/gone"));

            assert_eq!(repo.reference_depth(&main).unwrap(), 1);
            assert_eq!(repo.reference_depth(&one).unwrap(), 2);
            assert_eq!(repo.reference_depth(&two).unwrap(), 3);
            assert_eq!(repo.reference_depth(&dangling).unwrap(), 2);
        }

        #[test]
        fn symbolic_loop_is_detected() {
            let repo = MemoryRepo::new();
            let a = refname("refs/sym/a");
            let b = refname("refs/sym/b");
            repo.create_reference(&a, &RefTarget::Symbolic(b.clone()), false, "")
                .unwrap();
            let b_ref = repo
                .create_reference(&b, &RefTarget::Symbolic(a), false, "")
                .unwrap();
            assert!(matches!(
                repo.resolve_to_direct(&b_ref),
                Err(StoreError::SymbolicChainTooDeep { .. })
            ));
            assert!(repo.reference_depth(&b_ref).is_err());
        }

        #[test]
        fn head_follows_symbolic_target() {
            let repo = MemoryRepo::new();
            let (root, ..) = diamond(&repo);
            let main = refname("refs/heads/main");
            repo.create_reference(&main, &RefTarget::Direct(root.clone()), false, "")
                .unwrap();
            repo.set_head(RefTarget::Symbolic(main));
            assert_eq!(repo.head_commit().unwrap(), Some(root));
        }
    }
}

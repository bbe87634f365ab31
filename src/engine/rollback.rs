//! engine::rollback
//!
//! Undo log for reference changes made during a rewrite.
//!
//! Each reference mutation pushes its inverse onto a [`RollbackLog`]. When a
//! rewrite fails, the log is replayed newest first, so a reference that was
//! updated and then renamed is renamed back before its target is restored.
//!
//! # Best effort
//!
//! Replay never stops at the first failure. Every inverse action is tried and
//! the outcome of each is collected in a [`RollbackResult`]. New objects
//! created by the rewrite are never removed; they are unreferenced once the
//! references are restored.

use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::RefName;
use crate::store::{RefStore, RefTarget, Reference, StoreError};

#[derive(Debug, Error)]
pub enum RollbackError {
    /// The reference to restore no longer exists.
    #[error("cannot restore {refname}: reference is missing")]
    Missing {
        /// The reference that vanished.
        refname: String,
    },

    /// The store rejected an inverse action.
    #[error("store error during rollback of {refname}: {source}")]
    Store {
        /// The reference being restored.
        refname: String,
        /// The underlying failure.
        #[source]
        source: StoreError,
    },
}

/// The inverse of one reference mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackAction {
    /// Remove a backup reference that was created.
    DeleteBackup { name: RefName },
    /// Recreate a reference that was deleted.
    Recreate { reference: Reference },
    /// Point a reference back at its original target.
    RestoreTarget { name: RefName, target: RefTarget },
    /// Rename a reference back to its original name.
    RenameBack { current: RefName, original: RefName },
}

impl RollbackAction {
    /// The reference this action restores.
    pub fn refname(&self) -> &RefName {
        match self {
            RollbackAction::DeleteBackup { name } => name,
            RollbackAction::Recreate { reference } => &reference.name,
            RollbackAction::RestoreTarget { name, .. } => name,
            RollbackAction::RenameBack { original, .. } => original,
        }
    }

    fn apply<S: RefStore + ?Sized>(&self, store: &S, log_message: &str) -> Result<(), RollbackError> {
        let refname = self.refname().to_string();
        let store_err = |source: StoreError| RollbackError::Store {
            refname: refname.clone(),
            source,
        };

        match self {
            RollbackAction::DeleteBackup { name } => {
                store.delete_reference(name).map_err(store_err)?;
            }
            RollbackAction::Recreate { reference } => {
                store
                    .create_reference(&reference.name, &reference.target, true, log_message)
                    .map_err(store_err)?;
            }
            RollbackAction::RestoreTarget { name, target } => {
                let current = store
                    .find_reference(name)
                    .map_err(store_err)?
                    .ok_or_else(|| RollbackError::Missing {
                        refname: refname.clone(),
                    })?;
                store
                    .update_target(&current, target, log_message)
                    .map_err(store_err)?;
            }
            RollbackAction::RenameBack { current, original } => {
                let moved = store
                    .find_reference(current)
                    .map_err(store_err)?
                    .ok_or_else(|| RollbackError::Missing {
                        refname: current.to_string(),
                    })?;
                store
                    .rename_reference(&moved, original, log_message)
                    .map_err(store_err)?;
            }
        }
        Ok(())
    }
}

/// Inverse actions recorded during a rewrite, oldest first.
#[derive(Debug, Default)]
pub struct RollbackLog {
    actions: Vec<RollbackAction>,
}

impl RollbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the inverse of a mutation that just succeeded.
    pub fn push(&mut self, action: RollbackAction) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Recorded actions, oldest first.
    pub fn actions(&self) -> &[RollbackAction] {
        &self.actions
    }

    /// Apply every inverse action, newest first, and empty the log.
    pub fn replay<S: RefStore + ?Sized>(&mut self, store: &S, log_message: &str) -> RollbackResult {
        let mut result = RollbackResult::new();
        for action in self.actions.drain(..).rev() {
            let refname = action.refname().clone();
            match action.apply(store, log_message) {
                Ok(()) => {
                    debug!(refname = %refname, ?action, "rolled back");
                    result.restored.push(refname);
                }
                Err(e) => {
                    warn!(refname = %refname, error = %e, "rollback step failed");
                    result.failures.push((refname, e));
                }
            }
        }
        result
    }
}

/// What a replay managed to undo.
#[derive(Debug, Default)]
pub struct RollbackResult {
    /// References whose inverse action applied, in replay order
    pub restored: Vec<RefName>,
    pub failures: Vec<(RefName, RollbackError)>,
}

impl RollbackResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl std::fmt::Display for RollbackResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_complete() {
            write!(f, "restored {} reference change(s)", self.restored.len())
        } else {
            write!(
                f,
                "rollback incomplete: {} restored, {} failed",
                self.restored.len(),
                self.failures.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Oid, Signature};
    use crate::store::memory::{FailOn, MemoryRepo};
    use crate::store::ObjectStore;

    fn refname(name: &str) -> RefName {
        RefName::new(name).unwrap()
    }

    fn two_commits(repo: &MemoryRepo) -> (Oid, Oid) {
        let sig = Signature::from_raw("T", "t@example.com", 1, 0).unwrap();
        let tree = repo.write_tree(&[("f", "x")]).unwrap();
        let a = repo.create_commit("a", &sig, &sig, &tree, &[]).unwrap();
        let b = repo.create_commit("b", &sig, &sig, &tree, &[a.clone()]).unwrap();
        (a, b)
    }

    mod result {
        use super::*;

        #[test]
        fn empty_result_is_complete() {
            let result = RollbackResult::new();
            assert!(result.is_complete());
            assert_eq!(result.to_string(), "restored 0 reference change(s)");
        }

        #[test]
        fn any_failure_makes_it_incomplete() {
            let result = RollbackResult {
                restored: vec![refname("refs/heads/a")],
                failures: vec![(
                    refname("refs/heads/b"),
                    RollbackError::Missing {
                        refname: "refs/heads/b".to_string(),
                    },
                )],
            };
            assert!(!result.is_complete());
            assert_eq!(
                result.to_string(),
                "rollback incomplete: 1 restored, 1 failed"
            );
        }
    }

    mod replay {
        use super::*;

        #[test]
        fn update_and_rename_are_undone_in_reverse() {
            let repo = MemoryRepo::new();
            let (a, b) = two_commits(&repo);
            let tag = refname("refs/tags/v1");
            let renamed = refname("refs/tags/v1_new");
            let backup = refname("refs/original/tags/v1");
            let original = repo
                .create_reference(&tag, &RefTarget::Direct(a.clone()), false, "init")
                .unwrap();

            let mut log = RollbackLog::new();
            repo.create_reference(&backup, &original.target, false, "backup")
                .unwrap();
            log.push(RollbackAction::DeleteBackup {
                name: backup.clone(),
            });
            let updated = repo
                .update_target(&original, &RefTarget::Direct(b), "rewrite")
                .unwrap();
            log.push(RollbackAction::RestoreTarget {
                name: tag.clone(),
                target: original.target.clone(),
            });
            repo.rename_reference(&updated, &renamed, "rewrite").unwrap();
            log.push(RollbackAction::RenameBack {
                current: renamed.clone(),
                original: tag.clone(),
            });

            let result = log.replay(&repo, "filter-branch: abort");
            assert!(result.is_complete(), "{result}");
            assert!(log.is_empty());
            assert_eq!(repo.find_reference(&tag).unwrap(), Some(original));
            assert!(repo.find_reference(&renamed).unwrap().is_none());
            assert!(repo.find_reference(&backup).unwrap().is_none());
            assert_eq!(
                repo.reflog(&tag).last().map(String::as_str),
                Some("filter-branch: abort")
            );
        }

        #[test]
        fn recreate_deleted_reference() {
            let repo = MemoryRepo::new();
            let (a, _) = two_commits(&repo);
            let main = refname("refs/heads/main");
            let reference = repo
                .create_reference(&main, &RefTarget::Direct(a), false, "init")
                .unwrap();
            repo.delete_reference(&main).unwrap();

            let mut log = RollbackLog::new();
            log.push(RollbackAction::Recreate {
                reference: reference.clone(),
            });
            assert!(log.replay(&repo, "abort").is_complete());
            assert_eq!(repo.find_reference(&main).unwrap(), Some(reference));
        }

        #[test]
        fn continues_past_failures() {
            let repo = MemoryRepo::new();
            let (a, _) = two_commits(&repo);
            let keep = refname("refs/original/heads/keep");
            let drop = refname("refs/original/heads/drop");
            repo.create_reference(&keep, &RefTarget::Direct(a.clone()), false, "")
                .unwrap();
            repo.create_reference(&drop, &RefTarget::Direct(a), false, "")
                .unwrap();
            repo.fail_on(FailOn::DeleteRef(keep.clone()));

            let mut log = RollbackLog::new();
            log.push(RollbackAction::DeleteBackup { name: drop.clone() });
            log.push(RollbackAction::DeleteBackup { name: keep.clone() });
            log.push(RollbackAction::RestoreTarget {
                name: refname("refs/heads/gone"),
                target: RefTarget::Symbolic(refname("refs/heads/main")),
            });

            let result = log.replay(&repo, "abort");
            assert!(!result.is_complete());
            assert_eq!(result.restored, vec![drop]);
            assert_eq!(result.failures.len(), 2);
            assert!(matches!(result.failures[0].1, RollbackError::Missing { .. }));
            assert!(matches!(result.failures[1].1, RollbackError::Store { .. }));
        }
    }
}

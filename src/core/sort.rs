//! core::sort
//!
//! Commit walk ordering.
//!
//! A [`CommitSort`] is a combination of three independent flags. Not every
//! combination is meaningful for every caller, so each consumer validates
//! against a fixed set of accepted combinations with a pure function instead
//! of keeping a mutable allow-list around.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected walk ordering.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported commit ordering '{sort}' for {purpose}")]
pub struct SortError {
    /// The rejected ordering
    pub sort: CommitSort,
    /// What the ordering was requested for
    pub purpose: &'static str,
}

/// Ordering of a commit walk.
///
/// # Example
///
/// ```
/// use reweave::core::sort::CommitSort;
///
/// let sort = CommitSort::TOPOLOGICAL.reversed();
/// assert!(sort.validate_for_rewrite().is_ok());
/// assert!(CommitSort::TIME.validate_for_rewrite().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CommitSort {
    /// Parents are never shown before their children
    pub topological: bool,
    /// Order by commit time
    pub time: bool,
    /// Iterate in the opposite direction
    pub reverse: bool,
}

impl CommitSort {
    /// Unspecified order (whatever the backend yields).
    pub const NONE: CommitSort = CommitSort {
        topological: false,
        time: false,
        reverse: false,
    };

    /// Children before parents.
    pub const TOPOLOGICAL: CommitSort = CommitSort {
        topological: true,
        time: false,
        reverse: false,
    };

    /// Newest commit time first.
    pub const TIME: CommitSort = CommitSort {
        topological: false,
        time: true,
        reverse: false,
    };

    /// Orderings under which a rewrite walk visits parents before children.
    const REWRITE_ALLOWED: [CommitSort; 2] = [
        CommitSort {
            topological: true,
            time: false,
            reverse: true,
        },
        CommitSort {
            topological: true,
            time: true,
            reverse: true,
        },
    ];

    /// The ordering used by history rewriting: oldest first, parents before children.
    pub const fn rewrite_order() -> CommitSort {
        Self::REWRITE_ALLOWED[0]
    }

    /// Combine with another ordering (flag union).
    pub const fn union(self, other: CommitSort) -> CommitSort {
        CommitSort {
            topological: self.topological || other.topological,
            time: self.time || other.time,
            reverse: self.reverse || other.reverse,
        }
    }

    /// The same ordering, iterated in the opposite direction.
    pub const fn reversed(self) -> CommitSort {
        CommitSort {
            reverse: true,
            ..self
        }
    }

    /// Check that the walk visits every parent before its children.
    pub fn validate_for_rewrite(self) -> Result<(), SortError> {
        Self::check(self, &Self::REWRITE_ALLOWED, "history rewriting")
    }

    fn check(
        sort: CommitSort,
        allowed: &[CommitSort],
        purpose: &'static str,
    ) -> Result<(), SortError> {
        if allowed.contains(&sort) {
            Ok(())
        } else {
            Err(SortError { sort, purpose })
        }
    }
}

impl std::fmt::Display for CommitSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.topological {
            parts.push("topological");
        }
        if self.time {
            parts.push("time");
        }
        if self.reverse {
            parts.push("reverse");
        }
        if parts.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&parts.join("|"))
        }
    }
}

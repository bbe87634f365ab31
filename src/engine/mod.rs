//! engine
//!
//! History rewriting: walk a commit graph parents first, rebuild the
//! targeted commits through caller-supplied rewriters, then move every
//! affected reference onto the new history.
//!
//! # Architecture
//!
//! - [`options`] - the caller's rewriters, hooks and naming settings
//! - [`rewriter`] - the single-use [`HistoryRewriter`]
//! - [`rollback`] - undo log replayed when a rewrite fails
//!
//! The engine is generic over [`crate::store::Repository`] and never touches
//! a concrete repository. It is single-threaded and assumes exclusive
//! access to the repository while it runs.

pub mod options;
pub mod rewriter;
pub mod rollback;

pub use options::{
    CommitHeader, RewriteOptions, DEFAULT_BACKUP_NAMESPACE, DEFAULT_REFLOG_PREFIX,
};
pub use rewriter::{
    rewrite_history, CallbackStage, HistoryRewriter, RefUpdate, RewriteError, RewriteSummary,
};
pub use rollback::{RollbackAction, RollbackError, RollbackLog, RollbackResult};

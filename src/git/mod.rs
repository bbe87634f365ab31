//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to libgit2. No other module imports
//! `git2`. [`Git`] implements the store traits, so the history rewriter runs
//! against a real repository exactly as it runs against
//! [`crate::store::memory::MemoryRepo`] in tests.
//!
//! # Responsibilities
//!
//! - Repository discovery and opening
//! - Object lookup and creation (commits, trees, annotated tags)
//! - Reference enumeration and mutation, with reflog messages
//! - Commit walks and ancestry queries
//! - Revision parsing for the command line

mod interface;

pub use interface::{store_error, Git, GitError, RepoInfo};

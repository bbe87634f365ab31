//! reweave - rewrite git history with reference backup and rollback
//!
//! reweave rebuilds a selected set of commits through caller-supplied
//! rewriters (header, tree, parents), carries every descendant onto the new
//! history, rewrites annotated tags and moves branches and tags onto the new
//! commits. Each moved reference is first backed up; if anything fails, all
//! reference changes are undone.
//!
//! # Architecture
//!
//! - [`core`] - Domain types, configuration, paths and the repository lock
//! - [`store`] - Repository contracts, tree definitions and an in-memory store
//! - [`engine`] - The history rewriter and its rollback log
//! - [`git`] - libgit2-backed implementation of the store contracts
//! - [`cli`] - The `reweave` command-line host
//! - [`ui`] - Output formatting
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use reweave::engine::{rewrite_history, CommitHeader, RewriteOptions};
//! use reweave::git::Git;
//!
//! let git = Git::open(Path::new(".")).unwrap();
//! let targets = git.revision_commits(&["HEAD".to_string()]).unwrap();
//! let options = RewriteOptions::new().with_header_rewriter(|commit| {
//!     let mut header = CommitHeader::from_commit(commit);
//!     header.message = header.message.replace("teh", "the");
//!     Ok(header)
//! });
//! let summary = rewrite_history(&git, targets, options).unwrap();
//! println!("{} commits rewritten", summary.commits_rewritten);
//! ```

pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod store;
pub mod ui;
